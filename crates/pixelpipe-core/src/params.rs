//! Token-addressed parameter blocks.
//!
//! Every module carries two blocks: the live block the UI edits and a
//! committed snapshot with a layout fixed at module creation. Parameters are
//! addressed by token through a [`ParamLayout`] describing kind, count and
//! byte offset of each entry. Accessors copy values out rather than
//! reinterpreting the raw bytes in place, so the block itself needs no
//! alignment guarantees.

use std::sync::Arc;

use crate::token::Token;
use crate::{Error, Result};

/// Element kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    F32,
    I32,
    /// Fixed-size byte string, NUL padded.
    Str,
}

impl ParamKind {
    pub fn elem_size(self) -> usize {
        match self {
            ParamKind::F32 | ParamKind::I32 => 4,
            ParamKind::Str => 1,
        }
    }
}

/// One named parameter inside a layout.
#[derive(Debug, Clone)]
pub struct ParamDesc {
    pub name: Token,
    pub kind: ParamKind,
    pub count: usize,
    pub offset: usize,
}

/// Byte layout of a parameter block. Fixed once built, shared by all
/// instances of a module type.
#[derive(Debug, Default, Clone)]
pub struct ParamLayout {
    descs: Vec<ParamDesc>,
    defaults: Vec<u8>,
}

impl ParamLayout {
    pub fn builder() -> ParamLayoutBuilder {
        ParamLayoutBuilder::default()
    }

    pub fn size(&self) -> usize {
        self.defaults.len()
    }

    pub fn descs(&self) -> &[ParamDesc] {
        &self.descs
    }

    pub fn find(&self, name: Token) -> Option<&ParamDesc> {
        self.descs.iter().find(|d| d.name == name)
    }
}

/// Builds a [`ParamLayout`], assigning 4-byte aligned offsets in declaration
/// order and recording default values.
#[derive(Default)]
pub struct ParamLayoutBuilder {
    descs: Vec<ParamDesc>,
    defaults: Vec<u8>,
}

impl ParamLayoutBuilder {
    fn align4(&mut self) {
        while self.defaults.len() % 4 != 0 {
            self.defaults.push(0);
        }
    }

    pub fn f32(mut self, name: &str, count: usize, defaults: &[f32]) -> Self {
        self.align4();
        let offset = self.defaults.len();
        for i in 0..count {
            let v = defaults.get(i).copied().unwrap_or(0.0);
            self.defaults.extend_from_slice(&v.to_ne_bytes());
        }
        self.descs.push(ParamDesc {
            name: Token::new(name),
            kind: ParamKind::F32,
            count,
            offset,
        });
        self
    }

    pub fn i32(mut self, name: &str, count: usize, defaults: &[i32]) -> Self {
        self.align4();
        let offset = self.defaults.len();
        for i in 0..count {
            let v = defaults.get(i).copied().unwrap_or(0);
            self.defaults.extend_from_slice(&v.to_ne_bytes());
        }
        self.descs.push(ParamDesc {
            name: Token::new(name),
            kind: ParamKind::I32,
            count,
            offset,
        });
        self
    }

    pub fn string(mut self, name: &str, len: usize, default: &str) -> Self {
        self.align4();
        let offset = self.defaults.len();
        let mut bytes = vec![0u8; len];
        for (dst, src) in bytes.iter_mut().zip(default.bytes()) {
            *dst = src;
        }
        self.defaults.extend_from_slice(&bytes);
        self.descs.push(ParamDesc {
            name: Token::new(name),
            kind: ParamKind::Str,
            count: len,
            offset,
        });
        self
    }

    pub fn build(self) -> ParamLayout {
        ParamLayout {
            descs: self.descs,
            defaults: self.defaults,
        }
    }
}

/// A parameter block: a layout plus its current bytes.
#[derive(Debug, Clone)]
pub struct ParamBlock {
    layout: Arc<ParamLayout>,
    data: Vec<u8>,
}

impl ParamBlock {
    /// A block initialized to the layout's defaults.
    pub fn new(layout: Arc<ParamLayout>) -> Self {
        let data = layout.defaults.clone();
        Self { layout, data }
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite the whole block. The size is fixed at creation.
    pub fn copy_from(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.data.len() {
            return Err(Error::InvalidGraph(format!(
                "parameter block size mismatch: {} vs {}",
                bytes.len(),
                self.data.len()
            )));
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    fn desc(&self, name: Token, kind: ParamKind) -> Result<&ParamDesc> {
        let desc = self
            .layout
            .find(name)
            .ok_or_else(|| Error::InvalidGraph(format!("no parameter '{}'", name)))?;
        if desc.kind != kind {
            return Err(Error::InvalidGraph(format!(
                "parameter '{}' has kind {:?}",
                name, desc.kind
            )));
        }
        Ok(desc)
    }

    pub fn f32s(&self, name: Token) -> Result<Vec<f32>> {
        let desc = self.desc(name, ParamKind::F32)?;
        Ok((0..desc.count)
            .map(|i| {
                let off = desc.offset + 4 * i;
                f32::from_ne_bytes(self.data[off..off + 4].try_into().unwrap())
            })
            .collect())
    }

    pub fn i32s(&self, name: Token) -> Result<Vec<i32>> {
        let desc = self.desc(name, ParamKind::I32)?;
        Ok((0..desc.count)
            .map(|i| {
                let off = desc.offset + 4 * i;
                i32::from_ne_bytes(self.data[off..off + 4].try_into().unwrap())
            })
            .collect())
    }

    /// String parameter, truncated at the first NUL.
    pub fn string(&self, name: Token) -> Result<String> {
        let desc = self.desc(name, ParamKind::Str)?;
        let bytes = &self.data[desc.offset..desc.offset + desc.count];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn set_f32s(&mut self, name: Token, values: &[f32]) -> Result<()> {
        let desc = self.desc(name, ParamKind::F32)?.clone();
        for (i, v) in values.iter().enumerate().take(desc.count) {
            let off = desc.offset + 4 * i;
            self.data[off..off + 4].copy_from_slice(&v.to_ne_bytes());
        }
        Ok(())
    }

    pub fn set_i32s(&mut self, name: Token, values: &[i32]) -> Result<()> {
        let desc = self.desc(name, ParamKind::I32)?.clone();
        for (i, v) in values.iter().enumerate().take(desc.count) {
            let off = desc.offset + 4 * i;
            self.data[off..off + 4].copy_from_slice(&v.to_ne_bytes());
        }
        Ok(())
    }

    pub fn set_string(&mut self, name: Token, value: &str) -> Result<()> {
        let desc = self.desc(name, ParamKind::Str)?.clone();
        let dst = &mut self.data[desc.offset..desc.offset + desc.count];
        dst.fill(0);
        for (d, s) in dst.iter_mut().zip(value.bytes()) {
            *d = s;
        }
        Ok(())
    }
}
