//! Regions of interest.
//!
//! A ROI describes the rectangle and scale a connector will actually produce
//! or consume. `full_wd`/`full_ht` are facts about the conceptual
//! full-resolution source; `wd`/`ht`/`scale` are written by the two-pass
//! negotiation. During the backward (request) pass a `wd` or `ht` of 0 means
//! "whatever is available"; resolved ROIs are always concrete.

/// Region of interest of one connector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    /// Width of the conceptual full-resolution source.
    pub full_wd: u32,
    /// Height of the conceptual full-resolution source.
    pub full_ht: u32,
    /// Width this connector produces/consumes (0 = unresolved request).
    pub wd: u32,
    /// Height this connector produces/consumes (0 = unresolved request).
    pub ht: u32,
    /// Sampling scale relative to the full source. 1.0 is native resolution,
    /// 2.0 means every other pixel. Must stay > 0.
    pub scale: f32,
}

impl Default for Roi {
    fn default() -> Self {
        Self {
            full_wd: 0,
            full_ht: 0,
            wd: 0,
            ht: 0,
            scale: 1.0,
        }
    }
}

impl Roi {
    /// A fully resolved ROI covering a source of the given size at scale 1.
    pub fn full(wd: u32, ht: u32) -> Self {
        Self {
            full_wd: wd,
            full_ht: ht,
            wd,
            ht,
            scale: 1.0,
        }
    }

    /// The next-coarser mip level: dimensions halved (rounding up), scale
    /// doubled. Full size is unchanged.
    pub fn half(&self) -> Self {
        Self {
            full_wd: self.full_wd,
            full_ht: self.full_ht,
            wd: (self.wd + 1) / 2,
            ht: (self.ht + 1) / 2,
            scale: self.scale * 2.0,
        }
    }

    /// How many pixels the full source spans at the current scale.
    pub fn available(&self) -> (u32, u32) {
        let wd = (self.full_wd as f32 / self.scale).round() as u32;
        let ht = (self.full_ht as f32 / self.scale).round() as u32;
        (wd, ht)
    }

    /// Clamp a request against what is deliverable. A request of 0 (or one
    /// exceeding the deliverable size) resolves to the deliverable size.
    pub fn clamp_request(&mut self, avail_wd: u32, avail_ht: u32) {
        if self.wd == 0 || self.wd > avail_wd {
            self.wd = avail_wd;
        }
        if self.ht == 0 || self.ht > avail_ht {
            self.ht = avail_ht;
        }
    }

    pub fn pixels(&self) -> u64 {
        self.wd as u64 * self.ht as u64
    }

    /// Check the negotiation invariants. Widths and heights are unsigned by
    /// construction; scale must be strictly positive and finite.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.scale > 0.0) || !self.scale.is_finite() {
            return Err(format!("invalid roi scale {}", self.scale));
        }
        Ok(())
    }
}
