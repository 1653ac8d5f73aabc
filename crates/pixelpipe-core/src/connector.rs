//! Module-level connectors: named, typed ports on a module.

use petgraph::stable_graph::EdgeIndex;

use crate::format::Format;
use crate::graph::ModuleId;
use crate::roi::Roi;
use crate::token::Token;

/// Data-flow direction of a connector.
///
/// Feedback is a property of the connection, not of the port; see
/// [`ConnLink::feedback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Consumes a buffer produced upstream.
    Read,
    /// Produces a buffer.
    Write,
}

impl Direction {
    pub fn is_read(self) -> bool {
        matches!(self, Direction::Read)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Direction::Write)
    }
}

/// Where a read connector gets its data from.
#[derive(Debug, Clone, Copy)]
pub struct ConnLink {
    /// Upstream module.
    pub module: ModuleId,
    /// Connector index on the upstream module.
    pub conn: usize,
    /// True if this is a feedback connection (previous-iteration read).
    pub feedback: bool,
    /// The graph edge backing this link, removed on reconnect.
    pub(crate) edge: EdgeIndex,
}

/// A named port on a module instance.
///
/// Read connectors hold at most one upstream link; write connectors fan out
/// to any number of consumers. `decl_format` is what the plugin declared and
/// never changes; `format` is the negotiated value, re-derived on every
/// (re-)connect.
#[derive(Debug, Clone)]
pub struct Connector {
    pub name: Token,
    pub dir: Direction,
    /// Format as declared by the plugin (may contain wildcards).
    pub decl_format: Format,
    /// Format after connection-time negotiation.
    pub format: Format,
    /// ROI written by the two-pass negotiation.
    pub roi: Roi,
    /// Upstream link (read connectors only).
    pub link: Option<ConnLink>,
    /// Absent optional inputs get a dummy binding instead of failing.
    pub optional: bool,
}

impl Connector {
    pub fn new(desc: &ConnectorDesc) -> Self {
        Self {
            name: desc.name,
            dir: desc.dir,
            decl_format: desc.format,
            format: desc.format,
            roi: Roi::default(),
            link: None,
            optional: desc.optional,
        }
    }
}

/// Declarative connector description, part of a plugin's [`ModuleDesc`].
///
/// [`ModuleDesc`]: crate::plugin::ModuleDesc
#[derive(Debug, Clone)]
pub struct ConnectorDesc {
    pub name: Token,
    pub dir: Direction,
    pub format: Format,
    pub optional: bool,
}

impl ConnectorDesc {
    pub fn read(name: &str, chan: &str, dtype: &str) -> Self {
        Self {
            name: Token::new(name),
            dir: Direction::Read,
            format: Format::new(chan, dtype),
            optional: false,
        }
    }

    pub fn write(name: &str, chan: &str, dtype: &str) -> Self {
        Self {
            name: Token::new(name),
            dir: Direction::Write,
            format: Format::new(chan, dtype),
            optional: false,
        }
    }

    /// Mark a read connector as optional: left unconnected it binds a dummy
    /// buffer instead of failing ROI resolution.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_predicates() {
        assert!(Direction::Read.is_read());
        assert!(!Direction::Write.is_read());
        assert!(Direction::Write.is_write());
        assert!(!Direction::Read.is_write());
    }

    #[test]
    fn test_connector_from_desc() {
        let desc = ConnectorDesc::read("input", "rgba", "*").optional();
        let conn = Connector::new(&desc);
        assert_eq!(conn.name, Token::new("input"));
        assert!(conn.optional);
        assert!(conn.format.dtype.is_wildcard());
        assert!(conn.link.is_none());
    }
}
