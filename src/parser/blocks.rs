use std::sync::LazyLock;

use regex::Regex;

static OPEN_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<[a-zA-Z0-9]+:").unwrap());
static CLOSE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</[a-zA-Z0-9]+:([a-zA-Z0-9]+\s*>)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Waypoint,
    Route,
    Track,
}

impl BlockKind {
    /// Canonical emission order.
    pub const ORDER: [BlockKind; 3] = [BlockKind::Waypoint, BlockKind::Route, BlockKind::Track];

    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Waypoint => "wpt",
            BlockKind::Route => "rte",
            BlockKind::Track => "trk",
        }
    }
}

/// One top-level `wpt`, `rte` or `trk` element, as raw markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ContentBlock {
    /// Wrap a matched element, dropping any namespace prefix from its own
    /// opening and closing tags. Inner markup is kept byte for byte.
    pub fn from_matched(kind: BlockKind, element: &str) -> Self {
        let opened = OPEN_PREFIX_RE.replace(element, "<");
        let text = CLOSE_PREFIX_RE.replace(&opened, "</$1").into_owned();
        ContentBlock { kind, text }
    }

    /// Wrap markup that was freshly serialized and needs no normalization.
    pub fn synthesized(kind: BlockKind, text: String) -> Self {
        ContentBlock { kind, text }
    }
}
