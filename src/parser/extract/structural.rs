use std::sync::LazyLock;

use regex::Regex;

use super::Extracted;
use crate::parser::blocks::{BlockKind, ContentBlock};

// Pattern matching rather than an XML parser: the surrounding markup may be
// broken in ways a strict reader rejects. Prefixes are optional on both tags.
static WPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:[a-zA-Z0-9]+:)?wpt.*?</(?:[a-zA-Z0-9]+:)?wpt>").unwrap()
});
static TRK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:[a-zA-Z0-9]+:)?trk(?:\s[^>]*)?>.*?</(?:[a-zA-Z0-9]+:)?trk>").unwrap()
});
static RTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:[a-zA-Z0-9]+:)?rte(?:\s[^>]*)?>.*?</(?:[a-zA-Z0-9]+:)?rte>").unwrap()
});

/// Collect every wpt/rte/trk element, prefixes normalized. Each kind is
/// matched independently, in source order.
pub fn scan(content: &str) -> Extracted {
    let blocks = BlockKind::ORDER
        .into_iter()
        .flat_map(|kind| {
            pattern(kind)
                .find_iter(content)
                .map(move |m| ContentBlock::from_matched(kind, m.as_str()))
        })
        .collect();
    Extracted { blocks }
}

fn pattern(kind: BlockKind) -> &'static Regex {
    match kind {
        BlockKind::Waypoint => &WPT_RE,
        BlockKind::Route => &RTE_RE,
        BlockKind::Track => &TRK_RE,
    }
}
