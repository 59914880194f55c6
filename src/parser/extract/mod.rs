pub mod salvage;
pub mod structural;

use tracing::debug;

use super::blocks::{BlockKind, ContentBlock};
use salvage::ChunkMode;

/// Extracted blocks. Source order is kept within each kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub blocks: Vec<ContentBlock>,
}

impl Extracted {
    pub fn of(&self, kind: BlockKind) -> impl Iterator<Item = &ContentBlock> {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    pub fn count(&self, kind: BlockKind) -> usize {
        self.of(kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Structural,
    Salvage,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Structural => "structural",
            Mode::Salvage => "salvage",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub blocks: Extracted,
    pub mode: Mode,
    pub skipped_chunks: usize,
    pub duplicate_points: usize,
}

/// Structural pass first; salvage only when it finds no wpt, rte or trk.
/// `None` means nothing was recoverable, which is distinct from an empty
/// but successful extraction (that cannot be produced by either pass).
pub fn extract(content: &str, name: &str, chunk_mode: ChunkMode) -> Option<Extraction> {
    let blocks = structural::scan(content);
    if !blocks.is_empty() {
        for kind in BlockKind::ORDER {
            debug!(kind = kind.tag(), count = blocks.count(kind), "structural extraction");
        }
        return Some(Extraction {
            blocks,
            mode: Mode::Structural,
            skipped_chunks: 0,
            duplicate_points: 0,
        });
    }

    let salvaged = salvage::recover(content, name, chunk_mode);
    debug!(
        waypoints = salvaged.waypoints.len(),
        tracks = salvaged.tracks.len(),
        skipped = salvaged.skipped_chunks,
        "salvage extraction"
    );
    if salvaged.is_empty() {
        return None;
    }

    Some(Extraction {
        blocks: Extracted {
            blocks: salvaged.waypoints.into_iter().chain(salvaged.tracks).collect(),
        },
        mode: Mode::Salvage,
        skipped_chunks: salvaged.skipped_chunks,
        duplicate_points: salvaged.duplicate_points,
    })
}
