pub mod assemble;
pub mod blocks;
pub mod error;
pub mod extract;
pub mod name;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use blocks::BlockKind;
use error::RepairError;
use extract::salvage::ChunkMode;
use extract::Mode;

/// One uploaded file: text plus the name it arrived under.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub content: String,
    pub filename: String,
    /// Bytes were not valid UTF-8 and were decoded with replacements.
    pub lossy: bool,
}

impl RawDocument {
    pub fn from_bytes(bytes: &[u8], filename: &str) -> Self {
        let (content, lossy) = match std::str::from_utf8(bytes) {
            Ok(s) => (s.to_string(), false),
            Err(_) => (String::from_utf8_lossy(bytes).into_owned(), true),
        };
        RawDocument {
            content,
            filename: filename.to_string(),
            lossy,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    pub chunk_mode: ChunkMode,
}

/// Non-fatal findings. The caller decides how to surface them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Warning {
    SalvageMode,
    SkippedChunks(usize),
    DuplicatePoints(usize),
    LossyDecoding,
    MalformedOutput(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SalvageMode => write!(f, "structural parse found nothing, salvaged points from raw text"),
            Warning::SkippedChunks(n) => write!(f, "{n} point fragments had no lat/lon pair and were skipped"),
            Warning::DuplicatePoints(n) => {
                write!(f, "{n} points were read twice from a closing tag")
            }
            Warning::LossyDecoding => write!(f, "input was not valid UTF-8; invalid bytes replaced"),
            Warning::MalformedOutput(reason) => {
                write!(f, "output is not well-formed XML ({reason})")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Repaired {
    pub filename: String,
    pub document: String,
    pub name: String,
    pub mode: Mode,
    pub waypoints: usize,
    pub routes: usize,
    pub tracks: usize,
    pub warnings: Vec<Warning>,
}

/// Name → extract (structural, else salvage) → assemble. Pure: no I/O, and
/// either a complete document or an error comes back.
pub fn process(doc: &RawDocument, options: &RepairOptions) -> Result<Repaired, RepairError> {
    let name = name::resolve_name(&doc.content, &doc.filename);
    debug!(file = %doc.filename, %name, "resolved name");

    let extraction = extract::extract(&doc.content, &name, options.chunk_mode).ok_or_else(|| {
        RepairError::NoRecoverableContent {
            filename: doc.filename.clone(),
        }
    })?;

    let mut warnings = Vec::new();
    if doc.lossy {
        warnings.push(Warning::LossyDecoding);
    }
    if extraction.mode == Mode::Salvage {
        warnings.push(Warning::SalvageMode);
    }
    if extraction.skipped_chunks > 0 {
        warnings.push(Warning::SkippedChunks(extraction.skipped_chunks));
    }
    if extraction.duplicate_points > 0 {
        warnings.push(Warning::DuplicatePoints(extraction.duplicate_points));
    }

    let output = assemble::assemble(&name, &extraction.blocks);
    if let Err(reason) = assemble::check_well_formed(&output.text) {
        warnings.push(Warning::MalformedOutput(reason));
    }

    Ok(Repaired {
        filename: output.filename,
        document: output.text,
        name,
        mode: extraction.mode,
        waypoints: extraction.blocks.count(BlockKind::Waypoint),
        routes: extraction.blocks.count(BlockKind::Route),
        tracks: extraction.blocks.count(BlockKind::Track),
        warnings,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &str, filename: &str) -> Result<Repaired, RepairError> {
        process(&RawDocument::from_bytes(content.as_bytes(), filename), &RepairOptions::default())
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.gpx", name)).unwrap()
    }

    #[test]
    fn valid_file_structural() {
        let out = run(&fixture("valid"), "valid.gpx").unwrap();
        assert_eq!(out.mode, Mode::Structural);
        assert_eq!(out.name, "Lakeside Loop");
        assert_eq!(out.filename, "Lakeside Loop.gpx");
        assert_eq!((out.waypoints, out.routes, out.tracks), (2, 1, 1));
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        assert!(out.document.contains(r#"<wpt lat="47.3769000" lon="8.5417"#));
    }

    #[test]
    fn namespaced_dialect_normalized() {
        let out = run(&fixture("namespaced"), "device_export.gpx").unwrap();
        assert_eq!(out.mode, Mode::Structural);
        assert_eq!(out.tracks, 1);
        assert!(out.document.contains("\n<trk>"));
        assert!(out.document.contains("</trk>\n</gpx>"));
        assert!(!out.document.contains("<gpx10:trk>"));
        assert!(!out.document.contains("</gpx10:trk>"));
        assert!(!out.document.contains("<gpx10:wpt"));
        // Inner content is untouched.
        assert!(out.document.contains("<gpx10:trkseg>"));
    }

    #[test]
    fn single_track_point_salvaged() {
        let out = run(r#"<gpx><trkpt lat="1.0" lon="2.0"></trkpt>"#, "p.gpx").unwrap();
        assert_eq!(out.mode, Mode::Salvage);
        assert_eq!(out.tracks, 1);
        assert_eq!(out.document.matches("<trk>").count(), 1);
        assert_eq!(out.document.matches("<trkseg>").count(), 1);
        assert_eq!(out.document.matches("<trkpt ").count(), 1);
        assert!(out.document.contains(r#"<trkpt lat="1.0" lon="2.0">"#));
        assert!(out.warnings.contains(&Warning::SalvageMode));
    }

    #[test]
    fn clean_salvage_only_reports_mode() {
        let out = run(
            "<trkpt lat=\"1.0\" lon=\"2.0\"></trkpt>\n<trkpt lat=\"1.1\" lon=\"2.1\"></trkpt>",
            "two.gpx",
        )
        .unwrap();
        assert_eq!(out.warnings, vec![Warning::SalvageMode]);
    }

    #[test]
    fn broken_waypoint_salvaged_with_name() {
        let out = run(
            r#"<gpx><wpt lat="3.0" lon="4.0"><name>Spot</name></wpx></gpx"#,
            "w.gpx",
        )
        .unwrap();
        assert_eq!(out.mode, Mode::Salvage);
        assert_eq!(out.waypoints, 1);
        assert!(out.document.contains("<name><![CDATA[Spot]]></name>"));
    }

    #[test]
    fn no_coordinates_fails() {
        let err = run("<gpx><trk><name>x</name><trkseg>", "empty.gpx").unwrap_err();
        assert_eq!(
            err,
            RepairError::NoRecoverableContent {
                filename: "empty.gpx".into()
            }
        );
    }

    #[test]
    fn fixture_without_coordinates_fails() {
        let err = run(&fixture("no_coordinates"), "no_coordinates.gpx").unwrap_err();
        assert_eq!(err.kind(), "no_recoverable_content");
        assert_eq!(err.filename(), "no_coordinates.gpx");
    }

    #[test]
    fn metadata_cdata_name() {
        let gpx = r#"<gpx><metadata><name><![CDATA[Trail A]]></name></metadata><wpt lat="1" lon="2"></wpt></gpx>"#;
        let out = run(gpx, "t.gpx").unwrap();
        assert_eq!(out.name, "Trail A");
        assert_eq!(out.filename, "Trail A.gpx");
    }

    #[test]
    fn ampersand_in_name_stays_well_formed() {
        let gpx = r#"<metadata><name><![CDATA[Tom & Jerry]]></name></metadata><wpt lat="1" lon="2"></wpt>"#;
        let out = run(gpx, "t.gpx").unwrap();
        assert_eq!(out.name, "Tom & Jerry");
        assert_eq!(out.filename, "Tom & Jerry.gpx");
        assert_eq!(out.document.lines().nth(3), Some("    <name>Tom &amp; Jerry</name>"));
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);

        let again = run(&out.document, &out.filename).unwrap();
        assert_eq!(again.name, out.name);
        assert_eq!(again.document, out.document);
    }

    #[test]
    fn bare_ampersand_in_block_flagged() {
        let gpx = r#"<wpt lat="1" lon="2"><desc>A & B</desc></wpt>"#;
        let out = run(gpx, "a.gpx").unwrap();
        assert!(out
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::MalformedOutput(_))));
    }

    #[test]
    fn reprocessing_output_is_stable() {
        for name in ["valid", "namespaced", "truncated"] {
            let first = run(&fixture(name), &format!("{name}.gpx")).unwrap();
            let second = run(&first.document, &first.filename).unwrap();
            assert_eq!(second.mode, Mode::Structural, "{name}");
            assert_eq!(second.name, first.name, "{name}");
            assert_eq!(
                (second.waypoints, second.routes, second.tracks),
                (first.waypoints, first.routes, first.tracks),
                "{name}"
            );
            assert_eq!(second.document, first.document, "{name}");
        }
    }

    #[test]
    fn coordinate_text_preserved() {
        let out = run(&fixture("truncated"), "truncated.gpx").unwrap();
        assert!(out.document.contains(r#"lat="46.5500" lon="7.9800""#));
        assert!(out.document.contains(r#"lat="46.5521" lon="7.9812""#));
    }

    #[test]
    fn truncated_recording_salvaged() {
        let out = run(&fixture("truncated"), "truncated.gpx").unwrap();
        assert_eq!(out.mode, Mode::Salvage);
        assert_eq!(out.name, "Ridge Walk");
        assert_eq!(out.waypoints, 1);
        assert_eq!(out.tracks, 1);
        assert!(out.document.contains("<trk><name><![CDATA[Ridge Walk]]></name><trkseg>"));
        assert!(out.warnings.iter().all(|w| !matches!(w, Warning::MalformedOutput(_))));
    }

    #[test]
    fn lossy_input_still_repaired() {
        let mut bytes = br#"<trkpt lat="1" lon="2"></trkpt>"#.to_vec();
        bytes.push(0xFF);
        let doc = RawDocument::from_bytes(&bytes, "bad.gpx");
        assert!(doc.lossy);
        let out = process(&doc, &RepairOptions::default()).unwrap();
        assert!(out.warnings.contains(&Warning::LossyDecoding));
    }

    #[test]
    fn broken_inner_markup_flagged_not_dropped() {
        let gpx = "<trk><name>x</name><trkseg><trkpt lat=\"1\" lon=\"2\"></trk>";
        let out = run(gpx, "x.gpx").unwrap();
        assert_eq!(out.mode, Mode::Structural);
        assert!(out
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::MalformedOutput(_))));
    }
}
