use quick_xml::escape::escape;
use quick_xml::events::Event;

use super::blocks::BlockKind;
use super::extract::Extracted;

const PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const ROOT_OPEN: &str = concat!(
    r#"<gpx version="1.1" creator="gpx_mender" "#,
    r#"xmlns="http://www.topografix.com/GPX/1/1" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd">"#,
);
const ROOT_CLOSE: &str = "</gpx>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    pub filename: String,
    pub text: String,
}

/// Canonical GPX 1.1 document: metadata name, then waypoints, routes and
/// tracks, one block per line. The name is escaped as element text; the
/// filename keeps it raw.
pub fn assemble(name: &str, blocks: &Extracted) -> OutputDocument {
    let name_line = format!("    <name>{}</name>", escape(name));
    let mut lines: Vec<&str> = vec![PROLOG, ROOT_OPEN, "  <metadata>"];
    lines.push(&name_line);
    lines.push("  </metadata>");

    for kind in BlockKind::ORDER {
        lines.extend(blocks.of(kind).map(|b| b.text.as_str()));
    }
    lines.push(ROOT_CLOSE);

    OutputDocument {
        filename: format!("{name}.gpx"),
        text: lines.join("\n"),
    }
}

/// Run the document through an XML reader. Blocks are copied verbatim from
/// the input, so a structurally matched element can still carry breakage.
/// Text is unescaped too, so a bare `&` or unknown entity is reported.
pub fn check_well_formed(text: &str) -> Result<(), String> {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => return Ok(()),
            Ok(Event::Text(t)) => {
                if let Err(e) = t.unescape() {
                    return Err(format!("at byte {}: {}", reader.buffer_position(), e));
                }
            }
            Err(e) => {
                return Err(format!("at byte {}: {}", reader.error_position(), e));
            }
            _ => {}
        }
        buf.clear();
    }
}
