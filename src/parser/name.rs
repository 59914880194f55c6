use std::sync::LazyLock;

use quick_xml::escape::unescape;
use regex::Regex;

/// Placeholder used when nothing better is known. Never kept as a final
/// name if the upload filename offers a stem.
pub const DEFAULT_NAME: &str = "unnamed_track";

// First <name> after a <metadata> or <trk> open tag; closest one wins.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:metadata|trk)>.*?<name>(.*?)</name>").unwrap());

const INVALID_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Pick a label for the document: metadata or track name, else the upload
/// filename stem. Always non-empty and safe to use as a filename stem.
pub fn resolve_name(content: &str, original_filename: &str) -> String {
    let found = NAME_RE
        .captures(content)
        .map(|c| decode(c[1].trim()))
        .unwrap_or_default();

    let cleaned = sanitize(&found);
    if !cleaned.is_empty() && cleaned != DEFAULT_NAME {
        return cleaned;
    }

    let stem = sanitize(file_stem(original_filename));
    if stem.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        stem
    }
}

/// Element text may carry entities (`&amp;`); CDATA content is literal.
/// Undecodable text is kept as written.
fn decode(text: &str) -> String {
    if text.contains("<![CDATA[") {
        return text.to_string();
    }
    match unescape(text) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Strip CDATA markers and replace filesystem-invalid characters with `_`.
pub fn sanitize(name: &str) -> String {
    name.replace("<![CDATA[", "")
        .replace("]]>", "")
        .trim()
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Basename without its extension. Handles both `/` and `\` separators since
/// uploads may carry client-side paths. Leading dots belong to the stem.
fn file_stem(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dots = base.len() - base.trim_start_matches('.').len();
    match base[dots..].rfind('.') {
        Some(i) => &base[..dots + i],
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_name_with_cdata() {
        let gpx = "<gpx><metadata><name><![CDATA[Trail A]]></name></metadata></gpx>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "Trail A");
    }

    #[test]
    fn track_name_used_without_metadata() {
        let gpx = "<gpx><trk>\n  <name> Morning Ride </name><trkseg/></trk></gpx>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "Morning Ride");
    }

    #[test]
    fn closest_name_after_open_tag_wins() {
        let gpx = "<metadata><author><name>Alice</name></author></metadata><trk><name>Loop</name></trk>";
        // Non-greedy: the author's <name> is the first one after <metadata>.
        assert_eq!(resolve_name(gpx, "x.gpx"), "Alice");
    }

    #[test]
    fn case_insensitive_tags() {
        let gpx = "<METADATA><NAME>Upper</NAME></METADATA>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "Upper");
    }

    #[test]
    fn slash_replaced() {
        let gpx = "<metadata><name>North/South</name></metadata>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "North_South");
    }

    #[test]
    fn all_invalid_chars_replaced() {
        assert_eq!(sanitize(r#"a\b/c*d?e:f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn falls_back_to_filename_stem() {
        assert_eq!(resolve_name("<gpx></gpx>", "uploads/My Hike.gpx"), "My Hike");
        assert_eq!(resolve_name("<gpx></gpx>", r"C:\tracks\ride.v2.gpx"), "ride.v2");
    }

    #[test]
    fn empty_cdata_falls_back() {
        let gpx = "<metadata><name><![CDATA[  ]]></name></metadata>";
        assert_eq!(resolve_name(gpx, "fallback.gpx"), "fallback");
    }

    #[test]
    fn placeholder_name_falls_back() {
        let gpx = "<trk><name>unnamed_track</name></trk>";
        assert_eq!(resolve_name(gpx, "real.gpx"), "real");
    }

    #[test]
    fn never_empty() {
        assert_eq!(resolve_name("", ""), DEFAULT_NAME);
        assert_eq!(resolve_name("", ".gpx"), ".gpx");
    }

    #[test]
    fn stem_is_sanitized() {
        assert_eq!(resolve_name("", "a:b.gpx"), "a_b");
    }

    #[test]
    fn entities_decoded_outside_cdata() {
        let gpx = "<metadata><name>Tom &amp; Jerry</name></metadata>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "Tom & Jerry");
        let gpx = "<metadata><name><![CDATA[a &amp; b]]></name></metadata>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "a &amp; b");
        let gpx = "<metadata><name>Fish & Chips</name></metadata>";
        assert_eq!(resolve_name(gpx, "x.gpx"), "Fish & Chips");
    }

    #[test]
    fn name_outside_metadata_or_track_ignored() {
        let gpx = "<wpt lat=\"1\" lon=\"2\"><name>Spot</name></wpt>";
        assert_eq!(resolve_name(gpx, "points.gpx"), "points");
    }
}
