use std::sync::LazyLock;

use regex::Regex;

use crate::parser::blocks::{BlockKind, ContentBlock};

// Opening and closing point tags both delimit chunks.
static POINT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:/)?(?:[a-zA-Z0-9]+:)?(?:wpt|trkpt)").unwrap()
});
static LAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\blat=(?:"([^"]+)"|'([^']+)')"#).unwrap());
static LON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\blon=(?:"([^"]+)"|'([^']+)')"#).unwrap());
static ELE_RE: LazyLock<Regex> = LazyLock::new(|| value_before_close("ele"));
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| value_before_close("time"));
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| value_before_close("name"));

/// Text sitting right before `</tag>`, with or without its opening tag,
/// optionally CDATA-wrapped.
fn value_before_close(tag: &str) -> Regex {
    Regex::new(&format!(
        r"(?is)>\s*(?:<!\[CDATA\[([^<]*?)\]\]>|([^<]+))\s*</(?:[a-zA-Z0-9]+:)?{tag}>"
    ))
    .unwrap()
}

/// How chunks produced by closing tags are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkMode {
    /// Every tag occurrence opens a chunk; a record can be read twice.
    #[default]
    Reference,
    /// Drop a closing-tag chunk that repeats the coordinates read just before it.
    Deduplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Waypoint,
    TrackPoint,
}

/// A point recovered from raw text. Coordinates keep their source spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRecord {
    pub lat: String,
    pub lon: String,
    pub ele: Option<String>,
    pub time: Option<String>,
    pub name: Option<String>,
    pub kind: PointKind,
}

impl PointRecord {
    /// Read a point from the chunk that follows `tag`. A chunk without both
    /// coordinates is not a point.
    pub fn from_chunk(tag: &str, chunk: &str) -> Option<Self> {
        let lat = attr(&LAT_RE, chunk)?;
        let lon = attr(&LON_RE, chunk)?;
        let name = value(&NAME_RE, chunk);

        let kind = if tag.to_lowercase().contains("wpt") || name.is_some() {
            PointKind::Waypoint
        } else {
            PointKind::TrackPoint
        };

        Some(PointRecord {
            lat,
            lon,
            ele: value(&ELE_RE, chunk),
            time: value(&TIME_RE, chunk),
            name,
            kind,
        })
    }

    pub fn to_waypoint(&self) -> String {
        let mut out = format!(r#"<wpt lat="{}" lon="{}">"#, self.lat, self.lon);
        if let Some(name) = &self.name {
            out.push_str(&format!("<name>{}</name>", cdata(name)));
        }
        self.push_ele_time(&mut out);
        out.push_str("</wpt>");
        out
    }

    pub fn to_track_point(&self) -> String {
        let mut out = format!(r#"<trkpt lat="{}" lon="{}">"#, self.lat, self.lon);
        self.push_ele_time(&mut out);
        out.push_str("</trkpt>");
        out
    }

    fn push_ele_time(&self, out: &mut String) {
        if let Some(ele) = &self.ele {
            out.push_str(&format!("<ele>{ele}</ele>"));
        }
        if let Some(time) = &self.time {
            out.push_str(&format!("<time>{time}</time>"));
        }
    }
}

#[derive(Debug, Default)]
pub struct Salvaged {
    pub waypoints: Vec<ContentBlock>,
    pub tracks: Vec<ContentBlock>,
    /// Point fragments without a lat/lon pair. The tail after an ordinary
    /// closing tag is not a fragment.
    pub skipped_chunks: usize,
    /// Closing-tag chunks that repeated the previous point's coordinates.
    pub duplicate_points: usize,
}

impl Salvaged {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty() && self.tracks.is_empty()
    }
}

/// Split raw text at every point tag and recover what each chunk holds.
/// Track points are gathered into one synthetic track titled `name`.
pub fn recover(content: &str, name: &str, mode: ChunkMode) -> Salvaged {
    let points = recover_points(content, mode);
    let mut salvaged = Salvaged {
        skipped_chunks: points.skipped_chunks,
        duplicate_points: points.duplicate_points,
        ..Default::default()
    };

    let mut track_points = Vec::new();
    for point in &points.records {
        match point.kind {
            PointKind::Waypoint => salvaged.waypoints.push(ContentBlock::synthesized(
                BlockKind::Waypoint,
                point.to_waypoint(),
            )),
            PointKind::TrackPoint => track_points.push(point.to_track_point()),
        }
    }

    if !track_points.is_empty() {
        let track = format!(
            "<trk><name>{}</name><trkseg>{}</trkseg></trk>",
            cdata(name),
            track_points.join("\n")
        );
        salvaged
            .tracks
            .push(ContentBlock::synthesized(BlockKind::Track, track));
    }

    salvaged
}

struct RecoveredPoints {
    records: Vec<PointRecord>,
    skipped_chunks: usize,
    duplicate_points: usize,
}

fn recover_points(content: &str, mode: ChunkMode) -> RecoveredPoints {
    let tags: Vec<_> = POINT_TAG_RE.find_iter(content).collect();
    let mut records = Vec::new();
    let mut skipped_chunks = 0;
    let mut duplicate_points = 0;
    // Coordinates read from the chunk immediately before the current one.
    let mut previous: Option<(String, String)> = None;

    for (i, tag) in tags.iter().enumerate() {
        let end = tags.get(i + 1).map_or(content.len(), |next| next.start());
        let chunk = &content[tag.end()..end];

        let closing = tag.as_str().starts_with("</");
        let Some(point) = PointRecord::from_chunk(tag.as_str(), chunk) else {
            if !closing || has_partial_coordinates(chunk) {
                skipped_chunks += 1;
            }
            previous = None;
            continue;
        };

        let coords = (point.lat.clone(), point.lon.clone());
        let repeated = closing && previous.as_ref() == Some(&coords);
        previous = Some(coords);

        if repeated {
            duplicate_points += 1;
            if mode == ChunkMode::Deduplicate {
                continue;
            }
        }
        records.push(point);
    }

    RecoveredPoints {
        records,
        skipped_chunks,
        duplicate_points,
    }
}

fn has_partial_coordinates(chunk: &str) -> bool {
    LAT_RE.is_match(chunk) || LON_RE.is_match(chunk)
}

fn attr(re: &Regex, chunk: &str) -> Option<String> {
    let caps = re.captures(chunk)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(raw.replace('"', "&quot;"))
}

fn value(re: &Regex, chunk: &str) -> Option<String> {
    let caps = re.captures(chunk)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// CDATA section; an embedded `]]>` is split across two sections.
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}
