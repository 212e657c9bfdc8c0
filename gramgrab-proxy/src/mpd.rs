//! MPEG-DASH manifest quality selection.
//!
//! Pure XML string → ranked stream list conversion. No I/O, no async.
//! Only `Representation` elements with `mimetype="video/mp4"` are
//! considered; everything else in the manifest is ignored.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

const REPRESENTATION: &[u8] = b"Representation";
const BASE_URL: &[u8] = b"BaseURL";
const VIDEO_MP4: &str = "video/mp4";

/// One video quality variant of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
    /// `"{width}x{height}"`
    pub quality: String,
}

impl StreamDescriptor {
    #[must_use]
    pub fn new(url: impl Into<String>, width: u32, height: u32, bandwidth: u64) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            bandwidth,
            quality: format!("{width}x{height}"),
        }
    }
}

/// Why a manifest could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("malformed manifest XML near byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("manifest ended with {0} unclosed element(s)")]
    Truncated(usize),
}

/// Parse `manifest_xml` into video streams ranked by width, widest first.
///
/// Malformed input is a soft failure: it is logged and yields an empty list.
#[must_use]
pub fn parse_manifest(manifest_xml: &str) -> Vec<StreamDescriptor> {
    match try_parse_manifest(manifest_xml) {
        Ok(streams) => streams,
        Err(e) => {
            tracing::warn!(error = %e, "Error parsing DASH manifest");
            Vec::new()
        }
    }
}

/// Like [`parse_manifest`], but reports malformed input to the caller.
pub fn try_parse_manifest(manifest_xml: &str) -> Result<Vec<StreamDescriptor>, ManifestError> {
    let mut streams = collect_representations(manifest_xml)?;
    // Vec::sort_by is stable: equal widths keep manifest order.
    streams.sort_by(|a, b| b.width.cmp(&a.width));
    Ok(streams)
}

/// URL of the best stream, if any stream has one.
///
/// Streams without a `BaseURL` keep their rank in [`parse_manifest`] but are
/// never returned here; the next ranked stream with a URL wins instead.
#[must_use]
pub fn best_url(manifest_xml: &str) -> Option<String> {
    best_stream(manifest_xml).map(|s| s.url)
}

/// The highest-ranked stream that carries a non-empty URL.
#[must_use]
pub fn best_stream(manifest_xml: &str) -> Option<StreamDescriptor> {
    parse_manifest(manifest_xml)
        .into_iter()
        .find(|s| !s.url.is_empty())
}

struct Candidate {
    descriptor: StreamDescriptor,
    has_base_url: bool,
}

/// Walk the document once, in document order, returning every qualifying
/// representation unsorted.
fn collect_representations(manifest_xml: &str) -> Result<Vec<StreamDescriptor>, ManifestError> {
    let mut reader = Reader::from_str(manifest_xml);

    let mut candidates: Vec<Candidate> = Vec::new();
    // (candidate index, element depth) of qualifying representations still open
    let mut open: Vec<(usize, usize)> = Vec::new();
    // (element depth, accumulated text) of the BaseURL being read
    let mut base_url: Option<(usize, String)> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(&reader, e))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                match e.local_name().as_ref() {
                    REPRESENTATION => {
                        if let Some(descriptor) =
                            video_representation(&e).map_err(|err| xml_error(&reader, err))?
                        {
                            candidates.push(Candidate {
                                descriptor,
                                has_base_url: false,
                            });
                            open.push((candidates.len() - 1, depth));
                        }
                    }
                    BASE_URL if base_url.is_none() && !open.is_empty() => {
                        base_url = Some((depth, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => match e.local_name().as_ref() {
                REPRESENTATION => {
                    if let Some(descriptor) =
                        video_representation(&e).map_err(|err| xml_error(&reader, err))?
                    {
                        candidates.push(Candidate {
                            descriptor,
                            has_base_url: false,
                        });
                    }
                }
                BASE_URL if base_url.is_none() => {
                    assign_base_url(&mut candidates, &open, "");
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some((_, text)) = base_url.as_mut() {
                    let unescaped = t.unescape().map_err(|err| xml_error(&reader, err))?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if let Some((_, text)) = base_url.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if base_url.as_ref().is_some_and(|(d, _)| *d == depth) {
                    if let Some((_, text)) = base_url.take() {
                        assign_base_url(&mut candidates, &open, text.trim());
                    }
                }
                if open.last().is_some_and(|(_, d)| *d == depth) {
                    open.pop();
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ManifestError::Truncated(depth));
    }

    Ok(candidates.into_iter().map(|c| c.descriptor).collect())
}

fn xml_error(reader: &Reader<&[u8]>, source: quick_xml::Error) -> ManifestError {
    ManifestError::Xml {
        position: reader.buffer_position() as u64,
        source,
    }
}

/// The first `BaseURL` below a representation is its URL.
fn assign_base_url(candidates: &mut [Candidate], open: &[(usize, usize)], url: &str) {
    for &(idx, _) in open {
        let candidate = &mut candidates[idx];
        if !candidate.has_base_url {
            candidate.descriptor.url = url.to_string();
            candidate.has_base_url = true;
        }
    }
}

/// Build a descriptor if `element` is a `video/mp4` representation.
fn video_representation(element: &BytesStart<'_>) -> Result<Option<StreamDescriptor>, quick_xml::Error> {
    let mut is_video = false;
    let mut width = 0u64;
    let mut height = 0u64;
    let mut bandwidth = 0u64;

    for attr in element.attributes() {
        let attr = attr?;
        let key = attr.key.local_name();
        let key = key.as_ref();

        if key.eq_ignore_ascii_case(b"mimetype") {
            is_video = attr.unescape_value()? == VIDEO_MP4;
        } else if key == b"width" {
            width = parse_leading_int(&attr.unescape_value()?);
        } else if key == b"height" {
            height = parse_leading_int(&attr.unescape_value()?);
        } else if key == b"bandwidth" {
            bandwidth = parse_leading_int(&attr.unescape_value()?);
        }
    }

    if !is_video {
        return Ok(None);
    }

    Ok(Some(StreamDescriptor::new(
        String::new(),
        u32::try_from(width).unwrap_or(u32::MAX),
        u32::try_from(height).unwrap_or(u32::MAX),
        bandwidth,
    )))
}

/// Leading-digits integer parse: `" 720p"` → 720, `"abc"` / `"-5"` → 0.
fn parse_leading_int(raw: &str) -> u64 {
    let s = raw.trim_start();
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return 0;
    }
    s[..end].parse().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn representation(width: u32, height: u32, bandwidth: u64, url: &str) -> String {
        format!(
            r#"<Representation id="{width}" mimetype="video/mp4" codecs="avc1.64001F" width="{width}" height="{height}" bandwidth="{bandwidth}"><BaseURL>{url}</BaseURL><SegmentBase indexRange="822-1089"><Initialization range="0-821"/></SegmentBase></Representation>"#
        )
    }

    fn manifest(representations: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT12.5S">
  <Period>
    <AdaptationSet segmentAlignment="true">
      {}
    </AdaptationSet>
    <AdaptationSet>
      <Representation id="audio" mimetype="audio/mp4" bandwidth="64000"><BaseURL>https://cdn.example.com/a.mp4</BaseURL></Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
            representations.join("\n      ")
        )
    }

    #[test]
    fn test_ranks_by_width_descending() {
        let xml = manifest(&[
            representation(720, 1280, 900_000, "https://cdn.example.com/720.mp4"),
            representation(480, 854, 400_000, "https://cdn.example.com/480.mp4"),
            representation(1080, 1920, 2_000_000, "https://cdn.example.com/1080.mp4"),
        ]);

        let streams = parse_manifest(&xml);
        assert_eq!(streams.len(), 3);
        let widths: Vec<u32> = streams.iter().map(|s| s.width).collect();
        assert_eq!(widths, vec![1080, 720, 480]);
        assert_eq!(streams[0].quality, "1080x1920");
        assert_eq!(streams[0].bandwidth, 2_000_000);
        assert_eq!(best_url(&xml).as_deref(), Some("https://cdn.example.com/1080.mp4"));
    }

    #[test]
    fn test_best_url_independent_of_input_order() {
        let reps = [
            representation(480, 854, 1, "https://cdn.example.com/480.mp4"),
            representation(720, 1280, 1, "https://cdn.example.com/720.mp4"),
            representation(1080, 1920, 1, "https://cdn.example.com/1080.mp4"),
        ];
        let orders = [[0, 1, 2], [2, 1, 0], [1, 2, 0], [0, 2, 1], [2, 0, 1], [1, 0, 2]];
        for order in orders {
            let shuffled: Vec<String> = order.iter().map(|&i| reps[i].clone()).collect();
            assert_eq!(
                best_url(&manifest(&shuffled)).as_deref(),
                Some("https://cdn.example.com/1080.mp4"),
                "order {order:?}"
            );
        }
    }

    #[test]
    fn test_equal_widths_keep_manifest_order() {
        let xml = manifest(&[
            representation(720, 1280, 500_000, "https://cdn.example.com/first.mp4"),
            representation(1080, 1920, 1, "https://cdn.example.com/big.mp4"),
            representation(720, 1280, 900_000, "https://cdn.example.com/second.mp4"),
        ]);

        let urls: Vec<String> = parse_manifest(&xml).into_iter().map(|s| s.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/big.mp4",
                "https://cdn.example.com/first.mp4",
                "https://cdn.example.com/second.mp4",
            ]
        );
    }

    #[test]
    fn test_malformed_input_is_soft_failure() {
        for input in ["", "not xml at all", "<MPD><Period></MPD>", "<MPD><<>>", "<MPD><Period>"] {
            assert!(parse_manifest(input).is_empty(), "input {input:?}");
            assert_eq!(best_url(input), None, "input {input:?}");
        }
        assert!(try_parse_manifest("<MPD><Period></MPD>").is_err());
        assert!(try_parse_manifest("<MPD><Period>").is_err());
        assert!(try_parse_manifest("").unwrap().is_empty());
    }

    #[test]
    fn test_truncated_after_representation_discards_everything() {
        let mut xml = manifest(&[representation(1080, 1920, 1, "https://cdn.example.com/1080.mp4")]);
        xml.truncate(xml.find("</AdaptationSet>").unwrap());
        assert!(parse_manifest(&xml).is_empty());
    }

    #[test]
    fn test_only_non_video_representations() {
        let xml = r#"<MPD><Period><AdaptationSet>
            <Representation mimetype="audio/mp4" width="0" bandwidth="64000"><BaseURL>https://cdn.example.com/a.mp4</BaseURL></Representation>
            <Representation mimetype="video/webm" width="1920"><BaseURL>https://cdn.example.com/v.webm</BaseURL></Representation>
            <Representation width="1280"><BaseURL>https://cdn.example.com/untyped.mp4</BaseURL></Representation>
        </AdaptationSet></Period></MPD>"#;
        assert!(parse_manifest(xml).is_empty());
        assert_eq!(best_url(xml), None);
    }

    #[test]
    fn test_missing_and_non_numeric_attributes_default_to_zero() {
        let xml = r#"<MPD>
            <Representation mimetype="video/mp4" width="wide" height="-360" bandwidth="  812345bps"><BaseURL>https://cdn.example.com/a.mp4</BaseURL></Representation>
            <Representation mimetype="video/mp4"><BaseURL>https://cdn.example.com/b.mp4</BaseURL></Representation>
        </MPD>"#;
        let streams = parse_manifest(xml);
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].width, 0);
        assert_eq!(streams[0].height, 0);
        assert_eq!(streams[0].bandwidth, 812_345);
        assert_eq!(streams[0].quality, "0x0");
        assert_eq!(streams[1], StreamDescriptor::new("https://cdn.example.com/b.mp4", 0, 0, 0));
    }

    #[test]
    fn test_base_url_text_is_unescaped() {
        let xml = r#"<MPD><Representation mimetype="video/mp4" width="640">
            <BaseURL>
                https://cdn.example.com/v.mp4?efg=abc&amp;oh=00_xyz
            </BaseURL>
        </Representation>
        <Representation mimetype="video/mp4" width="320"><BaseURL><![CDATA[https://cdn.example.com/c.mp4?a=1&b=2]]></BaseURL></Representation></MPD>"#;
        let streams = parse_manifest(xml);
        assert_eq!(streams[0].url, "https://cdn.example.com/v.mp4?efg=abc&oh=00_xyz");
        assert_eq!(streams[1].url, "https://cdn.example.com/c.mp4?a=1&b=2");
    }

    #[test]
    fn test_namespaced_elements_and_camel_case_mime_attribute() {
        let xml = r#"<mpd:MPD xmlns:mpd="urn:mpeg:dash:schema:mpd:2011">
            <mpd:Representation mimeType="video/mp4" width="720"><mpd:BaseURL>https://cdn.example.com/720.mp4</mpd:BaseURL></mpd:Representation>
        </mpd:MPD>"#;
        assert_eq!(best_url(xml).as_deref(), Some("https://cdn.example.com/720.mp4"));
    }

    #[test]
    fn test_empty_base_url_keeps_rank_but_is_not_best() {
        let xml = manifest(&[
            representation(720, 1280, 1, "https://cdn.example.com/720.mp4"),
            r#"<Representation mimetype="video/mp4" width="1080" height="1920"><SegmentBase/></Representation>"#
                .to_string(),
            r#"<Representation mimetype="video/mp4" width="1080" height="1920"/>"#.to_string(),
            representation(1080, 1920, 1, "https://cdn.example.com/1080.mp4"),
        ]);

        let streams = parse_manifest(&xml);
        assert_eq!(streams.len(), 4);
        assert_eq!(streams[0].url, "");
        assert_eq!(streams[1].url, "");
        assert_eq!(streams[2].url, "https://cdn.example.com/1080.mp4");
        assert_eq!(best_url(&xml).as_deref(), Some("https://cdn.example.com/1080.mp4"));
        assert_eq!(best_stream(&xml).map(|s| s.width), Some(1080));
    }

    #[test]
    fn test_all_base_urls_empty_yields_none() {
        let xml = r#"<MPD><Representation mimetype="video/mp4" width="720"><BaseURL></BaseURL></Representation><Representation mimetype="video/mp4" width="480"><BaseURL/></Representation></MPD>"#;
        assert_eq!(parse_manifest(xml).len(), 2);
        assert_eq!(best_url(xml), None);
    }

    #[test]
    fn test_first_base_url_wins() {
        let xml = r#"<MPD><Representation mimetype="video/mp4" width="720"><BaseURL>https://cdn.example.com/primary.mp4</BaseURL><BaseURL>https://cdn.example.com/backup.mp4</BaseURL></Representation></MPD>"#;
        assert_eq!(best_url(xml).as_deref(), Some("https://cdn.example.com/primary.mp4"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let xml = manifest(&[
            representation(720, 1280, 1, "https://cdn.example.com/a.mp4"),
            representation(720, 1280, 2, "https://cdn.example.com/b.mp4"),
            representation(1080, 1920, 3, "https://cdn.example.com/c.mp4"),
        ]);
        assert_eq!(parse_manifest(&xml), parse_manifest(&xml));
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("1080"), 1080);
        assert_eq!(parse_leading_int(" 720p"), 720);
        assert_eq!(parse_leading_int("+42"), 42);
        assert_eq!(parse_leading_int("-5"), 0);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("99999999999999999999999"), u64::MAX);
    }
}
