//! Capability prober
//!
//! Classifies a negotiated track from its textual media descriptor (a caps
//! string such as `application/x-rtp, media=(string)video,
//! encoding-name=(string)H265`). Only the first structure of the descriptor
//! is considered.
//!
//! Malformed input never fails: it is classified as [`TrackKind::Other`] and
//! logged at DEBUG.

use std::collections::HashMap;
use std::fmt;

/// Media type names that wrap a payload in a real-time transport envelope
const RTP_ENVELOPES: &[&str] = &["application/x-rtp", "application/x-srtp"];

/// Broad classification of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Other => write!(f, "other"),
        }
    }
}

/// Parsed first structure of a media descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Media type name, e.g. `video/x-raw` or `application/x-rtp`
    pub media_type: String,
    /// Field values with type annotations and quotes stripped
    pub fields: HashMap<String, String>,
}

impl MediaDescriptor {
    /// Parse a caps-like descriptor
    ///
    /// Returns `None` when the media type is empty or is not of the form
    /// `major/minor`.
    pub fn parse(input: &str) -> Option<Self> {
        let first = split_unquoted(input, ';').into_iter().next()?;
        let mut parts = split_unquoted(first, ',').into_iter();

        let media_type = parts.next()?.trim();
        if !is_media_type(media_type) {
            return None;
        }

        let mut fields = HashMap::new();
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            fields.insert(key.to_string(), field_value(value));
        }

        Some(Self {
            media_type: media_type.to_string(),
            fields,
        })
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Whether the payload is still inside an RTP/SRTP envelope
    pub fn is_rtp(&self) -> bool {
        RTP_ENVELOPES.contains(&self.media_type.as_str())
    }

    pub fn kind(&self) -> TrackKind {
        let category = if self.is_rtp() {
            self.field("media").unwrap_or_default()
        } else {
            self.media_type
                .split_once('/')
                .map(|(major, _)| major)
                .unwrap_or_default()
        };

        match category.to_ascii_lowercase().as_str() {
            "video" => TrackKind::Video,
            "audio" => TrackKind::Audio,
            _ => TrackKind::Other,
        }
    }
}

/// Classify a descriptor
pub fn classify(descriptor: &str) -> TrackKind {
    match MediaDescriptor::parse(descriptor) {
        Some(parsed) => parsed.kind(),
        None => {
            tracing::debug!(descriptor, "Unparseable media descriptor, treating as non-video");
            TrackKind::Other
        }
    }
}

/// Whether the descriptor names a primary (raw or encoded) video track
pub fn is_primary_video(descriptor: &str) -> bool {
    classify(descriptor) == TrackKind::Video
}

fn is_media_type(s: &str) -> bool {
    match s.split_once('/') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && !s.contains(char::is_whitespace)
                && !minor.contains('/')
        }
        None => false,
    }
}

/// `(string)video` -> `video`, `"a, b"` -> `a, b`
fn field_value(raw: &str) -> String {
    let mut value = raw.trim();
    if value.starts_with('(') {
        if let Some(end) = value.find(')') {
            value = value[end + 1..].trim_start();
        }
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    }
    value.to_string()
}

fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                out.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_and_encoded_video() {
        assert!(is_primary_video("video/x-raw, format=(string)NV12, width=(int)1920"));
        assert!(is_primary_video("video/x-h265, stream-format=(string)byte-stream"));
        assert!(is_primary_video("video/x-h264"));
    }

    #[test]
    fn test_rtp_envelope_uses_media_field() {
        let caps = "application/x-rtp, media=(string)video, clock-rate=(int)90000, \
                    encoding-name=(string)H265";
        assert!(is_primary_video(caps));

        let audio = "application/x-rtp, media=(string)audio, encoding-name=(string)PCMA";
        assert_eq!(classify(audio), TrackKind::Audio);
        assert!(!is_primary_video(audio));
    }

    #[test]
    fn test_audio_is_not_video() {
        assert_eq!(classify("audio/x-raw, rate=(int)48000"), TrackKind::Audio);
        assert!(!is_primary_video("audio/mpeg"));
    }

    #[test]
    fn test_malformed_descriptors_are_not_video() {
        for input in ["", "   ", "video", ",,,", "/x-raw", "video/", "not a caps string"] {
            assert_eq!(classify(input), TrackKind::Other, "input: {:?}", input);
            assert!(!is_primary_video(input));
        }
    }

    #[test]
    fn test_rtp_without_media_field() {
        assert_eq!(classify("application/x-rtp, clock-rate=(int)90000"), TrackKind::Other);
    }

    #[test]
    fn test_only_first_structure_counts() {
        assert_eq!(classify("audio/x-raw; video/x-raw"), TrackKind::Audio);
    }

    #[test]
    fn test_quoted_values_with_separators() {
        let d = MediaDescriptor::parse(
            r#"application/x-rtp, media=(string)video, a-tool=(string)"GStreamer, 1.22", encoding-name=h264"#,
        )
        .unwrap();
        assert_eq!(d.field("a-tool"), Some("GStreamer, 1.22"));
        assert_eq!(d.field("encoding-name"), Some("h264"));
        assert_eq!(d.kind(), TrackKind::Video);
    }

    #[test]
    fn test_media_field_is_case_insensitive() {
        assert!(is_primary_video("application/x-rtp, media=VIDEO"));
    }
}
