//! Graph profile: the small set of knobs that distinguish deployment targets
//!
//! One builder covers every target. A profile only decides whether decoding is
//! automatic or explicit, whether a scale stage is present, and which sink
//! renders the frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Video codec for explicit decode chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
}

impl Codec {
    pub fn depayloader(&self) -> &'static str {
        match self {
            Codec::H264 => "rtph264depay",
            Codec::H265 => "rtph265depay",
        }
    }

    pub fn parser(&self) -> &'static str {
        match self {
            Codec::H264 => "h264parse",
            Codec::H265 => "h265parse",
        }
    }

    /// Decoder factories, hardware first and software last
    pub fn decoder_candidates(&self) -> &'static [&'static str] {
        match self {
            Codec::H264 => &["v4l2slh264dec", "v4l2h264dec", "omxh264dec", "avdec_h264"],
            Codec::H265 => &["v4l2slh265dec", "v4l2h265dec", "omxh265dec", "avdec_h265"],
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::H264 => write!(f, "h264"),
            Codec::H265 => write!(f, "h265"),
        }
    }
}

/// How the encoded stream is turned into raw frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecodeMode {
    /// Opaque auto-plugging decoder picks depayloader, parser and decoder
    #[default]
    Auto,

    /// Fixed depay → parse → decode chain for a known codec
    Explicit { codec: Codec },
}

/// Output size forced by a scale stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,

    /// Frames per second; left to the source when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            framerate: None,
        }
    }

    pub fn with_framerate(mut self, fps: u32) -> Self {
        self.framerate = Some(fps);
        self
    }

    /// Raw-video caps string for the filter stage
    pub fn caps(&self) -> String {
        match self.framerate {
            Some(fps) => format!(
                "video/x-raw,width={},height={},framerate={}/1",
                self.width, self.height, fps
            ),
            None => format!("video/x-raw,width={},height={}", self.width, self.height),
        }
    }
}

/// Kind of render sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Overlay-capable sink drawing into a native window handle
    Overlay,
    /// GTK widget sink
    Gtk,
    /// Direct KMS plane output (no window system)
    Kms,
    /// Whatever the platform auto-detects
    #[default]
    Auto,
    /// Discards frames; for headless checks
    Fake,
}

impl SinkKind {
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            SinkKind::Overlay => &["d3dvideosink", "glimagesink", "autovideosink"],
            SinkKind::Gtk => &["gtksink"],
            SinkKind::Kms => &["kmssink"],
            SinkKind::Auto => &["autovideosink"],
            SinkKind::Fake => &["fakesink"],
        }
    }
}

/// Graph shape for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphProfile {
    pub decode_mode: DecodeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_resolution: Option<Resolution>,
    pub sink_kind: SinkKind,
}

impl GraphProfile {
    pub fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode_mode = mode;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.target_resolution = Some(resolution);
        self
    }

    pub fn with_sink(mut self, sink: SinkKind) -> Self {
        self.sink_kind = sink;
        self
    }
}

/// Lower transport preference for the source stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// TCP for `rtspt://` and `rtsps://`, transport default otherwise
    #[default]
    Auto,
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// Concrete protocol for `url`, or `None` to keep the source default
    pub fn resolve(&self, url: &str) -> Option<&'static str> {
        match self {
            TransportProtocol::Tcp => Some("tcp"),
            TransportProtocol::Udp => Some("udp"),
            TransportProtocol::Auto => {
                let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
                match scheme.as_deref() {
                    Some("rtspt") | Some("rtsps") => Some("tcp"),
                    _ => None,
                }
            }
        }
    }
}

/// Source stage tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Jitter buffer latency in milliseconds
    pub latency_ms: u32,
    pub protocol: TransportProtocol,
    /// Connection timeout; source default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            protocol: TransportProtocol::Auto,
            timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_auto_prefers_tcp_for_reliable_schemes() {
        let auto = TransportProtocol::Auto;
        assert_eq!(auto.resolve("rtspt://cam/stream"), Some("tcp"));
        assert_eq!(auto.resolve("RTSPS://cam/stream"), Some("tcp"));
        assert_eq!(auto.resolve("rtsp://cam/stream"), None);
        assert_eq!(auto.resolve("garbage"), None);
        assert_eq!(TransportProtocol::Udp.resolve("rtspt://cam"), Some("udp"));
    }

    #[test]
    fn test_decoder_candidates_end_in_software() {
        for codec in [Codec::H264, Codec::H265] {
            let last = codec.decoder_candidates().last().unwrap();
            assert!(last.starts_with("avdec_"), "{codec}: {last}");
        }
    }

    #[test]
    fn test_resolution_caps() {
        assert_eq!(Resolution::new(960, 540).caps(), "video/x-raw,width=960,height=540");
        assert_eq!(
            Resolution::new(640, 360).with_framerate(15).caps(),
            "video/x-raw,width=640,height=360,framerate=15/1"
        );
    }

    #[test]
    fn test_profile_from_toml() {
        let profile: GraphProfile = toml::from_str(
            r#"
            sink_kind = "kms"

            [decode_mode]
            mode = "explicit"
            codec = "h265"

            [target_resolution]
            width = 960
            height = 540
            "#,
        )
        .unwrap();

        assert_eq!(profile.decode_mode, DecodeMode::Explicit { codec: Codec::H265 });
        assert_eq!(profile.sink_kind, SinkKind::Kms);
        assert_eq!(profile.target_resolution, Some(Resolution::new(960, 540)));
    }

    #[test]
    fn test_profile_defaults() {
        let profile: GraphProfile = toml::from_str("").unwrap();
        assert_eq!(profile, GraphProfile::default());
        assert_eq!(profile.decode_mode, DecodeMode::Auto);
        assert_eq!(profile.sink_kind, SinkKind::Auto);
    }
}
