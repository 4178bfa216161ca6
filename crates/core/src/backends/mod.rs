//! Media framework backends

#[cfg(feature = "gstreamer")]
pub mod gst;

#[cfg(feature = "gstreamer")]
pub use gst::GstBackend;
