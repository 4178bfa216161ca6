//! GStreamer backend
//!
//! Maps plan stages to GStreamer elements inside one `gst::Pipeline` per
//! graph. Dynamic sources (`rtspsrc`, `decodebin`) report new pads through
//! `pad-added`; each pad is held behind a blocking probe and posted to the
//! supervisor as a [`Track`]. Linking the track, or dropping it, releases the
//! probe. A bus sync handler forwards errors, warnings, end-of-stream and
//! pipeline state changes into the same queue, and answers
//! `prepare-window-handle` with the stream's window handle.

use std::collections::HashMap;
use std::sync::Arc;

use gst::glib;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_video as gst_video;
use gst_video::prelude::*;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BuildError, Error, LinkError, Result, SurfaceError};
use crate::graph::{
    BusEvent, EventSender, Graph, GraphEvent, GraphPlan, JunctionId, JunctionSpec, MediaBackend,
    PlaybackState, StageRole, StageSpec, Track, TrackHandle,
};
use crate::surface::RenderSurface;

/// GStreamer-backed [`MediaBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn init(&self) -> Result<()> {
        gst::init().map_err(|e| Error::Init(e.to_string()))
    }

    fn shutdown(&self) {
        // SAFETY: called once by MediaRuntime after every supervisor, and
        // therefore every pipeline, is gone.
        unsafe { gst::deinit() }
    }

    fn instantiate(
        &self,
        plan: &GraphPlan,
        events: EventSender,
    ) -> std::result::Result<Box<dyn Graph>, BuildError> {
        Ok(Box::new(GstGraph::build(plan, events)?))
    }
}

/// A pad waiting for a link decision
struct PendingPad {
    pad: gst::Pad,
    probe: Option<gst::PadProbeId>,
}

impl Drop for PendingPad {
    fn drop(&mut self) {
        if let Some(probe) = self.probe.take() {
            self.pad.remove_probe(probe);
        }
    }
}

struct GstGraph {
    stream: String,
    pipeline: gst::Pipeline,
    elements: HashMap<StageRole, gst::Element>,
    junctions: Vec<JunctionSpec>,
    surface: Arc<Mutex<RenderSurface>>,
    torn_down: bool,
}

impl GstGraph {
    fn build(plan: &GraphPlan, events: EventSender) -> std::result::Result<Self, BuildError> {
        let pipeline = gst::Pipeline::with_name(&format!("{}_pipeline", plan.stream));
        let mut elements = HashMap::new();

        for stage in &plan.stages {
            let element = make_element(stage)?;
            apply_properties(&element, stage);
            pipeline
                .add(&element)
                .map_err(|e| BuildError::new(stage.role, &stage.candidates, e.to_string()))?;
            elements.insert(stage.role, element);
        }

        for (upstream, downstream) in &plan.static_links {
            let (Some(up), Some(down)) = (elements.get(upstream), elements.get(downstream)) else {
                continue;
            };
            up.link(down).map_err(|e| {
                let candidates = plan
                    .stage(*downstream)
                    .map(|s| s.candidates.clone())
                    .unwrap_or_default();
                BuildError::new(
                    *downstream,
                    &candidates,
                    format!("cannot link {} to {}: {}", upstream, downstream, e),
                )
            })?;
        }

        for (role, junction) in plan.dynamic_sources() {
            if let Some(upstream) = elements.get(&role) {
                watch_pads(upstream, junction, events.clone());
            }
        }

        let surface = Arc::new(Mutex::new(RenderSurface::None));
        let bus = pipeline.bus().ok_or_else(|| {
            BuildError::new(StageRole::Source, &[], "pipeline has no bus")
        })?;
        bus.set_sync_handler(bus_handler(
            pipeline.name().to_string(),
            Arc::clone(&surface),
            events,
        ));

        Ok(Self {
            stream: plan.stream.clone(),
            pipeline,
            elements,
            junctions: plan.junctions.clone(),
            surface,
            torn_down: false,
        })
    }

    fn sink(&self) -> std::result::Result<&gst::Element, SurfaceError> {
        self.elements
            .get(&StageRole::Sink)
            .ok_or_else(|| SurfaceError::Rejected("graph has no sink".to_string()))
    }
}

impl Graph for GstGraph {
    fn bind_surface(&mut self, surface: &RenderSurface) -> std::result::Result<(), SurfaceError> {
        let sink = self.sink()?.clone();
        let overlay = sink.dynamic_cast_ref::<gst_video::VideoOverlay>();
        let unsupported = || SurfaceError::Unsupported {
            sink: sink.factory().map(|f| f.name().to_string()).unwrap_or_default(),
            surface: surface.kind().to_string(),
        };

        match surface {
            RenderSurface::None => {}
            RenderSurface::WindowHandle(handle) => {
                match overlay {
                    // SAFETY: the window belongs to the embedding application,
                    // which keeps it alive while the stream is configured for it
                    Some(overlay) => {
                        unsafe { overlay.set_window_handle(*handle as usize) };
                        overlay.expose();
                    }
                    // Auto-plugging bins pick their real sink later; the bus
                    // handler answers prepare-window-handle for them
                    None if sink.is::<gst::Bin>() => {}
                    None => return Err(unsupported()),
                }
            }
            RenderSurface::Rect(rect) => {
                // kmssink takes the rectangle as a property
                if let Some(pspec) = sink.find_property("render-rectangle") {
                    let value = glib::Value::deserialize(&rect.to_string(), pspec.value_type())
                        .map_err(|e| SurfaceError::Rejected(e.to_string()))?;
                    sink.set_property_from_value("render-rectangle", &value);
                } else if let Some(overlay) = overlay {
                    overlay
                        .set_render_rectangle(
                            rect.x,
                            rect.y,
                            rect.width as i32,
                            rect.height as i32,
                        )
                        .map_err(|e| SurfaceError::Rejected(e.to_string()))?;
                } else {
                    return Err(unsupported());
                }
            }
        }

        *self.surface.lock() = *surface;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map(|_| ())
            .map_err(|e| Error::Play(e.to_string()))
    }

    fn link(&mut self, track: Track) -> std::result::Result<(), LinkError> {
        let id = track.junction;
        let junction = self
            .junctions
            .iter()
            .find(|j| j.id == id)
            .ok_or_else(|| LinkError::new(id, "no such junction"))?;
        let downstream = self
            .elements
            .get(&junction.downstream)
            .ok_or_else(|| LinkError::new(id, format!("missing {} stage", junction.downstream)))?;
        let pending = track
            .handle
            .downcast::<PendingPad>()
            .ok_or_else(|| LinkError::new(id, "track does not carry a pad"))?;
        let sink_pad = downstream
            .static_pad("sink")
            .ok_or_else(|| LinkError::new(id, format!("{} has no sink pad", junction.downstream)))?;

        if sink_pad.is_linked() {
            return Err(LinkError::new(id, "sink pad already linked"));
        }

        pending
            .pad
            .link(&sink_pad)
            .map_err(|e| LinkError::new(id, e.to_string()))?;
        debug!(stream = %self.stream, junction = %id, pad = %pending.pad.name(), "Pad linked");

        // Dropping the pending pad removes the blocking probe
        drop(pending);
        Ok(())
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(stream = %self.stream, error = %e, "Failed to stop pipeline");
        }
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        for element in self.elements.values() {
            let _ = self.pipeline.remove(element);
        }
        self.elements.clear();
        *self.surface.lock() = RenderSurface::None;
    }
}

impl Drop for GstGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn make_element(stage: &StageSpec) -> std::result::Result<gst::Element, BuildError> {
    for factory in &stage.candidates {
        match gst::ElementFactory::make(factory)
            .name(stage.name.as_str())
            .build()
        {
            Ok(element) => {
                debug!(stage = %stage.role, %factory, "Created element");
                return Ok(element);
            }
            Err(e) => debug!(stage = %stage.role, %factory, error = %e, "Factory unavailable"),
        }
    }
    Err(BuildError::new(
        stage.role,
        &stage.candidates,
        "no candidate factory is available",
    ))
}

/// Set the properties the element actually has
fn apply_properties(element: &gst::Element, stage: &StageSpec) {
    for (key, value) in &stage.properties {
        let Some(pspec) = element.find_property(key) else {
            debug!(stage = %stage.role, property = %key, "Element has no such property, skipping");
            continue;
        };
        if !pspec.flags().contains(glib::ParamFlags::WRITABLE) {
            continue;
        }
        match glib::Value::deserialize(value, pspec.value_type()) {
            Ok(v) => element.set_property_from_value(key, &v),
            Err(e) => warn!(
                stage = %stage.role,
                property = %key,
                %value,
                error = %e,
                "Invalid property value"
            ),
        }
    }
}

/// Post every new source pad of `element` as a track on `junction`
fn watch_pads(element: &gst::Element, junction: JunctionId, events: EventSender) {
    element.connect_pad_added(move |_, pad| {
        if pad.direction() != gst::PadDirection::Src {
            return;
        }

        let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
        let probe = pad.add_probe(gst::PadProbeType::BLOCK_DOWNSTREAM, |_, _| {
            gst::PadProbeReturn::Ok
        });
        let pending = PendingPad {
            pad: pad.clone(),
            probe,
        };

        // A closed queue means the graph is being torn down
        let _ = events.send(GraphEvent::TrackAvailable(Track::new(
            junction,
            caps.to_string(),
            TrackHandle::new(pending),
        )));
    });
}

fn bus_handler(
    pipeline_name: String,
    surface: Arc<Mutex<RenderSurface>>,
    events: EventSender,
) -> impl Fn(&gst::Bus, &gst::Message) -> gst::BusSyncReply + Send + Sync + 'static {
    move |_, msg| {
        if gst_video::is_video_overlay_prepare_window_handle_message(msg) {
            if let RenderSurface::WindowHandle(handle) = *surface.lock() {
                let overlay = msg
                    .src()
                    .and_then(|src| src.dynamic_cast_ref::<gst_video::VideoOverlay>());
                if let Some(overlay) = overlay {
                    // SAFETY: see GstGraph::bind_surface
                    unsafe { overlay.set_window_handle(handle as usize) };
                    overlay.expose();
                }
            }
            return gst::BusSyncReply::Drop;
        }

        if let Some(event) = translate(msg, &pipeline_name) {
            let _ = events.send(GraphEvent::Bus(event));
        }
        gst::BusSyncReply::Drop
    }
}

fn translate(msg: &gst::Message, pipeline_name: &str) -> Option<BusEvent> {
    use gst::MessageView;

    let source = msg
        .src()
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match msg.view() {
        MessageView::Error(err) => Some(BusEvent::Error {
            source,
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        }),
        MessageView::Warning(w) => Some(BusEvent::Warning {
            source,
            message: w.error().to_string(),
        }),
        MessageView::Eos(_) => Some(BusEvent::EndOfStream),
        MessageView::StateChanged(s) if source == pipeline_name => Some(BusEvent::StateChanged {
            old: playback_state(s.old()),
            new: playback_state(s.current()),
        }),
        _ => None,
    }
}

fn playback_state(state: gst::State) -> PlaybackState {
    match state {
        gst::State::Ready => PlaybackState::Ready,
        gst::State::Paused => PlaybackState::Paused,
        gst::State::Playing => PlaybackState::Playing,
        _ => PlaybackState::Null,
    }
}

#[cfg(all(test, feature = "gstreamer"))]
mod tests {
    use super::*;

    fn init() {
        gst::init().unwrap();
    }

    fn element(factory: &str, name: &str) -> gst::Element {
        gst::ElementFactory::make(factory).name(name).build().unwrap()
    }

    fn stage(role: StageRole, candidates: &[&str], properties: &[(&str, &str)]) -> StageSpec {
        StageSpec {
            role,
            name: format!("cam_{}", role),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_translate_error_keeps_source_and_details() {
        init();
        let src = element("fakesrc", "cam_source");
        let msg = gst::message::Error::builder(gst::CoreError::Failed, "Could not read from resource")
            .src(&src)
            .debug("RTSP connection lost")
            .build();

        assert_eq!(
            translate(&msg, "cam_pipeline"),
            Some(BusEvent::Error {
                source: "cam_source".to_string(),
                message: "Could not read from resource".to_string(),
                debug: Some("RTSP connection lost".to_string()),
            })
        );
    }

    #[test]
    fn test_translate_warning_and_eos() {
        init();
        let sink = element("fakesink", "cam_sink");
        let warning = gst::message::Warning::builder(gst::CoreError::Failed, "Dropping frames")
            .src(&sink)
            .build();
        assert_eq!(
            translate(&warning, "cam_pipeline"),
            Some(BusEvent::Warning {
                source: "cam_sink".to_string(),
                message: "Dropping frames".to_string(),
            })
        );

        let eos = gst::message::Eos::new();
        assert_eq!(translate(&eos, "cam_pipeline"), Some(BusEvent::EndOfStream));
    }

    #[test]
    fn test_translate_state_changes_of_pipeline_only() {
        init();
        let pipeline = gst::Pipeline::with_name("cam_pipeline");
        let sink = element("fakesink", "cam_sink");
        let changed = |src: &gst::Element| {
            gst::message::StateChanged::builder(
                gst::State::Paused,
                gst::State::Playing,
                gst::State::VoidPending,
            )
            .src(src)
            .build()
        };

        assert_eq!(
            translate(&changed(pipeline.upcast_ref()), "cam_pipeline"),
            Some(BusEvent::StateChanged {
                old: PlaybackState::Paused,
                new: PlaybackState::Playing,
            })
        );
        assert_eq!(translate(&changed(&sink), "cam_pipeline"), None);
    }

    #[test]
    fn test_playback_state_mapping() {
        assert_eq!(playback_state(gst::State::Ready), PlaybackState::Ready);
        assert_eq!(playback_state(gst::State::Paused), PlaybackState::Paused);
        assert_eq!(playback_state(gst::State::Playing), PlaybackState::Playing);
        assert_eq!(playback_state(gst::State::Null), PlaybackState::Null);
        assert_eq!(playback_state(gst::State::VoidPending), PlaybackState::Null);
    }

    #[test]
    fn test_apply_properties_skips_unknown_and_read_only() {
        init();
        let queue = element("queue", "cam_queue");
        let spec = stage(
            StageRole::Queue,
            &["queue"],
            &[
                ("max-size-buffers", "7"),
                ("no-such-property", "1"),
                ("current-level-buffers", "99"),
                ("max-size-time", "soon"),
            ],
        );

        apply_properties(&queue, &spec);

        assert_eq!(queue.property::<u32>("max-size-buffers"), 7);
        assert_eq!(queue.property::<u32>("current-level-buffers"), 0);
    }

    #[test]
    fn test_make_element_falls_through_candidates() {
        init();
        let spec = stage(StageRole::Sink, &["not-a-real-sink", "fakesink"], &[]);
        let sink = make_element(&spec).unwrap();
        assert_eq!(sink.factory().unwrap().name().as_str(), "fakesink");
        assert_eq!(sink.name().as_str(), "cam_sink");

        let spec = stage(StageRole::Sink, &["not-a-real-sink", "also-not-real"], &[]);
        let err = make_element(&spec).unwrap_err();
        assert_eq!(err.stage, StageRole::Sink);
        assert_eq!(err.candidates, vec!["not-a-real-sink", "also-not-real"]);
    }
}
