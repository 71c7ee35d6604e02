//! The retained-mode runtime.
//!
//! One `step` runs the cooperative scheduler once: poll input bytes, decode
//! and route events, run model updates, then commit, resolve, lay out, and
//! render a frame when anything changed. Frames are throttled by the fps
//! cap; resizes coalesce within a window; when the output stream reports
//! backpressure, up to three frames queue and the oldest drops first.
//! Constraint or layout failures abort the frame and keep the previous one
//! on screen.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use rezi_core::commit::{CommitOptions, Committer, Instance, InstanceId};
use rezi_core::commit::signature::layout_signatures;
use rezi_core::constraint::resolver::{ResolveOptions, ViewportSize};
use rezi_core::constraint::{ConstraintGraph, ConstraintProperty, ResolveCache, build_constraint_graph, resolve_constraints};
use rezi_core::drawlist::DrawlistBuilder;
use rezi_core::error::ReziCoreError;
use rezi_core::event::Event;
use rezi_core::input::InputParser;
use rezi_core::layout::{Axis, LayoutEngine, LayoutTree, measure_intrinsic};
use rezi_core::render::Renderer;
use rezi_core::repro::{
    BackendCapsSnapshot, CaptureBounds, CaptureConfig, CaptureTotals, CapsSnapshot, EventBatchRecord,
    EventCapture, ReproBundle, SCHEMA_V1, TerminalCapsSnapshot, TimingModel, Truncation, to_hex,
};
use rezi_core::terminal::Backend;
use rezi_core::vnode::VNode;

use crate::config::RuntimeConfig;
use crate::model::{Model, Update};
use crate::router::{Routed, Router};

/// Runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A core operation failed.
    #[error(transparent)]
    Core(#[from] ReziCoreError),

    /// The runtime was used before `start` or after `stop`.
    #[error("runtime is not running")]
    NotRunning,
}

type Action<M> = Box<dyn FnMut(&mut M) -> Update>;

/// Empty polls to tolerate before flushing a pending escape; a sequence
/// split across reads completes within this allowance.
const QUIET_POLLS_BEFORE_FLUSH: u32 = 2;

struct Capture {
    bounds: CaptureBounds,
    batches: Vec<EventBatchRecord>,
    last_batch_at: Instant,
    events: u64,
    bytes: u64,
    truncation: Option<Truncation>,
}

/// The retained-mode runtime driving a [`Model`] against a [`Backend`].
pub struct Runtime<B: Backend, M: Model> {
    backend: B,
    model: M,
    config: RuntimeConfig,

    committer: Committer,
    parser: InputParser,
    router: Router,
    actions: HashMap<String, Action<M>>,
    press_actions: HashMap<String, String>,
    engine: LayoutEngine,
    renderer: Renderer,
    builder: DrawlistBuilder,
    resolve_cache: ResolveCache,

    root: Option<Rc<Instance>>,
    graph: Option<ConstraintGraph>,
    graph_vnode: Option<Rc<VNode>>,
    signatures: Option<HashMap<InstanceId, u32>>,
    layout: Option<LayoutTree>,
    last_drawlist: Option<Vec<u8>>,
    last_render_viewport: (u16, u16),
    last_fatal: Option<ReziCoreError>,

    viewport: (u16, u16),
    running: bool,
    quit: bool,
    force_render: bool,

    last_frame_at: Option<Instant>,
    pending_frames: VecDeque<Vec<u8>>,
    output_drained: bool,
    pending_resize: Option<(u16, u16)>,
    resize_deadline: Option<Instant>,
    quiet_polls: u32,

    capture: Option<Capture>,
}

impl<B: Backend, M: Model> Runtime<B, M> {
    /// Create a runtime with configuration from defaults plus environment
    /// overrides.
    pub fn new(backend: B, model: M) -> Self {
        Self::with_config(backend, model, RuntimeConfig::default().with_env_overrides())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(backend: B, model: M, config: RuntimeConfig) -> Self {
        Self {
            backend,
            model,
            config,
            committer: Committer::new(),
            parser: InputParser::new(),
            router: Router::new(),
            actions: HashMap::new(),
            press_actions: HashMap::new(),
            engine: LayoutEngine::new(),
            renderer: Renderer::new(),
            builder: DrawlistBuilder::new(),
            resolve_cache: ResolveCache::default(),
            root: None,
            graph: None,
            graph_vnode: None,
            signatures: None,
            layout: None,
            last_drawlist: None,
            last_render_viewport: (0, 0),
            last_fatal: None,
            viewport: (0, 0),
            running: false,
            quit: false,
            force_render: false,
            last_frame_at: None,
            pending_frames: VecDeque::new(),
            output_drained: true,
            pending_resize: None,
            resize_deadline: None,
            quiet_polls: 0,
            capture: None,
        }
    }

    /// The model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The model, mutably.
    pub fn model_mut(&mut self) -> &mut M {
        self.force_render = true;
        &mut self.model
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The event router.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// The focused instance, if any.
    pub fn focused(&self) -> Option<InstanceId> {
        self.router.focused()
    }

    /// The last fatal frame error, if the previous frame was retained.
    pub fn last_fatal(&self) -> Option<&ReziCoreError> {
        self.last_fatal.as_ref()
    }

    /// The most recent layout tree.
    pub fn layout(&self) -> Option<&LayoutTree> {
        self.layout.as_ref()
    }

    /// Register a named action invokable from keybindings and presses.
    pub fn register_action(&mut self, name: impl Into<String>, action: Action<M>) {
        self.actions.insert(name.into(), action);
    }

    /// Fire a named action when the widget with this `id` prop is activated.
    pub fn on_press(&mut self, widget_id: impl Into<String>, action: impl Into<String>) {
        self.press_actions.insert(widget_id.into(), action.into());
    }

    /// Start the backend and schedule the first frame.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        self.backend.start()?;
        self.viewport = self.backend.size()?;
        self.running = true;
        self.force_render = true;
        tracing::debug!(cols = self.viewport.0, rows = self.viewport.1, "runtime started");
        Ok(())
    }

    /// Stop the backend. Pending frames are dropped.
    pub fn stop(&mut self) -> Result<(), RuntimeError> {
        self.running = false;
        self.pending_frames.clear();
        self.backend.stop()?;
        Ok(())
    }

    /// Run one scheduler iteration. Returns `false` once the model quit.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        if !self.running {
            return Err(RuntimeError::NotRunning);
        }

        let mut changed = false;
        let events = self.poll_events()?;
        for event in &events {
            match self.dispatch(event) {
                Update::Changed => changed = true,
                Update::Quit => self.quit = true,
                Update::Unchanged => {}
            }
        }

        // Tick keeps animations and timers stepping without input.
        match self.model.update(&Event::Tick) {
            Update::Changed => changed = true,
            Update::Quit => self.quit = true,
            Update::Unchanged => {}
        }

        if self.quit {
            return Ok(false);
        }

        if changed || self.force_render {
            self.force_render = false;
            self.render_frame()?;
        }
        self.pump_pending()?;
        Ok(true)
    }

    /// Run the scheduler until the model quits.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.step()? {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        self.stop()
    }

    fn dispatch(&mut self, event: &Event) -> Update {
        match self.router.route(event, self.layout.as_ref()) {
            Routed::Forward => self.model.update(event),
            Routed::FocusChanged => Update::Changed,
            Routed::Action(name) => self.run_action(&name),
            Routed::Activate(instance) => {
                let action = self
                    .instance_widget_id(instance)
                    .and_then(|id| self.press_actions.get(&id).cloned());
                match action {
                    Some(name) => self.run_action(&name),
                    None => self.model.update(event),
                }
            }
        }
    }

    fn run_action(&mut self, name: &str) -> Update {
        match self.actions.get_mut(name) {
            Some(action) => action(&mut self.model),
            None => {
                tracing::debug!(action = name, "no handler registered");
                Update::Unchanged
            }
        }
    }

    fn instance_widget_id(&self, id: InstanceId) -> Option<String> {
        let root = self.root.as_ref()?;
        let mut found = None;
        root.walk_preorder(&mut |instance| {
            if instance.id() == id {
                found = instance.vnode().widget_id().map(str::to_owned);
            }
        });
        found
    }

    /// Poll the backend: raw bytes through the decoder, posted user events,
    /// and coalesced resizes, in arrival order.
    fn poll_events(&mut self) -> Result<Vec<Event>, RuntimeError> {
        let mut events = Vec::new();

        // Resize detection with coalescing: only the newest size within the
        // window is delivered.
        let size = self.backend.size()?;
        if size == self.viewport {
            // A resize that bounced back within the window is dropped.
            self.pending_resize = None;
            self.resize_deadline = None;
        } else if self.pending_resize != Some(size) {
            self.pending_resize = Some(size);
            if self.resize_deadline.is_none() {
                self.resize_deadline = Some(
                    Instant::now() + std::time::Duration::from_millis(self.config.resize_coalesce_ms),
                );
            }
        }
        if let (Some(pending), Some(deadline)) = (self.pending_resize, self.resize_deadline) {
            if Instant::now() >= deadline {
                self.viewport = pending;
                self.pending_resize = None;
                self.resize_deadline = None;
                self.force_render = true;
                events.push(Event::Resize {
                    cols: pending.0,
                    rows: pending.1,
                });
            }
        }

        for (tag, payload) in self.backend.take_user_events() {
            events.push(Event::User { tag, payload });
        }

        let mut got_bytes = false;
        while let Some(polled) = self.backend.poll_events()? {
            got_bytes = true;
            let decoded = self.parser.feed(&polled.bytes);
            self.record_batch(&polled.bytes, decoded.len());
            events.extend(decoded);
        }

        // A pending escape that stays quiet across polls will never
        // complete; flush it as Escape-then-text.
        if got_bytes {
            self.quiet_polls = 0;
        } else if self.parser.has_pending() {
            self.quiet_polls += 1;
            if self.quiet_polls >= QUIET_POLLS_BEFORE_FLUSH {
                events.extend(self.parser.flush());
                self.quiet_polls = 0;
            }
        }

        Ok(events)
    }

    /// Commit, resolve, lay out, and render the current view.
    fn render_frame(&mut self) -> Result<(), RuntimeError> {
        let vnode = self.model.view();
        let result = self
            .committer
            .commit(self.root.as_ref(), &vnode, CommitOptions::default());
        let root = result.root;
        self.root = Some(Rc::clone(&root));
        self.router.sync_focus_order(&root);

        // Reuse the constraint graph when the view returned the identical
        // VNode tree.
        let reuse_graph = self
            .graph_vnode
            .as_ref()
            .is_some_and(|prev| Rc::ptr_eq(prev, &vnode));
        if !reuse_graph {
            match build_constraint_graph(&root) {
                Ok(graph) => {
                    self.graph = Some(graph);
                    self.graph_vnode = Some(Rc::clone(&vnode));
                }
                Err(error) => {
                    // Fatal: report and keep the previous frame.
                    tracing::debug!(%error, "constraint graph build failed; frame retained");
                    self.last_fatal = Some(error.into());
                    return Ok(());
                }
            }
        }
        let Some(graph) = self.graph.as_ref() else {
            return Ok(());
        };

        // Layout-stability signatures gate the expensive half of the frame:
        // an unchanged tree resubmits the previous drawlist.
        let signatures = layout_signatures(&root);
        let unchanged = match (&signatures, &self.signatures) {
            (Some(new), Some(old)) => new == old,
            _ => false,
        };
        if unchanged
            && self.last_drawlist.is_some()
            && !graph.requires_commit_relayout()
            && self.last_render_viewport == self.viewport
        {
            if let Some(bytes) = self.last_drawlist.clone() {
                self.submit(bytes)?;
            }
            return Ok(());
        }
        self.signatures = signatures;

        // Resolve constraints with intrinsic measurements and committed
        // plain values for referenced siblings.
        let mut intrinsic = HashMap::new();
        for &instance_id in graph.intrinsic_instances() {
            if let Some(instance) = find_instance(&root, instance_id) {
                let (w, h) = measure_intrinsic(&instance);
                intrinsic.insert(instance_id, (f64::from(w), f64::from(h)));
            }
        }
        let base_values = collect_base_values(&root);
        let viewport = ViewportSize::new(f64::from(self.viewport.0), f64::from(self.viewport.1));
        let resolved = resolve_constraints(
            graph,
            viewport,
            ResolveOptions {
                intrinsic_values: Some(&intrinsic),
                base_values: Some(&base_values),
                ..Default::default()
            },
            Some(&mut self.resolve_cache),
        );
        tracing::trace!(cache_hit = resolved.cache_hit, "constraints resolved");

        let layout = match self.engine.layout(
            &root,
            0,
            0,
            i32::from(self.viewport.0),
            i32::from(self.viewport.1),
            Axis::Vertical,
            &resolved.values,
        ) {
            Ok(layout) => layout,
            Err(error) => {
                tracing::debug!(%error, "layout failed; frame retained");
                self.last_fatal = Some(error);
                return Ok(());
            }
        };

        self.builder.reset();
        self.renderer.render(&layout, &mut self.builder);
        let bytes = match self.builder.build() {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::debug!(%error, "drawlist build failed; frame retained");
                self.last_fatal = Some(error.into());
                return Ok(());
            }
        };

        self.layout = Some(layout);
        self.last_fatal = None;
        root.clear_dirty();
        self.last_drawlist = Some(bytes.clone());
        self.last_render_viewport = self.viewport;
        self.submit(bytes)
    }

    /// Submit a frame, honoring the fps cap and output backpressure.
    fn submit(&mut self, bytes: Vec<u8>) -> Result<(), RuntimeError> {
        if !self.output_drained {
            self.output_drained = self.backend.poll_drained();
        }
        let now = Instant::now();
        let throttled = self
            .last_frame_at
            .is_some_and(|last| now.duration_since(last) < self.config.frame_interval());
        if throttled || !self.output_drained {
            self.enqueue(bytes);
            return Ok(());
        }
        self.output_drained = self.backend.request_frame(&bytes)?;
        self.last_frame_at = Some(now);
        Ok(())
    }

    fn enqueue(&mut self, bytes: Vec<u8>) {
        while self.pending_frames.len() >= self.config.max_pending_frames {
            // Newest wins; the oldest queued frame drops.
            self.pending_frames.pop_front();
            tracing::trace!("dropped oldest pending frame");
        }
        self.pending_frames.push_back(bytes);
    }

    /// Submit queued frames once the cap allows and the stream drained.
    fn pump_pending(&mut self) -> Result<(), RuntimeError> {
        if !self.output_drained {
            self.output_drained = self.backend.poll_drained();
        }
        while !self.pending_frames.is_empty() {
            let now = Instant::now();
            let throttled = self
                .last_frame_at
                .is_some_and(|last| now.duration_since(last) < self.config.frame_interval());
            if throttled || !self.output_drained {
                return Ok(());
            }
            if let Some(bytes) = self.pending_frames.pop_front() {
                self.output_drained = self.backend.request_frame(&bytes)?;
                self.last_frame_at = Some(now);
            }
        }
        Ok(())
    }

    /// Begin capturing polled input into a repro bundle.
    pub fn start_capture(&mut self, bounds: CaptureBounds) {
        self.capture = Some(Capture {
            bounds,
            batches: Vec::new(),
            last_batch_at: Instant::now(),
            events: 0,
            bytes: 0,
            truncation: None,
        });
    }

    fn record_batch(&mut self, bytes: &[u8], event_count: usize) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };
        if capture.truncation.is_some() {
            return;
        }
        let step = capture.batches.len() as u64;
        let exceeded = if step >= capture.bounds.max_batches {
            Some("max-batches")
        } else if capture.events + event_count as u64 > capture.bounds.max_events {
            Some("max-events")
        } else if capture.bytes + bytes.len() as u64 > capture.bounds.max_bytes {
            Some("max-bytes")
        } else {
            None
        };
        if let Some(reason) = exceeded {
            capture.truncation = Some(Truncation {
                reason: reason.to_owned(),
                first_omitted_step: step,
            });
            return;
        }
        let now = Instant::now();
        let delta_ms = now.duration_since(capture.last_batch_at).as_millis() as u64;
        capture.last_batch_at = now;
        capture.events += event_count as u64;
        capture.bytes += bytes.len() as u64;
        capture.batches.push(EventBatchRecord {
            step,
            delta_ms,
            event_count: event_count as u64,
            byte_length: bytes.len() as u64,
            bytes_hex: to_hex(bytes),
        });
    }

    /// Finish capturing and assemble the bundle.
    pub fn stop_capture(&mut self) -> Option<ReproBundle> {
        let capture = self.capture.take()?;
        let caps = self.backend.caps();
        Some(ReproBundle {
            schema: SCHEMA_V1.to_owned(),
            capture_config: CaptureConfig {
                mode: "manual".into(),
                viewport_cols: u32::from(self.viewport.0),
                viewport_rows: u32::from(self.viewport.1),
            },
            caps_snapshot: CapsSnapshot {
                terminal_caps: TerminalCapsSnapshot {
                    color_mode: caps.color_mode as u8,
                    supports_mouse: caps.supports_mouse,
                    supports_bracketed_paste: caps.supports_bracketed_paste,
                    supports_focus_events: caps.supports_focus_events,
                    sgr_attrs_supported: caps.sgr_attrs_supported,
                },
                backend_caps: BackendCapsSnapshot {
                    name: "rezi".into(),
                    version: env!("CARGO_PKG_VERSION").into(),
                },
            },
            timing_model: TimingModel {
                kind: "deterministic".into(),
                clock: "monotonic-ms".into(),
                replay_strategy: "recorded-delta".into(),
                // The monotonic scale starts at capture start; batches carry
                // deltas from there.
                base_time_ms: 0,
            },
            event_capture: EventCapture {
                ordering: "poll-order".into(),
                timing: "step-delta-ms".into(),
                bounds: capture.bounds,
                totals: CaptureTotals {
                    captured_batches: capture.batches.len() as u64,
                    captured_events: capture.events,
                    captured_bytes: capture.bytes,
                },
                truncation: capture.truncation,
                batches: capture.batches,
            },
        })
    }
}

fn find_instance(root: &Rc<Instance>, id: InstanceId) -> Option<Rc<Instance>> {
    let mut found = None;
    root.walk_preorder(&mut |instance| {
        if instance.id() == id && found.is_none() {
            found = Some(Rc::clone(instance));
        }
    });
    found
}

/// Committed plain (non-expression) dimension values, consumed by sibling
/// references and aggregations.
fn collect_base_values(root: &Rc<Instance>) -> HashMap<(InstanceId, ConstraintProperty), f64> {
    let mut base = HashMap::new();
    root.walk_preorder(&mut |instance| {
        let vnode = instance.vnode();
        for property in ConstraintProperty::ALL {
            if let Some(value) = vnode.get_number(property.prop_name()) {
                base.insert((instance.id(), property), value);
            }
        }
    });
    base
}
