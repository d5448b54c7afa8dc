//! Desktop host: one winit window driving one [`EngineHandle`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{Event, Touch, TouchPhase, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::window::{Window, WindowBuilder};

use crate::config::VariantConfig;
use crate::engine::{EngineHandle, TickOutcome};
use crate::error::ContextError;
use crate::gpu::WgpuBackend;
use crate::host::{
    FrameScheduler, FrameToken, HostEvent, HostSurface, InputEvents, ListenerId, ListenerKind,
};
use crate::types::{ContextAttributes, PointerPosition, SurfaceSize};

const DEFAULT_SIZE: SurfaceSize = SurfaceSize::new(1280, 720);

/// Host backed by a winit window. Frame requests map to `request_redraw`.
pub struct WindowHost {
    window: Arc<Window>,
    next_token: u64,
    pending: Option<FrameToken>,
    gate: RedrawGate,
    next_listener: u64,
    listeners: Vec<(ListenerId, ListenerKind)>,
}

impl WindowHost {
    pub fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();
        Self {
            gate: RedrawGate::new(SurfaceSize::new(size.width, size.height)),
            window,
            next_token: 0,
            pending: None,
            next_listener: 0,
            listeners: Vec::new(),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Takes the token of the outstanding frame request, if any.
    pub fn take_pending(&mut self) -> Option<FrameToken> {
        self.pending.take()
    }

    /// Records a new window size and issues any redraw held back while the
    /// window had no area.
    pub fn resize(&mut self, size: SurfaceSize) {
        if self.gate.resize(size) && self.pending.is_some() {
            self.window.request_redraw();
        }
    }

    pub fn is_listening(&self, kind: ListenerKind) -> bool {
        self.listeners.iter().any(|(_, live)| *live == kind)
    }
}

impl HostSurface for WindowHost {
    type Context = WgpuBackend;

    fn viewport_size(&self) -> SurfaceSize {
        let size = self.window.inner_size();
        SurfaceSize::new(size.width, size.height)
    }

    fn acquire_context(
        &mut self,
        attributes: ContextAttributes,
    ) -> Result<WgpuBackend, ContextError> {
        WgpuBackend::new(Arc::clone(&self.window), self.viewport_size(), attributes)
    }
}

impl FrameScheduler for WindowHost {
    fn request_frame(&mut self) -> FrameToken {
        self.next_token += 1;
        let token = FrameToken(self.next_token);
        self.pending = Some(token);
        if self.gate.request() {
            self.window.request_redraw();
        }
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        if self.pending == Some(token) {
            self.pending = None;
            self.gate.cancel();
        }
    }
}

impl InputEvents for WindowHost {
    fn add_listener(&mut self, kind: ListenerKind) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, kind));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(live, _)| *live != id);
    }
}

/// Holds redraw requests back while the window has no area; a minimised
/// window never presents, so nothing else would throttle the loop.
#[derive(Debug)]
struct RedrawGate {
    size: SurfaceSize,
    deferred: bool,
}

impl RedrawGate {
    fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            deferred: false,
        }
    }

    /// True when the redraw may be requested now.
    fn request(&mut self) -> bool {
        self.deferred = self.size.is_empty();
        !self.deferred
    }

    /// True when a deferred request should be issued for the new size.
    fn resize(&mut self, size: SurfaceSize) -> bool {
        self.size = size;
        if self.deferred && !size.is_empty() {
            self.deferred = false;
            return true;
        }
        false
    }

    fn cancel(&mut self) {
        self.deferred = false;
    }
}

/// Active touch points, oldest first. The oldest is the primary touch.
#[derive(Debug, Default)]
struct TouchState {
    points: Vec<(u64, PointerPosition)>,
}

impl TouchState {
    /// Applies `touch`; returns the active points when they moved.
    fn handle(&mut self, touch: &Touch) -> Option<Vec<PointerPosition>> {
        let position = pointer_position(touch.location);
        match touch.phase {
            TouchPhase::Started => self.points.push((touch.id, position)),
            TouchPhase::Moved => {
                let entry = self.points.iter_mut().find(|(id, _)| *id == touch.id)?;
                entry.1 = position;
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                self.points.retain(|(id, _)| *id != touch.id);
                return None;
            }
        }
        Some(self.points.iter().map(|(_, point)| *point).collect())
    }
}

fn pointer_position(position: PhysicalPosition<f64>) -> PointerPosition {
    PointerPosition::new(position.x as f32, position.y as f32)
}

/// Preview window settings.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub variant: VariantConfig,
    pub size: Option<SurfaceSize>,
    pub title: String,
}

/// Opens a window, attaches `config.variant` and runs until the window is
/// closed or rendering fails.
pub fn run_preview(config: PreviewConfig) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let size = config.size.unwrap_or(DEFAULT_SIZE);
    let window = WindowBuilder::new()
        .with_title(&config.title)
        .with_inner_size(PhysicalSize::new(size.width, size.height))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let window_id = window.id();

    let variant = config.variant.name.clone();
    let engine = EngineHandle::attach(WindowHost::new(Arc::clone(&window)), config.variant)
        .with_context(|| format!("failed to attach variant `{variant}`"))?;
    let mut engine = Some(engine);
    let mut touches = TouchState::default();
    let mut failure = None;

    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent {
            window_id: id,
            event,
        } if id == window_id => {
            let Some(handle) = engine.as_mut() else {
                return;
            };
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    engine = None;
                    elwt.exit();
                }
                WindowEvent::Resized(new_size) => {
                    let size = SurfaceSize::new(new_size.width, new_size.height);
                    handle.dispatch(&HostEvent::Resize(size));
                    handle.host_mut().resize(size);
                }
                WindowEvent::ScaleFactorChanged {
                    mut inner_size_writer,
                    ..
                } => {
                    let _ = inner_size_writer.request_inner_size(window.inner_size());
                }
                WindowEvent::CursorMoved { position, .. } => {
                    if handle.host().is_listening(ListenerKind::PointerMove) {
                        handle.dispatch(&HostEvent::PointerMove(pointer_position(position)));
                    }
                }
                WindowEvent::Touch(touch) => {
                    if let Some(points) = touches.handle(&touch) {
                        if handle.host().is_listening(ListenerKind::TouchMove) {
                            handle.dispatch(&HostEvent::TouchMove(points));
                        }
                    }
                }
                WindowEvent::RedrawRequested => {
                    let Some(token) = handle.host_mut().take_pending() else {
                        return;
                    };
                    match handle.on_frame(token, Instant::now()) {
                        Ok(TickOutcome::Dropped(err)) => {
                            tracing::debug!(error = %err, "frame dropped; retrying");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "rendering stopped");
                            failure = Some(err);
                            engine = None;
                            elwt.exit();
                        }
                    }
                }
                _ => {}
            }
        }
        Event::AboutToWait => {
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    drop(engine);
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))?;
    match failure {
        Some(err) => Err(anyhow!(err).context("render loop failed")),
        None => Ok(()),
    }
}
