//! Interfaces the embedding host provides to the engine.
//!
//! A host owns the drawing surface, the frame clock and the input event
//! source. The engine asks it for a context, a frame callback and listener
//! registrations, and the host feeds callbacks back through
//! `EngineHandle::on_frame` and `EngineHandle::dispatch`.

use std::fmt;

use crate::backend::GraphicsBackend;
use crate::error::ContextError;
use crate::types::{ContextAttributes, PointerPosition, SurfaceSize};

/// Identifies one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(pub u64);

impl fmt::Display for FrameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Identifies one registered input listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Resize,
    PointerMove,
    TouchMove,
}

/// Event delivered by the host to an attached engine.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// New viewport size in device pixels.
    Resize(SurfaceSize),
    /// Pointer position, top-left origin.
    PointerMove(PointerPosition),
    /// Active touch points; only the first is used.
    TouchMove(Vec<PointerPosition>),
}

impl HostEvent {
    pub fn kind(&self) -> ListenerKind {
        match self {
            HostEvent::Resize(_) => ListenerKind::Resize,
            HostEvent::PointerMove(_) => ListenerKind::PointerMove,
            HostEvent::TouchMove(_) => ListenerKind::TouchMove,
        }
    }
}

pub trait HostSurface {
    type Context: GraphicsBackend;

    /// Current viewport size in device pixels.
    fn viewport_size(&self) -> SurfaceSize;

    fn acquire_context(
        &mut self,
        attributes: ContextAttributes,
    ) -> Result<Self::Context, ContextError>;
}

pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameToken;

    fn cancel_frame(&mut self, token: FrameToken);
}

pub trait InputEvents {
    fn add_listener(&mut self, kind: ListenerKind) -> ListenerId;

    fn remove_listener(&mut self, id: ListenerId);
}

/// Everything the engine needs from its embedding environment.
pub trait Host: HostSurface + FrameScheduler + InputEvents {}

impl<T> Host for T where T: HostSurface + FrameScheduler + InputEvents {}
