//! In-memory host and backend used by the unit tests.
//!
//! `RecordingBackend` keeps every live object id and every draw in a shared
//! [`Ledger`], so tests can inspect GPU state after the engine that owned the
//! backend has been detached or dropped.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::backend::{
    BufferId, GraphicsBackend, ProgramId, ResourceCounts, ShaderId, TextureId, TextureImage,
};
use crate::error::{CompileError, ContextError, FrameError, GeometryError, LinkError, TextureError};
use crate::host::{FrameScheduler, FrameToken, HostSurface, InputEvents, ListenerId, ListenerKind};
use crate::registry::{TextureSlot, UniformLayout};
use crate::types::{ContextAttributes, ShaderSource, SurfaceSize, UniformValue};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DrawCall {
    pub program: Option<ProgramId>,
    pub buffer: BufferId,
    pub first: u32,
    pub count: u32,
    pub viewport: Option<SurfaceSize>,
    pub uniforms: BTreeMap<String, UniformValue>,
    pub textures: BTreeMap<String, TextureId>,
}

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    next_id: u64,
    pub shaders: BTreeSet<u64>,
    pub programs: BTreeSet<u64>,
    pub buffers: BTreeSet<u64>,
    pub textures: BTreeMap<u64, TextureImage>,
    pub live_contexts: usize,
    pub contexts_acquired: usize,
    pub viewport: Option<SurfaceSize>,
    pub viewport_history: Vec<SurfaceSize>,
    pub active_program: Option<ProgramId>,
    pub uniforms: BTreeMap<(u64, String), UniformValue>,
    pub bindings: BTreeMap<(u64, String), TextureId>,
    pub draws: Vec<DrawCall>,
    pub fail_link: bool,
    pub fail_buffer: bool,
    pub draw_errors: Vec<FrameError>,
    pub attributes: Option<ContextAttributes>,
    pub requested: Vec<FrameToken>,
    pub cancelled: Vec<FrameToken>,
    pub listeners: BTreeMap<u64, ListenerKind>,
}

impl Ledger {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn counts(&self) -> ResourceCounts {
        ResourceCounts {
            shaders: self.shaders.len(),
            programs: self.programs.len(),
            buffers: self.buffers.len(),
            textures: self.textures.len(),
        }
    }

    pub fn last_draw(&self) -> Option<&DrawCall> {
        self.draws.last()
    }

    pub fn listener_kinds(&self) -> Vec<ListenerKind> {
        self.listeners.values().copied().collect()
    }
}

pub(crate) type SharedLedger = Rc<RefCell<Ledger>>;

/// Rejects sources with characters GLSL never accepts or unbalanced braces.
fn compile_log(source: &ShaderSource) -> Option<String> {
    if let Some(bad) = source.text.chars().find(|ch| matches!(ch, '@' | '$' | '`')) {
        return Some(format!("0:1: '{bad}' : unexpected character"));
    }
    let opened = source.text.matches('{').count();
    let closed = source.text.matches('}').count();
    if opened != closed {
        return Some(format!("0:1: '' : unexpected end of input ({opened} '{{' vs {closed} '}}')"));
    }
    None
}

#[derive(Debug)]
pub(crate) struct RecordingBackend {
    ledger: SharedLedger,
    released: bool,
}

impl RecordingBackend {
    pub fn new(ledger: SharedLedger) -> Self {
        {
            let mut ledger = ledger.borrow_mut();
            ledger.live_contexts += 1;
            ledger.contexts_acquired += 1;
        }
        Self {
            ledger,
            released: false,
        }
    }

    pub fn standalone() -> Self {
        Self::new(SharedLedger::default())
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }
}

impl GraphicsBackend for RecordingBackend {
    fn set_viewport(&mut self, size: SurfaceSize) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.viewport = Some(size);
        ledger.viewport_history.push(size);
    }

    fn compile_shader(
        &mut self,
        source: &ShaderSource,
        _layout: &UniformLayout,
    ) -> Result<ShaderId, CompileError> {
        let mut ledger = self.ledger.borrow_mut();
        let id = ledger.allocate();
        ledger.shaders.insert(id);
        if let Some(log) = compile_log(source) {
            ledger.shaders.remove(&id);
            return Err(CompileError {
                stage: source.stage,
                log,
            });
        }
        Ok(ShaderId(id))
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        _layout: &UniformLayout,
    ) -> Result<ProgramId, LinkError> {
        let mut ledger = self.ledger.borrow_mut();
        if !ledger.shaders.contains(&vertex.0) || !ledger.shaders.contains(&fragment.0) {
            return Err(LinkError {
                log: "attached shader is not live".into(),
            });
        }
        if ledger.fail_link {
            return Err(LinkError {
                log: "varying mismatch between stages".into(),
            });
        }
        let id = ledger.allocate();
        ledger.programs.insert(id);
        Ok(ProgramId(id))
    }

    fn use_program(&mut self, program: ProgramId) {
        self.ledger.borrow_mut().active_program = Some(program);
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.ledger.borrow_mut().shaders.remove(&shader.0);
    }

    fn delete_program(&mut self, program: ProgramId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.programs.remove(&program.0);
        ledger.uniforms.retain(|(id, _), _| *id != program.0);
        ledger.bindings.retain(|(id, _), _| *id != program.0);
        if ledger.active_program == Some(program) {
            ledger.active_program = None;
        }
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId, GeometryError> {
        let mut ledger = self.ledger.borrow_mut();
        if ledger.fail_buffer {
            return Err(GeometryError::Allocation(format!(
                "cannot allocate {} bytes",
                std::mem::size_of_val(vertices)
            )));
        }
        let id = ledger.allocate();
        ledger.buffers.insert(id);
        Ok(BufferId(id))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.ledger.borrow_mut().buffers.remove(&buffer.0);
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, TextureError> {
        let mut ledger = self.ledger.borrow_mut();
        let id = ledger.allocate();
        ledger.textures.insert(id, image.clone());
        Ok(TextureId(id))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.ledger.borrow_mut().textures.remove(&texture.0);
    }

    fn bind_texture(&mut self, program: ProgramId, slot: &TextureSlot, texture: TextureId) {
        self.ledger
            .borrow_mut()
            .bindings
            .insert((program.0, slot.name.clone()), texture);
    }

    fn set_uniform(&mut self, program: ProgramId, name: &str, value: UniformValue) {
        self.ledger
            .borrow_mut()
            .uniforms
            .insert((program.0, name.to_string()), value);
    }

    fn draw_triangle_strip(
        &mut self,
        buffer: BufferId,
        first: u32,
        count: u32,
    ) -> Result<(), FrameError> {
        let mut ledger = self.ledger.borrow_mut();
        if !ledger.draw_errors.is_empty() {
            return Err(ledger.draw_errors.remove(0));
        }
        let program = ledger.active_program;
        let active = program.map(|p| p.0);
        let uniforms = ledger
            .uniforms
            .iter()
            .filter(|((id, _), _)| Some(*id) == active)
            .map(|((_, name), value)| (name.clone(), *value))
            .collect();
        let textures = ledger
            .bindings
            .iter()
            .filter(|((id, _), _)| Some(*id) == active)
            .map(|((_, name), texture)| (name.clone(), *texture))
            .collect();
        let viewport = ledger.viewport;
        ledger.draws.push(DrawCall {
            program,
            buffer,
            first,
            count,
            viewport,
            uniforms,
            textures,
        });
        Ok(())
    }

    fn resource_counts(&self) -> ResourceCounts {
        self.ledger.borrow().counts()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.ledger.borrow_mut().live_contexts -= 1;
    }
}

/// Host double that hands out `RecordingBackend`s. Scheduling and listener
/// bookkeeping also lives in the shared ledger.
#[derive(Debug)]
pub(crate) struct FakeHost {
    pub size: SurfaceSize,
    pub fail_context: bool,
    ledger: SharedLedger,
}

impl FakeHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            fail_context: false,
            ledger: SharedLedger::default(),
        }
    }

    pub fn ledger(&self) -> SharedLedger {
        Rc::clone(&self.ledger)
    }
}

impl HostSurface for FakeHost {
    type Context = RecordingBackend;

    fn viewport_size(&self) -> SurfaceSize {
        self.size
    }

    fn acquire_context(
        &mut self,
        attributes: ContextAttributes,
    ) -> Result<Self::Context, ContextError> {
        if self.fail_context {
            return Err(ContextError::Unavailable("no adapter for fake surface".into()));
        }
        self.ledger.borrow_mut().attributes = Some(attributes);
        Ok(RecordingBackend::new(Rc::clone(&self.ledger)))
    }
}

impl FrameScheduler for FakeHost {
    fn request_frame(&mut self) -> FrameToken {
        let mut ledger = self.ledger.borrow_mut();
        let token = FrameToken(ledger.allocate());
        ledger.requested.push(token);
        token
    }

    fn cancel_frame(&mut self, token: FrameToken) {
        self.ledger.borrow_mut().cancelled.push(token);
    }
}

impl InputEvents for FakeHost {
    fn add_listener(&mut self, kind: ListenerKind) -> ListenerId {
        let mut ledger = self.ledger.borrow_mut();
        let id = ledger.allocate();
        ledger.listeners.insert(id, kind);
        ListenerId(id)
    }

    fn remove_listener(&mut self, id: ListenerId) {
        self.ledger.borrow_mut().listeners.remove(&id.0);
    }
}
