//! Lifecycle binder: ties one variant to one host surface.
//!
//! [`EngineHandle::attach`] acquires a context, builds the program, uploads
//! the quad and starts the frame driver. The host then calls
//! [`EngineHandle::on_frame`] for every scheduled token and forwards input
//! through [`EngineHandle::dispatch`]. [`EngineHandle::detach`] (or dropping
//! the handle) releases everything in reverse order.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::backend::{BufferId, GraphicsBackend, TextureId, TextureImage};
use crate::config::VariantConfig;
use crate::driver::{DriverState, FrameDriver};
use crate::error::{ContextError, FrameError, InitError, UniformError};
use crate::geometry::{draw_quad, upload_quad};
use crate::host::{FrameToken, Host, HostEvent, ListenerId, ListenerKind};
use crate::program::{build_program, ProgramHandle};
use crate::registry::UniformLayout;
use crate::textures::TextureLoader;
use crate::types::{
    PointerPosition, SurfaceSize, TextureSource, UniformRole, UniformValue,
};

/// State sampled once at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub elapsed: f32,
    pub surface: SurfaceSize,
    pub pointer: PointerPosition,
}

/// What a call to [`EngineHandle::on_frame`] did.
#[derive(Debug)]
pub enum TickOutcome {
    /// One quad was drawn with the sampled state.
    Drawn(FrameSample),
    /// The surface has no area; nothing was drawn but the loop continues.
    Skipped,
    /// A recoverable frame error; the next frame is already scheduled.
    Dropped(FrameError),
    /// Stale token or detached engine.
    Ignored,
}

/// GPU objects owned by one attached engine.
struct GpuResources<C: GraphicsBackend> {
    context: C,
    program: Option<ProgramHandle>,
    quad: Option<BufferId>,
    textures: BTreeMap<String, TextureId>,
}

impl<C: GraphicsBackend> GpuResources<C> {
    fn new(context: C) -> Self {
        Self {
            context,
            program: None,
            quad: None,
            textures: BTreeMap::new(),
        }
    }

    fn release(mut self) {
        for (_, texture) in std::mem::take(&mut self.textures) {
            self.context.delete_texture(texture);
        }
        if let Some(quad) = self.quad.take() {
            self.context.delete_buffer(quad);
        }
        if let Some(program) = self.program.take() {
            program.release(&mut self.context);
        }
        let leaked = self.context.resource_counts();
        if !leaked.is_empty() {
            warn!(?leaked, "GPU objects still live at context release");
        }
        self.context.release();
    }
}

/// Creates and binds a placeholder for every texture slot of `program`.
fn bind_placeholders<C: GraphicsBackend>(
    context: &mut C,
    program: &ProgramHandle,
) -> Result<BTreeMap<String, TextureId>, InitError> {
    let mut created = BTreeMap::new();
    for slot in program.layout.textures() {
        match context.create_texture(&TextureImage::placeholder(slot.kind)) {
            Ok(texture) => {
                context.bind_texture(program.program, slot, texture);
                created.insert(slot.name.clone(), texture);
            }
            Err(err) => {
                for (_, texture) in created {
                    context.delete_texture(texture);
                }
                return Err(err.into());
            }
        }
    }
    Ok(created)
}

fn wanted_listeners(layout: &UniformLayout) -> Vec<ListenerKind> {
    let mut kinds = vec![ListenerKind::Resize];
    if layout
        .specs()
        .iter()
        .any(|spec| spec.role == UniformRole::Pointer)
    {
        kinds.push(ListenerKind::PointerMove);
        kinds.push(ListenerKind::TouchMove);
    }
    kinds
}

/// One variant rendering into one host surface.
pub struct EngineHandle<H: Host> {
    host: H,
    gpu: Option<GpuResources<H::Context>>,
    config: VariantConfig,
    layout: UniformLayout,
    values: BTreeMap<String, UniformValue>,
    surface: SurfaceSize,
    pointer: PointerPosition,
    driver: FrameDriver,
    listeners: Vec<(ListenerId, ListenerKind)>,
    loader: Option<TextureLoader>,
}

impl<H: Host> EngineHandle<H> {
    /// Binds `config` to `host` and schedules the first frame.
    ///
    /// On failure everything created so far is released and no listener is
    /// left registered.
    pub fn attach(mut host: H, config: VariantConfig) -> Result<Self, InitError> {
        let layout = config.validate()?;
        let surface = host.viewport_size();
        let mut context = host.acquire_context(config.context)?;
        context.set_viewport(surface);

        let mut gpu = GpuResources::new(context);
        if let Err(err) = Self::prepare_gpu(&mut gpu, &config, layout.clone()) {
            gpu.release();
            return Err(err);
        }

        let mut loader = TextureLoader::new();
        for (name, source) in &config.textures {
            loader.spawn(name, source.clone());
        }

        let mut engine = Self {
            host,
            gpu: Some(gpu),
            values: config.resolved_values(),
            config,
            layout,
            surface,
            pointer: PointerPosition::default(),
            driver: FrameDriver::new(),
            listeners: Vec::new(),
            loader: Some(loader),
        };
        engine.push_values();
        engine.sync_listeners();
        engine.driver.start(&mut engine.host);

        info!(
            variant = %engine.config.name,
            surface = %surface,
            "attached background variant"
        );
        Ok(engine)
    }

    fn prepare_gpu(
        gpu: &mut GpuResources<H::Context>,
        config: &VariantConfig,
        layout: UniformLayout,
    ) -> Result<(), InitError> {
        let program = build_program(&mut gpu.context, &config.vertex, &config.fragment, layout)?;
        gpu.context.use_program(program.program);
        let program = gpu.program.insert(program);
        gpu.quad = Some(upload_quad(&mut gpu.context)?);
        gpu.textures = bind_placeholders(&mut gpu.context, program)?;
        Ok(())
    }

    /// Tears down listeners, the frame loop and every GPU object.
    /// Calling it again is a no-op.
    pub fn detach(&mut self) {
        let Some(gpu) = self.gpu.take() else {
            return;
        };
        for (id, _) in self.listeners.drain(..) {
            self.host.remove_listener(id);
        }
        self.driver.stop(&mut self.host);
        self.loader = None;
        gpu.release();
        info!(variant = %self.config.name, "detached background variant");
    }

    pub fn is_attached(&self) -> bool {
        self.gpu.is_some()
    }

    /// Token of the frame the driver is waiting for, if any.
    pub fn scheduled_frame(&self) -> Option<FrameToken> {
        self.driver.pending_token()
    }

    pub fn driver_state(&self) -> DriverState {
        self.driver.state()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &VariantConfig {
        &self.config
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn pointer(&self) -> PointerPosition {
        self.pointer
    }

    pub fn value(&self, name: &str) -> Option<UniformValue> {
        self.values.get(name).copied()
    }

    /// Runs one tick for `token`.
    ///
    /// Fatal errors park the driver and are returned; the host is expected
    /// to detach.
    pub fn on_frame(&mut self, token: FrameToken, now: Instant) -> Result<TickOutcome, FrameError> {
        if self.gpu.is_none() || !self.driver.begin(token) {
            return Ok(TickOutcome::Ignored);
        }

        self.apply_loaded_textures();

        let sample = FrameSample {
            elapsed: self.driver.sample_time(now),
            surface: self.surface,
            pointer: self.pointer,
        };

        if sample.surface.is_empty() {
            self.driver.reschedule(&mut self.host);
            return Ok(TickOutcome::Skipped);
        }

        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(TickOutcome::Ignored);
        };
        let (Some(program), Some(quad)) = (gpu.program.as_ref(), gpu.quad) else {
            return Ok(TickOutcome::Ignored);
        };

        for spec in program.layout.specs() {
            let value = match spec.role {
                UniformRole::Time => Some(UniformValue::Scalar(sample.elapsed)),
                UniformRole::Resolution => Some(UniformValue::Vec2(sample.surface.as_uniform())),
                UniformRole::Pointer => Some(UniformValue::Vec2(sample.pointer.as_uniform())),
                UniformRole::Color | UniformRole::Custom => self.values.get(&spec.name).copied(),
                UniformRole::Texture => None,
            };
            if let Some(value) = value {
                gpu.context.set_uniform(program.program, &spec.name, value);
            }
        }

        match draw_quad(&mut gpu.context, quad) {
            Ok(()) => {
                self.driver.record_frame(now, sample.elapsed);
                self.driver.reschedule(&mut self.host);
                Ok(TickOutcome::Drawn(sample))
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "dropped frame");
                self.driver.reschedule(&mut self.host);
                Ok(TickOutcome::Dropped(err))
            }
            Err(err) => {
                error!(error = %err, "fatal frame error; stopping render loop");
                self.driver.halt();
                Err(err)
            }
        }
    }

    /// Routes a host event; ignored unless a listener of its kind is live.
    pub fn dispatch(&mut self, event: &HostEvent) {
        let kind = event.kind();
        if !self.listeners.iter().any(|(_, live)| *live == kind) {
            return;
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        match event {
            HostEvent::Resize(size) => {
                self.surface = *size;
                gpu.context.set_viewport(*size);
                debug!(surface = %size, "surface resized");
            }
            HostEvent::PointerMove(position) => {
                self.pointer = *position;
            }
            HostEvent::TouchMove(points) => {
                if let Some(first) = points.first() {
                    self.pointer = *first;
                }
            }
        }
    }

    /// Sets a caller-supplied uniform; picked up by the next tick.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), UniformError> {
        self.layout.check_value(name, &value)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Starts loading a new texture for `name`; the current one stays bound
    /// until the load lands.
    pub fn set_texture(&mut self, name: &str, source: TextureSource) -> Result<(), UniformError> {
        self.layout.check_texture(name, source.kind())?;
        if let Some(loader) = self.loader.as_mut() {
            loader.spawn(name, source.clone());
        }
        self.config.textures.insert(name.to_string(), source);
        Ok(())
    }

    /// Switches to `config`.
    ///
    /// Matching sources and schema only refresh values and textures. Anything
    /// else rebuilds the program; if that fails the current program keeps
    /// running and the error is returned.
    pub fn reconfigure(&mut self, config: VariantConfig) -> Result<(), InitError> {
        let layout = config.validate()?;
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(ContextError::Unavailable("engine is detached".into()).into());
        };
        if config.context != self.config.context {
            warn!(
                current = ?self.config.context,
                requested = ?config.context,
                "context attributes are fixed at attach; keeping the current context"
            );
        }

        if self.config.same_program(&config) {
            if let Some(loader) = self.loader.as_mut() {
                for (name, source) in &config.textures {
                    if self.config.textures.get(name) != Some(source) {
                        loader.spawn(name, source.clone());
                    }
                }
            }
            self.values = config.resolved_values();
            debug!(variant = %config.name, "updated variant values in place");
            self.config = config;
            return Ok(());
        }

        let program = build_program(
            &mut gpu.context,
            &config.vertex,
            &config.fragment,
            layout.clone(),
        )?;
        let textures = match bind_placeholders(&mut gpu.context, &program) {
            Ok(textures) => textures,
            Err(err) => {
                program.release(&mut gpu.context);
                return Err(err);
            }
        };
        gpu.context.use_program(program.program);

        if let Some(previous) = gpu.program.replace(program) {
            previous.release(&mut gpu.context);
        }
        for (_, texture) in std::mem::replace(&mut gpu.textures, textures) {
            gpu.context.delete_texture(texture);
        }

        let mut loader = TextureLoader::new();
        for (name, source) in &config.textures {
            loader.spawn(name, source.clone());
        }
        self.loader = Some(loader);

        info!(from = %self.config.name, to = %config.name, "rebuilt shader program");
        self.values = config.resolved_values();
        self.layout = layout;
        self.config = config;
        self.push_values();
        self.sync_listeners();
        Ok(())
    }

    fn push_values(&mut self) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let Some(program) = gpu.program.as_ref() else {
            return;
        };
        for (name, value) in &self.values {
            gpu.context.set_uniform(program.program, name, *value);
        }
    }

    fn sync_listeners(&mut self) {
        let wanted = wanted_listeners(&self.layout);
        let host = &mut self.host;
        self.listeners.retain(|(id, kind)| {
            let keep = wanted.contains(kind);
            if !keep {
                host.remove_listener(*id);
            }
            keep
        });
        for kind in wanted {
            if !self.listeners.iter().any(|(_, live)| *live == kind) {
                let id = self.host.add_listener(kind);
                self.listeners.push((id, kind));
            }
        }
    }

    fn apply_loaded_textures(&mut self) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };
        let loaded = loader.drain();
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let Some(program) = gpu.program.as_ref() else {
            return;
        };

        for texture in loaded {
            let image = match texture.result {
                Ok(image) => image,
                Err(err) => {
                    warn!(
                        uniform = %texture.uniform,
                        error = %err,
                        "texture load failed; keeping placeholder"
                    );
                    continue;
                }
            };
            let slot = match program.layout.check_texture(&texture.uniform, image.kind()) {
                Ok(slot) => slot,
                Err(err) => {
                    warn!(error = %err, "discarding loaded texture");
                    continue;
                }
            };
            match gpu.context.create_texture(&image) {
                Ok(id) => {
                    gpu.context.bind_texture(program.program, slot, id);
                    if let Some(previous) = gpu.textures.insert(slot.name.clone(), id) {
                        gpu.context.delete_texture(previous);
                    }
                    let (width, height) = image.dimensions();
                    debug!(uniform = %slot.name, width, height, "bound loaded texture");
                }
                Err(err) => {
                    warn!(uniform = %slot.name, error = %err, "texture upload failed");
                }
            }
        }
    }
}

impl<H: Host> Drop for EngineHandle<H> {
    fn drop(&mut self) {
        self.detach();
    }
}
