use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::coords::{ColorRgba, Viewport};
use crate::device::config::MAX_TEXTURE_SIZE;
use crate::device::{Binding, Capabilities, ContextConfig, Extension, RasterState};
use crate::ids::{BufferId, ClockId, IdAllocator, TargetId, TextureId};
use crate::logging::{Diagnostics, LogDiagnostics};
use crate::resource::{GpuBuffer, GpuTexture};
use crate::shader::{ProgramController, ProgramDesc, ShaderProgram};
use crate::target::{ActivationStack, TargetSlot};
use crate::time::{Clock, FrameTimer};

/// Owns the wgpu core objects.
pub(crate) struct Gpu {
    #[allow(dead_code)]
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Gpu {
    /// Adapter/device acquisition is asynchronous under wgpu.
    async fn acquire(config: &ContextConfig) -> Result<(Self, Capabilities)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let caps = Capabilities::probe(&adapter);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(config.label),
                required_features: caps.required_features(&config.extensions),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        Ok((Gpu { instance, adapter, device, queue }, caps))
    }
}

/// The headless rendering context.
///
/// One context owns every GPU object created through it: textures, buffers,
/// render-target attachments and shader programs live in identity-keyed
/// tables and are addressed by copyable ids. Exactly one program is active at
/// a time and exactly one destination (a render target or the canvas) is bound.
///
/// Acquisition is fail-soft: if no adapter is available `initialize` logs
/// through the diagnostics sink and the context stays uninitialized.
pub struct GpuContext {
    pub(crate) config: ContextConfig,
    pub(crate) diagnostics: Arc<dyn Diagnostics>,
    pub(crate) ids: IdAllocator,
    pub(crate) gpu: Option<Gpu>,
    pub(crate) capabilities: Capabilities,
    pub(crate) extensions: HashSet<Extension>,

    // ── canvas ────────────────────────────────────────────────────────────
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) canvas: Option<TargetId>,
    pub(crate) transparent: Option<TextureId>,

    // ── resource tables ───────────────────────────────────────────────────
    pub(crate) textures: HashMap<TextureId, GpuTexture>,
    pub(crate) buffers: HashMap<BufferId, GpuBuffer>,
    pub(crate) targets: HashMap<TargetId, TargetSlot>,

    // ── programs ──────────────────────────────────────────────────────────
    pub(crate) programs: HashMap<String, ShaderProgram>,
    pub(crate) program_order: Vec<String>,
    pub(crate) active_program: Option<String>,

    // ── binding state ─────────────────────────────────────────────────────
    pub(crate) raster: RasterState,
    pub(crate) binding: Binding,
    pub(crate) stack: ActivationStack,

    // ── clocks ────────────────────────────────────────────────────────────
    default_clock: Clock,
    clocks: Vec<Clock>,
    timer: FrameTimer,
    delta_time: Duration,
}

impl GpuContext {
    /// Creates an uninitialized context. Call `initialize` before use.
    pub fn new(config: ContextConfig) -> Self {
        let width = config.width.clamp(1, MAX_TEXTURE_SIZE);
        let height = config.height.clamp(1, MAX_TEXTURE_SIZE);
        let stack = ActivationStack::with_capacity(config.stack_capacity);

        Self {
            config,
            diagnostics: Arc::new(LogDiagnostics),
            ids: IdAllocator::new(),
            gpu: None,
            capabilities: Capabilities::default(),
            extensions: HashSet::new(),
            width,
            height,
            canvas: None,
            transparent: None,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            program_order: Vec::new(),
            active_program: None,
            raster: RasterState::initial(),
            binding: Binding::canvas(width, height),
            stack,
            default_clock: Clock::new("default"),
            clocks: Vec::new(),
            timer: FrameTimer::new(),
            delta_time: Duration::ZERO,
        }
    }

    /// Creates and initializes a context in one step.
    ///
    /// Check `is_initialized` on the result; acquisition failure is not an error.
    pub fn headless(config: ContextConfig) -> Self {
        let mut ctx = Self::new(config);
        ctx.initialize();
        ctx
    }

    /// Replaces the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> &Arc<dyn Diagnostics> {
        &self.diagnostics
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    /// Acquires the device and sets up default state.
    ///
    /// Returns whether the context is usable. A second call on an initialized
    /// context does nothing.
    pub fn initialize(&mut self) -> bool {
        if self.gpu.is_some() {
            return true;
        }

        let (gpu, caps) = match pollster::block_on(Gpu::acquire(&self.config)) {
            Ok(acquired) => acquired,
            Err(err) => {
                self.diagnostics.error(&format!("unable to acquire GPU context: {err:#}"));
                return false;
            }
        };

        log::debug!(
            "acquired adapter {:?} ({:?})",
            gpu.adapter.get_info().name,
            gpu.adapter.get_info().backend
        );

        self.gpu = Some(gpu);
        self.capabilities = caps;

        let requested = self.config.extensions.clone();
        for ext in requested {
            self.initialize_extension(ext, true);
        }

        self.set_defaults();
        self.init_canvas();
        self.init_programs();

        true
    }

    /// Enables an optional capability if the adapter has it.
    pub fn initialize_extension(&mut self, ext: Extension, show_log: bool) -> bool {
        if self.capabilities.supports(ext) {
            self.extensions.insert(ext);
            return true;
        }
        if show_log {
            self.diagnostics.warn(&format!("extension '{ext}' doesn't initialize"));
        }
        false
    }

    fn set_defaults(&mut self) {
        self.raster = RasterState::initial();
        self.binding = Binding::canvas(self.width, self.height);
        self.stack.reset();
    }

    fn init_canvas(&mut self) {
        self.canvas = self.create_canvas_slot(self.width, self.height);
        self.transparent = self.create_transparent_texture();
    }

    fn init_programs(&mut self) {
        let pending: Vec<String> = self.program_order.clone();
        for name in &pending {
            self.link_program(name);
        }
        if let Some(first) = pending.first()
            && let Some(mut controller) = self.program(first)
        {
            controller.activate();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Releases every resource and resets binding state.
    ///
    /// Programs are deactivated and removed, textures and buffers are
    /// destroyed, raster state is switched fully off. Calling this on an
    /// uninitialized or already destroyed context does nothing.
    pub fn destroy(&mut self) {
        if self.gpu.is_none() {
            return;
        }

        let names: Vec<String> = self.program_order.clone();
        for name in names {
            self.remove_program(&name);
        }

        for (_, slot) in self.targets.drain() {
            slot.release();
        }
        for (_, texture) in self.textures.drain() {
            texture.raw.destroy();
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.raw.destroy();
        }

        self.raster = RasterState::disabled();
        self.binding = Binding::canvas(self.width, self.height);
        self.stack.reset();
        self.canvas = None;
        self.transparent = None;
        self.extensions.clear();
        self.gpu = None;

        log::debug!("GPU context destroyed");
    }

    // ── capabilities ──────────────────────────────────────────────────────

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether an extension was requested, supported and enabled.
    pub fn has_extension(&self, ext: Extension) -> bool {
        self.extensions.contains(&ext)
    }

    // ── size / viewport ───────────────────────────────────────────────────

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resizes the canvas, clamped to the maximum texture size.
    ///
    /// When the canvas is the bound destination its viewport follows.
    pub fn set_size(&mut self, width: u32, height: u32) {
        let w = width.clamp(1, MAX_TEXTURE_SIZE);
        let h = height.clamp(1, MAX_TEXTURE_SIZE);
        if w != width || h != height {
            log::debug!("canvas size {width}x{height} clamped to {w}x{h}");
        }

        self.width = w;
        self.height = h;

        if self.gpu.is_some() {
            if let Some(old) = self.canvas.take() {
                self.release_target_slot(old);
            }
            self.canvas = self.create_canvas_slot(w, h);
        }

        if self.binding.target.is_none() {
            self.binding.viewport = Viewport::full(w, h);
        }
    }

    /// Current viewport of the bound destination.
    pub fn viewport(&self) -> Viewport {
        self.binding.viewport
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    pub(crate) fn canvas_binding(&self) -> Binding {
        Binding::canvas(self.width, self.height)
    }

    /// Texture holding the canvas color output.
    pub fn canvas_texture(&self) -> Option<TextureId> {
        let id = self.canvas?;
        self.targets.get(&id)?.color(0)
    }

    // ── raster state ──────────────────────────────────────────────────────

    pub fn raster_state(&self) -> RasterState {
        self.raster
    }

    pub fn set_raster_state(&mut self, state: RasterState) {
        self.raster = state;
    }

    /// Clears every attachment of the bound destination.
    ///
    /// `depth` clears the depth attachment when the destination has one.
    pub fn clear(&mut self, color: ColorRgba, depth: Option<f32>) {
        let Some(gpu) = self.gpu.as_ref() else { return };
        let target = self.binding.target.or(self.canvas);
        let Some(slot) = target.and_then(|id| self.targets.get(&id)) else { return };

        let views: Vec<&wgpu::TextureView> = slot
            .colors
            .iter()
            .flatten()
            .filter_map(|id| self.textures.get(id))
            .map(|t| &t.view)
            .collect();

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.into()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();

        let depth_attachment = match (depth, slot.depth.as_ref()) {
            (Some(value), Some(d)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: &d.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(value),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            _ => None,
        };

        if color_attachments.is_empty() && depth_attachment.is_none() {
            return;
        }

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilekiln clear encoder"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tilekiln clear pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    // ── programs ──────────────────────────────────────────────────────────

    /// Registers a shader program.
    ///
    /// On an initialized context the program is compiled immediately;
    /// otherwise compilation happens in `initialize`. A duplicate name is
    /// reported and the existing program kept. Returns whether the program
    /// was registered.
    pub fn add_program(&mut self, desc: ProgramDesc) -> bool {
        if self.programs.contains_key(&desc.name) {
            self.diagnostics.warn(&format!("shader program '{}' already exists", desc.name));
            return false;
        }
        let name = desc.name.clone();
        self.programs.insert(name.clone(), ShaderProgram::new(desc));
        self.program_order.push(name.clone());
        if self.gpu.is_some() {
            self.link_program(&name);
        }
        true
    }

    /// Controller for a registered program.
    pub fn program(&mut self, name: &str) -> Option<ProgramController<'_>> {
        if !self.programs.contains_key(name) {
            return None;
        }
        Some(ProgramController::new(self, name))
    }

    pub fn has_program(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Whether the named program compiled and resolved every variable.
    pub fn is_program_linked(&self, name: &str) -> bool {
        self.programs.get(name).is_some_and(ShaderProgram::is_linked)
    }

    pub fn active_program(&self) -> Option<&str> {
        self.active_program.as_deref()
    }

    /// Deactivates and drops a program.
    pub fn remove_program(&mut self, name: &str) -> bool {
        if self.active_program.as_deref() == Some(name) {
            if let Some(program) = self.programs.get_mut(name) {
                program.disable_attribute_arrays();
            }
            self.active_program = None;
        }
        self.program_order.retain(|n| n != name);
        self.programs.remove(name).is_some()
    }

    fn link_program(&mut self, name: &str) {
        let Some(gpu) = self.gpu.as_ref() else { return };
        let Some(program) = self.programs.get_mut(name) else { return };
        program.link(gpu, self.diagnostics.as_ref());
    }

    // ── clocks ────────────────────────────────────────────────────────────

    pub fn default_clock(&self) -> &Clock {
        &self.default_clock
    }

    pub fn default_clock_mut(&mut self) -> &mut Clock {
        &mut self.default_clock
    }

    /// Registers an auxiliary clock ticked by `draw_frame`.
    pub fn add_clock(&mut self, mut clock: Clock) -> ClockId {
        if let Some(id) = clock.id() {
            log::debug!("clock '{}' was already attached as {id}; reattaching", clock.name);
        }
        let id: ClockId = self.ids.next();
        clock.attach(id);
        self.clocks.push(clock);
        id
    }

    /// Detaches an auxiliary clock and hands it back.
    pub fn remove_clock(&mut self, id: ClockId) -> Option<Clock> {
        let index = self.clocks.iter().position(|c| c.id() == Some(id))?;
        let mut clock = self.clocks.remove(index);
        clock.detach();
        Some(clock)
    }

    pub fn clock(&self, id: ClockId) -> Option<&Clock> {
        self.clocks.iter().find(|c| c.id() == Some(id))
    }

    pub fn clock_mut(&mut self, id: ClockId) -> Option<&mut Clock> {
        self.clocks.iter_mut().find(|c| c.id() == Some(id))
    }

    /// Measures the clamped wall time since the previous frame and ticks
    /// the default clock and every auxiliary clock.
    pub fn draw_frame(&mut self) -> Duration {
        let dt = self.timer.lap();
        self.tick_all(dt);
        dt
    }

    /// Ticks every clock by an explicit delta.
    pub fn tick_all(&mut self, dt: Duration) {
        self.delta_time = dt;
        self.default_clock.tick(dt);
        for clock in &mut self.clocks {
            clock.tick(dt);
        }
    }

    /// Delta used by the most recent frame.
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }

    /// Id source shared by everything created against this context.
    pub fn id_allocator(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    // ── internal access ───────────────────────────────────────────────────

    pub(crate) fn gpu(&self) -> Option<&Gpu> {
        self.gpu.as_ref()
    }

    pub(crate) fn report_unknown_texture(&self, id: TextureId) {
        self.diagnostics.warn(&format!("unknown {id}"));
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::CaptureDiagnostics;
    use crate::testing::gpu_context;

    // ── without a device ──────────────────────────────────────────────────

    #[test]
    fn new_context_is_not_initialized() {
        let ctx = GpuContext::new(ContextConfig::default());
        assert!(!ctx.is_initialized());
        assert_eq!((ctx.width(), ctx.height()), (256, 256));
        assert_eq!(ctx.viewport(), Viewport::full(256, 256));
    }

    #[test]
    fn size_is_clamped_to_max_texture_size() {
        let mut ctx = GpuContext::new(ContextConfig::default());
        ctx.set_size(10_000, 300);
        assert_eq!((ctx.width(), ctx.height()), (4096, 300));
        assert_eq!(ctx.viewport(), Viewport::full(4096, 300));
    }

    #[test]
    fn destroy_on_uninitialized_context_is_noop() {
        let mut ctx = GpuContext::new(ContextConfig::default());
        ctx.destroy();
        ctx.destroy();
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn unsupported_extension_is_reported() {
        let diag = Arc::new(CaptureDiagnostics::new());
        let mut ctx = GpuContext::new(ContextConfig::default()).with_diagnostics(diag.clone());
        assert!(!ctx.initialize_extension(Extension::ColorBufferFloat, true));
        assert!(diag.contains("extension 'EXT_color_buffer_float' doesn't initialize"));
        assert!(!ctx.initialize_extension(Extension::AnisotropicFiltering, false));
        assert_eq!(diag.messages().len(), 1);
    }

    // ── clocks ────────────────────────────────────────────────────────────

    #[test]
    fn tick_all_advances_default_and_auxiliary_clocks() {
        let mut ctx = GpuContext::new(ContextConfig::default());
        let fast = ctx.add_clock(Clock::new("fast").with_multiplier(10.0));
        ctx.tick_all(Duration::from_millis(5));

        assert_eq!(ctx.default_clock().time_ms(), 5.0);
        assert_eq!(ctx.clock(fast).map(Clock::time_ms), Some(50.0));
        assert_eq!(ctx.delta_time(), Duration::from_millis(5));
    }

    #[test]
    fn removed_clock_stops_ticking() {
        let mut ctx = GpuContext::new(ContextConfig::default());
        let id = ctx.add_clock(Clock::new("aux"));
        let clock = ctx.remove_clock(id).expect("clock was registered");
        assert_eq!(clock.id(), None);
        ctx.tick_all(Duration::from_millis(5));
        assert!(ctx.clock(id).is_none());
        assert!(ctx.remove_clock(id).is_none());
    }

    #[test]
    fn draw_frame_never_exceeds_clamp() {
        let mut ctx = GpuContext::new(ContextConfig::default());
        let dt = ctx.draw_frame();
        assert!(dt <= Duration::from_millis(250));
    }

    // ── with a device ─────────────────────────────────────────────────────

    #[test]
    fn initialize_sets_gl_like_defaults() {
        let Some(ctx) = gpu_context(64, 32) else { return };
        assert!(ctx.is_initialized());
        assert_eq!(ctx.raster_state(), RasterState::initial());
        assert!(ctx.canvas_texture().is_some());
        assert_eq!(ctx.viewport(), Viewport::full(64, 32));
    }

    #[test]
    fn initialize_twice_is_noop() {
        let Some(mut ctx) = gpu_context(16, 16) else { return };
        let canvas = ctx.canvas_texture();
        assert!(ctx.initialize());
        assert_eq!(ctx.canvas_texture(), canvas);
    }

    #[test]
    fn destroy_releases_everything_and_is_idempotent() {
        let Some(mut ctx) = gpu_context(16, 16) else { return };
        let image = image::RgbaImage::new(4, 4);
        let _ = ctx.create_texture(&image, crate::resource::TextureFilter::Nearest);
        let _ = ctx.create_vertex_buffer(&[0.0; 6], 2, crate::resource::BufferUsage::Static);

        ctx.destroy();
        assert!(!ctx.is_initialized());
        assert!(ctx.textures.is_empty());
        assert!(ctx.buffers.is_empty());
        assert!(ctx.targets.is_empty());
        assert_eq!(ctx.raster_state(), RasterState::disabled());

        ctx.destroy();
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn resize_recreates_canvas_attachment() {
        let Some(mut ctx) = gpu_context(32, 32) else { return };
        ctx.set_size(48, 16);
        let tex = ctx.canvas_texture().expect("canvas exists");
        let info = ctx.texture_info(tex).expect("canvas texture registered");
        assert_eq!((info.width, info.height), (48, 16));
    }
}
