use wgpu::util::DeviceExt;

use crate::device::GpuContext;
use crate::error::{GpuError, GpuResult};
use crate::ids::BufferId;
use crate::resource::BufferKind;
use crate::shader::Value;
use crate::shader::dispatch::AttributeInput;
use crate::shader::program::PipelineKey;

/// Primitive assembly of a draw call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

impl DrawMode {
    pub(crate) fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
            DrawMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            DrawMode::Lines => wgpu::PrimitiveTopology::LineList,
            DrawMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            DrawMode::Points => wgpu::PrimitiveTopology::PointList,
        }
    }

    fn is_strip(self) -> bool {
        matches!(self, DrawMode::TriangleStrip | DrawMode::LineStrip)
    }
}

#[derive(Copy, Clone)]
enum DrawCall {
    Arrays { first: u32, count: u32 },
    Indexed { buffer: BufferId },
}

/// Handle to one registered program, borrowed from its context.
///
/// The context allows a single active program: activating this one first
/// disables the attribute arrays of whichever program was active before.
pub struct ProgramController<'a> {
    ctx: &'a mut GpuContext,
    name: String,
}

impl<'a> ProgramController<'a> {
    pub(crate) fn new(ctx: &'a mut GpuContext, name: &str) -> Self {
        Self { ctx, name: name.to_owned() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_linked(&self) -> bool {
        self.ctx.is_program_linked(&self.name)
    }

    pub fn is_active(&self) -> bool {
        self.ctx.active_program.as_deref() == Some(self.name.as_str())
    }

    /// Makes this the active program. Fails on an unlinked program.
    pub fn activate(&mut self) -> bool {
        if !self.is_linked() {
            self.ctx
                .diagnostics
                .error(&format!("cannot activate unlinked shader program '{}'", self.name));
            return false;
        }
        if self.is_active() {
            return true;
        }

        if let Some(previous) = self.ctx.active_program.take()
            && let Some(program) = self.ctx.programs.get_mut(&previous)
        {
            program.disable_attribute_arrays();
        }
        if let Some(program) = self.ctx.programs.get_mut(&self.name) {
            program.enable_attribute_arrays();
        }
        self.ctx.active_program = Some(self.name.clone());
        true
    }

    pub fn deactivate(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Some(program) = self.ctx.programs.get_mut(&self.name) {
            program.disable_attribute_arrays();
        }
        self.ctx.active_program = None;
    }

    /// Stores and dispatches every value, handing texture units out from zero.
    pub fn set(&mut self, values: &[(&str, Value)]) {
        let diagnostics = self.ctx.diagnostics.clone();
        let Some(program) = self.ctx.programs.get_mut(&self.name) else { return };
        if !program.is_linked() {
            diagnostics.warn(&format!("set on unlinked shader program '{}'", self.name));
            return;
        }
        program.state.reset_units();
        for (name, value) in values {
            program.dispatch(name, value.clone(), diagnostics.as_ref());
        }
    }

    /// Dispatches one value without resetting texture units.
    pub fn apply(&mut self, name: &str, value: Value) {
        let diagnostics = self.ctx.diagnostics.clone();
        let Some(program) = self.ctx.programs.get_mut(&self.name) else { return };
        program.dispatch(name, value, diagnostics.as_ref());
    }

    /// Re-dispatches every stored value.
    pub fn reapply(&mut self) {
        let diagnostics = self.ctx.diagnostics.clone();
        let Some(program) = self.ctx.programs.get_mut(&self.name) else { return };
        program.reapply(diagnostics.as_ref());
    }

    /// Drops every attribute binding, e.g. before buffers are deleted.
    pub fn clear_attributes(&mut self) {
        if let Some(program) = self.ctx.programs.get_mut(&self.name) {
            program.state.clear_attributes();
            program.values.retain(|_, v| !matches!(v, Value::Buffer { .. }));
        }
    }

    /// Draws `count` vertices starting at `first`.
    pub fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> GpuResult<()> {
        self.draw(mode, DrawCall::Arrays { first, count })
    }

    /// Draws every index of `index_buffer`.
    pub fn draw_indexed(&mut self, mode: DrawMode, index_buffer: BufferId) -> GpuResult<()> {
        self.draw(mode, DrawCall::Indexed { buffer: index_buffer })
    }

    /// Deactivates and unregisters the program, consuming the controller.
    pub fn remove(self) -> bool {
        self.ctx.remove_program(&self.name)
    }

    fn draw(&mut self, mode: DrawMode, call: DrawCall) -> GpuResult<()> {
        let ctx = &mut *self.ctx;
        let Some(gpu) = ctx.gpu.as_ref() else { return Err(GpuError::NotInitialized) };

        if ctx.active_program.as_deref() != Some(self.name.as_str()) {
            return Err(GpuError::ProgramNotActive(self.name.clone()));
        }
        let Some(program) = ctx.programs.get_mut(&self.name) else {
            return Err(GpuError::ProgramNotLinked(self.name.clone()));
        };
        if !program.is_linked() {
            return Err(GpuError::ProgramNotLinked(self.name.clone()));
        }

        let index = match call {
            DrawCall::Arrays { count: 0, .. } => return Ok(()),
            DrawCall::Arrays { .. } => None,
            DrawCall::Indexed { buffer } => {
                let Some(b) = ctx.buffers.get(&buffer) else { return Err(GpuError::UnknownBuffer(buffer)) };
                let (BufferKind::Index, Some(format)) = (b.info.kind, b.info.index_format) else {
                    return Err(GpuError::NotAnIndexBuffer(buffer));
                };
                if b.info.item_count == 0 {
                    return Ok(());
                }
                Some((b, format))
            }
        };

        // ── destination ───────────────────────────────────────────────────
        let Some(target_id) = ctx.binding.target.or(ctx.canvas) else {
            return Err(GpuError::NotInitialized);
        };
        let Some(slot) = ctx.targets.get(&target_id) else {
            return Err(GpuError::UnknownTarget(target_id));
        };
        let mut color_views = Vec::new();
        let mut color_formats = Vec::new();
        for id in slot.colors.iter().flatten() {
            let Some(texture) = ctx.textures.get(id) else { return Err(GpuError::UnknownTexture(*id)) };
            color_views.push(&texture.view);
            color_formats.push(texture.info.format);
        }
        let depth = slot.depth.as_ref().filter(|_| ctx.raster.depth_test);

        let key = PipelineKey {
            topology: mode.topology(),
            strip_index_format: match index {
                Some((_, format)) if mode.is_strip() => Some(format),
                _ => None,
            },
            raster: ctx.raster,
            color_formats,
            depth_format: depth.map(|d| d.format),
        };
        program.prepare_pipeline(gpu, &key);
        let program = &*program;
        let Some(pipeline) = program.pipeline(&key) else {
            return Err(GpuError::ProgramNotLinked(self.name.clone()));
        };
        let Some(linked) = program.linked.as_ref() else {
            return Err(GpuError::ProgramNotLinked(self.name.clone()));
        };

        // ── bind group ────────────────────────────────────────────────────
        let uniform_buffer = linked.uniform_binding.map(|binding| {
            let buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tilekiln uniform buffer"),
                contents: &program.state.uniform_bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            });
            (binding, buffer)
        });

        let fallback = ctx.transparent.and_then(|id| ctx.textures.get(&id));
        let mut entries = Vec::new();
        if let Some((binding, buffer)) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry { binding: *binding, resource: buffer.as_entire_binding() });
        }
        for (slot_index, units) in linked.sampler_slots.iter().enumerate() {
            for (unit_index, unit) in units.iter().enumerate() {
                let bound = program.state.sampler_texture(slot_index, unit_index);
                let texture = match bound {
                    Some(id) => match ctx.textures.get(&id) {
                        Some(t) => Some(t),
                        None => {
                            ctx.diagnostics.warn(&format!("unknown {id} bound to '{}'", self.name));
                            fallback
                        }
                    },
                    None => fallback,
                };
                let Some(texture) = texture else { return Err(GpuError::NotInitialized) };
                entries.push(wgpu::BindGroupEntry {
                    binding: unit.texture,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: unit.sampler,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
        }
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tilekiln program bind group"),
            layout: &linked.bind_group_layout,
            entries: &entries,
        });

        // ── vertex inputs ─────────────────────────────────────────────────
        // Constants and unbound attributes get a one-element buffer each.
        let mut owned: Vec<Option<wgpu::Buffer>> = Vec::with_capacity(linked.attributes.len());
        let mut shared: Vec<Option<(&wgpu::Buffer, u64)>> = Vec::with_capacity(linked.attributes.len());
        for (i, slot) in linked.attributes.iter().enumerate() {
            match program.state.attributes.get(i).cloned().flatten() {
                Some(AttributeInput::Buffer { id, byte_offset }) => {
                    let Some(b) = ctx.buffers.get(&id) else { return Err(GpuError::UnknownBuffer(id)) };
                    if byte_offset >= b.info.byte_len {
                        return Err(GpuError::BufferOffset { buffer: id, offset: byte_offset, len: b.info.byte_len });
                    }
                    owned.push(None);
                    shared.push(Some((&b.raw, byte_offset)));
                }
                input => {
                    let contents = match input {
                        Some(AttributeInput::Constant(bytes)) => bytes,
                        _ => vec![0; slot.stride() as usize],
                    };
                    owned.push(Some(gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("tilekiln constant attribute"),
                        contents: &contents,
                        usage: wgpu::BufferUsages::VERTEX,
                    })));
                    shared.push(None);
                }
            }
        }

        // ── pass ──────────────────────────────────────────────────────────
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_attachment = depth.map(|d| wgpu::RenderPassDepthStencilAttachment {
            view: &d.view,
            depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store }),
            stencil_ops: None,
        });

        let viewport = ctx.binding.viewport;
        let (vx, vy, vw, vh) = viewport.to_wgpu(slot.height);

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilekiln draw encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tilekiln draw pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_viewport(vx, vy, vw, vh, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            for (i, (own, share)) in owned.iter().zip(&shared).enumerate() {
                match (own, share) {
                    (Some(buffer), _) => pass.set_vertex_buffer(i as u32, buffer.slice(..)),
                    (None, Some((buffer, offset))) => pass.set_vertex_buffer(i as u32, buffer.slice(*offset..)),
                    (None, None) => {}
                }
            }
            match (call, index) {
                (DrawCall::Arrays { first, count }, _) => pass.draw(first..first + count, 0..1),
                (DrawCall::Indexed { .. }, Some((buffer, format))) => {
                    pass.set_index_buffer(buffer.raw.slice(..), format);
                    pass.draw_indexed(0..buffer.info.item_count, 0, 0..1);
                }
                (DrawCall::Indexed { .. }, None) => {}
            }
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ColorRgba;
    use crate::device::RasterState;
    use crate::resource::BufferUsage;
    use crate::shader::{ProgramDesc, VarKind};
    use crate::testing::gpu_context;

    const VS: &str = r#"
@vertex
fn vs_main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(position, 0.0, 1.0);
}
"#;

    const FS: &str = r#"
struct Uniforms {
    color: vec4<f32>,
};
@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u.color;
}
"#;

    fn solid(name: &str) -> ProgramDesc {
        ProgramDesc::new(name)
            .attribute("position", VarKind::Vec2)
            .uniform("color", VarKind::Vec4)
            .vertex_shader(VS)
            .fragment_shader(FS)
    }

    #[test]
    fn topology_follows_mode() {
        assert_eq!(DrawMode::TriangleStrip.topology(), wgpu::PrimitiveTopology::TriangleStrip);
        assert_eq!(DrawMode::Points.topology(), wgpu::PrimitiveTopology::PointList);
        assert!(DrawMode::LineStrip.is_strip());
        assert!(!DrawMode::Triangles.is_strip());
    }

    // ── activation ────────────────────────────────────────────────────────

    #[test]
    fn only_one_program_is_active() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        assert!(ctx.add_program(solid("a")));
        assert!(ctx.add_program(solid("b")));

        let mut a = ctx.program("a").expect("a registered");
        assert!(a.activate());
        let mut b = ctx.program("b").expect("b registered");
        assert!(b.activate());
        assert!(b.is_active());

        assert_eq!(ctx.active_program(), Some("b"));
        assert!(!ctx.programs["a"].arrays_enabled);
        assert!(ctx.programs["b"].arrays_enabled);
    }

    #[test]
    fn unlinked_program_cannot_activate_or_draw() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        assert!(ctx.add_program(solid("broken").fragment_shader("fn nope(")));
        assert!(!ctx.is_program_linked("broken"));
        let mut p = ctx.program("broken").expect("registered");
        assert!(!p.activate());
        assert!(matches!(p.draw_arrays(DrawMode::Triangles, 0, 3), Err(GpuError::ProgramNotActive(_))));
    }

    #[test]
    fn duplicate_program_name_keeps_first() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        assert!(ctx.add_program(solid("dup")));
        assert!(!ctx.add_program(solid("dup").fragment_shader("broken")));
        assert!(ctx.is_program_linked("dup"));
    }

    #[test]
    fn remove_clears_active_program() {
        let Some(mut ctx) = gpu_context(8, 8) else { return };
        assert!(ctx.add_program(solid("gone")));
        let mut p = ctx.program("gone").expect("registered");
        assert!(p.activate());
        assert!(p.remove());
        assert_eq!(ctx.active_program(), None);
        assert!(!ctx.has_program("gone"));
    }

    // ── drawing ───────────────────────────────────────────────────────────

    #[test]
    fn full_screen_triangles_fill_the_canvas() {
        let Some(mut ctx) = gpu_context(4, 4) else { return };
        ctx.set_raster_state(RasterState::overlay());
        ctx.clear(ColorRgba::transparent(), None);
        assert!(ctx.add_program(solid("fill")));

        let quad = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
        let vbo = ctx.create_vertex_buffer(&quad, 2, BufferUsage::Static).expect("vbo");

        let mut p = ctx.program("fill").expect("registered");
        assert!(p.activate());
        p.set(&[("position", Value::buffer(vbo)), ("color", Value::Vec4([0.0, 1.0, 0.0, 1.0]))]);
        p.draw_arrays(DrawMode::Triangles, 0, 6).expect("draw succeeds");

        let canvas = ctx.canvas_texture().expect("canvas");
        let mut pixels = vec![0u8; 4 * 4 * 4];
        ctx.read_texture(canvas, &mut pixels).expect("readback");
        assert!(pixels.chunks_exact(4).all(|px| px == [0, 255, 0, 255]));
    }

    #[test]
    fn indexed_draw_uses_the_index_count() {
        let Some(mut ctx) = gpu_context(4, 4) else { return };
        ctx.set_raster_state(RasterState::overlay());
        ctx.clear(ColorRgba::transparent(), None);
        assert!(ctx.add_program(solid("indexed")));

        let corners = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
        let vbo = ctx.create_vertex_buffer(&corners, 2, BufferUsage::Static).expect("vbo");
        let ibo = ctx.create_index_buffer(&[0, 1, 2, 0, 2, 3], BufferUsage::Static).expect("ibo");

        let mut p = ctx.program("indexed").expect("registered");
        assert!(p.activate());
        p.set(&[("position", Value::buffer(vbo)), ("color", Value::Vec4([1.0, 0.0, 0.0, 1.0]))]);
        assert!(matches!(p.draw_indexed(DrawMode::Triangles, vbo), Err(GpuError::NotAnIndexBuffer(_))));
        p.draw_indexed(DrawMode::Triangles, ibo).expect("draw succeeds");

        let canvas = ctx.canvas_texture().expect("canvas");
        let mut pixels = vec![0u8; 4 * 4 * 4];
        ctx.read_texture(canvas, &mut pixels).expect("readback");
        assert!(pixels.chunks_exact(4).all(|px| px == [255, 0, 0, 255]));
    }

    #[test]
    fn pipelines_are_cached_per_raster_state() {
        let Some(mut ctx) = gpu_context(4, 4) else { return };
        ctx.set_raster_state(RasterState::overlay());
        assert!(ctx.add_program(solid("cached")));
        let vbo = ctx.create_vertex_buffer(&[-1.0, -1.0, 1.0, -1.0, 1.0, 1.0], 2, BufferUsage::Static).unwrap();

        let mut p = ctx.program("cached").unwrap();
        assert!(p.activate());
        p.set(&[("position", Value::buffer(vbo)), ("color", Value::Vec4([1.0; 4]))]);
        p.draw_arrays(DrawMode::Triangles, 0, 3).unwrap();
        p.draw_arrays(DrawMode::Triangles, 0, 3).unwrap();
        assert_eq!(ctx.programs["cached"].cached_pipelines(), 1);

        ctx.set_raster_state(RasterState::default());
        let mut p = ctx.program("cached").unwrap();
        p.draw_arrays(DrawMode::Triangles, 0, 3).unwrap();
        assert_eq!(ctx.programs["cached"].cached_pipelines(), 2);
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let Some(mut ctx) = gpu_context(4, 4) else { return };
        assert!(ctx.add_program(solid("offset")));
        let vbo = ctx.create_vertex_buffer(&[0.0; 6], 2, BufferUsage::Static).expect("vbo");
        let mut p = ctx.program("offset").expect("registered");
        assert!(p.activate());
        p.set(&[("position", Value::buffer_at(vbo, 64))]);
        assert!(matches!(
            p.draw_arrays(DrawMode::Triangles, 0, 3),
            Err(GpuError::BufferOffset { offset: 64, len: 24, .. })
        ));
    }
}
