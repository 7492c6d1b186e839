//! Context, program and target shared by every tile renderer.

use anyhow::{Context as _, bail};
use tilekiln_engine::coords::ColorRgba;
use tilekiln_engine::device::RasterState;
use tilekiln_engine::ids::BufferId;
use tilekiln_engine::resource::{BufferUsage, TextureFilter};
use tilekiln_engine::shader::{ProgramController, ProgramDesc};
use tilekiln_engine::target::{RenderTarget, RenderTargetConfig};
use tilekiln_engine::{ContextConfig, GpuContext, GpuError, GpuResult};

use crate::error::TileError;

/// Offscreen drawing surface of one renderer.
///
/// Vertex and index buffers uploaded through the surface belong to the
/// current render call and are deleted once its pixels are read back.
pub(crate) struct Surface {
    pub ctx: GpuContext,
    target: RenderTarget,
    program: String,
    buffers: Vec<BufferId>,
}

impl Surface {
    /// Headless context with `desc` linked and a color-only target.
    pub fn create(width: u32, height: u32, desc: ProgramDesc) -> anyhow::Result<Self> {
        let mut ctx = GpuContext::headless(ContextConfig::sized(width, height));
        if !ctx.is_initialized() {
            bail!("no GPU adapter for a {width}x{height} context");
        }
        ctx.set_raster_state(RasterState::overlay());

        let program = desc.name.clone();
        if !ctx.add_program(desc) || !ctx.is_program_linked(&program) {
            bail!("shader program '{program}' did not link");
        }

        let mut target = RenderTarget::new(RenderTargetConfig {
            width,
            height,
            filter: TextureFilter::Linear,
            use_depth: false,
            ..RenderTargetConfig::default()
        });
        target
            .init(&mut ctx)
            .with_context(|| format!("creating {width}x{height} render target"))?;

        Ok(Self { ctx, target, program, buffers: Vec::new() })
    }

    /// `create`, with failures logged instead of returned.
    pub fn create_logged(kind: &str, width: u32, height: u32, desc: ProgramDesc) -> Option<Self> {
        match Self::create(width, height, desc) {
            Ok(surface) => {
                log::debug!("{kind} renderer ready ({width}x{height})");
                Some(surface)
            }
            Err(err) => {
                log::warn!("{kind} renderer: initialization failed: {err:#}");
                None
            }
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.target.width(), self.target.height())
    }

    pub fn output_len(&self) -> usize {
        let (w, h) = self.size();
        w as usize * h as usize * 4
    }

    pub fn upload_vertices(&mut self, data: &[f32], item_size: u32) -> GpuResult<BufferId> {
        let id = self.ctx.create_vertex_buffer(data, item_size, BufferUsage::Stream)?;
        self.buffers.push(id);
        Ok(id)
    }

    pub fn upload_indices(&mut self, data: &[u32]) -> GpuResult<BufferId> {
        let id = self.ctx.create_index_buffer(data, BufferUsage::Stream)?;
        self.buffers.push(id);
        Ok(id)
    }

    /// Number of buffers the current call holds.
    #[cfg(test)]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Clears the target, runs `draw` with the activated program and reads
    /// the result into `out`.
    ///
    /// The target is deactivated and the call's buffers released whatever
    /// `draw` returns.
    pub fn run<F>(&mut self, out: &mut [u8], draw: F) -> Result<(), TileError>
    where
        F: FnOnce(&mut ProgramController<'_>) -> GpuResult<()>,
    {
        let result = self.draw_and_read(out, draw);
        self.release_buffers();
        result
    }

    fn draw_and_read<F>(&mut self, out: &mut [u8], draw: F) -> Result<(), TileError>
    where
        F: FnOnce(&mut ProgramController<'_>) -> GpuResult<()>,
    {
        let expected = self.output_len();
        if out.len() < expected {
            return Err(TileError::BufferTooSmall { expected, actual: out.len() });
        }

        if !self.target.activate(&mut self.ctx) {
            return Err(TileError::NotReady);
        }
        self.ctx.set_raster_state(RasterState::overlay());
        self.ctx.clear(ColorRgba::transparent(), None);

        let drawn = match self.ctx.program(&self.program) {
            Some(mut program) => {
                if program.activate() {
                    draw(&mut program)
                } else {
                    Err(GpuError::ProgramNotLinked(self.program.clone()))
                }
            }
            None => Err(GpuError::ProgramNotLinked(self.program.clone())),
        };
        self.target.deactivate(&mut self.ctx);
        drawn?;

        self.target.read_all_pixels(&self.ctx, &mut out[..expected], 0)?;
        Ok(())
    }

    fn release_buffers(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        if let Some(mut program) = self.ctx.program(&self.program) {
            program.clear_attributes();
        }
        for id in self.buffers.drain(..) {
            self.ctx.delete_buffer(id);
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.release_buffers();
        self.target.destroy(&mut self.ctx);
    }
}
