use glam::Mat4;
use texgrid_common::DisplayConfig;

use crate::backend::GpuBackend;
use crate::error::DeviceError;

/// Region of the back buffer the rasterizer writes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(display: &DisplayConfig) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: display.width as f32,
            height: display.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Owns the backend and the matrices fixed at startup.
///
/// Either `init` returns a fully working device or nothing is left behind:
/// the backend creates device, swap-chain and depth buffer in one call.
pub struct GraphicsDevice<B: GpuBackend> {
    backend: B,
    display: DisplayConfig,
    world: Mat4,
    projection: Mat4,
    ortho: Mat4,
    viewport: Viewport,
    description: String,
}

impl<B: GpuBackend> GraphicsDevice<B> {
    pub fn init(surface: B::Surface, display: &DisplayConfig) -> Result<Self, DeviceError> {
        display
            .validate()
            .map_err(|e| DeviceError::InvalidDisplay(e.to_string()))?;

        let backend = B::create(surface, display)?;
        let description = backend.describe();

        let projection = Mat4::perspective_lh(
            display.field_of_view.to_radians(),
            display.aspect_ratio(),
            display.near_plane,
            display.far_plane,
        );
        let (half_w, half_h) = (display.width as f32 / 2.0, display.height as f32 / 2.0);
        let ortho = Mat4::orthographic_lh(
            -half_w,
            half_w,
            -half_h,
            half_h,
            display.near_plane,
            display.far_plane,
        );

        let (width, height) = (display.width, display.height);
        let (vsync, fullscreen) = (display.vsync, display.fullscreen);
        tracing::info!(
            adapter = %description,
            width,
            height,
            vsync,
            fullscreen,
            "graphics device initialized"
        );

        Ok(Self {
            backend,
            display: display.clone(),
            world: Mat4::IDENTITY,
            projection,
            ortho,
            viewport: Viewport::full(display),
            description,
        })
    }

    /// Clear color and depth on the next back buffer.
    pub fn begin_scene(&mut self, color: [f32; 4]) -> Result<(), DeviceError> {
        self.backend.begin_scene(color)
    }

    /// Present; blocks on the display refresh when vsync is on.
    pub fn end_scene(&mut self) -> Result<(), DeviceError> {
        self.backend.end_scene()
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn ortho_matrix(&self) -> Mat4 {
        self.ortho
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn adapter_description(&self) -> &str {
        &self.description
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
