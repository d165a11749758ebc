//! The native seam: one trait covering the device and its immediate context.
//!
//! Handles returned by a backend are owned by whichever component created
//! them. Dropping a handle releases the GPU resource.

use std::fmt;

use texgrid_common::DisplayConfig;

use crate::error::{DeviceError, ResourceCreationError};
use crate::texture::ImageData;

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Pixel => f.write_str("pixel"),
        }
    }
}

/// How the input assembler groups indices into primitives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Topology {
    #[default]
    TriangleList,
}

/// Per-attribute vertex data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
}

impl VertexFormat {
    pub const fn size(self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
        }
    }
}

/// One named attribute inside a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: &'static str,
    pub format: VertexFormat,
    pub offset: u64,
    pub location: u32,
}

/// Input layout: how raw vertex buffer bytes map to shader attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: &'static [VertexAttribute],
}

/// Resource kind expected at a binding slot. The slot number is the index
/// in [`PipelineDesc::bindings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSlot {
    /// Uniform block read by the vertex stage.
    ConstantBuffer,
    /// 2D texture read by the pixel stage.
    Texture,
    /// Filtering sampler used by the pixel stage.
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Wrap,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address: AddressMode,
}

impl SamplerDesc {
    /// Linear min/mag/mip filtering with wrapping coordinates.
    pub const LINEAR_WRAP: Self = Self {
        filter: FilterMode::Linear,
        address: AddressMode::Wrap,
    };
}

/// Everything needed to build a pipeline: both stages, the input layout,
/// the resource slots and the primitive topology.
pub struct PipelineDesc<'a, B: GpuBackend + ?Sized> {
    pub label: &'a str,
    pub vertex: &'a B::Shader,
    pub pixel: &'a B::Shader,
    pub layout: &'a VertexLayout,
    pub bindings: &'a [BindingSlot],
    pub topology: Topology,
}

/// Device plus immediate context.
///
/// Calls are synchronous and single-threaded. State set through the `set_*`
/// and `bind_*` calls persists until overwritten or the scene ends.
pub trait GpuBackend {
    /// Opaque window/surface handle supplied by the application.
    type Surface;
    type Buffer;
    type Shader;
    type Pipeline;
    type Sampler;
    type TextureView;

    /// Create device, context, swap-chain and depth buffer in one step.
    fn create(surface: Self::Surface, display: &DisplayConfig) -> Result<Self, DeviceError>
    where
        Self: Sized;

    /// Human-readable adapter description.
    fn describe(&self) -> String;

    /// Static vertex buffer, uploaded once.
    fn create_vertex_buffer(
        &mut self,
        label: &str,
        contents: &[u8],
    ) -> Result<Self::Buffer, ResourceCreationError>;

    /// Static index buffer of `u32` indices, uploaded once.
    fn create_index_buffer(
        &mut self,
        label: &str,
        contents: &[u8],
    ) -> Result<Self::Buffer, ResourceCreationError>;

    /// CPU-writable constant buffer of `size` bytes.
    fn create_constant_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<Self::Buffer, ResourceCreationError>;

    /// Compile one stage. `Err` carries the compiler diagnostics verbatim.
    fn compile_shader(
        &mut self,
        label: &str,
        stage: ShaderStage,
        source: &str,
        entry_point: &str,
    ) -> Result<Self::Shader, String>;

    fn create_pipeline(
        &mut self,
        desc: &PipelineDesc<'_, Self>,
    ) -> Result<Self::Pipeline, ResourceCreationError>;

    fn create_sampler(
        &mut self,
        label: &str,
        desc: &SamplerDesc,
    ) -> Result<Self::Sampler, ResourceCreationError>;

    /// Upload an RGBA8 image and return a view the pixel stage can sample.
    fn create_texture(
        &mut self,
        label: &str,
        image: &ImageData,
    ) -> Result<Self::TextureView, ResourceCreationError>;

    /// Acquire the next back buffer and clear color and depth.
    fn begin_scene(&mut self, color: [f32; 4]) -> Result<(), DeviceError>;

    /// Submit recorded work and present. Blocks on vsync when enabled.
    ///
    /// Draws the backend had to drop since the last call surface here as
    /// [`DeviceError::DrawSkipped`].
    fn end_scene(&mut self) -> Result<(), DeviceError>;

    fn set_vertex_buffer(&mut self, buffer: &Self::Buffer, stride: u64);

    fn set_index_buffer(&mut self, buffer: &Self::Buffer);

    fn set_topology(&mut self, topology: Topology);

    fn set_pipeline(&mut self, pipeline: &Self::Pipeline);

    /// Map `buffer` for writing, copy `contents`, unmap.
    fn write_buffer(
        &mut self,
        buffer: &Self::Buffer,
        contents: &[u8],
    ) -> Result<(), ResourceCreationError>;

    fn bind_buffer(&mut self, binding: u32, buffer: &Self::Buffer);

    fn bind_texture(&mut self, binding: u32, view: &Self::TextureView);

    fn bind_sampler(&mut self, binding: u32, sampler: &Self::Sampler);

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32);
}
