//! Shader programs: the untextured color variant and the textured variant.
//!
//! Both compile a vertex and a pixel stage from files, build the input layout
//! for [`Vertex`], and own a constant buffer holding the world, view and
//! projection matrices. Neither stores a mesh or texture; those arrive with
//! each draw.

use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use texgrid_common::ShaderKind;

use crate::backend::{BindingSlot, GpuBackend, PipelineDesc, SamplerDesc, ShaderStage, Topology};
use crate::error::{CompileFailure, RenderError, ResourceCreationError, ShaderCompileError};
use crate::mesh::Vertex;

pub const MATRIX_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;
pub const SAMPLER_BINDING: u32 = 2;

/// Host-side transforms, column-vector convention (`projection * view * world * p`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

/// Constant-buffer layout shared with the vertex stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MatrixBuffer {
    pub world: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl MatrixBuffer {
    /// Transpose each matrix for upload. The shaders multiply row vectors
    /// from the left (`p * world * view * projection`), which only matches
    /// the host convention once the matrices are transposed.
    pub fn transposed(transforms: &Transforms) -> Self {
        Self {
            world: transforms.world.transpose().to_cols_array_2d(),
            view: transforms.view.transpose().to_cols_array_2d(),
            projection: transforms.projection.transpose().to_cols_array_2d(),
        }
    }
}

/// Where a program's two stages live and which functions they start at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex_path: PathBuf,
    pub pixel_path: PathBuf,
    pub vertex_entry: String,
    pub pixel_entry: String,
}

impl ShaderSource {
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const PIXEL_ENTRY: &'static str = "fs_main";

    pub fn new(vertex_path: impl Into<PathBuf>, pixel_path: impl Into<PathBuf>) -> Self {
        Self {
            vertex_path: vertex_path.into(),
            pixel_path: pixel_path.into(),
            vertex_entry: Self::VERTEX_ENTRY.to_string(),
            pixel_entry: Self::PIXEL_ENTRY.to_string(),
        }
    }

    /// `<dir>/<kind>.vert.wgsl` and `<dir>/<kind>.frag.wgsl`.
    pub fn for_kind(dir: &Path, kind: ShaderKind) -> Self {
        let stem = kind.file_stem();
        Self::new(
            dir.join(format!("{stem}.vert.wgsl")),
            dir.join(format!("{stem}.frag.wgsl")),
        )
    }
}

/// Per-draw inputs handed to a program at render time.
pub struct DrawParams<'a, B: GpuBackend> {
    pub index_count: u32,
    pub transforms: Transforms,
    /// Required by the textured program, ignored by the color program.
    pub texture: Option<&'a B::TextureView>,
}

/// One compiled program: upload transforms, bind, draw.
pub trait ShaderProgram<B: GpuBackend> {
    fn compile(backend: &mut B, source: &ShaderSource) -> Result<Self, RenderError>
    where
        Self: Sized;

    /// Upload the transposed matrices, bind resources and issue one indexed
    /// draw. Fails only when the constant buffer cannot be mapped or a
    /// required texture is absent.
    fn render(&self, backend: &mut B, params: &DrawParams<'_, B>) -> Result<(), RenderError>;

    fn kind(&self) -> ShaderKind;
}

/// Compile the program selected by `kind` from `dir`.
pub fn compile_program<B: GpuBackend + 'static>(
    backend: &mut B,
    kind: ShaderKind,
    dir: &Path,
) -> Result<Box<dyn ShaderProgram<B>>, RenderError> {
    let source = ShaderSource::for_kind(dir, kind);
    Ok(match kind {
        ShaderKind::Color => Box::new(ColorShader::compile(backend, &source)?),
        ShaderKind::Texture => Box::new(TextureShader::compile(backend, &source)?),
    })
}

fn compile_stage<B: GpuBackend>(
    backend: &mut B,
    stage: ShaderStage,
    path: &Path,
    entry_point: &str,
) -> Result<B::Shader, ShaderCompileError> {
    let fail = |reason| ShaderCompileError {
        stage,
        path: path.to_path_buf(),
        reason,
    };

    let source = std::fs::read_to_string(path).map_err(|err| {
        fail(match err.kind() {
            std::io::ErrorKind::NotFound => CompileFailure::FileMissing,
            _ => CompileFailure::CompileFailed(err.to_string()),
        })
    })?;

    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| stage.to_string());
    let shader = backend
        .compile_shader(&label, stage, &source, entry_point)
        .map_err(|diagnostics| fail(CompileFailure::CompileFailed(diagnostics)))?;
    tracing::debug!(%stage, path = %path.display(), entry_point, "shader stage compiled");
    Ok(shader)
}

/// Native resources common to both variants. Each program owns its own.
struct ProgramCore<B: GpuBackend> {
    pipeline: B::Pipeline,
    matrix_buffer: B::Buffer,
    // Stage handles stay alive as long as the pipeline built from them.
    _vertex_shader: B::Shader,
    _pixel_shader: B::Shader,
}

impl<B: GpuBackend> ProgramCore<B> {
    fn compile(
        backend: &mut B,
        source: &ShaderSource,
        label: &str,
        bindings: &[BindingSlot],
    ) -> Result<Self, RenderError> {
        let vertex_shader = compile_stage(
            backend,
            ShaderStage::Vertex,
            &source.vertex_path,
            &source.vertex_entry,
        )?;
        let pixel_shader = compile_stage(
            backend,
            ShaderStage::Pixel,
            &source.pixel_path,
            &source.pixel_entry,
        )?;

        let pipeline = backend.create_pipeline(&PipelineDesc {
            label,
            vertex: &vertex_shader,
            pixel: &pixel_shader,
            layout: &Vertex::LAYOUT,
            bindings,
            topology: Topology::TriangleList,
        })?;

        let matrix_buffer = backend.create_constant_buffer(
            "matrix buffer",
            std::mem::size_of::<MatrixBuffer>() as u64,
        )?;

        Ok(Self {
            pipeline,
            matrix_buffer,
            _vertex_shader: vertex_shader,
            _pixel_shader: pixel_shader,
        })
    }

    fn upload(&self, backend: &mut B, transforms: &Transforms) -> Result<(), ResourceCreationError> {
        let matrices = MatrixBuffer::transposed(transforms);
        backend.write_buffer(&self.matrix_buffer, bytemuck::bytes_of(&matrices))?;
        backend.bind_buffer(MATRIX_BINDING, &self.matrix_buffer);
        Ok(())
    }

    fn draw(&self, backend: &mut B, index_count: u32) {
        backend.set_pipeline(&self.pipeline);
        backend.draw_indexed(index_count, 0, 0);
    }
}

/// Untextured program.
pub struct ColorShader<B: GpuBackend> {
    core: ProgramCore<B>,
}

impl<B: GpuBackend> ShaderProgram<B> for ColorShader<B> {
    fn compile(backend: &mut B, source: &ShaderSource) -> Result<Self, RenderError> {
        let core = ProgramCore::compile(
            backend,
            source,
            "color pipeline",
            &[BindingSlot::ConstantBuffer],
        )?;
        tracing::info!("color shader ready");
        Ok(Self { core })
    }

    fn render(&self, backend: &mut B, params: &DrawParams<'_, B>) -> Result<(), RenderError> {
        self.core.upload(backend, &params.transforms)?;
        self.core.draw(backend, params.index_count);
        Ok(())
    }

    fn kind(&self) -> ShaderKind {
        ShaderKind::Color
    }
}

/// Textured program: samples one texture with a linear, wrapping sampler.
pub struct TextureShader<B: GpuBackend> {
    core: ProgramCore<B>,
    sampler: B::Sampler,
}

impl<B: GpuBackend> ShaderProgram<B> for TextureShader<B> {
    fn compile(backend: &mut B, source: &ShaderSource) -> Result<Self, RenderError> {
        let core = ProgramCore::compile(
            backend,
            source,
            "texture pipeline",
            &[
                BindingSlot::ConstantBuffer,
                BindingSlot::Texture,
                BindingSlot::Sampler,
            ],
        )?;
        let sampler = backend.create_sampler("texture sampler", &SamplerDesc::LINEAR_WRAP)?;
        tracing::info!("texture shader ready");
        Ok(Self { core, sampler })
    }

    fn render(&self, backend: &mut B, params: &DrawParams<'_, B>) -> Result<(), RenderError> {
        let texture = params.texture.ok_or_else(|| {
            ResourceCreationError::new("texture binding", "textured program drawn without a texture")
        })?;
        self.core.upload(backend, &params.transforms)?;
        backend.bind_texture(TEXTURE_BINDING, texture);
        backend.bind_sampler(SAMPLER_BINDING, &self.sampler);
        self.core.draw(backend, params.index_count);
        Ok(())
    }

    fn kind(&self) -> ShaderKind {
        ShaderKind::Texture
    }
}
