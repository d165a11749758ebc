//! Backend-agnostic rendering pipeline: one mesh, one shader program, one
//! texture and a steerable camera, drawn once per tick.
//!
//! # Invariants
//! - Every GPU resource has exactly one owner and is released when that owner drops.
//! - Mesh, Texture and ShaderProgram never reference each other; the frame
//!   loop hands index count and texture view to the program at draw time.
//! - Matrices are transposed exactly once, on upload to the constant buffer.
//! - A failed frame is terminal; nothing is retried.
//!
//! The native API sits behind [`GpuBackend`]. [`RecordingBackend`] implements
//! it in software so the whole pipeline runs without a GPU.

pub mod backend;
pub mod camera;
pub mod device;
pub mod error;
pub mod frame;
pub mod mesh;
pub mod recording;
pub mod shader;
pub mod texture;

pub use backend::{
    AddressMode, BindingSlot, FilterMode, GpuBackend, PipelineDesc, SamplerDesc, ShaderStage,
    Topology, VertexAttribute, VertexFormat, VertexLayout,
};
pub use camera::Camera;
pub use device::{GraphicsDevice, Viewport};
pub use error::{
    CompileFailure, DeviceError, RenderError, ResourceCreationError, ShaderCompileError,
};
pub use frame::FrameController;
pub use mesh::{GeometryBuffer, Mesh, Vertex};
pub use recording::{
    Command, FaultPlan, RecordStats, RecordingBackend, ResourceKind, ResourceTracker,
};
pub use shader::{
    ColorShader, DrawParams, MatrixBuffer, ShaderProgram, ShaderSource, TextureShader,
    Transforms, compile_program,
};
pub use texture::{FileImageLoader, ImageData, ImageLoadError, ImageLoader, Texture};

pub fn crate_info() -> &'static str {
    "texgrid-render v0.1.0"
}
