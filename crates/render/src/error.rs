use std::path::PathBuf;

use crate::backend::ShaderStage;

/// Device, swap-chain or depth-buffer failure. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid display configuration: {0}")]
    InvalidDisplay(String),
    #[error("failed to create surface: {0}")]
    Surface(String),
    #[error("no compatible graphics adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(String),
    #[error("failed to create depth buffer: {0}")]
    DepthBuffer(String),
    #[error("failed to acquire swap-chain frame: {0}")]
    Acquire(String),
    #[error("scene was not begun before {0}")]
    NoScene(&'static str),
    #[error("{count} draw(s) skipped this frame: {reason}")]
    DrawSkipped { count: u32, reason: String },
}

/// Buffer, layout, sampler, texture or constant-buffer allocation failure.
#[derive(Debug, thiserror::Error)]
#[error("failed to create {resource}: {reason}")]
pub struct ResourceCreationError {
    pub resource: String,
    pub reason: String,
}

impl ResourceCreationError {
    pub fn new(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

/// Why a shader stage could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileFailure {
    /// Compiler diagnostics, verbatim.
    CompileFailed(String),
    /// The source file could not be located.
    FileMissing,
}

/// A shader stage failed to load or compile.
#[derive(Debug, thiserror::Error)]
#[error("{stage} shader {}: {}", .path.display(), describe(.reason))]
pub struct ShaderCompileError {
    pub stage: ShaderStage,
    pub path: PathBuf,
    pub reason: CompileFailure,
}

fn describe(reason: &CompileFailure) -> String {
    match reason {
        CompileFailure::CompileFailed(diagnostics) => format!("error compiling shader\n{diagnostics}"),
        CompileFailure::FileMissing => "missing shader file".to_string(),
    }
}

impl ShaderCompileError {
    pub fn is_file_missing(&self) -> bool {
        self.reason == CompileFailure::FileMissing
    }

    /// Compiler output when compilation itself failed.
    pub fn diagnostics(&self) -> Option<&str> {
        match &self.reason {
            CompileFailure::CompileFailed(text) => Some(text),
            CompileFailure::FileMissing => None,
        }
    }
}

/// Any pipeline failure. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Resource(#[from] ResourceCreationError),
    #[error(transparent)]
    Shader(#[from] ShaderCompileError),
}
