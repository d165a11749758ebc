//! Shared types for the texgrid renderer: camera rotation, geometry selection,
//! and the configuration values fixed at startup.
//!
//! # Invariants
//! - Configuration is passed explicitly at construction; nothing here is global state.
//! - Angles are stored in degrees and converted to radians only where matrices are built.

mod config;
mod types;

pub use config::{
    AppConfig, CameraConfig, ConfigError, ConfigOverrides, DisplayConfig, GeometrySpec,
    MAX_GRID_SUBDIVISIONS, SceneConfig, ShaderKind,
};
pub use types::{Rotation, wrap_degrees};

pub fn crate_info() -> &'static str {
    "texgrid-common v0.1.0"
}
