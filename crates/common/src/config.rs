use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::Rotation;

/// Largest grid accepted; keeps both `(N + 1)^2` vertices and `6 * N^2`
/// indices well inside `u32`.
pub const MAX_GRID_SUBDIVISIONS: u32 = 4096;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid display configuration: {0}")]
    InvalidDisplay(String),
    #[error("invalid scene configuration: {0}")]
    InvalidScene(String),
}

/// Display parameters fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Surface width in physical pixels.
    pub width: u32,
    /// Surface height in physical pixels.
    pub height: u32,
    pub near_plane: f32,
    pub far_plane: f32,
    /// Block `end_scene` on the display refresh.
    pub vsync: bool,
    pub fullscreen: bool,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            near_plane: 0.3,
            far_plane: 1000.0,
            vsync: true,
            fullscreen: false,
            field_of_view: 45.0,
        }
    }
}

impl DisplayConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDisplay(format!(
                "surface has zero size {}x{}",
                self.width, self.height
            )));
        }
        if !(self.near_plane > 0.0 && self.near_plane < self.far_plane) {
            return Err(ConfigError::InvalidDisplay(format!(
                "planes must satisfy 0 < near < far (near={}, far={})",
                self.near_plane, self.far_plane
            )));
        }
        if !(self.field_of_view > 0.0 && self.field_of_view < 180.0) {
            return Err(ConfigError::InvalidDisplay(format!(
                "field of view {} is outside (0, 180)",
                self.field_of_view
            )));
        }
        Ok(())
    }
}

/// Which geometry generator builds the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometrySpec {
    /// Two triangles spanning `(-1, -1)` to `(1, 1)`.
    Quad,
    /// `subdivisions x subdivisions` cells on integer coordinates.
    Grid { subdivisions: u32 },
}

impl Default for GeometrySpec {
    fn default() -> Self {
        GeometrySpec::Grid { subdivisions: 10 }
    }
}

impl GeometrySpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            GeometrySpec::Quad => Ok(()),
            GeometrySpec::Grid { subdivisions } => {
                if (1..=MAX_GRID_SUBDIVISIONS).contains(&subdivisions) {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidScene(format!(
                        "grid subdivisions must be in 1..={MAX_GRID_SUBDIVISIONS}, got {subdivisions}"
                    )))
                }
            }
        }
    }
}

/// Shader program variant, selected once at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderKind {
    /// Untextured program; colors are derived from texture coordinates.
    Color,
    #[default]
    Texture,
}

impl ShaderKind {
    /// Base name of the shader source files, e.g. `texture.vert.wgsl`.
    pub fn file_stem(self) -> &'static str {
        match self {
            ShaderKind::Color => "color",
            ShaderKind::Texture => "texture",
        }
    }
}

/// Initial camera placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: Vec3,
    pub rotation: Rotation,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -5.0),
            rotation: Rotation::ZERO,
        }
    }
}

/// What gets drawn: one mesh, one shader program, one texture, one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub geometry: GeometrySpec,
    pub shader: ShaderKind,
    /// Directory holding `<kind>.vert.wgsl` and `<kind>.frag.wgsl`.
    pub shader_dir: PathBuf,
    pub texture: PathBuf,
    pub clear_color: [f32; 4],
    pub camera: CameraConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            geometry: GeometrySpec::default(),
            shader: ShaderKind::default(),
            shader_dir: PathBuf::from("assets/shaders"),
            texture: PathBuf::from("assets/textures/sidewalk.tga"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            camera: CameraConfig::default(),
        }
    }
}

/// Top-level configuration, usually read from a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub scene: SceneConfig,
}

impl AppConfig {
    /// Read and validate a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.display.validate()?;
        self.scene.geometry.validate()
    }
}

/// Command-line overrides applied on top of a loaded configuration.
///
/// `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub fullscreen: Option<bool>,
    pub geometry: Option<GeometrySpec>,
    pub shader: Option<ShaderKind>,
    pub shader_dir: Option<PathBuf>,
    pub texture: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Apply every override, then re-validate.
    pub fn apply(&self, mut config: AppConfig) -> Result<AppConfig, ConfigError> {
        let display = &mut config.display;
        if let Some(width) = self.width {
            display.width = width;
        }
        if let Some(height) = self.height {
            display.height = height;
        }
        if let Some(vsync) = self.vsync {
            display.vsync = vsync;
        }
        if let Some(fullscreen) = self.fullscreen {
            display.fullscreen = fullscreen;
        }

        let scene = &mut config.scene;
        if let Some(geometry) = self.geometry {
            scene.geometry = geometry;
        }
        if let Some(shader) = self.shader {
            scene.shader = shader;
        }
        if let Some(dir) = &self.shader_dir {
            scene.shader_dir = dir.clone();
        }
        if let Some(texture) = &self.texture {
            scene.texture = texture.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_startup_constants() {
        let d = DisplayConfig::default();
        assert_eq!(d.near_plane, 0.3);
        assert_eq!(d.far_plane, 1000.0);
        assert!(d.vsync);
        assert!(!d.fullscreen);
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn yaml_overrides_selected_fields() {
        let config = AppConfig::from_yaml(
            r#"
display:
  width: 800
  height: 600
scene:
  geometry:
    kind: grid
    subdivisions: 4
  shader: color
  camera:
    position: [0.0, 0.0, -15.0]
    rotation: { pitch: -30.0, yaw: 30.0, roll: -53.0 }
"#,
        )
        .unwrap();
        assert_eq!(config.display.width, 800);
        assert_eq!(config.display.far_plane, 1000.0);
        assert_eq!(config.scene.geometry, GeometrySpec::Grid { subdivisions: 4 });
        assert_eq!(config.scene.shader, ShaderKind::Color);
        assert_eq!(config.scene.camera.position, Vec3::new(0.0, 0.0, -15.0));
        assert_eq!(config.scene.camera.rotation.roll, -53.0);
    }

    #[test]
    fn quad_geometry_parses() {
        let config = AppConfig::from_yaml("scene:\n  geometry:\n    kind: quad\n").unwrap();
        assert_eq!(config.scene.geometry, GeometrySpec::Quad);
    }

    #[test]
    fn rejects_zero_size_display() {
        let err = AppConfig::from_yaml("display:\n  width: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDisplay(_)));
    }

    #[test]
    fn rejects_inverted_planes() {
        let display = DisplayConfig {
            near_plane: 10.0,
            far_plane: 1.0,
            ..DisplayConfig::default()
        };
        assert!(display.validate().is_err());
    }

    #[test]
    fn rejects_empty_grid() {
        assert!(GeometrySpec::Grid { subdivisions: 0 }.validate().is_err());
        assert!(
            GeometrySpec::Grid {
                subdivisions: MAX_GRID_SUBDIVISIONS + 1
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "display:\n  vsync: false").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert!(!config.display.vsync);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let overrides = ConfigOverrides {
            width: Some(640),
            vsync: Some(false),
            geometry: Some(GeometrySpec::Quad),
            ..ConfigOverrides::default()
        };
        let config = overrides.apply(AppConfig::default()).unwrap();
        assert_eq!(config.display.width, 640);
        assert_eq!(config.display.height, 720);
        assert!(!config.display.vsync);
        assert_eq!(config.scene.geometry, GeometrySpec::Quad);
        assert_eq!(config.scene.shader, ShaderKind::Texture);
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = ConfigOverrides {
            geometry: Some(GeometrySpec::Grid { subdivisions: 0 }),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            overrides.apply(AppConfig::default()),
            Err(ConfigError::InvalidScene(_))
        ));
    }
}
