use texgrid_common::{AppConfig, SceneConfig, ShaderKind};
use texgrid_input::{CameraSteer, InputState};

use crate::backend::GpuBackend;
use crate::camera::Camera;
use crate::device::GraphicsDevice;
use crate::error::RenderError;
use crate::mesh::Mesh;
use crate::shader::{DrawParams, ShaderProgram, Transforms, compile_program};
use crate::texture::{ImageLoader, Texture};

/// The per-tick loop body: steer, render the camera, draw one mesh.
///
/// Resources are created once up front. Field order matters: Rust drops
/// fields top to bottom, so every resource is released before the device.
pub struct FrameController<B: GpuBackend + 'static> {
    shader: Box<dyn ShaderProgram<B>>,
    texture: Option<Texture<B>>,
    mesh: Mesh<B>,
    camera: Camera,
    steer: CameraSteer,
    clear_color: [f32; 4],
    frames: u64,
    device: GraphicsDevice<B>,
}

impl<B: GpuBackend + 'static> FrameController<B> {
    /// Create the device and every scene resource. Any failure drops whatever
    /// was already created.
    pub fn new(
        surface: B::Surface,
        config: &AppConfig,
        loader: &dyn ImageLoader,
    ) -> Result<Self, RenderError> {
        let device = GraphicsDevice::init(surface, &config.display)?;
        Self::assemble(device, &config.scene, loader)
    }

    /// Build the scene on an existing device.
    pub fn assemble(
        mut device: GraphicsDevice<B>,
        scene: &SceneConfig,
        loader: &dyn ImageLoader,
    ) -> Result<Self, RenderError> {
        let backend = device.backend_mut();
        let mesh = Mesh::build(backend, &scene.geometry)?;
        let shader = compile_program(backend, scene.shader, &scene.shader_dir)?;
        let texture = match scene.shader {
            ShaderKind::Texture => Some(Texture::load(backend, loader, &scene.texture)?),
            ShaderKind::Color => None,
        };

        tracing::info!(
            geometry = ?scene.geometry,
            shader = ?scene.shader,
            indices = mesh.index_count(),
            "scene assembled"
        );

        Ok(Self {
            shader,
            texture,
            mesh,
            camera: Camera::from_config(&scene.camera),
            steer: CameraSteer::default(),
            clear_color: scene.clear_color,
            frames: 0,
            device,
        })
    }

    /// Run one tick. `false` means the frame failed and the loop must stop.
    pub fn frame(&mut self, input: &dyn InputState) -> bool {
        let rotation = self.steer.apply(self.camera.rotation(), input);
        self.camera
            .set_rotation(rotation.pitch, rotation.yaw, rotation.roll);
        self.camera.render();

        match self.render() {
            Ok(()) => {
                self.frames += 1;
                tracing::trace!(frame = self.frames, ?rotation, "frame presented");
                true
            }
            Err(err) => {
                tracing::error!(%err, frame = self.frames + 1, "frame failed");
                false
            }
        }
    }

    fn render(&mut self) -> Result<(), RenderError> {
        self.device.begin_scene(self.clear_color)?;

        let transforms = Transforms {
            world: self.device.world_matrix(),
            view: self.camera.view_matrix(),
            projection: self.device.projection_matrix(),
        };
        let backend = self.device.backend_mut();
        self.mesh.bind(backend);
        self.shader.render(
            backend,
            &DrawParams {
                index_count: self.mesh.index_count(),
                transforms,
                texture: self.texture.as_ref().map(Texture::view),
            },
        )?;

        self.device.end_scene()?;
        Ok(())
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn device(&self) -> &GraphicsDevice<B> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut GraphicsDevice<B> {
        &mut self.device
    }

    pub fn texture(&self) -> Option<&Texture<B>> {
        self.texture.as_ref()
    }

    pub fn mesh(&self) -> &Mesh<B> {
        &self.mesh
    }

    pub fn shader_kind(&self) -> ShaderKind {
        self.shader.kind()
    }

    /// Frames presented successfully so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, FaultPlan, RecordingBackend, ResourceKind};
    use crate::texture::{FileImageLoader, ImageData, ImageLoadError};
    use glam::Vec3;
    use std::path::{Path, PathBuf};
    use texgrid_common::{CameraConfig, GeometrySpec, Rotation};
    use texgrid_input::{Key, KeyboardState};

    struct SolidLoader;

    impl ImageLoader for SolidLoader {
        fn load(&self, _path: &Path) -> Result<ImageData, ImageLoadError> {
            Ok(ImageData::solid(8, 8, [128, 128, 128, 255]))
        }
    }

    fn assets() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets")
    }

    fn scenario() -> AppConfig {
        let mut config = AppConfig::default();
        config.scene.geometry = GeometrySpec::Grid { subdivisions: 10 };
        config.scene.shader = ShaderKind::Texture;
        config.scene.shader_dir = assets().join("shaders");
        config.scene.texture = assets().join("textures/sidewalk.tga");
        config.scene.camera = CameraConfig {
            position: Vec3::new(0.0, 0.0, -15.0),
            rotation: Rotation::new(-30.0, 30.0, -53.0),
        };
        config
    }

    fn controller(config: &AppConfig) -> FrameController<RecordingBackend> {
        FrameController::new(FaultPlan::default(), config, &FileImageLoader).unwrap()
    }

    #[test]
    fn textured_grid_issues_one_draw_of_600() {
        let mut fc = controller(&scenario());
        assert!(fc.texture().is_some_and(Texture::is_valid));
        fc.device_mut().backend_mut().take_commands();

        assert!(fc.frame(&KeyboardState::new()));
        assert_eq!(fc.device().backend().draws(), vec![(600, 0, 0)]);
        assert_eq!(fc.frame_count(), 1);
    }

    #[test]
    fn frame_calls_run_in_order() {
        let mut fc = controller(&scenario());
        fc.device_mut().backend_mut().take_commands();
        assert!(fc.frame(&KeyboardState::new()));

        let commands = fc.device_mut().backend_mut().take_commands();
        let position = |pred: fn(&Command) -> bool| commands.iter().position(pred).unwrap();
        let begin = position(|c| matches!(c, Command::BeginScene { .. }));
        let bind = position(|c| matches!(c, Command::SetVertexBuffer { .. }));
        let write = position(|c| matches!(c, Command::WriteBuffer { .. }));
        let draw = position(|c| matches!(c, Command::DrawIndexed { .. }));
        let end = position(|c| matches!(c, Command::EndScene));
        assert!(begin < bind && bind < write && write < draw && draw < end);
        assert_eq!(commands.first(), Some(&Command::BeginScene { color: [0.0, 0.0, 0.0, 1.0] }));
        assert_eq!(commands.last(), Some(&Command::EndScene));
    }

    #[test]
    fn held_keys_steer_the_camera() {
        let mut fc = controller(&scenario());
        let input = KeyboardState::holding([Key::Down, Key::Left, Key::Confirm]);
        for _ in 0..3 {
            assert!(fc.frame(&input));
        }
        let r = fc.camera().rotation();
        assert!((r.pitch - -27.0).abs() < 1e-4, "{r:?}");
        assert!((r.yaw - 27.0).abs() < 1e-4, "{r:?}");
        assert!((r.roll - -52.7).abs() < 1e-4, "{r:?}");
        assert_eq!(fc.frame_count(), 3);
    }

    #[test]
    fn uploaded_view_follows_camera() {
        let mut fc = controller(&scenario());
        assert!(fc.frame(&KeyboardState::new()));

        let view = fc.camera().view_matrix();
        let backend = fc.device().backend();
        let bytes = backend
            .commands()
            .iter()
            .rev()
            .find_map(|c| match c {
                Command::WriteBuffer { contents, .. } => Some(contents.clone()),
                _ => None,
            })
            .unwrap();
        let uploaded: crate::shader::MatrixBuffer = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(uploaded.view, view.transpose().to_cols_array_2d());
    }

    #[test]
    fn color_program_needs_no_texture() {
        let mut config = scenario();
        config.scene.shader = ShaderKind::Color;
        config.scene.geometry = GeometrySpec::Quad;
        let mut fc = controller(&config);
        assert!(fc.texture().is_none());
        assert_eq!(fc.shader_kind(), ShaderKind::Color);
        assert!(fc.frame(&KeyboardState::new()));
        assert_eq!(fc.device().backend().draws().last(), Some(&(6, 0, 0)));
    }

    #[test]
    fn loader_is_pluggable() {
        let mut config = scenario();
        config.scene.texture = PathBuf::from("ignored.tga");
        let fc = FrameController::<RecordingBackend>::new(FaultPlan::default(), &config, &SolidLoader)
            .unwrap();
        let texture = fc.texture().unwrap();
        assert!(texture.is_valid());
        assert_eq!(texture.dimensions(), (8, 8));
    }

    #[test]
    fn map_failure_stops_the_loop() {
        let mut fc = controller(&scenario());
        fc.device_mut().backend_mut().set_faults(FaultPlan {
            buffer_writes: true,
            ..FaultPlan::default()
        });
        assert!(!fc.frame(&KeyboardState::new()));
        assert_eq!(fc.frame_count(), 0);
        assert!(fc.device().backend().draws().is_empty());
    }

    #[test]
    fn long_runs_keep_the_command_log_bounded() {
        let mut fc = controller(&scenario());
        assert!(fc.frame(&KeyboardState::new()));
        assert!(fc.frame(&KeyboardState::new()));
        let per_frame = fc.device().backend().commands().len();
        assert_eq!(
            fc.device().backend().commands().first(),
            Some(&Command::BeginScene { color: [0.0, 0.0, 0.0, 1.0] })
        );

        for _ in 0..10_000 {
            assert!(fc.frame(&KeyboardState::new()));
        }
        let backend = fc.device().backend();
        assert_eq!(backend.commands().len(), per_frame);
        assert_eq!(backend.draws(), vec![(600, 0, 0)]);
        assert_eq!(backend.stats().draws, 10_002);
        assert_eq!(backend.stats().indices, 600 * 10_002);
        assert_eq!(fc.frame_count(), 10_002);
    }

    #[test]
    fn missing_shader_aborts_construction() {
        let mut config = scenario();
        config.scene.shader_dir = PathBuf::from("/no/such/shaders");
        let result = FrameController::<RecordingBackend>::new(
            FaultPlan::default(),
            &config,
            &FileImageLoader,
        );
        match result {
            Err(RenderError::Shader(err)) => assert!(err.is_file_missing()),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("constructed without shader sources"),
        }
    }

    #[test]
    fn failed_construction_releases_partial_resources() {
        let config = scenario();
        let mut device =
            GraphicsDevice::<RecordingBackend>::init(FaultPlan::default(), &config.display).unwrap();
        let tracker = device.backend().tracker();
        device.backend_mut().set_faults(FaultPlan {
            samplers: true,
            ..FaultPlan::default()
        });
        let result = FrameController::assemble(device, &config.scene, &FileImageLoader);
        assert!(matches!(result, Err(RenderError::Resource(_))));
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn teardown_releases_everything() {
        let fc = controller(&scenario());
        let tracker = fc.device().backend().tracker();
        assert_eq!(tracker.live_of(ResourceKind::VertexBuffer), 1);
        assert_eq!(tracker.live_of(ResourceKind::IndexBuffer), 1);
        assert_eq!(tracker.live_of(ResourceKind::Texture), 1);
        drop(fc);
        assert_eq!(tracker.live_count(), 0);
    }
}
