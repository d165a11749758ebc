use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use texgrid_common::{AppConfig, ConfigOverrides, GeometrySpec, ShaderKind};
use texgrid_input::{Key, KeyboardState};
use texgrid_render::{FileImageLoader, FrameController};
use texgrid_render_wgpu::WgpuBackend;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

#[derive(Parser)]
#[command(name = "texgrid-desktop", about = "Textured grid with a steerable camera")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Borderless fullscreen on the current monitor
    #[arg(long)]
    fullscreen: bool,

    /// Present without waiting for the display refresh
    #[arg(long)]
    no_vsync: bool,

    /// Grid subdivisions per side
    #[arg(long, conflicts_with = "quad")]
    grid: Option<u32>,

    /// Draw a single quad instead of a grid
    #[arg(long)]
    quad: bool,

    /// Shader program: `color` or `texture`
    #[arg(long, value_parser = parse_shader)]
    shader: Option<ShaderKind>,

    #[arg(long)]
    texture: Option<PathBuf>,
}

fn parse_shader(name: &str) -> Result<ShaderKind, String> {
    match name {
        "color" => Ok(ShaderKind::Color),
        "texture" => Ok(ShaderKind::Texture),
        other => Err(format!("unknown shader `{other}`, expected `color` or `texture`")),
    }
}

impl Cli {
    fn app_config(&self) -> Result<AppConfig> {
        let base = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AppConfig::default(),
        };
        let geometry = if self.quad {
            Some(GeometrySpec::Quad)
        } else {
            self.grid.map(|subdivisions| GeometrySpec::Grid { subdivisions })
        };
        let overrides = ConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.no_vsync.then_some(false),
            fullscreen: self.fullscreen.then_some(true),
            geometry,
            shader: self.shader,
            texture: self.texture.clone(),
            ..ConfigOverrides::default()
        };
        Ok(overrides.apply(base)?)
    }
}

/// Arrow keys steer pitch and yaw; Enter and Backspace roll.
fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::ArrowUp => Some(Key::Up),
        KeyCode::ArrowDown => Some(Key::Down),
        KeyCode::ArrowLeft => Some(Key::Left),
        KeyCode::ArrowRight => Some(Key::Right),
        KeyCode::Enter | KeyCode::NumpadEnter => Some(Key::Confirm),
        KeyCode::Backspace => Some(Key::Cancel),
        _ => None,
    }
}

struct TexgridApp {
    config: AppConfig,
    window: Option<Arc<Window>>,
    frames: Option<FrameController<WgpuBackend>>,
    keys: KeyboardState,
    failure: Option<anyhow::Error>,
}

impl TexgridApp {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            frames: None,
            keys: KeyboardState::new(),
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let display = &self.config.display;
        let mut attrs = Window::default_attributes()
            .with_title("texgrid")
            .with_inner_size(PhysicalSize::new(display.width, display.height))
            .with_resizable(false);
        if display.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).context("creating window")?);

        // Fullscreen windows take the monitor's size; the surface must match.
        let size = window.inner_size();
        if display.fullscreen && size.width > 0 && size.height > 0 {
            self.config.display.width = size.width;
            self.config.display.height = size.height;
        }

        let surface = wgpu::SurfaceTarget::from(window.clone());
        let frames = FrameController::new(surface, &self.config, &FileImageLoader)
            .context("initializing renderer")?;
        tracing::info!(
            adapter = frames.device().adapter_description(),
            "renderer ready"
        );

        window.request_redraw();
        self.window = Some(window);
        self.frames = Some(frames);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        self.failure = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for TexgridApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Focused(false) => {
                self.keys.clear();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                let pressed = state == ElementState::Pressed;
                if code == KeyCode::Escape && pressed {
                    event_loop.exit();
                } else if let Some(key) = map_key(code) {
                    self.keys.set(key, pressed);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(frames) = self.frames.as_mut() else {
                    return;
                };
                if !frames.frame(&self.keys) {
                    let failed = frames.frame_count() + 1;
                    self.fail(event_loop, anyhow::anyhow!("frame {failed} failed to render"));
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = cli.app_config()?;
    tracing::info!(
        width = config.display.width,
        height = config.display.height,
        geometry = ?config.scene.geometry,
        shader = ?config.scene.shader,
        "texgrid-desktop starting"
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = TexgridApp::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(frames) = app.frames.take() {
        tracing::info!(frames = frames.frame_count(), "shutting down");
    }
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_keys_steer() {
        assert_eq!(map_key(KeyCode::ArrowUp), Some(Key::Up));
        assert_eq!(map_key(KeyCode::Enter), Some(Key::Confirm));
        assert_eq!(map_key(KeyCode::Backspace), Some(Key::Cancel));
        assert_eq!(map_key(KeyCode::KeyW), None);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["texgrid-desktop", "--quad", "--no-vsync", "--shader", "color"]);
        let config = cli.app_config().unwrap();
        assert_eq!(config.scene.geometry, GeometrySpec::Quad);
        assert_eq!(config.scene.shader, ShaderKind::Color);
        assert!(!config.display.vsync);
        assert!(!config.display.fullscreen);
    }

    #[test]
    fn grid_and_quad_conflict() {
        assert!(Cli::try_parse_from(["texgrid-desktop", "--quad", "--grid", "4"]).is_err());
    }
}
