use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use glam::Vec3;
use std::path::PathBuf;
use texgrid_common::{AppConfig, ConfigOverrides, GeometrySpec, ShaderKind};
use texgrid_input::{Key, KeyboardState};
use texgrid_render::{
    FaultPlan, FileImageLoader, FrameController, GeometryBuffer, RecordingBackend,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "texgrid-cli", about = "Headless tools for the texgrid renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Validate a configuration file and print it with defaults filled in
    Check {
        /// YAML configuration file
        config: Option<PathBuf>,
    },
    /// Generate geometry and report its counts and bounds
    Geometry {
        /// Grid subdivisions per side
        #[arg(long, default_value = "10", conflicts_with = "quad")]
        grid: u32,
        /// Generate the quad instead of a grid
        #[arg(long)]
        quad: bool,
        /// Also print every vertex and triangle
        #[arg(long)]
        dump: bool,
    },
    /// Run frames against the recording backend and report what was drawn
    Replay {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to run
        #[arg(short, long, default_value = "1")]
        frames: u64,
        /// Keys held for every frame, e.g. `up,left,confirm`
        #[arg(long, value_delimiter = ',', value_parser = parse_key)]
        hold: Vec<Key>,
        /// Override the shader program: `color` or `texture`
        #[arg(long, value_parser = parse_shader)]
        shader: Option<ShaderKind>,
    },
}

fn parse_key(name: &str) -> Result<Key, String> {
    Key::from_name(name).ok_or_else(|| format!("unknown key `{name}`"))
}

fn parse_shader(name: &str) -> Result<ShaderKind, String> {
    match name {
        "color" => Ok(ShaderKind::Color),
        "texture" => Ok(ShaderKind::Texture),
        other => Err(format!("unknown shader `{other}`, expected `color` or `texture`")),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            AppConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(AppConfig::default()),
    }
}

fn geometry(spec: GeometrySpec, dump: bool) -> anyhow::Result<()> {
    let g = GeometryBuffer::generate(&spec)?;
    let (min, max) = g.vertices().iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), v| {
            let p = Vec3::from_array(v.position);
            (min.min(p), max.max(p))
        },
    );

    println!("Geometry: {spec:?}");
    println!("  vertices:  {}", g.vertex_count());
    println!("  indices:   {}", g.index_count());
    println!("  triangles: {}", g.index_count() / 3);
    println!("  bounds:    {min} .. {max}");

    if dump {
        for (i, v) in g.vertices().iter().enumerate() {
            println!("  v{i}: pos={:?} uv={:?}", v.position, v.tex_coord);
        }
        for (i, tri) in g.indices().chunks(3).enumerate() {
            println!("  t{i}: {tri:?}");
        }
    }
    Ok(())
}

fn replay(config: AppConfig, frames: u64, hold: Vec<Key>) -> anyhow::Result<()> {
    let mut controller =
        FrameController::<RecordingBackend>::new(FaultPlan::default(), &config, &FileImageLoader)
            .context("building the scene")?;
    let input = KeyboardState::holding(hold);
    tracing::debug!(frames, held = ?input, "replaying");

    if let Some(texture) = controller.texture() {
        if !texture.is_valid() {
            println!(
                "warning: {} could not be decoded; drawing the fallback texture",
                config.scene.texture.display()
            );
        }
    }

    for _ in 0..frames {
        if !controller.frame(&input) {
            bail!("frame {} failed", controller.frame_count() + 1);
        }
    }

    let backend = controller.device().backend();
    let rotation = controller.camera().rotation();
    println!(
        "Replay: {} frames, shader={:?}",
        controller.frame_count(),
        controller.shader_kind()
    );
    println!("  adapter:  {}", controller.device().adapter_description());
    let stats = backend.stats();
    println!("  draws:    {} ({} indices)", stats.draws, stats.indices);
    println!("  last frame: {:?}", backend.draws());
    println!("  presented: {}", backend.frames_presented());
    println!(
        "  rotation: pitch={:.2} yaw={:.2} roll={:.2}",
        rotation.pitch, rotation.yaw, rotation.roll
    );
    println!("  view:     {}", controller.camera().view_matrix());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("texgrid-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", texgrid_common::crate_info());
            println!("input: {}", texgrid_input::crate_info());
            println!("render: {}", texgrid_render::crate_info());
        }
        Commands::Check { config } => {
            let config = load_config(config.as_ref())?;
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::Geometry { grid, quad, dump } => {
            let spec = if quad {
                GeometrySpec::Quad
            } else {
                GeometrySpec::Grid { subdivisions: grid }
            };
            geometry(spec, dump)?;
        }
        Commands::Replay {
            config,
            frames,
            hold,
            shader,
        } => {
            let overrides = ConfigOverrides {
                shader,
                ..ConfigOverrides::default()
            };
            let config = overrides.apply(load_config(config.as_ref())?)?;
            replay(config, frames, hold)?;
        }
    }

    Ok(())
}
