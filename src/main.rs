//! Webcam pose capture with keypoint and device orientation overlays.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pose_capture::{
    app::{AppConfig, GuiMode, PoseCaptureApp},
    config::Config,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera index to use (overrides the config file)
    #[arg(long)]
    cam: Option<i32>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Path to the PoseNet ONNX model (overrides the config file)
    #[arg(long)]
    model: Option<PathBuf>,

    /// GUI display mode (window, none)
    #[arg(short, long, default_value = "window")]
    gui: GuiMode,

    /// Start with the orientation permission granted
    #[arg(short = 'p', long)]
    permission_granted: bool,

    /// Initial window width
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height
    #[arg(long)]
    height: Option<u32>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

fn load_config(args: &Args) -> Config {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            match Config::from_file(path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("Failed to load config file: {}. Using defaults.", e);
                    Config::default()
                }
            }
        }
        None => Config::default(),
    };

    if let Some(cam) = args.cam {
        config.camera.index = cam;
    }
    if let Some(model) = &args.model {
        config.model.posenet.clone_from(model);
    }
    if let Some(width) = args.width {
        config.display.window_width = width;
    }
    if let Some(height) = args.height {
        config.display.window_height = height;
    }
    config
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    let config = load_config(&args);
    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }
    config.validate().context("Invalid configuration")?;

    info!("Pose Capture");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let mut app = PoseCaptureApp::new(AppConfig {
        config,
        gui_mode: args.gui,
        permission_granted: args.permission_granted,
    })?;
    runtime.block_on(app.run())?;

    Ok(())
}
