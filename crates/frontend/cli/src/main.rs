use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_core::System;
use emu_gb::camera::{SENSOR_HEIGHT, SENSOR_WIDTH};
use emu_gb::{DitherPattern, GbConfig, GbSystem, SCREEN_HEIGHT, SCREEN_WIDTH};

mod picture;

/// Headless Game Boy runner.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Cartridge ROM image
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Battery RAM to load before running (ignored if the file is missing)
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write battery RAM here after running
    #[arg(long)]
    write_save: Option<PathBuf>,

    /// Camera sensor image: 128x112 PNG or raw grayscale bytes
    #[arg(long)]
    camera_image: Option<PathBuf>,

    /// Camera dither pattern (standard, 2x2, grid, maze, nest, fuzz,
    /// vertical, horizontal, diagonal); overrides the config file
    #[arg(long)]
    dither: Option<DitherPattern>,

    /// Write the final frame as PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// JSON emulator configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Level for every log category (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: LogLevel,

    #[arg(long)]
    log_cpu: Option<LogLevel>,

    #[arg(long)]
    log_ppu: Option<LogLevel>,

    #[arg(long)]
    log_cartridge: Option<LogLevel>,

    #[arg(long)]
    log_camera: Option<LogLevel>,

    /// Dump a save state as JSON after running
    #[arg(long)]
    state_out: Option<PathBuf>,

    /// Print bytes sent over the serial port
    #[arg(long, default_value_t = false)]
    print_serial: bool,
}

fn configure_logging(args: &Args) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();

    let config = LogConfig::global();
    config.set_global_level(args.log_level);
    let overrides = [
        (LogCategory::Cpu, args.log_cpu),
        (LogCategory::Ppu, args.log_ppu),
        (LogCategory::Cartridge, args.log_cartridge),
        (LogCategory::Camera, args.log_camera),
    ];
    for (category, level) in overrides {
        if let Some(level) = level {
            config.set_level(category, level);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<GbConfig> {
    let Some(path) = path else {
        return Ok(GbConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    GbConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    configure_logging(&args);

    let mut config = load_config(args.config.as_ref())?;
    if let Some(pattern) = args.dither {
        config.camera_dither_pattern = pattern;
    }
    let mut sys = GbSystem::with_config(config);

    let rom = fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;
    sys.load_rom(&rom)
        .with_context(|| format!("loading {}", args.rom.display()))?;
    log::info!(
        "loaded {} ({} bytes of save RAM)",
        sys.title().unwrap_or("?"),
        sys.save_data_size()
    );

    if let Some(path) = args.save.as_ref().filter(|p| p.exists()) {
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        sys.load_save_data(&data)
            .with_context(|| format!("loading save {}", path.display()))?;
    }

    if let Some(path) = &args.camera_image {
        let image = picture::read_grayscale(path, SENSOR_WIDTH as u32, SENSOR_HEIGHT as u32)?;
        if !sys.set_camera_image(&image) {
            anyhow::bail!(
                "{} was not accepted (camera cartridge with a {}x{} image required)",
                path.display(),
                SENSOR_WIDTH,
                SENSOR_HEIGHT
            );
        }
    }

    for _ in 0..args.frames {
        sys.step_frame()?;
    }
    log::info!("ran {} frames", sys.frame_count());

    if sys.illegal_opcode_count() > 0 {
        log::warn!(
            "{} undefined opcode(s) executed, last {:?}",
            sys.illegal_opcode_count(),
            sys.last_illegal_opcode()
        );
    }

    if let Some(path) = &args.screenshot {
        picture::write_png(
            path,
            SCREEN_WIDTH as u32,
            SCREEN_HEIGHT as u32,
            sys.frame_buffer(),
        )?;
    }

    if let Some(path) = &args.write_save {
        fs::write(path, sys.save_data())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if let Some(path) = &args.state_out {
        let state = serde_json::to_string_pretty(&sys.save_state())?;
        fs::write(path, state).with_context(|| format!("writing {}", path.display()))?;
    }

    if args.print_serial {
        println!("{}", String::from_utf8_lossy(sys.serial_output()));
    }

    Ok(())
}
