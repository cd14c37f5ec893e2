use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framesweep::{
    DecodeHandle, DemuxCallbacks, DemuxOptions, DemuxSession, FfmpegDecodeHandle,
    FfmpegLogLevel, FrameDemuxer, FrameOutputOptions, FrameQualityStore, PixelFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framesweep metadata input.mp4 --json\n  framesweep extract input.mp4 --out frames --fps 24 --progress\n  framesweep extract input.mp4 --out frames --no-upgrade --width 320\n  framesweep completions zsh > _framesweep";

#[derive(Debug, Parser)]
#[command(
    name = "framesweep",
    version,
    about = "Build scrub-ready frame arrays from video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging from the extraction passes.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar for the first pass.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Pixel format of captured frames (rgb8, rgba8, gray8).
    #[arg(long)]
    pixel_format: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print source dimensions and duration.
    #[command(visible_alias = "probe")]
    Metadata {
        /// Input media path or URL.
        input: String,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// Frame rate used to count slots.
        #[arg(long, default_value_t = DemuxOptions::default().target_frame_rate())]
        fps: f64,
    },

    /// Build the frame array and write it to a directory.
    Extract {
        /// Input media path or URL.
        input: String,
        /// Output directory for frame images.
        #[arg(long)]
        out: PathBuf,
        /// Frame rate of the final frame array.
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        /// Sampling rate of the fast first pass.
        #[arg(long, default_value_t = 12.0)]
        low_fps: f64,
        /// Captures per batch between yields.
        #[arg(long, default_value_t = 30)]
        batch_size: usize,
        /// Stop after the first pass and write the best-effort frames.
        #[arg(long)]
        no_upgrade: bool,
        /// Output image extension (png, jpg, jpeg, bmp, tiff).
        #[arg(long, default_value = "png")]
        ext: String,
        /// Output width; height follows the aspect ratio unless given.
        #[arg(long)]
        width: Option<u32>,
        /// Output height.
        #[arg(long)]
        height: Option<u32>,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_pixel_format(value: &str) -> Option<PixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
        "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
        "gray8" | "gray" | "greyscale" | "grayscale" => Some(PixelFormat::Gray8),
        _ => None,
    }
}

fn parse_extension(value: &str) -> Option<String> {
    let clean = value.trim_start_matches('.').to_ascii_lowercase();
    matches!(clean.as_str(), "png" | "jpg" | "jpeg" | "bmp" | "tiff").then_some(clean)
}

fn init_logger(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        .level_for("framesweep", level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logger(global.verbose)?;

    let level = match &global.log_level {
        Some(level) => level.parse::<FfmpegLogLevel>()?,
        None => FfmpegLogLevel::Error,
    };
    framesweep::set_ffmpeg_log_level(level);
    Ok(())
}

fn frame_output(
    global: &GlobalOptions,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<FrameOutputOptions, Box<dyn std::error::Error>> {
    let pixel_format = match &global.pixel_format {
        Some(value) => {
            parse_pixel_format(value).ok_or(format!("unsupported --pixel-format: {value}"))?
        }
        None => PixelFormat::default(),
    };
    Ok(FrameOutputOptions {
        pixel_format,
        width,
        height,
        ..FrameOutputOptions::default()
    })
}

fn ensure_output_dir(out: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if out.exists() && fs::read_dir(out)?.next().is_some() {
        if !overwrite {
            return Err(format!(
                "output directory is not empty: {} (use --overwrite)",
                out.display()
            )
            .into());
        }
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("overwriting frames in {}", out.display()).yellow()
        );
    }
    fs::create_dir_all(out)?;
    Ok(())
}

/// Write every displayable slot, named by slot index so `frame_N` shows
/// the source at `N / fps`. Empty slots leave gaps in the numbering.
fn write_frames(
    store: &FrameQualityStore,
    out: &Path,
    ext: &str,
    verbose: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut written = 0;
    for index in 0..store.len() {
        let Some(frame) = store.resolve_display(index) else {
            continue;
        };
        let path = out.join(format!("frame_{index:06}.{ext}"));
        frame.save(&path)?;
        written += 1;
        if verbose {
            eprintln!("saved {}", path.display());
        }
    }
    Ok(written)
}

fn progress_bar(enabled: bool) -> Result<Option<ProgressBar>, Box<dyn std::error::Error>> {
    if !enabled {
        return Ok(None);
    }
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}% {msg}")?;
    bar.set_style(style.progress_chars("##-"));
    bar.set_message("low-res pass");
    Ok(Some(bar))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Metadata { input, json, fps } => {
            let handle = FfmpegDecodeHandle::new(FrameOutputOptions::default());
            let metadata = handle.load_metadata(&input).await?;
            handle.release();

            if json {
                let payload = json!({
                    "width": metadata.width,
                    "height": metadata.height,
                    "duration_seconds": metadata.duration_seconds,
                    "total_time_ms": metadata.total_time_ms(),
                    "fps": fps,
                    "slots": metadata.slot_count(fps),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "Source:".bold(), input);
                println!("  Resolution: {}x{}", metadata.width, metadata.height);
                println!("  Duration:   {:.3}s", metadata.duration_seconds);
                println!("  Slots:      {} at {fps} fps", metadata.slot_count(fps));
            }
        }
        Commands::Extract {
            input,
            out,
            fps,
            low_fps,
            batch_size,
            no_upgrade,
            ext,
            width,
            height,
        } => {
            let ext = parse_extension(&ext).ok_or(format!("unsupported --ext: {ext}"))?;
            ensure_output_dir(&out, cli.global.overwrite)?;

            let options = DemuxOptions::new()
                .with_target_frame_rate(fps)
                .with_low_res_frame_rate(low_fps)
                .with_batch_size(batch_size)
                .with_background_upgrade(!no_upgrade)
                .with_frame_output(frame_output(&cli.global, width, height)?);
            options.validate()?;

            let bar = progress_bar(cli.global.progress)?;

            let mut callbacks = DemuxCallbacks::new();
            if let Some(bar) = &bar {
                let progress = bar.clone();
                let complete = bar.clone();
                callbacks = callbacks
                    .on_progress(move |percent| progress.set_position(percent as u64))
                    .on_complete(move |frames| {
                        complete.set_message(format!("{} frame(s) ready", frames.len()))
                    });
            }

            let handle = FfmpegDecodeHandle::new(options.frame_output().clone());
            let mut session = DemuxSession::new(handle, options);
            session.set_callbacks(callbacks);
            session.initialize(&input)?;
            let store = session.join().await?;

            if let Some(bar) = bar {
                bar.finish_with_message("done");
            }

            let written = write_frames(&store, &out, &ext, cli.global.verbose)?;

            println!("{} {}", "slots:".bold(), store.summary());
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Wrote {written} frame(s) to {}", out.display()).green()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framesweep", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Cli, ensure_output_dir, parse_extension, parse_pixel_format, write_frames};
    use clap::Parser;
    use framesweep::{FrameQualityStore, Tier, fill_gaps};
    use image::DynamicImage;

    #[test]
    fn parse_pixel_format_aliases() {
        assert!(parse_pixel_format("rgb").is_some());
        assert!(parse_pixel_format("RGBA8").is_some());
        assert!(parse_pixel_format("greyscale").is_some());
        assert!(parse_pixel_format("yuv420p").is_none());
    }

    #[test]
    fn parse_extension_strips_dot() {
        assert_eq!(parse_extension(".PNG").as_deref(), Some("png"));
        assert_eq!(parse_extension("jpeg").as_deref(), Some("jpeg"));
        assert!(parse_extension("gif").is_none());
    }

    #[test]
    fn extract_defaults() {
        let cli = Cli::parse_from(["framesweep", "extract", "in.mp4", "--out", "frames"]);
        match cli.command {
            super::Commands::Extract {
                fps,
                low_fps,
                batch_size,
                no_upgrade,
                ..
            } => {
                assert_eq!(fps, 30.0);
                assert_eq!(low_fps, 12.0);
                assert_eq!(batch_size, 30);
                assert!(!no_upgrade);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn non_empty_output_dir_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_000000.png"), b"stale").unwrap();

        assert!(ensure_output_dir(dir.path(), false).is_err());
        assert!(ensure_output_dir(dir.path(), true).is_ok());
    }

    #[test]
    fn frames_are_named_by_slot_index() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        ensure_output_dir(&out, false).unwrap();

        let mut store = FrameQualityStore::initialize(4, 30.0);
        let frame = Arc::new(DynamicImage::new_rgb8(4, 2));
        store.set(2, Tier::LowRes, Some(frame), 2.0 / 30.0).unwrap();
        fill_gaps(&mut store);

        let written = write_frames(&store, &out, "png", false).unwrap();
        assert_eq!(written, 2);
        assert!(!out.join("frame_000000.png").exists());
        assert!(out.join("frame_000002.png").exists());
        assert!(out.join("frame_000003.png").exists());
    }

    #[test]
    fn metadata_counts_slots_at_default_rate() {
        let cli = Cli::parse_from(["framesweep", "metadata", "in.mp4"]);
        match cli.command {
            super::Commands::Metadata { fps, json, .. } => {
                assert_eq!(fps, 30.0);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        let cli = Cli::parse_from(["framesweep", "metadata", "in.mp4", "--fps", "24"]);
        assert!(matches!(cli.command, super::Commands::Metadata { fps, .. } if fps == 24.0));
    }
}
