use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(name = "scenecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a job file into a video (requires chrome and `ffmpeg`).
    Render(RenderArgs),
    /// Probe a media file and print its frame count (requires `ffprobe`).
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input job JSON.
    #[arg(long = "job")]
    job_path: PathBuf,

    /// Override the job's output path.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Override the job's worker count.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Suppress the progress bar.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media file to probe.
    #[arg(long = "in")]
    in_path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scenecast=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = scenecast::RenderConfig::from_path(&args.job_path)
        .with_context(|| format!("load job '{}'", args.job_path.display()))?;
    if let Some(out) = args.out {
        cfg.output_path = Some(out);
    }
    if let Some(concurrency) = args.concurrency {
        cfg.concurrency = concurrency;
    }

    let total = cfg.duration_frames;
    let mut job = scenecast::RenderJob::new(cfg)?;

    if !args.quiet {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {wide_bar} {pos}/{len} frames ({msg})",
            )
            .expect("static progress template"),
        );
        job = job.on_progress(move |report| {
            bar.set_position(report.frames_done);
            bar.set_message(format!("{:.1} fps", report.fps));
            if report.frames_done == report.frames_total {
                bar.finish_with_message("done");
            }
        });
    }

    let out = job.render()?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let frames = scenecast::encode::probe::count_frames(&args.in_path)?;
    println!("{frames}");
    Ok(())
}
