use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dronesight::core_modules::colormap::Colormap;
use dronesight::logger::DualLogger;
use dronesight::{BatchOrchestrator, Config, PairStatus, PipelineKind};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dronesight", version, about = "Batch RGB/thermal overlay and change detection")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Align `*_T.JPG` thermal frames onto `*_Z.JPG` RGB frames and blend them.
    Thermal {
        #[command(flatten)]
        common: CommonArgs,
        /// Weight of the RGB frame in the blend.
        #[arg(long)]
        alpha: Option<f64>,
        /// Weight of the colorized thermal frame in the blend.
        #[arg(long)]
        beta: Option<f64>,
        #[arg(long, value_enum)]
        colormap: Option<Colormap>,
        #[arg(long)]
        scale_min: Option<f64>,
        #[arg(long)]
        scale_max: Option<f64>,
        #[arg(long)]
        scale_step: Option<f64>,
    },
    /// Detect and annotate changes between `{base}.jpg` and `{base}~2.jpg`.
    Change {
        #[command(flatten)]
        common: CommonArgs,
        /// Smallest contour area reported as a change.
        #[arg(long)]
        min_area: Option<f64>,
        /// Margin, in pixels, added around each crop.
        #[arg(long)]
        margin: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory holding the input pairs.
    #[arg(short, long)]
    input: PathBuf,
    /// Directory receiving the outputs (created if missing).
    #[arg(short, long)]
    output: PathBuf,
    /// JSON configuration file; flags override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Worker count (defaults to the number of logical CPUs).
    #[arg(short, long)]
    workers: Option<usize>,
    /// Also append log lines to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn load_config(common: &CommonArgs) -> Result<Config> {
    let mut config = match &common.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if common.workers.is_some() {
        config.batch.workers = common.workers;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Argument Parsing & Configuration ---
    let cli = Cli::parse();
    let (kind, common, config) = match &cli.command {
        Command::Thermal { common, alpha, beta, colormap, scale_min, scale_max, scale_step } => {
            let mut config = load_config(common)?;
            let overlay = &mut config.overlay;
            overlay.alpha = alpha.unwrap_or(overlay.alpha);
            overlay.beta = beta.unwrap_or(overlay.beta);
            overlay.colormap = colormap.unwrap_or(overlay.colormap);
            let aligner = &mut config.aligner;
            aligner.scale_min = scale_min.unwrap_or(aligner.scale_min);
            aligner.scale_max = scale_max.unwrap_or(aligner.scale_max);
            aligner.scale_step = scale_step.unwrap_or(aligner.scale_step);
            (PipelineKind::Thermal, common, config)
        }
        Command::Change { common, min_area, margin } => {
            let mut config = load_config(common)?;
            config.change.min_region_area = min_area.unwrap_or(config.change.min_region_area);
            config.change.crop_margin = margin.unwrap_or(config.change.crop_margin);
            (PipelineKind::Change, common, config)
        }
    };
    let orchestrator = BatchOrchestrator::new(kind, config).context("invalid configuration")?;

    // --- 2. Logging ---
    DualLogger::init(common.log_file.as_deref()).context("initialising logging")?;

    // --- 3. Batch Run ---
    let report = orchestrator
        .run(&common.input, &common.output)
        .await
        .with_context(|| format!("running {kind} batch on {}", common.input.display()))?;

    // --- 4. Status Report ---
    for result in &report.results {
        println!("{result}");
    }
    report.log_summary();
    println!(
        "Processing complete: {}/{} pairs succeeded. Outputs in {}",
        report.count(PairStatus::Ok),
        report.results.len(),
        common.output.display()
    );
    Ok(())
}
