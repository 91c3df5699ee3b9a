//! Footprint CLI - Human Footprint Index maps from pressure layers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use footprint_core::io::read_geotiff;
use footprint_pipeline::cache;
use footprint_pipeline::naming::{base_path, manifest_path};
use footprint_pipeline::{
    plan, prepare_study_area, run_with_progress, ProcessingMode, Progress, RunConfig, YearStatus,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "footprint")]
#[command(author, version, about = "Human Footprint Index raster pipeline", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare, score and aggregate every layer of a run file
    Run {
        /// Run configuration (JSON)
        config: PathBuf,
        /// Worker threads (1 = sequential, 0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Override the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a run file without reading any raster
    Validate {
        /// Run configuration (JSON)
        config: PathBuf,
    },
    /// Build the grid template and write the base raster
    Template {
        /// Run configuration (JSON)
        config: PathBuf,
        /// Output file (defaults to the run's b02_base location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show which snapshot every layer uses for every requested year
    Resolve {
        /// Run configuration (JSON)
        config: PathBuf,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::from_file(path).with_context(|| format!("Invalid run configuration {}", path.display()))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn cmd_run(config: PathBuf, workers: Option<usize>, output: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(&config)?;
    if workers.is_some() {
        config.workers = workers;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
    let mode = ProcessingMode::from_workers(config.workers);

    let start = Instant::now();
    let pb = progress_bar();
    let report = |event: &Progress| match event {
        Progress::Planned { units, years } => {
            pb.set_length((*units + *years) as u64);
            pb.set_message("preparing layers");
        }
        Progress::UnitFinished { layer, snapshot, .. } => {
            match snapshot {
                Some(year) => pb.set_message(format!("{layer}@{year}")),
                None => pb.set_message(layer.clone()),
            }
            pb.inc(1);
        }
        Progress::YearFinished { year, .. } => {
            pb.set_message(format!("map {year}"));
            pb.inc(1);
        }
    };
    let manifest = run_with_progress(&config, mode, &report).context("Run failed")?;
    pb.finish_and_clear();

    println!(
        "Units: {} succeeded, {} skipped, {} reused from cache",
        manifest.succeeded_units(),
        manifest.skipped_units(),
        manifest.cache_hits()
    );
    for u in &manifest.uncovered {
        println!("  {} has no snapshot for {}", u.layer, u.year);
    }
    for record in &manifest.years {
        match &record.status {
            YearStatus::Succeeded(m) => println!("  {}: {}", record.year, m.map.display()),
            YearStatus::Skipped(reason) => println!("  {}: skipped ({})", record.year, reason.message),
        }
    }
    done("Manifest", &manifest_path(&config.output_dir), start.elapsed());
    Ok(())
}

fn cmd_validate(config: PathBuf) -> Result<()> {
    let config = load_config(&config)?;
    let layers = config.layers().count();
    println!("Configuration OK");
    println!("  Study area: {} ({} at {})", config.study_area.name, config.study_area.crs, config.study_area.cell_size);
    println!("  Scheme: {} [{}, {}], {}", config.scheme.name, config.scheme.min_score, config.scheme.max_score, config.scheme.combination);
    println!("  Pressures: {}, layers: {}", config.pressures.len(), layers);
    println!("  Years: {:?}", config.years);
    Ok(())
}

fn cmd_template(config: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config)?;
    let start = Instant::now();

    let pb = spinner("Building grid template...");
    let area = prepare_study_area(&config).context("Failed to build the grid template")?;
    pb.finish_and_clear();

    let t = &area.template;
    info!("Template: {} x {} cells", t.cols, t.rows);
    let path = output.unwrap_or_else(|| base_path(&config.output_dir, &area.name, t.cell_size()));
    cache::publish(&area.base_raster(), &path).context("Failed to write base raster")?;

    let bounds = t.bounds();
    println!("Grid: {} x {} at {} ({})", t.cols, t.rows, t.cell_size(), t.crs);
    println!(
        "Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    println!("Cells inside: {}", area.inside_count());
    done("Base raster", &path, start.elapsed());
    Ok(())
}

fn cmd_resolve(config: PathBuf) -> Result<()> {
    let config = load_config(&config)?;
    let plan = plan(&config);

    println!("Policy: {:?}", config.temporal_policy);
    for year in &plan.years {
        println!("{year}:");
        for unit in plan.units.iter().filter(|u| u.years.contains(year)) {
            let snapshot = unit.snapshot.map_or("static".to_string(), |y| y.to_string());
            println!("  {:<20} {:<8} {}", unit.layer, snapshot, unit.source.display());
        }
        for u in plan.uncovered.iter().filter(|u| u.year == *year) {
            println!("  {:<20} -        {}", u.layer, u.reason.message);
        }
    }
    Ok(())
}

fn cmd_info(input: PathBuf) -> Result<()> {
    let pb = spinner("Reading raster...");
    let raster: footprint_core::Raster<f64> = read_geotiff(&input).context("Failed to read raster")?;
    pb.finish_and_clear();

    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(crs) = raster.crs() {
        println!("CRS: {}", crs);
    }
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run { config, workers, output } => cmd_run(config, workers, output),
        Commands::Validate { config } => cmd_validate(config),
        Commands::Template { config, output } => cmd_template(config, output),
        Commands::Resolve { config } => cmd_resolve(config),
        Commands::Info { input } => cmd_info(input),
    }
}
