mod batch;
mod files;
mod parser;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use batch::{BatchConfig, BatchStats, FileReport};
use parser::extract::salvage::ChunkMode;
use parser::RepairOptions;

#[derive(Parser)]
#[command(name = "gpx_mender", about = "Repair and normalize damaged GPX files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair GPX files (or directories of them) into clean GPX 1.1
    Repair {
        /// Input .gpx files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Where repaired files are written
        #[arg(short, long, default_value = "repaired")]
        out_dir: PathBuf,
        /// Skip documents larger than this many bytes
        #[arg(long, default_value_t = batch::DEFAULT_MAX_BYTES)]
        max_bytes: usize,
        /// In salvage mode, drop points re-read from a closing tag
        #[arg(long)]
        dedupe_points: bool,
        /// Write a JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Process without writing repaired files
        #[arg(long)]
        dry_run: bool,
    },
    /// Show what a repair would produce for one file
    Inspect {
        file: PathBuf,
        /// Refuse documents larger than this many bytes
        #[arg(long, default_value_t = batch::DEFAULT_MAX_BYTES)]
        max_bytes: usize,
        #[arg(long)]
        dedupe_points: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Also print the repaired document
        #[arg(long)]
        show: bool,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    dedupe_points: bool,
    stats: &'a BatchStats,
    files: &'a [FileReport],
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Repair {
            paths,
            out_dir,
            max_bytes,
            dedupe_points,
            report,
            dry_run,
        } => {
            let inputs = files::collect_inputs(&paths)?;
            if inputs.is_empty() {
                println!("No .gpx files found.");
                return Ok(());
            }

            let config = BatchConfig {
                out_dir,
                max_bytes,
                dry_run,
                options: options(dedupe_points),
            };
            println!("Repairing {} files...", inputs.len());
            let (reports, stats) = batch::run(&inputs, &config)?;

            for r in &reports {
                print_report_line(r);
            }
            println!(
                "\n{} repaired ({} via salvage), {} failed.",
                stats.repaired, stats.salvaged, stats.failed
            );
            if !dry_run && stats.repaired > 0 {
                println!("Output: {}", config.out_dir.display());
            }

            if let Some(path) = report {
                let run = RunReport {
                    generated_at: Utc::now(),
                    dedupe_points,
                    stats: &stats,
                    files: &reports,
                };
                files::write_report(&path, &run)?;
                println!("Report: {}", path.display());
            }
            Ok(())
        }
        Commands::Inspect {
            file,
            max_bytes,
            dedupe_points,
            json,
            show,
        } => {
            let config = BatchConfig {
                out_dir: PathBuf::new(),
                max_bytes,
                dry_run: true,
                options: options(dedupe_points),
            };
            let (report, repaired) = batch::inspect(&file, &config);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                print_inspect(&report);
            }
            if show {
                if let Some(repaired) = &repaired {
                    println!("\n{}", repaired.document);
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn options(dedupe_points: bool) -> RepairOptions {
    RepairOptions {
        chunk_mode: if dedupe_points {
            ChunkMode::Deduplicate
        } else {
            ChunkMode::Reference
        },
    }
}

fn print_report_line(r: &FileReport) {
    match (&r.output, &r.error) {
        (Some(out), _) => println!(
            "  ok    {} -> {} [{}]",
            r.source,
            out,
            r.mode.unwrap_or("-")
        ),
        (None, Some(err)) => println!("  FAIL  {}: {}", r.source, err),
        (None, None) => println!("  ?     {}", r.source),
    }
}

fn print_inspect(r: &FileReport) {
    println!("Source:    {}", r.source);
    println!("Status:    {}", r.status);
    if let Some(err) = &r.error {
        println!("Error:     {}", err);
        return;
    }
    println!("Name:      {}", r.name.as_deref().unwrap_or("-"));
    println!("Output:    {}", r.output.as_deref().unwrap_or("-"));
    println!("Mode:      {}", r.mode.unwrap_or("-"));
    println!("Waypoints: {}", r.waypoints);
    println!("Routes:    {}", r.routes);
    println!("Tracks:    {}", r.tracks);
    for w in &r.warnings {
        println!("Warning:   {}", w);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
