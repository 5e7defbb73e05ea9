use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use slo_attainment::{analysis, dataset, report};

#[derive(Parser)]
#[command(name = "slo-attainment")]
#[command(about = "Outcome-attainment statistics over rubric assessment exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one course + SLO slice
    AnalyzeCourse {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        course: String,
        #[arg(long)]
        slo: String,
        /// Write a markdown report here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Emit the analysis as JSON instead of markdown
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Analyze one SLO across all courses
    AnalyzeSlo {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        slo: String,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::AnalyzeCourse {
            csv,
            course,
            slo,
            out,
            json,
        } => {
            let records = dataset::load_csv(&csv)?;
            let rows = dataset::filter_course_slo(&records, &course, &slo);
            if rows.is_empty() {
                println!("No rows for course {course} and {slo}.");
                return Ok(());
            }
            let analysis = analysis::analyze_course(&course, &slo, &rows);
            let output = if json {
                serde_json::to_string_pretty(&analysis).context("failed to encode analysis")?
            } else {
                report::build_course_report(&analysis)
            };
            emit(&output, out.as_deref())?;
        }
        Commands::AnalyzeSlo { csv, slo, out, json } => {
            let records = dataset::load_csv(&csv)?;
            let rows = dataset::filter_slo(&records, &slo);
            if rows.is_empty() {
                println!("No rows for {slo}.");
                return Ok(());
            }
            let analysis = analysis::analyze_slo(&slo, &rows);
            let output = if json {
                serde_json::to_string_pretty(&analysis).context("failed to encode analysis")?
            } else {
                report::build_slo_report(&analysis)
            };
            emit(&output, out.as_deref())?;
        }
    }

    Ok(())
}

fn emit(output: &str, out: Option<&std::path::Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{output}"),
    }
    Ok(())
}
