mod analyzer;
mod error;
mod loader;
mod models;
mod records;
mod scaling;

use analyzer::AtarEstimator;
use anyhow::{Context, Result};
use clap::{Arg, Command};
use loader::TableLoader;
use models::{Config, ReportRow};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "config.toml";
const REPORT_FILE: &str = "atar_estimates.csv";

const REPORT_HEADERS: [&str; 8] = [
    "Student_Id",
    "Full_Name",
    "ATAR_Prediction",
    "Predicted_Range",
    "Major1",
    "Major2",
    "Major3",
    "Minor",
];

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("atar-estimator")
        .version("1.0")
        .about("Estimates ATARs from a school's academic record export")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Report file path (defaults to <output_directory>/atar_estimates.csv)"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration from {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!(
            "⚠️  Please review the data source and input file names in {}, \
             then run the program again.",
            config_file
        );
        return Ok(());
    };

    let output_path = match matches.get_one::<String>("output") {
        Some(path) => PathBuf::from(path),
        None => Path::new(config.output_directory.as_deref().unwrap_or("output")).join(REPORT_FILE),
    };

    // Load the four input tables
    let loader = TableLoader::new();
    let files = &config.input_files;

    println!("📂 Reading input tables...");
    let academic_records = loader
        .load("ACS export", &config.source_for(&files.acs_export)?)
        .await?;
    let past_params = loader
        .load("past parameters", &config.source_for(&files.past_params)?)
        .await?;
    let scaling_groups = loader
        .load("scaling groups", &config.source_for(&files.scaling_groups)?)
        .await?;
    let atar_bounds = loader
        .load("ATAR bounds", &config.source_for(&files.atar_bounds)?)
        .await?;

    if academic_records.is_empty() {
        println!("⚠️  The ACS export contains no unit rows");
    }

    println!("🎯 Estimating ATARs for {} unit rows...", academic_records.len());
    let rows = match AtarEstimator::new(&config).produce_report(
        &academic_records,
        &past_params,
        &scaling_groups,
        &atar_bounds,
    ) {
        Ok(rows) => rows,
        Err(err) => {
            if err.is_format_error() {
                println!("❌ An input file is missing columns or has malformed values");
            } else if err.is_lookup_error() {
                println!(
                    "❌ The scaling groups or ATAR bounds do not cover every course and score"
                );
            }
            println!("   No report was written.");
            return Err(anyhow::Error::new(err).context("Failed to produce ATAR estimates"));
        }
    };

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(&output_path)
        .with_context(|| format!("Failed to create report file: {}", output_path.display()))?;
    write_report(&rows, file)?;

    print_summary(&rows);

    println!("\n✅ Estimation complete!");
    println!("📄 Report written to: {}", output_path.display());
    Ok(())
}

fn write_report<W: std::io::Write>(rows: &[ReportRow], output: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(REPORT_HEADERS)?;

    for row in rows {
        let rank = row.predicted_rank.to_string();
        writer.write_record([
            row.student_id.as_str(),
            row.full_name.as_str(),
            rank.as_str(),
            row.predicted_range.as_str(),
            row.major1.as_str(),
            row.major2.as_str(),
            row.major3.as_str(),
            row.minor.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn print_summary(rows: &[ReportRow]) {
    println!("\n📊 SUMMARY");
    println!("==========\n");

    if rows.is_empty() {
        println!("❓ No students with three or more major courses were found");
        return;
    }

    let ranks: Vec<u32> = rows.iter().map(|row| row.predicted_rank).collect();
    let lowest = ranks.iter().min().copied().unwrap_or_default();
    let highest = ranks.iter().max().copied().unwrap_or_default();
    let mean = ranks.iter().map(|&rank| f64::from(rank)).sum::<f64>() / ranks.len() as f64;

    println!("🎓 Students estimated: {}", rows.len());
    println!("📈 Predicted ATARs: lowest {}, highest {}, mean {:.1}", lowest, highest, mean);
}
