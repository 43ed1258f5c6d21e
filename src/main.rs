use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use regime_monitor::{
    commands::{export_prices, history, report},
    context::AppContext,
    diagnostic::Diagnostic,
    workbook::ReportFormat,
};
use std::path::PathBuf;

const DEFAULT_PRICE_SNAPSHOT_FILE: &str = "data/monthly-prices.bin";

#[derive(Parser)]
#[command(name = "regime-monitor")]
#[command(about = "Monthly weak-regime monitor for a fixed equity portfolio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every asset for the latest month and write the report and history
    Report {
        /// Price snapshot to use instead of downloading prices
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Directory for report sheets and the history file
        #[arg(long = "output-dir", value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Directory holding the scaler and classifier artifacts
        #[arg(long = "model-dir", value_name = "DIR")]
        model_dir: Option<PathBuf>,
        /// Report format: xlsx (default) or csv
        #[arg(long, value_name = "FORMAT", value_parser = parse_report_format)]
        format: Option<ReportFormat>,
    },
    /// Download prices and save a monthly snapshot for offline runs
    ExportPrices {
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Print the recorded monitoring history
    History {
        /// Only show rows for this asset
        #[arg(long)]
        asset: Option<String>,
        /// Only show rows with this diagnostic (weak-regime, attention, normal)
        #[arg(long, value_parser = parse_diagnostic)]
        diagnostic: Option<Diagnostic>,
        /// Directory holding the history file
        #[arg(long = "output-dir", value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

fn parse_report_format(raw: &str) -> Result<ReportFormat, String> {
    ReportFormat::parse(raw).ok_or_else(|| format!("unknown report format '{raw}' (expected xlsx or csv)"))
}

fn parse_diagnostic(raw: &str) -> Result<Diagnostic, String> {
    Diagnostic::parse(raw).ok_or_else(|| format!("unknown diagnostic '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command } = Cli::parse();

    let mut app_context = AppContext::initialize()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting regime monitor. Defensive monitoring only, not investment advice.");

    match command {
        Commands::Report {
            data_file,
            output_dir,
            model_dir,
            format,
        } => {
            if let Some(dir) = output_dir {
                app_context.settings_mut().output_dir = dir;
            }
            if let Some(dir) = model_dir {
                app_context.settings_mut().model_dir = dir;
            }
            if let Some(format) = format {
                app_context.settings_mut().report_format = format;
            }
            let written = report::run(&app_context, data_file.as_deref()).await?;
            info!("Report complete: {} file(s) written", written.len());
        }
        Commands::ExportPrices { output } => {
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_PRICE_SNAPSHOT_FILE));
            export_prices::run(&app_context, &output_path).await?;
        }
        Commands::History {
            asset,
            diagnostic,
            output_dir,
        } => {
            if let Some(dir) = output_dir {
                app_context.settings_mut().output_dir = dir;
            }
            history::run(&app_context, asset.as_deref(), diagnostic)?;
        }
    }

    Ok(())
}
