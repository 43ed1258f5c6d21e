use crate::context::AppContext;
use crate::diagnostic::Diagnostic;
use crate::history::{HistoryLedger, HISTORY_FILE};
use anyhow::Result;
use log::{info, warn};

pub fn run(app: &AppContext, asset: Option<&str>, diagnostic: Option<Diagnostic>) -> Result<()> {
    let path = app.settings().output_dir.join(HISTORY_FILE);
    let ledger = HistoryLedger::load(&path)?;
    if ledger.is_empty() {
        warn!("No monitoring history at {}", path.display());
        return Ok(());
    }

    let asset = asset.map(str::to_uppercase);
    let rows: Vec<_> = match asset.as_deref() {
        Some(symbol) => ledger.rows_for_asset(symbol).collect(),
        None => ledger.rows().collect(),
    };
    let rows: Vec<_> = rows
        .into_iter()
        .filter(|row| diagnostic.map_or(true, |wanted| row.diagnostic == wanted))
        .collect();
    info!(
        "{} history row(s){}",
        rows.len(),
        asset
            .as_deref()
            .map_or_else(String::new, |symbol| format!(" for {symbol}"))
    );

    println!(
        "{:<10} {:<12} {:>7} {:>5}  {}",
        "period", "asset", "score", "label", "diagnostic"
    );
    for row in rows {
        println!(
            "{:<10} {:<12} {:>7.3} {:>5}  {}",
            row.period.format("%Y-%m"),
            row.asset,
            row.score,
            row.label,
            row.diagnostic
        );
    }

    Ok(())
}
