use crate::context::AppContext;
use anyhow::Result;
use log::info;
use std::path::Path;

pub async fn run(app: &AppContext, output_path: &Path) -> Result<()> {
    info!("Generating price snapshot at {}", output_path.display());

    let market_data = app.market_data(None).await?;
    market_data.save_to_file(output_path)?;
    info!(
        "Price snapshot with {} asset(s) successfully written to {}",
        market_data.assets.len(),
        output_path.display()
    );

    Ok(())
}
