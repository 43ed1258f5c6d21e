use crate::classifier::ScoringModel;
use crate::config::{MonitorSettings, SETTING_KEYS};
use crate::prices::MarketData;
use crate::yahoo::YahooClient;
use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::env;
use std::path::Path;

pub struct AppContext {
    settings: MonitorSettings,
}

impl AppContext {
    /// Reads `.env` (when present) and the process environment into settings.
    pub fn initialize() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(err).context("Failed to read .env file"),
        }

        let settings_map: HashMap<String, String> = SETTING_KEYS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self::from_settings_map(&settings_map)
    }

    pub fn from_settings_map(settings_map: &HashMap<String, String>) -> Result<Self> {
        let settings = MonitorSettings::from_settings_map(settings_map)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut MonitorSettings {
        &mut self.settings
    }

    pub fn yahoo_client(&self) -> Result<YahooClient> {
        YahooClient::new(self.settings.yahoo_chart_url.clone())
    }

    pub fn load_model(&self) -> Result<ScoringModel> {
        let model = ScoringModel::load(&self.settings.model_dir, self.settings.classifier)
            .with_context(|| {
                format!(
                    "Failed to load {} model from {}",
                    self.settings.classifier.label(),
                    self.settings.model_dir.display()
                )
            })?;
        Ok(model)
    }

    /// Monthly prices for the configured universe, from a snapshot file when
    /// one is given and from the chart API otherwise.
    pub async fn market_data(&self, data_file: Option<&Path>) -> Result<MarketData> {
        match data_file {
            Some(path) => {
                let market_data = MarketData::load_from_file(path)?;
                info!(
                    "Loaded {} asset series (benchmark {}) from {}",
                    market_data.assets.len(),
                    market_data.benchmark.symbol,
                    path.display()
                );
                market_data.restrict_to(&self.settings.assets)
            }
            None => {
                let client = self.yahoo_client()?;
                crate::yahoo::fetch_market_data(&client, &self.settings).await
            }
        }
    }
}
