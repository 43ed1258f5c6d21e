pub mod export_prices;
pub mod history;
pub mod report;
