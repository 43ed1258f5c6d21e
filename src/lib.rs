pub mod classifier;
pub mod commands;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod features;
pub mod history;
pub mod indicators;
pub mod lightgbm;
pub mod models;
pub mod monitor;
pub mod prices;
pub mod regime;
pub mod report;
pub(crate) mod retry;
pub mod workbook;
pub mod yahoo;
