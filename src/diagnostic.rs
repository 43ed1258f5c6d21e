use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ATTENTION_THRESHOLD: f64 = 0.60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Diagnostic {
    #[serde(rename = "Weak regime", alias = "WeakRegime")]
    WeakRegime,
    Attention,
    Normal,
}

impl Diagnostic {
    /// Fuses the persistence label with the model score.
    ///
    /// A positive label always wins; the score only separates `Attention`
    /// from `Normal`, with the threshold itself counting as `Attention`.
    pub fn classify(label: u8, score: f64, attention_threshold: f64) -> Self {
        if label == 1 {
            Diagnostic::WeakRegime
        } else if score >= attention_threshold {
            Diagnostic::Attention
        } else {
            Diagnostic::Normal
        }
    }

    /// Sort rank, most severe first.
    pub fn severity_rank(self) -> u8 {
        match self {
            Diagnostic::WeakRegime => 0,
            Diagnostic::Attention => 1,
            Diagnostic::Normal => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Diagnostic::WeakRegime => "Weak regime",
            Diagnostic::Attention => "Attention",
            Diagnostic::Normal => "Normal",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(|c: char| c == '_' || c == '-' || c == ' ', "");
        match normalized.as_str() {
            "weakregime" => Some(Diagnostic::WeakRegime),
            "attention" => Some(Diagnostic::Attention),
            "normal" => Some(Diagnostic::Normal),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
