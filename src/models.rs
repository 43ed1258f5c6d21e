use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// One calendar month of a monthly series. `close` is `None` for a month
/// without a usable price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyClose {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

/// One slot per consecutive calendar month for a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<MonthlyClose>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<MonthlyClose>) -> Self {
        Self {
            symbol: symbol.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Months holding a price.
    pub fn observations(&self) -> usize {
        self.points.iter().filter(|point| point.close.is_some()).count()
    }

    /// Latest month holding a price.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points
            .iter()
            .rev()
            .find(|point| point.close.is_some())
            .map(|point| point.date)
    }
}

/// Simple returns aligned with the months they end on.
///
/// `dates[i]` is the month that closed period `i`; the first month of the
/// source series has no return and therefore no entry here. A period touching
/// a month without a price is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnSeries {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl ReturnSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn position_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }
}
