use crate::diagnostic::Diagnostic;
use crate::features::FEATURE_NAMES;
use crate::report::MonitorReport;
use anyhow::{anyhow, Context, Result};
use log::info;
use rust_xlsxwriter as xlsx;
use std::fs;
use std::path::{Path, PathBuf};

pub const INFO_SHEET: &str = "INFO";
pub const SUMMARY_SHEET: &str = "SUMMARY";
pub const DETAIL_SHEET: &str = "DETAIL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Green,
    Yellow,
    Red,
}

impl Fill {
    pub fn rgb(self) -> u32 {
        match self {
            Fill::Green => 0xC6EFCE,
            Fill::Yellow => 0xFFEB9C,
            Fill::Red => 0xFFC7CE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberFormat {
    #[default]
    General,
    /// `0.000`
    Decimal3,
    /// `0.00%`
    Percent2,
}

impl NumberFormat {
    /// Spreadsheet number format code, `None` for the general format.
    pub fn code(self) -> Option<&'static str> {
        match self {
            NumberFormat::General => None,
            NumberFormat::Decimal3 => Some("0.000"),
            NumberFormat::Percent2 => Some("0.00%"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub fill: Option<Fill>,
    pub format: NumberFormat,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            fill: None,
            format: NumberFormat::General,
        }
    }

    pub fn number(value: Option<f64>, format: NumberFormat) -> Self {
        Self {
            value: value.map_or(CellValue::Empty, CellValue::Number),
            fill: None,
            format,
        }
    }

    pub fn empty() -> Self {
        Self {
            value: CellValue::Empty,
            fill: None,
            format: NumberFormat::General,
        }
    }

    pub fn with_fill(mut self, fill: Fill) -> Self {
        self.fill = Some(fill);
        self
    }

    /// Text shown for the cell once its number format is applied.
    pub fn render(&self) -> String {
        match &self.value {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => match self.format {
                NumberFormat::General => value.to_string(),
                NumberFormat::Decimal3 => format!("{value:.3}"),
                NumberFormat::Percent2 => format!("{:.2}%", value * 100.0),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub freeze_header: bool,
}

impl Sheet {
    fn new(name: &str, header: &[&str], freeze_header: bool) -> Self {
        Self {
            name: name.to_string(),
            header: header.iter().map(|column| column.to_string()).collect(),
            rows: Vec::new(),
            freeze_header,
        }
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|name| name == column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

/// Score colour bands: green below the first bound, yellow below the second,
/// red otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBands {
    pub green_below: f64,
    pub yellow_below: f64,
}

impl Default for ScoreBands {
    fn default() -> Self {
        Self {
            green_below: 0.10,
            yellow_below: 0.30,
        }
    }
}

pub fn diagnostic_fill(diagnostic: Diagnostic) -> Fill {
    match diagnostic {
        Diagnostic::Normal => Fill::Green,
        Diagnostic::Attention => Fill::Yellow,
        Diagnostic::WeakRegime => Fill::Red,
    }
}

pub fn score_fill(score: f64, bands: ScoreBands) -> Fill {
    if score < bands.green_below {
        Fill::Green
    } else if score < bands.yellow_below {
        Fill::Yellow
    } else {
        Fill::Red
    }
}

/// Context printed on the informational sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    pub benchmark: String,
    pub zscore_window: usize,
    pub attention_threshold: f64,
    pub classifier: String,
}

fn info_sheet(report: &MonitorReport, context: &ReportContext) -> Sheet {
    let period = report
        .period
        .map_or_else(|| "-".to_string(), |date| date.format("%Y-%m").to_string());
    let lines = vec![
        "Asset deterioration monitor - equity portfolio".to_string(),
        String::new(),
        "Defensive monitoring of a fixed list of equities.".to_string(),
        "Flags persistent regimes of below-average performance to support".to_string(),
        "decisions to hold, trim or pause contributions.".to_string(),
        String::new(),
        format!("Reporting period: {period}"),
        String::new(),
        "Method:".to_string(),
        "- Monthly adjusted closing prices".to_string(),
        "- Simple monthly returns".to_string(),
        format!(
            "- Absolute and {}-relative z-scores over {} months",
            context.benchmark, context.zscore_window
        ),
        "- Weak regime = two consecutive months with negative z-score".to_string(),
        format!("- {} score used as an auxiliary signal", context.classifier),
        format!(
            "- Attention when score >= {:.2} without a weak regime",
            context.attention_threshold
        ),
        String::new(),
        "Recommended use:".to_string(),
        "- Monthly review".to_string(),
        "- Not for trading".to_string(),
        "- Produces no automatic recommendations".to_string(),
    ];

    let mut sheet = Sheet::new(INFO_SHEET, &[""], false);
    sheet.rows = lines.into_iter().map(|line| vec![Cell::text(line)]).collect();
    sheet
}

fn summary_sheet(report: &MonitorReport, bands: ScoreBands) -> Sheet {
    let mut sheet = Sheet::new(
        SUMMARY_SHEET,
        &["asset", "diagnostic", "score", "return", "return_6m"],
        true,
    );
    sheet.rows = report
        .rows
        .iter()
        .map(|row| {
            vec![
                Cell::text(row.asset.clone()),
                Cell::text(row.diagnostic.as_str()).with_fill(diagnostic_fill(row.diagnostic)),
                Cell::number(Some(row.score), NumberFormat::Decimal3)
                    .with_fill(score_fill(row.score, bands)),
                Cell::number(Some(row.current_return), NumberFormat::Percent2),
                Cell::number(Some(row.return_6m), NumberFormat::Percent2),
            ]
        })
        .collect();
    sheet
}

fn detail_sheet(report: &MonitorReport) -> Sheet {
    let mut header: Vec<&str> = vec!["asset"];
    header.extend(FEATURE_NAMES.iter());
    header.extend(["label", "score", "diagnostic", "status"]);
    let mut sheet = Sheet::new(DETAIL_SHEET, &header, true);

    let feature_formats = [
        NumberFormat::Percent2,
        NumberFormat::Percent2,
        NumberFormat::Percent2,
        NumberFormat::Percent2,
        NumberFormat::Decimal3,
        NumberFormat::Decimal3,
    ];

    sheet.rows = report
        .details
        .iter()
        .map(|assessment| {
            let mut cells = vec![Cell::text(assessment.asset.clone())];
            cells.extend(
                assessment
                    .features
                    .as_array()
                    .iter()
                    .zip(feature_formats.iter())
                    .map(|(value, format)| Cell::number(*value, *format)),
            );
            cells.push(Cell::number(
                assessment.label.map(f64::from),
                NumberFormat::General,
            ));
            cells.push(Cell::number(assessment.score, NumberFormat::Decimal3));
            cells.push(
                assessment
                    .diagnostic
                    .map_or_else(Cell::empty, |diagnostic| Cell::text(diagnostic.as_str())),
            );
            cells.push(match &assessment.exclusion {
                Some(reason) => Cell::text(format!("excluded: {reason}")),
                None => Cell::text("ok"),
            });
            cells
        })
        .collect();
    sheet
}

/// Lays a report out as the INFO, SUMMARY and DETAIL sheets.
pub fn build_workbook(report: &MonitorReport, context: &ReportContext, bands: ScoreBands) -> Workbook {
    Workbook {
        sheets: vec![
            info_sheet(report, context),
            summary_sheet(report, bands),
            detail_sheet(report),
        ],
    }
}

pub trait ReportSink {
    /// Persists the workbook under `stem` and returns the files written.
    fn write(&self, stem: &str, workbook: &Workbook) -> Result<Vec<PathBuf>>;
}

/// Writes each sheet as `<stem>_<sheet>.csv` with number formats applied.
pub struct CsvWorkbookSink {
    output_dir: PathBuf,
}

impl CsvWorkbookSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    fn write_sheet(&self, path: &Path, sheet: &Sheet) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Unable to create sheet file {}", path.display()))?;
        writer
            .write_record(&sheet.header)
            .with_context(|| format!("Failed to write header of sheet {}", sheet.name))?;
        for row in &sheet.rows {
            writer
                .write_record(row.iter().map(Cell::render))
                .with_context(|| format!("Failed to write row of sheet {}", sheet.name))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush sheet file {}", path.display()))?;
        Ok(())
    }
}

impl ReportSink for CsvWorkbookSink {
    fn write(&self, stem: &str, workbook: &Workbook) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let mut written = Vec::with_capacity(workbook.sheets.len());
        for sheet in &workbook.sheets {
            let path = self
                .output_dir
                .join(format!("{stem}_{}.csv", sheet.name.to_ascii_lowercase()));
            self.write_sheet(&path, sheet)?;
            info!("Wrote sheet {} to {}", sheet.name, path.display());
            written.push(path);
        }
        Ok(written)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Sink writing this format into `output_dir`.
    pub fn sink(self, output_dir: impl AsRef<Path>) -> Box<dyn ReportSink> {
        match self {
            ReportFormat::Xlsx => Box::new(XlsxWorkbookSink::new(output_dir)),
            ReportFormat::Csv => Box::new(CsvWorkbookSink::new(output_dir)),
        }
    }
}

/// Writes the whole workbook to `<stem>.xlsx` with fills, number formats and
/// frozen header rows.
pub struct XlsxWorkbookSink {
    output_dir: PathBuf,
}

impl XlsxWorkbookSink {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    fn cell_format(cell: &Cell) -> Option<xlsx::Format> {
        if cell.fill.is_none() && cell.format.code().is_none() {
            return None;
        }
        let mut format = xlsx::Format::new();
        if let Some(code) = cell.format.code() {
            format = format.set_num_format(code);
        }
        if let Some(fill) = cell.fill {
            format = format
                .set_pattern(xlsx::FormatPattern::Solid)
                .set_background_color(xlsx::Color::RGB(fill.rgb()));
        }
        Some(format)
    }

    fn write_cell(
        worksheet: &mut xlsx::Worksheet,
        row: u32,
        col: u16,
        cell: &Cell,
    ) -> Result<(), xlsx::XlsxError> {
        let format = Self::cell_format(cell);
        match (&cell.value, format.as_ref()) {
            (CellValue::Text(text), Some(format)) => {
                worksheet.write_string_with_format(row, col, text, format)?;
            }
            (CellValue::Text(text), None) => {
                worksheet.write_string(row, col, text)?;
            }
            (CellValue::Number(value), Some(format)) => {
                worksheet.write_number_with_format(row, col, *value, format)?;
            }
            (CellValue::Number(value), None) => {
                worksheet.write_number(row, col, *value)?;
            }
            (CellValue::Empty, Some(format)) => {
                worksheet.write_blank(row, col, format)?;
            }
            (CellValue::Empty, None) => {}
        }
        Ok(())
    }

    fn write_sheet(worksheet: &mut xlsx::Worksheet, sheet: &Sheet) -> Result<(), xlsx::XlsxError> {
        worksheet.set_name(&sheet.name)?;

        let has_header = sheet.header.iter().any(|column| !column.is_empty());
        let first_row: u32 = if has_header {
            let bold = xlsx::Format::new().set_bold();
            for (col, column) in sheet.header.iter().enumerate() {
                worksheet.write_string_with_format(0, col as u16, column, &bold)?;
            }
            if sheet.freeze_header {
                worksheet.set_freeze_panes(1, 0)?;
            }
            1
        } else {
            0
        };

        for (offset, row) in sheet.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                Self::write_cell(worksheet, first_row + offset as u32, col as u16, cell)?;
            }
        }
        Ok(())
    }
}

impl ReportSink for XlsxWorkbookSink {
    fn write(&self, stem: &str, workbook: &Workbook) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let mut document = xlsx::Workbook::new();
        for sheet in &workbook.sheets {
            let worksheet = document.add_worksheet();
            Self::write_sheet(worksheet, sheet)
                .map_err(|err| anyhow!("Failed to lay out sheet {}: {}", sheet.name, err))?;
        }

        let path = self.output_dir.join(format!("{stem}.xlsx"));
        document
            .save(&path)
            .with_context(|| format!("Unable to write workbook {}", path.display()))?;
        info!(
            "Wrote {} sheet(s) to {}",
            workbook.sheets.len(),
            path.display()
        );
        Ok(vec![path])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bands_follow_thresholds() {
        let bands = ScoreBands::default();
        assert_eq!(score_fill(0.0, bands), Fill::Green);
        assert_eq!(score_fill(0.0999, bands), Fill::Green);
        assert_eq!(score_fill(0.10, bands), Fill::Yellow);
        assert_eq!(score_fill(0.2999, bands), Fill::Yellow);
        assert_eq!(score_fill(0.30, bands), Fill::Red);
        assert_eq!(score_fill(0.95, bands), Fill::Red);
    }

    #[test]
    fn diagnostic_colours() {
        assert_eq!(diagnostic_fill(Diagnostic::Normal), Fill::Green);
        assert_eq!(diagnostic_fill(Diagnostic::Attention), Fill::Yellow);
        assert_eq!(diagnostic_fill(Diagnostic::WeakRegime), Fill::Red);
    }

    #[test]
    fn number_formats_map_to_spreadsheet_codes() {
        assert_eq!(NumberFormat::General.code(), None);
        assert_eq!(NumberFormat::Decimal3.code(), Some("0.000"));
        assert_eq!(NumberFormat::Percent2.code(), Some("0.00%"));
        assert_eq!(Fill::Red.rgb(), 0xFFC7CE);
    }

    #[test]
    fn report_format_parses_known_names() {
        assert_eq!(ReportFormat::parse("XLSX"), Some(ReportFormat::Xlsx));
        assert_eq!(ReportFormat::parse(" csv "), Some(ReportFormat::Csv));
        assert_eq!(ReportFormat::parse("ods"), None);
        assert_eq!(ReportFormat::default(), ReportFormat::Xlsx);
    }

    #[test]
    fn xlsx_sink_writes_single_workbook_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut summary = Sheet::new(SUMMARY_SHEET, &["asset", "score"], true);
        summary.rows.push(vec![
            Cell::text("AAA").with_fill(Fill::Yellow),
            Cell::number(Some(0.25), NumberFormat::Decimal3).with_fill(Fill::Yellow),
        ]);
        summary.rows.push(vec![Cell::text("BBB"), Cell::empty().with_fill(Fill::Green)]);
        let mut info_sheet = Sheet::new(INFO_SHEET, &[""], false);
        info_sheet.rows.push(vec![Cell::text("monitor")]);
        let workbook = Workbook {
            sheets: vec![info_sheet, summary],
        };

        let written = ReportFormat::Xlsx
            .sink(dir.path().join("out"))
            .write("monitor_report_2024_05_31", &workbook)
            .unwrap();

        assert_eq!(written, vec![dir.path().join("out").join("monitor_report_2024_05_31.xlsx")]);
        let bytes = fs::read(&written[0]).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn render_applies_number_formats() {
        assert_eq!(Cell::number(Some(0.12345), NumberFormat::Decimal3).render(), "0.123");
        assert_eq!(Cell::number(Some(-0.0321), NumberFormat::Percent2).render(), "-3.21%");
        assert_eq!(Cell::number(None, NumberFormat::Percent2).render(), "");
        assert_eq!(Cell::number(Some(1.0), NumberFormat::General).render(), "1");
    }
}
