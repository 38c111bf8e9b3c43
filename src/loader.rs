// 🏗️ Record Loader
// Source tables → cleaned, labelled, source-tagged delivery records

use crate::rules::{is_phase_marker, LabelNormalizer};
use crate::table::{read_table, CellValue, Table};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Unit tag meaning "the whole site", shown as no unit at all
pub const ALL_UNITS: &str = "ALL UNITS";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LoadError {
    /// The table could not be read at all (missing file, corrupt workbook)
    #[error("source {path} is unavailable: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("source '{dataset}' has no column named '{column}'")]
    MissingColumn { dataset: String, column: String },
}

impl LoadError {
    pub fn unavailable(path: &Path, reason: impl fmt::Display) -> Self {
        LoadError::SourceUnavailable {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// CORE TYPES
// ============================================================================

/// DeliveryRecord - one normalized delivery event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub category: String,
    pub unit_tag: String,
    pub date: NaiveDate,
    pub label: String,
    pub source: String,
}

/// Names of the three required columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub category: String,
    pub unit_tag: String,
    pub date: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            category: "OFCI Equipment Category".to_string(),
            unit_tag: "Unit Tag".to_string(),
            date: "Vendor On Site Delivery Date".to_string(),
        }
    }
}

/// One delivery log on disk and the label its records are tagged with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub label: String,
    pub path: PathBuf,
    /// Worksheet to read; first sheet when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl DataSource {
    pub fn new(label: &str, path: impl Into<PathBuf>) -> Self {
        DataSource {
            label: label.to_string(),
            path: path.into(),
            sheet: None,
        }
    }
}

/// What happened to the rows of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub kept: usize,
    pub missing_field: usize,
    pub empty_label: usize,
    pub phase_marker: usize,
    pub bad_date: usize,
}

impl LoadReport {
    pub fn dropped(&self) -> usize {
        self.missing_field + self.empty_label + self.phase_marker + self.bad_date
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} rows kept ({} missing fields, {} empty labels, {} phase markers, {} bad dates)",
            self.kept,
            self.rows_read,
            self.missing_field,
            self.empty_label,
            self.phase_marker,
            self.bad_date
        )
    }
}

// ============================================================================
// LOADER
// ============================================================================

pub struct RecordLoader {
    columns: ColumnMap,
    normalizer: LabelNormalizer,
}

impl RecordLoader {
    /// Loader with the default column names and label rules
    pub fn new() -> Self {
        RecordLoader {
            columns: ColumnMap::default(),
            normalizer: LabelNormalizer::new(),
        }
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_normalizer(mut self, normalizer: LabelNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn normalizer(&self) -> &LabelNormalizer {
        &self.normalizer
    }

    /// Turn one table into delivery records tagged with `source`.
    ///
    /// Bad rows are dropped silently; only a missing required column fails.
    pub fn load(&self, table: &Table, source: &str) -> Result<Vec<DeliveryRecord>, LoadError> {
        self.load_with_report(table, source).map(|(records, _)| records)
    }

    /// Same as [`load`](Self::load), plus per-reason drop counts
    pub fn load_with_report(
        &self,
        table: &Table,
        source: &str,
    ) -> Result<(Vec<DeliveryRecord>, LoadReport), LoadError> {
        let column = |name: &str| {
            table.column_index(name).ok_or_else(|| LoadError::MissingColumn {
                dataset: source.to_string(),
                column: name.trim().to_string(),
            })
        };
        let category_col = column(&self.columns.category)?;
        let unit_col = column(&self.columns.unit_tag)?;
        let date_col = column(&self.columns.date)?;

        let mut report = LoadReport {
            rows_read: table.len(),
            ..LoadReport::default()
        };
        let mut records = Vec::new();

        for row in 0..table.len() {
            let category = table.cell(row, category_col);
            let unit = table.cell(row, unit_col);
            let date = table.cell(row, date_col);

            if category.is_blank() || unit.is_blank() || date.is_blank() {
                report.missing_field += 1;
                continue;
            }

            let category = category.to_string();
            let mut unit_tag = unit.to_string();
            if unit_tag == ALL_UNITS {
                unit_tag.clear();
            }

            let label = self.normalizer.normalize(&category, &unit_tag);
            if label.is_empty() {
                report.empty_label += 1;
                continue;
            }
            if is_phase_marker(&label) {
                report.phase_marker += 1;
                continue;
            }

            let Some(date) = parse_date(date) else {
                report.bad_date += 1;
                continue;
            };

            records.push(DeliveryRecord {
                category,
                unit_tag,
                date,
                label,
                source: source.to_string(),
            });
        }

        report.kept = records.len();
        debug!(source, "{}", report.summary());

        Ok((records, report))
    }

    /// Read and load one source from disk
    pub fn load_source(&self, source: &DataSource) -> Result<Vec<DeliveryRecord>, LoadError> {
        let table = read_table(&source.path, source.sheet.as_deref())?;
        let (records, report) = self.load_with_report(&table, &source.label)?;

        info!(
            source = %source.label,
            path = %source.path.display(),
            kept = report.kept,
            dropped = report.dropped(),
            "loaded delivery log"
        );

        Ok(records)
    }

    /// Load every source in order and concatenate; no deduplication
    pub fn load_all(&self, sources: &[DataSource]) -> Result<Vec<DeliveryRecord>, LoadError> {
        let mut all = Vec::new();
        for source in sources {
            all.extend(self.load_source(source)?);
        }
        Ok(all)
    }
}

impl Default for RecordLoader {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DATE PARSING
// ============================================================================

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Calendar date of a cell; time of day is discarded.
///
/// Text is tried against the known export formats. Bare numbers are not
/// treated as dates.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Text(text) => parse_date_text(text.trim()),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn table(rows: Vec<[CellValue; 3]>) -> Table {
        Table::new(
            vec![
                "OFCI Equipment Category ".to_string(),
                " Unit Tag".to_string(),
                "Vendor On Site Delivery Date".to_string(),
            ],
            rows.into_iter().map(|r| r.to_vec()).collect(),
        )
    }

    #[test]
    fn test_load_basic_row() {
        let t = table(vec![[text("MV SWITCHGEAR"), text("1.3A"), text("2025-03-04")]]);
        let records = RecordLoader::new().load(&t, "CMH116").unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "MV SWGR 1.3A");
        assert_eq!(records[0].source, "CMH116");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
    }

    #[test]
    fn test_all_units_collapses_to_empty() {
        let t = table(vec![[text("STANDBY GENERATOR"), text("ALL UNITS"), text("2025-03-04")]]);
        let records = RecordLoader::new().load(&t, "CMH120").unwrap();

        assert_eq!(records[0].unit_tag, "");
        assert_eq!(records[0].label, "STANDBY");
    }

    #[test]
    fn test_missing_fields_dropped() {
        let t = table(vec![
            [text("SWITCHGEAR"), text("A"), text("2025-03-01")],
            [CellValue::Empty, text("A"), text("2025-03-01")],
            [text("SWITCHGEAR"), text("  "), text("2025-03-01")],
            [text("SWITCHGEAR"), text("B"), CellValue::Empty],
            [text("MARS"), text("R1"), text("2025-03-02")],
        ]);
        let (records, report) = RecordLoader::new().load_with_report(&t, "CMH116").unwrap();

        assert_eq!(records.len(), 5 - 3);
        assert_eq!(report.missing_field, 3);
        assert_eq!(report.kept, 2);
    }

    #[test]
    fn test_phase_markers_dropped_but_not_phase_with_suffix() {
        let t = table(vec![
            [text("Phase"), text("3"), text("2025-03-01")],
            [text("PHASE"), text("3A"), text("2025-03-01")],
        ]);
        let (records, report) = RecordLoader::new().load_with_report(&t, "CMH116").unwrap();

        assert_eq!(report.phase_marker, 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "PHASE 3A");
    }

    #[test]
    fn test_bad_dates_dropped() {
        let t = table(vec![
            [text("SWITCHGEAR"), text("A"), text("TBD")],
            [text("SWITCHGEAR"), text("A"), CellValue::Number(45000.0)],
            [text("SWITCHGEAR"), text("A"), text("3/7/2025")],
        ]);
        let (records, report) = RecordLoader::new().load_with_report(&t, "CMH116").unwrap();

        assert_eq!(report.bad_date, 2);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
    }

    #[test]
    fn test_fully_deleted_label_dropped() {
        let t = table(vec![[text("GENERATOR"), text("ALL UNITS"), text("2025-03-04")]]);
        let (records, report) = RecordLoader::new().load_with_report(&t, "CMH116").unwrap();

        assert!(records.is_empty());
        assert_eq!(report.empty_label, 1);
    }

    #[test]
    fn test_numeric_unit_tag_is_stringified() {
        let t = table(vec![[text("TRANSFORMER"), CellValue::Number(2.0), text("2025-03-04")]]);
        let records = RecordLoader::new().load(&t, "CMH116").unwrap();
        assert_eq!(records[0].label, "2");
    }

    #[test]
    fn test_missing_column_is_error() {
        let t = Table::new(vec!["Category".to_string()], vec![]);
        let result = RecordLoader::new().load(&t, "CMH116");

        assert!(matches!(
            result,
            Err(LoadError::MissingColumn { column, .. }) if column == "OFCI Equipment Category"
        ));
    }

    #[test]
    fn test_custom_columns() {
        let t = Table::new(
            vec!["Equipment".to_string(), "Unit".to_string(), "Delivered".to_string()],
            vec![vec![text("PANELS LV LV"), text("4"), text("2025-03-04")]],
        );
        let loader = RecordLoader::new().with_columns(ColumnMap {
            category: "Equipment".to_string(),
            unit_tag: "Unit".to_string(),
            date: "Delivered".to_string(),
        });

        let records = loader.load(&t, "CMH116").unwrap();
        assert_eq!(records[0].label, "LV 4");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 4);

        assert_eq!(parse_date(&text("2025-03-04")), expected);
        assert_eq!(parse_date(&text("2025-03-04 00:00:00")), expected);
        assert_eq!(parse_date(&text("2025-03-04T13:45:00")), expected);
        assert_eq!(parse_date(&text("03/04/2025")), expected);
        assert_eq!(parse_date(&text("3/4/25")), expected);
        assert_eq!(parse_date(&text("04-Mar-2025")), expected);
        assert_eq!(parse_date(&text("2025-03-04T08:00:00-05:00")), expected);
        assert_eq!(
            parse_date(&CellValue::DateTime(
                expected.unwrap().and_hms_opt(15, 30, 0).unwrap()
            )),
            expected
        );
        assert_eq!(parse_date(&text("not a date")), None);
        assert_eq!(parse_date(&CellValue::Bool(true)), None);
    }
}
