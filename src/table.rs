// 📄 Table Readers
// Named-column tables read from CSV exports or spreadsheet workbooks

use crate::loader::LoadError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One cell value as read from a source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// True for empty cells and whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => write!(f, "{}", text),
            // Whole numbers read from workbooks come back as floats ("2.0")
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Header names plus rows of cells, addressed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Build a table; header names are trimmed
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Table {
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by (trimmed) name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (row, column); short rows read as empty
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }
}

// ============================================================================
// READER TRAIT
// ============================================================================

/// TableReader - reads a whole source table from disk
pub trait TableReader {
    /// Read the table at `path`.
    ///
    /// Fails with `LoadError::SourceUnavailable` when the file cannot be
    /// opened or decoded at all.
    fn read_table(&self, path: &Path) -> Result<Table, LoadError>;
}

/// Pick a reader from the file extension
///
/// # Examples:
/// ```text
/// reader_for("log.csv")  → CsvTableReader
/// reader_for("log.xlsx") → ExcelTableReader (first sheet)
/// ```
pub fn reader_for(path: &Path, sheet: Option<&str>) -> Result<Box<dyn TableReader>, LoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => Ok(Box::new(CsvTableReader::new())),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
            Ok(Box::new(ExcelTableReader::new(sheet.map(str::to_string))))
        }
        _ => Err(LoadError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Read a table, choosing the reader from the extension
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<Table, LoadError> {
    reader_for(path, sheet)?.read_table(path)
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvTableReader;

impl CsvTableReader {
    pub fn new() -> Self {
        CsvTableReader
    }

    /// Parse CSV text from any reader. Fields that are not valid UTF-8
    /// (e.g. Latin-1 exports) are decoded lossily instead of failing the table.
    pub fn parse<R: std::io::Read>(&self, reader: R) -> Result<Table, csv::Error> {
        use csv::ReaderBuilder;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();

        let mut rows = Vec::new();
        for result in reader.byte_records() {
            let record = result?;
            let cells = record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(String::from_utf8_lossy(field).into_owned())
                    }
                })
                .collect();
            rows.push(cells);
        }

        Ok(Table::new(headers, rows))
    }
}

impl Default for CsvTableReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TableReader for CsvTableReader {
    fn read_table(&self, path: &Path) -> Result<Table, LoadError> {
        let file = std::fs::File::open(path).map_err(|e| LoadError::unavailable(path, e))?;
        self.parse(file)
            .map_err(|e| LoadError::unavailable(path, e))
    }
}

// ============================================================================
// SPREADSHEETS
// ============================================================================

/// Workbook reader (xlsx, xls, xlsb, ods) via calamine
pub struct ExcelTableReader {
    sheet: Option<String>,
}

impl ExcelTableReader {
    /// `sheet = None` reads the first worksheet
    pub fn new(sheet: Option<String>) -> Self {
        ExcelTableReader { sheet }
    }

    fn convert(cell: &calamine::Data) -> CellValue {
        use calamine::Data;

        match cell {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(s) if s.is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => dt
                .as_datetime()
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Number(dt.as_f64())),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        }
    }
}

impl TableReader for ExcelTableReader {
    fn read_table(&self, path: &Path) -> Result<Table, LoadError> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::unavailable(path, e))?;

        let sheet = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| LoadError::unavailable(path, "workbook has no sheets"))?,
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| LoadError::unavailable(path, e))?;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(Self::convert).collect::<Vec<_>>())
            .skip_while(|cells| cells.iter().all(CellValue::is_blank));

        let headers = match rows.next() {
            Some(cells) => cells.iter().map(|c| c.to_string()).collect(),
            None => return Ok(Table::default()),
        };

        Ok(Table::new(headers, rows.collect()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_headers_are_trimmed() {
        let data = " OFCI Equipment Category ,Unit Tag  ,Vendor On Site Delivery Date\n\
                    MV SWITCHGEAR,1.3A,2025-03-04\n";
        let table = CsvTableReader::new().parse(data.as_bytes()).unwrap();

        assert_eq!(table.column_index("OFCI Equipment Category"), Some(0));
        assert_eq!(table.column_index("Unit Tag"), Some(1));
        assert_eq!(table.column_index(" Vendor On Site Delivery Date "), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_csv_empty_fields_and_short_rows() {
        let data = "a,b,c\nx,,z\nonly\n";
        let table = CsvTableReader::new().parse(data.as_bytes()).unwrap();

        assert_eq!(table.cell(0, 0), &CellValue::Text("x".to_string()));
        assert_eq!(table.cell(0, 1), &CellValue::Empty);
        assert_eq!(table.cell(1, 2), &CellValue::Empty);
        assert_eq!(table.cell(9, 0), &CellValue::Empty);
    }

    #[test]
    fn test_csv_latin1_row_does_not_fail_table() {
        let data: &[u8] = b"Category,Unit Tag,Date\n\
                            MARS,R1,2025-03-04\n\
                            Caf\xe9 PANELS,P1,2025-03-05\n\
                            MARS,R2,2025-03-06\n";
        let table = CsvTableReader::new().parse(data).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.cell(0, 1), &CellValue::Text("R1".to_string()));
        assert_eq!(table.cell(1, 0), &CellValue::Text("Caf\u{FFFD} PANELS".to_string()));
        assert_eq!(table.cell(2, 1), &CellValue::Text("R2".to_string()));
    }

    #[test]
    fn test_blank_cells() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::Text("   ".to_string()).is_blank());
        assert!(!CellValue::Text("A".to_string()).is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_display_whole_numbers_without_fraction() {
        assert_eq!(CellValue::Number(2.0).to_string(), "2");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn test_reader_for_extension() {
        assert!(reader_for(Path::new("log.CSV"), None).is_ok());
        assert!(reader_for(Path::new("log.xlsx"), Some("Log")).is_ok());
        assert!(matches!(
            reader_for(Path::new("log.pdf"), None),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let result = read_table(Path::new("/nonexistent/delivery-log.csv"), None);
        assert!(matches!(result, Err(LoadError::SourceUnavailable { .. })));
    }
}
