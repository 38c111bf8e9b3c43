// Delivery Calendar - Core Library
// Exposes all modules for use in the CLI, the web server, and tests

pub mod rules;
pub mod table;
pub mod loader;
pub mod layout;
pub mod render;
pub mod config;
pub mod session;

// Re-export commonly used types
pub use rules::{
    LabelNormalizer, RewriteRule, RuleError,
    default_rules, is_phase_marker,
};
pub use table::{
    CellValue, Table, TableReader, CsvTableReader, ExcelTableReader,
    read_table, reader_for,
};
pub use loader::{
    DeliveryRecord, DataSource, ColumnMap, RecordLoader, LoadReport, LoadError,
    parse_date,
};
pub use layout::{
    LayoutConfig, MonthLayout, WeekRow, CalendarCell, LayoutError,
    compute_layout, month_grid,
};
pub use render::{
    Canvas, Shape, TextRole, Palette, Renderer, RenderOptions, RenderError,
};
pub use config::{Config, SourceConfig};
pub use session::{AuthGate, Credentials, Session, SessionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Layout and draw one month of records
pub fn render_month(
    records: &[DeliveryRecord],
    year: i32,
    month: u32,
    layout: &LayoutConfig,
    renderer: &Renderer,
) -> Result<Canvas, LayoutError> {
    let layout = compute_layout(records, year, month, layout)?;
    Ok(renderer.render(&layout))
}
