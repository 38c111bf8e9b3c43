// 📐 Layout Engine
// Month grid geometry: row heights sized to the busiest day in each week
//
// Coordinates are in calendar units: one unit per weekday column on x,
// y grows upward and the first week row starts just below y = 0.

use crate::loader::DeliveryRecord;
use chrono::{Datelike, Month, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Space under the last stacked label of a row
pub const ROW_MARGIN: f64 = 0.1;
/// Gap between the header block and the first row
pub const ROW_GAP: f64 = 0.02;
/// Weekday names sit this far above the first row
pub const WEEKDAY_GAP: f64 = 0.05;
/// Extra space between the weekday names and the legend
pub const LEGEND_GAP: f64 = 0.06;
/// Room reserved for the title text itself
pub const TITLE_HEIGHT: f64 = 0.2;
/// Space below the last row
pub const BOTTOM_MARGIN: f64 = 0.3;

pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("{year}-{month:02} is not a valid calendar month")]
    InvalidMonth { year: i32, month: u32 },
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Spacing constants; purely visual, they never change which records appear
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Height of a week row with at most one event per day
    pub default_row_height: f64,
    /// Vertical distance between stacked labels
    pub line_height: f64,
    /// Distance from a cell's top edge to its first label
    pub date_padding: f64,
    /// Space between weekday names and the legend
    pub weekday_padding: f64,
    /// Space between the legend and the title
    pub title_padding: f64,
    pub first_weekday: Weekday,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            default_row_height: 1.0,
            line_height: 0.15,
            date_padding: 0.12,
            weekday_padding: 0.12,
            title_padding: 0.25,
            first_weekday: Weekday::Sun,
        }
    }
}

impl LayoutConfig {
    /// Row height needed to stack `events` labels in one cell
    pub fn row_height(&self, events: usize) -> f64 {
        let stacked = events.saturating_sub(1) as f64 * self.line_height;
        self.default_row_height
            .max(self.date_padding + stacked + ROW_MARGIN)
    }
}

// ============================================================================
// LAYOUT TYPES
// ============================================================================

/// One slot of the month grid
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCell<'a> {
    pub column: usize,
    /// Day of month; `None` for padding slots outside the month
    pub day: Option<u32>,
    pub date: Option<NaiveDate>,
    /// Records on this day, in input order
    pub records: Vec<&'a DeliveryRecord>,
    pub top: f64,
    pub height: f64,
    /// y of each record's label, same order as `records`
    pub label_offsets: Vec<f64>,
}

impl CalendarCell<'_> {
    pub fn is_present(&self) -> bool {
        self.day.is_some()
    }

    pub fn event_count(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekRow<'a> {
    pub top: f64,
    pub height: f64,
    /// Most events on any single day of this week
    pub week_max: usize,
    pub cells: Vec<CalendarCell<'a>>,
}

impl WeekRow<'_> {
    pub fn bottom(&self) -> f64 {
        self.top - self.height
    }
}

/// Geometry for one calendar page
#[derive(Debug, Clone, PartialEq)]
pub struct MonthLayout<'a> {
    pub year: i32,
    pub month: u32,
    pub first_weekday: Weekday,
    pub weeks: Vec<WeekRow<'a>>,
    pub title_y: f64,
    pub weekday_y: f64,
    pub legend_y: f64,
    /// Lowest y of the page
    pub bottom: f64,
    /// Highest y of the page
    pub top: f64,
}

impl<'a> MonthLayout<'a> {
    /// Month name and year, e.g. "March 2025"
    pub fn title(&self) -> String {
        let name = u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("");
        format!("{} {}", name, self.year)
    }

    /// Short weekday names in column order
    pub fn weekday_names(&self) -> Vec<&'static str> {
        let mut day = self.first_weekday;
        (0..DAYS_PER_WEEK)
            .map(|_| {
                let name = weekday_short_name(day);
                day = day.succ();
                name
            })
            .collect()
    }

    pub fn cells(&self) -> impl Iterator<Item = &CalendarCell<'a>> {
        self.weeks.iter().flat_map(|week| week.cells.iter())
    }

    /// Cell holding a given date, if it is in this month
    pub fn cell_for(&self, date: NaiveDate) -> Option<&CalendarCell<'a>> {
        self.cells().find(|cell| cell.date == Some(date))
    }

    /// Number of records per day of the month
    pub fn count_per_day(&self) -> HashMap<u32, usize> {
        self.cells()
            .filter_map(|cell| cell.day.map(|day| (day, cell.event_count())))
            .collect()
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

fn weekday_short_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

// ============================================================================
// MONTH GRID
// ============================================================================

/// Rows of seven day slots; `None` outside the month.
///
/// Only weeks that contain at least one day of the month are produced.
pub fn month_grid(
    year: i32,
    month: u32,
    first_weekday: Weekday,
) -> Result<Vec<[Option<u32>; DAYS_PER_WEEK]>, LayoutError> {
    let invalid = || LayoutError::InvalidMonth { year, month };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let days = days_in_month(first).ok_or_else(invalid)?;

    let lead = (first.weekday().num_days_from_monday() + 7
        - first_weekday.num_days_from_monday())
        % 7;

    let mut weeks = Vec::new();
    let mut week = [None; DAYS_PER_WEEK];
    let mut slot = lead as usize;

    for day in 1..=days {
        week[slot] = Some(day);
        slot += 1;
        if slot == DAYS_PER_WEEK {
            weeks.push(week);
            week = [None; DAYS_PER_WEEK];
            slot = 0;
        }
    }
    if slot > 0 {
        weeks.push(week);
    }

    Ok(weeks)
}

fn days_in_month(first: NaiveDate) -> Option<u32> {
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
    };
    Some(next.signed_duration_since(first).num_days() as u32)
}

// ============================================================================
// LAYOUT
// ============================================================================

/// Compute the page geometry for (year, month).
///
/// Each week row is tall enough to stack the busiest day's labels; rows
/// with at most one event stay at `default_row_height`. Rows are packed
/// top to bottom, so sparse weeks take no more room than they need.
pub fn compute_layout<'a>(
    records: &'a [DeliveryRecord],
    year: i32,
    month: u32,
    config: &LayoutConfig,
) -> Result<MonthLayout<'a>, LayoutError> {
    let grid = month_grid(year, month, config.first_weekday)?;

    let mut by_date: HashMap<NaiveDate, Vec<&'a DeliveryRecord>> = HashMap::new();
    for record in records {
        if record.date.year() == year && record.date.month() == month {
            by_date.entry(record.date).or_default().push(record);
        }
    }

    let mut weeks = Vec::with_capacity(grid.len());
    let mut cumulative = 0.0;

    for slots in &grid {
        let mut cells: Vec<CalendarCell<'a>> = slots
            .iter()
            .enumerate()
            .map(|(column, day)| {
                let date = day.and_then(|d| NaiveDate::from_ymd_opt(year, month, d));
                let records = date
                    .and_then(|d| by_date.get(&d).cloned())
                    .unwrap_or_default();
                CalendarCell {
                    column,
                    day: *day,
                    date,
                    records,
                    top: 0.0,
                    height: 0.0,
                    label_offsets: Vec::new(),
                }
            })
            .collect();

        let week_max = cells.iter().map(|c| c.event_count()).max().unwrap_or(0);
        let height = config.row_height(week_max);
        let top = -(cumulative + ROW_GAP);
        cumulative += height;

        for cell in &mut cells {
            cell.top = top;
            cell.height = height;
            cell.label_offsets = (0..cell.records.len())
                .map(|i| top - config.date_padding - i as f64 * config.line_height)
                .collect();
        }

        weeks.push(WeekRow {
            top,
            height,
            week_max,
            cells,
        });
    }

    // month_grid always yields at least four weeks
    let first_top = weeks.first().map(|w| w.top).unwrap_or(-ROW_GAP);
    let last_bottom = weeks.last().map(|w| w.bottom()).unwrap_or(first_top);

    let weekday_y = first_top + WEEKDAY_GAP;
    let legend_y = weekday_y + config.weekday_padding + LEGEND_GAP;
    let title_y = legend_y + config.title_padding;

    Ok(MonthLayout {
        year,
        month,
        first_weekday: config.first_weekday,
        weeks,
        title_y,
        weekday_y,
        legend_y,
        bottom: last_bottom - BOTTOM_MARGIN,
        top: title_y + TITLE_HEIGHT,
    })
}

// ============================================================================
// TESTS
// ============================================================================
