// 🎨 Renderer
// Draws a month layout onto a 2D canvas (SVG, optionally rasterized to PNG)

use crate::layout::{MonthLayout, DAYS_PER_WEEK};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CELL_FILL_EVEN: &str = "#ffffff";
const CELL_FILL_ODD: &str = "#e6f2ff";
const CELL_BORDER: &str = "black";
const TEXT_COLOR: &str = "black";

/// Color for records whose source has no palette entry
pub const UNKNOWN_SOURCE_COLOR: &str = "black";

const TITLE_PT: f64 = 20.0;
const WEEKDAY_PT: f64 = 14.0;
const DAY_NUMBER_PT: f64 = 14.0;
const LEGEND_PT: f64 = 12.0;
const LABEL_PT: f64 = 9.0;

const DAY_NUMBER_INSET: f64 = 0.05;
const LABEL_INDENT: f64 = 0.17;
const LABEL_NUDGE: f64 = 0.08;
const LEGEND_SPACING: f64 = 0.35;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("SVG parse error: {0}")]
    Svg(String),

    #[error("pixmap allocation failed for {0}x{1}")]
    Pixmap(u32, u32),

    #[cfg(feature = "png")]
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
}

// ============================================================================
// PALETTE
// ============================================================================

/// Source label → text color, in legend order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    entries: Vec<(String, String)>,
}

impl Palette {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Palette { entries }
    }

    pub fn color_for(&self, source: &str) -> &str {
        self.entries
            .iter()
            .find(|(label, _)| label == source)
            .map(|(_, color)| color.as_str())
            .unwrap_or(UNKNOWN_SOURCE_COLOR)
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::new(vec![
            ("CMH116".to_string(), "darkblue".to_string()),
            ("CMH120".to_string(), "darkred".to_string()),
        ])
    }
}

// ============================================================================
// CANVAS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Title,
    Weekday,
    Legend,
    DayNumber,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
}

/// Which edge of the text box sits on the given y
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline {
    Top,
    Bottom,
}

/// A drawing primitive in calendar coordinates (y grows upward)
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Rectangle hanging down from (x, top)
    Rect {
        x: f64,
        top: f64,
        width: f64,
        height: f64,
        fill: String,
        stroke: String,
    },
    Text {
        x: f64,
        y: f64,
        content: String,
        size_pt: f64,
        bold: bool,
        color: String,
        anchor: Anchor,
        baseline: Baseline,
        role: TextRole,
    },
}

/// Page size of the SVG output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub width_px: u32,
    pub height_px: u32,
    pub margin_px: f64,
    /// Converts point sizes to pixels
    pub dpi: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            width_px: 1800,
            height_px: 1000,
            margin_px: 20.0,
            dpi: 100.0,
        }
    }
}

/// Drawn calendar page: shapes in paint order plus the visible extent
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub shapes: Vec<Shape>,
    pub options: RenderOptions,
}

impl Canvas {
    fn push_text(
        &mut self,
        (x, y): (f64, f64),
        content: &str,
        size_pt: f64,
        color: &str,
        role: TextRole,
    ) {
        let (bold, anchor, baseline) = match role {
            TextRole::Title => (true, Anchor::Middle, Baseline::Bottom),
            TextRole::Weekday => (true, Anchor::Middle, Baseline::Bottom),
            TextRole::Legend => (false, Anchor::Start, Baseline::Bottom),
            TextRole::DayNumber => (true, Anchor::Start, Baseline::Top),
            TextRole::Label => (false, Anchor::Start, Baseline::Top),
        };

        self.shapes.push(Shape::Text {
            x,
            y,
            content: content.to_string(),
            size_pt,
            bold,
            color: color.to_string(),
            anchor,
            baseline,
            role,
        });
    }

    /// Text shapes with a given role, in paint order
    pub fn texts(&self, role: TextRole) -> impl Iterator<Item = (&str, &str, f64, f64)> {
        self.shapes.iter().filter_map(move |shape| match shape {
            Shape::Text {
                x,
                y,
                content,
                color,
                role: r,
                ..
            } if *r == role => Some((content.as_str(), color.as_str(), *x, *y)),
            _ => None,
        })
    }

    fn scale(&self) -> (f64, f64) {
        let o = &self.options;
        let sx = (o.width_px as f64 - 2.0 * o.margin_px) / (self.x_max - self.x_min);
        let sy = (o.height_px as f64 - 2.0 * o.margin_px) / (self.y_max - self.y_min);
        (sx, sy)
    }

    fn to_px(&self, x: f64, y: f64) -> (f64, f64) {
        let (sx, sy) = self.scale();
        let m = self.options.margin_px;
        (m + (x - self.x_min) * sx, m + (self.y_max - y) * sy)
    }

    /// Serialize the canvas as an SVG document
    pub fn to_svg(&self) -> String {
        let (sx, sy) = self.scale();
        let (w, h) = (self.options.width_px, self.options.height_px);

        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n"
        ));
        svg.push_str(&format!("<rect width=\"{w}\" height=\"{h}\" fill=\"white\"/>\n"));

        for shape in &self.shapes {
            match shape {
                Shape::Rect {
                    x,
                    top,
                    width,
                    height,
                    fill,
                    stroke,
                } => {
                    let (px, py) = self.to_px(*x, *top);
                    svg.push_str(&format!(
                        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" stroke=\"{}\" stroke-width=\"1\"/>\n",
                        px,
                        py,
                        width * sx,
                        height * sy,
                        svg_escape(fill),
                        svg_escape(stroke)
                    ));
                }
                Shape::Text {
                    x,
                    y,
                    content,
                    size_pt,
                    bold,
                    color,
                    anchor,
                    baseline,
                    role,
                } => {
                    let (px, py) = self.to_px(*x, *y);
                    let anchor = match anchor {
                        Anchor::Start => "start",
                        Anchor::Middle => "middle",
                    };
                    let baseline = match baseline {
                        Baseline::Top => "hanging",
                        Baseline::Bottom => "auto",
                    };
                    svg.push_str(&format!(
                        "<text class=\"{}\" x=\"{:.2}\" y=\"{:.2}\" font-family=\"sans-serif\" font-size=\"{:.2}\" font-weight=\"{}\" fill=\"{}\" text-anchor=\"{}\" dominant-baseline=\"{}\">{}</text>\n",
                        role_class(*role),
                        px,
                        py,
                        size_pt * self.options.dpi / 72.0,
                        if *bold { "bold" } else { "normal" },
                        svg_escape(color),
                        anchor,
                        baseline,
                        svg_escape(content)
                    ));
                }
            }
        }

        svg.push_str("</svg>\n");
        svg
    }

    /// Rasterize through resvg using the system fonts
    #[cfg(feature = "png")]
    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        use png::{BitDepth, ColorType, Encoder};

        let svg = self.to_svg();

        let mut opt = usvg::Options::default();
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        opt.fontdb = std::sync::Arc::new(fontdb);

        let tree = usvg::Tree::from_str(&svg, &opt).map_err(|e| RenderError::Svg(e.to_string()))?;

        let (w, h) = (self.options.width_px, self.options.height_px);
        let mut pixmap = tiny_skia::Pixmap::new(w, h).ok_or(RenderError::Pixmap(w, h))?;
        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

        let mut bytes = Vec::new();
        {
            let mut enc = Encoder::new(&mut bytes, w, h);
            enc.set_color(ColorType::Rgba);
            enc.set_depth(BitDepth::Eight);
            let mut writer = enc.write_header()?;
            writer.write_image_data(pixmap.data())?;
        }
        Ok(bytes)
    }
}

fn role_class(role: TextRole) -> &'static str {
    match role {
        TextRole::Title => "title",
        TextRole::Weekday => "weekday",
        TextRole::Legend => "legend",
        TextRole::DayNumber => "day",
        TextRole::Label => "label",
    }
}

fn svg_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// RENDERER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    palette: Palette,
    options: RenderOptions,
}

impl Renderer {
    pub fn new(palette: Palette) -> Self {
        Renderer {
            palette,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Draw the page. Labels are placed at the layout's offsets as-is:
    /// never wrapped, truncated or measured.
    pub fn render(&self, layout: &MonthLayout<'_>) -> Canvas {
        let mut canvas = Canvas {
            x_min: 0.0,
            x_max: DAYS_PER_WEEK as f64,
            y_min: layout.bottom,
            y_max: layout.top,
            shapes: Vec::new(),
            options: self.options,
        };

        // Cell backgrounds + borders
        for cell in layout.cells().filter(|c| c.is_present()) {
            let fill = if cell.column % 2 == 0 {
                CELL_FILL_EVEN
            } else {
                CELL_FILL_ODD
            };
            canvas.shapes.push(Shape::Rect {
                x: cell.column as f64,
                top: cell.top,
                width: 1.0,
                height: cell.height,
                fill: fill.to_string(),
                stroke: CELL_BORDER.to_string(),
            });
        }

        for cell in layout.cells() {
            if let Some(day) = cell.day {
                canvas.push_text(
                    (cell.column as f64 + DAY_NUMBER_INSET, cell.top - DAY_NUMBER_INSET),
                    &day.to_string(),
                    DAY_NUMBER_PT,
                    TEXT_COLOR,
                    TextRole::DayNumber,
                );
            }
        }

        canvas.push_text(
            (DAYS_PER_WEEK as f64 / 2.0, layout.title_y),
            &layout.title(),
            TITLE_PT,
            TEXT_COLOR,
            TextRole::Title,
        );

        for (i, name) in layout.weekday_names().into_iter().enumerate() {
            canvas.push_text(
                (i as f64 + 0.5, layout.weekday_y),
                name,
                WEEKDAY_PT,
                TEXT_COLOR,
                TextRole::Weekday,
            );
        }

        for (i, (source, color)) in self.palette.entries().iter().enumerate() {
            canvas.push_text(
                (i as f64 * LEGEND_SPACING, layout.legend_y),
                source,
                LEGEND_PT,
                color,
                TextRole::Legend,
            );
        }

        for cell in layout.cells() {
            for (record, y) in cell.records.iter().zip(&cell.label_offsets) {
                canvas.push_text(
                    (cell.column as f64 + LABEL_INDENT, y + LABEL_NUDGE),
                    &record.label,
                    LABEL_PT,
                    self.palette.color_for(&record.source),
                    TextRole::Label,
                );
            }
        }

        canvas
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{compute_layout, LayoutConfig};
    use crate::loader::DeliveryRecord;
    use chrono::NaiveDate;

    fn record(day: u32, label: &str, source: &str) -> DeliveryRecord {
        DeliveryRecord {
            category: label.to_string(),
            unit_tag: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            label: label.to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_palette_lookup_and_default() {
        let palette = Palette::default();
        assert_eq!(palette.color_for("CMH116"), "darkblue");
        assert_eq!(palette.color_for("CMH120"), "darkred");
        assert_eq!(palette.color_for("CMH999"), UNKNOWN_SOURCE_COLOR);
    }

    #[test]
    fn test_empty_month_is_structurally_complete() {
        let layout = compute_layout(&[], 2025, 3, &LayoutConfig::default()).unwrap();
        let canvas = Renderer::default().render(&layout);

        let rects = canvas
            .shapes
            .iter()
            .filter(|s| matches!(s, Shape::Rect { .. }))
            .count();
        assert_eq!(rects, 31);
        assert_eq!(canvas.texts(TextRole::DayNumber).count(), 31);
        assert_eq!(canvas.texts(TextRole::Weekday).count(), 7);
        assert_eq!(canvas.texts(TextRole::Legend).count(), 2);
        assert_eq!(canvas.texts(TextRole::Label).count(), 0);
        assert_eq!(canvas.texts(TextRole::Title).next().unwrap().0, "March 2025");
    }

    #[test]
    fn test_column_parity_fill() {
        let layout = compute_layout(&[], 2025, 3, &LayoutConfig::default()).unwrap();
        let canvas = Renderer::default().render(&layout);

        for shape in &canvas.shapes {
            if let Shape::Rect { x, fill, stroke, .. } = shape {
                let expected = if (*x as usize) % 2 == 0 { CELL_FILL_EVEN } else { CELL_FILL_ODD };
                assert_eq!(fill, expected);
                assert_eq!(stroke, CELL_BORDER);
            }
        }
    }

    #[test]
    fn test_labels_colored_by_source() {
        let records = vec![
            record(4, "MV SWGR 1.3A", "CMH116"),
            record(4, "STANDBY", "CMH120"),
            record(4, "Racking", "elsewhere"),
        ];
        let layout = compute_layout(&records, 2025, 3, &LayoutConfig::default()).unwrap();
        let canvas = Renderer::default().render(&layout);

        let labels: Vec<_> = canvas.texts(TextRole::Label).collect();
        assert_eq!(labels.len(), 3);
        assert_eq!((labels[0].0, labels[0].1), ("MV SWGR 1.3A", "darkblue"));
        assert_eq!((labels[1].0, labels[1].1), ("STANDBY", "darkred"));
        assert_eq!(labels[2].1, UNKNOWN_SOURCE_COLOR);

        // Stacked downward one line apart, same column
        assert!((labels[0].3 - labels[1].3 - 0.15).abs() < 1e-9);
        assert_eq!(labels[0].2, labels[1].2);
    }

    #[test]
    fn test_labels_drawn_last() {
        let records = vec![record(10, "SWGR A", "CMH116")];
        let layout = compute_layout(&records, 2025, 3, &LayoutConfig::default()).unwrap();
        let canvas = Renderer::default().render(&layout);

        assert!(matches!(
            canvas.shapes.last(),
            Some(Shape::Text { role: TextRole::Label, .. })
        ));
    }

    #[test]
    fn test_svg_output() {
        let records = vec![record(4, "GEN <1> & 2", "CMH116")];
        let layout = compute_layout(&records, 2025, 3, &LayoutConfig::default()).unwrap();
        let svg = Renderer::default().render(&layout).to_svg();

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("class=\"label\"").count(), 1);
        assert!(svg.contains("GEN &lt;1&gt; &amp; 2"));
        assert!(svg.contains(">March 2025</text>"));
    }

    #[test]
    fn test_svg_one_element_per_line() {
        let records = vec![record(4, "MV SWGR", "CMH116"), record(4, "STANDBY", "CMH120")];
        let layout = compute_layout(&records, 2025, 3, &LayoutConfig::default()).unwrap();
        let canvas = Renderer::default().render(&layout);
        let svg = canvas.to_svg();

        // open tag, background, one line per shape, close tag
        assert_eq!(svg.lines().count(), canvas.shapes.len() + 3);
        assert!(svg
            .lines()
            .skip(2)
            .take(canvas.shapes.len())
            .all(|l| l.starts_with("<rect ") || l.starts_with("<text ")));
    }

    #[test]
    fn test_canvas_maps_extent_to_page() {
        let layout = compute_layout(&[], 2025, 3, &LayoutConfig::default()).unwrap();
        let canvas = Renderer::default().render(&layout);

        let (x0, y0) = canvas.to_px(canvas.x_min, canvas.y_max);
        let (x1, y1) = canvas.to_px(canvas.x_max, canvas.y_min);
        assert!((x0 - 20.0).abs() < 1e-9 && (y0 - 20.0).abs() < 1e-9);
        assert!((x1 - 1780.0).abs() < 1e-9 && (y1 - 980.0).abs() < 1e-9);
    }
}
