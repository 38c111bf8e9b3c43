use chrono::NaiveDate;
use delivery_calendar::{
    compute_layout, Config, DataSource, LayoutConfig, LoadError, Palette, RecordLoader,
    Renderer, TextRole,
};
use std::fs;
use tempfile::TempDir;

const HEADER: &str = "OFCI Equipment Category , Unit Tag ,Vendor On Site Delivery Date\n";

fn write_log(dir: &TempDir, name: &str, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut body = HEADER.to_string();
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn two_sources_same_day_stack_two_colored_labels() {
    let dir = TempDir::new().unwrap();
    let a = write_log(&dir, "cmh116.csv", &["MV SWITCHGEAR,1.3A,2025-03-04"]);
    let b = write_log(&dir, "cmh120.csv", &["STANDBY GENERATOR,ALL UNITS,03/04/2025"]);

    let records = RecordLoader::new()
        .load_all(&[DataSource::new("CMH116", a), DataSource::new("CMH120", b)])
        .unwrap();
    assert_eq!(records.len(), 2);

    let layout = compute_layout(&records, 2025, 3, &LayoutConfig::default()).unwrap();
    let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
    let cell = layout.cell_for(day).unwrap();
    assert_eq!(cell.event_count(), 2);

    let canvas = Renderer::new(Palette::default()).render(&layout);
    let column = cell.column as f64;
    let in_cell: Vec<_> = canvas
        .texts(TextRole::Label)
        .filter(|(_, _, x, y)| *x > column && *x < column + 1.0 && *y <= cell.top + 0.1)
        .collect();

    assert_eq!(in_cell.len(), 2);
    assert_eq!((in_cell[0].0, in_cell[0].1), ("MV SWGR 1.3A", "darkblue"));
    assert_eq!((in_cell[1].0, in_cell[1].1), ("STANDBY", "darkred"));
}

#[test]
fn sources_are_concatenated_without_dedup() {
    let dir = TempDir::new().unwrap();
    let row = "LV SWITCHGEAR,2B,2025-03-10";
    let a = write_log(&dir, "a.csv", &[row, "Phase,3,2025-03-10"]);
    let b = write_log(&dir, "b.csv", &[row]);

    let records = RecordLoader::new()
        .load_all(&[DataSource::new("CMH116", a), DataSource::new("CMH120", b)])
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].source, "CMH116");
    assert_eq!(records[1].source, "CMH120");
    assert_eq!(records[0].label, records[1].label);
    assert!(records.iter().all(|r| !delivery_calendar::is_phase_marker(&r.label)));
}

#[test]
fn missing_source_file_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let missing = DataSource::new("CMH116", dir.path().join("gone.xlsx"));

    let result = RecordLoader::new().load_all(&[missing]);
    assert!(matches!(result, Err(LoadError::SourceUnavailable { .. })));
}

#[test]
fn config_drives_the_whole_pipeline() {
    let dir = TempDir::new().unwrap();
    write_log(
        &dir,
        "site.csv",
        &[
            "MARS,R1,2025-03-04",
            "MARS,R2,2025-03-04",
            "PANELS,P1,2025-03-20",
            ",P9,2025-03-21",
        ],
    );
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[layout]
first_weekday = "Mon"

[[sources]]
label = "SITE"
path = "site.csv"
color = "green"
"#,
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).unwrap();
    let records = config.loader().unwrap().load_all(&config.data_sources()).unwrap();
    assert_eq!(records.len(), 3);

    let canvas = delivery_calendar::render_month(&records, 2025, 3, &config.layout, &config.renderer())
        .unwrap();

    let legend: Vec<_> = canvas.texts(TextRole::Legend).map(|t| (t.0, t.1)).collect();
    assert_eq!(legend, [("SITE", "green")]);

    let labels: Vec<_> = canvas.texts(TextRole::Label).map(|t| t.0).collect();
    assert_eq!(labels, ["Racking R1", "Racking R2", "P1"]);

    let weekdays: Vec<_> = canvas.texts(TextRole::Weekday).map(|t| t.0).collect();
    assert_eq!(weekdays[0], "Mon");

    let svg = canvas.to_svg();
    assert_eq!(svg.matches("fill=\"green\"").count(), 4);
}

#[test]
fn latin1_export_keeps_its_good_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latin1.csv");
    let mut body = HEADER.as_bytes().to_vec();
    body.extend_from_slice(b"MARS,R1,2025-03-04\nCaf\xe9 PANELS,P1,2025-03-05\nMARS,R2,2025-03-06\n");
    fs::write(&path, body).unwrap();

    let records = RecordLoader::new()
        .load_all(&[DataSource::new("CMH116", path)])
        .unwrap();

    let labels: Vec<_> = records.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, ["Racking R1", "Caf\u{FFFD} P1", "Racking R2"]);
}
