use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use delivery_calendar::{compute_layout, AuthGate, Config, DeliveryRecord, Session};

#[derive(Parser)]
#[command(name = "delivery-calendar")]
#[command(about = "Month-at-a-glance calendar of equipment deliveries")]
#[command(version)]
struct Cli {
    /// Config file (default: user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Password, when the config requires one
    #[arg(long, global = true, env = "DELIVERY_CALENDAR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one month to an SVG or PNG file
    Render {
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(short, long)]
        month: Option<u32>,
        /// Output file; extension picks the format
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print each delivery day of a month with its labels
    List {
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(short, long)]
        month: Option<u32>,
    },
    /// Show the label a category and unit tag normalize to
    Label {
        category: String,
        #[arg(default_value = "")]
        unit: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let session = start_session(&config.auth_gate()?, cli.password.as_deref())?;

    match cli.command {
        Command::Render { year, month, out } => {
            let (year, month) = year_month(year, month);
            run_render(&config, &session, year, month, out)
        }
        Command::List { year, month } => {
            let (year, month) = year_month(year, month);
            run_list(&config, &session, year, month)
        }
        Command::Label { category, unit } => {
            let normalizer = config.normalizer()?;
            println!("{}", normalizer.normalize(&category, &unit));
            Ok(())
        }
    }
}

fn year_month(year: Option<i32>, month: Option<u32>) -> (i32, u32) {
    let today = Local::now().date_naive();
    (year.unwrap_or(today.year()), month.unwrap_or(today.month()))
}

/// A wrong password fails here; a missing one is caught by `require_login`
fn start_session(gate: &AuthGate, password: Option<&str>) -> Result<Session> {
    let mut session = gate.open_session();
    if let Some(password) = password {
        if !gate.login(&mut session, password) {
            bail!("Incorrect password");
        }
    }
    Ok(session)
}

fn require_login(session: &Session) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Login required: pass --password or set DELIVERY_CALENDAR_PASSWORD");
    }
    Ok(())
}

fn load_records(config: &Config) -> Result<Vec<DeliveryRecord>> {
    let loader = config.loader()?;
    let records = loader
        .load_all(&config.data_sources())
        .context("Failed to load delivery logs")?;
    Ok(records)
}

fn run_render(
    config: &Config,
    session: &Session,
    year: i32,
    month: u32,
    out: Option<PathBuf>,
) -> Result<()> {
    require_login(session)?;

    println!("📅 Delivery Calendar - {}-{:02}", year, month);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load all sources
    println!("\n📂 Loading delivery logs...");
    let records = load_records(config)?;
    println!("✓ Loaded {} deliveries from {} sources", records.len(), config.sources.len());

    // 2. Layout + draw
    let layout = compute_layout(&records, year, month, &config.layout)?;
    let canvas = config.renderer().render(&layout);
    let in_month: usize = layout.cells().map(|c| c.event_count()).sum();
    println!("✓ {} deliveries fall in {}", in_month, layout.title());

    // 3. Write
    let out = out.unwrap_or_else(|| PathBuf::from(format!("calendar-{}-{:02}.svg", year, month)));
    write_canvas(&canvas, &out)?;
    println!("\n✅ Wrote {}", out.display());

    Ok(())
}

fn write_canvas(canvas: &delivery_calendar::Canvas, out: &Path) -> Result<()> {
    let extension = out
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("svg")
        .to_lowercase();

    let bytes = match extension.as_str() {
        "svg" => canvas.to_svg().into_bytes(),
        #[cfg(feature = "png")]
        "png" => canvas.to_png()?,
        other => bail!("Unsupported output format: .{}", other),
    };

    fs::write(out, bytes).with_context(|| format!("Failed to write {}", out.display()))
}

fn run_list(config: &Config, session: &Session, year: i32, month: u32) -> Result<()> {
    require_login(session)?;

    let records = load_records(config)?;
    let layout = compute_layout(&records, year, month, &config.layout)?;

    println!("📅 {}", layout.title());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut any = false;
    for cell in layout.cells().filter(|c| !c.records.is_empty()) {
        if let Some(date) = cell.date {
            println!("\n{} ({})", date.format("%a %d"), cell.event_count());
            for record in &cell.records {
                println!("  [{}] {}", record.source, record.label);
            }
            any = true;
        }
    }

    if !any {
        println!("\nNo deliveries this month.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_calendar::Credentials;

    fn gate() -> AuthGate {
        AuthGate::new(Some(Credentials::from_password("site-walk")))
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let err = start_session(&gate(), Some("guess")).unwrap_err();
        assert_eq!(err.to_string(), "Incorrect password");
    }

    #[test]
    fn test_missing_password_needs_login() {
        let session = start_session(&gate(), None).unwrap();
        let err = require_login(&session).unwrap_err();
        assert!(err.to_string().starts_with("Login required"));
    }

    #[test]
    fn test_correct_password_and_open_gate() {
        assert!(start_session(&gate(), Some("site-walk")).unwrap().is_authenticated());
        assert!(start_session(&AuthGate::default(), None).unwrap().is_authenticated());
    }
}
