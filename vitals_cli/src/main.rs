use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use vitals_core::chart::MetricChart;
use vitals_core::export::{export_calories_csv, export_mass_waist_csv, CALORIES_CSV, MASS_WAIST_CSV};
use vitals_core::*;

#[derive(Parser)]
#[command(name = "vitals")]
#[command(about = "Health measurement reconciliation and trend charts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one refresh from saved pages
    Ingest {
        /// Directory holding calorie_diary.html, mass_log.html and waist_log.html
        #[arg(long)]
        pages: PathBuf,
    },

    /// Print stored records
    Show {
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Only show one collection
        #[arg(long, value_enum)]
        collection: Option<CollectionArg>,
    },

    /// Write the chart payload as JSON
    Chart {
        #[arg(long)]
        out: PathBuf,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Export both collections as CSV
    Export {
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CollectionArg {
    Kcal,
    MassWaist,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        vitals_core::logging::init_with_level("debug");
    } else {
        vitals_core::logging::init();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let store_path = data_dir.join(&config.data.store_file);
    tracing::debug!("Using store at {:?}", store_path);

    match cli.command {
        Commands::Ingest { pages } => cmd_ingest(&store_path, &pages, &config),
        Commands::Show {
            from,
            to,
            collection,
        } => cmd_show(&store_path, from, to, collection, &config),
        Commands::Chart { out, from, to } => cmd_chart(&store_path, &out, from, to, &config),
        Commands::Export { out_dir } => cmd_export(&store_path, &out_dir, &config),
    }
}

fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Option<(NaiveDate, NaiveDate)> {
    if from.is_none() && to.is_none() {
        return None;
    }
    Some((from.unwrap_or(NaiveDate::MIN), to.unwrap_or(NaiveDate::MAX)))
}

fn open_store(store_path: &Path, config: &Config) -> Result<ReconciliationStore> {
    ReconciliationStore::open_with_profile(store_path, &config.body.profile())
}

fn cmd_ingest(store_path: &Path, pages: &Path, config: &Config) -> Result<()> {
    let store = open_store(store_path, config)?;
    let coordinator =
        RefreshCoordinator::new(DirectoryPageSource::new(pages), store, config.body.profile());

    match coordinator.start_refresh() {
        RefreshOutcome::Completed(report) => {
            println!("✓ Refresh complete");
            println!(
                "  Calorie days:     {} ({} diary rows skipped)",
                report.calorie_records, report.diary_rows_skipped
            );
            println!(
                "  Measurement days: {} ({} log rows skipped)",
                report.mass_waist_records, report.measurement_rows_skipped
            );
            println!(
                "  Inserted {}, replaced {}, unchanged {}",
                report.batch.inserted, report.batch.replaced, report.batch.unchanged
            );
            if !report.batch.written {
                println!("  No changes - store not rewritten");
            }
            println!("  Store: {}", store_path.display());
            Ok(())
        }
        RefreshOutcome::Failed(message) => {
            eprintln!("✗ Refresh failed: {}", message);
            std::process::exit(1);
        }
        RefreshOutcome::AlreadyRunning => {
            eprintln!("✗ A refresh is already running");
            std::process::exit(1);
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".into())
}

fn cmd_show(
    store_path: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    collection: Option<CollectionArg>,
    config: &Config,
) -> Result<()> {
    let store = open_store(store_path, config)?;
    let from = from.unwrap_or(NaiveDate::MIN);
    let to = to.unwrap_or(NaiveDate::MAX);

    if collection != Some(CollectionArg::MassWaist) {
        let records = store.calories().query(from, to);
        println!("Daily kcal ({} days)", records.len());
        println!(
            "  {:<10}  {:>9}  {:>9}  {:>9}",
            "date", "intake", "exercise", "net"
        );
        for record in records {
            println!(
                "  {:<10}  {:>9.0}  {:>9.0}  {:>9.0}",
                record.date().to_string(),
                record.intake_kcal(),
                record.exercise_kcal(),
                record.net_kcal()
            );
        }
    }

    if collection.is_none() {
        println!();
    }

    if collection != Some(CollectionArg::Kcal) {
        let records = store.mass_waist().query(from, to);
        println!("Daily mass/waist ({} days)", records.len());
        println!(
            "  {:<10}  {:>8}  {:>8}  {:>8}",
            "date", "mass kg", "waist cm", "fat %"
        );
        for record in records {
            println!(
                "  {:<10}  {:>8}  {:>8}  {:>8}",
                record.date().to_string(),
                fmt_opt(record.mass_kg()),
                fmt_opt(record.waist_cm()),
                fmt_opt(record.body_fat_pct())
            );
        }
    }

    Ok(())
}

fn print_metric(chart: &MetricChart) {
    let points = chart.raw.points.iter().filter(|p| p.value.is_some()).count();
    println!("  {}: {} points", chart.metric.label(), points);
    if let Some(fit) = chart.trend_fit {
        println!("    Trend: {:+.3} per day", fit.slope_per_day);
    }
    if let Some(date) = chart.projected_crossing {
        println!("    Reaches goal {} on {}", fmt_opt(chart.goal_value), date);
    }
}

fn cmd_chart(
    store_path: &Path,
    out: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    config: &Config,
) -> Result<()> {
    let store = open_store(store_path, config)?;
    let assembler = ChartAssembler::from_config(&config.chart)?;
    let payload = assembler.assemble(&store, date_range(from, to));

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(out, serde_json::to_string_pretty(&payload)?)?;

    println!("✓ Chart data written to {}", out.display());
    print_metric(&payload.net_kcal);
    print_metric(&payload.mass_kg);
    print_metric(&payload.body_fat_pct);
    Ok(())
}

fn cmd_export(store_path: &Path, out_dir: &Path, config: &Config) -> Result<()> {
    let store = open_store(store_path, config)?;

    let calories_path = out_dir.join(CALORIES_CSV);
    let kcal_rows = export_calories_csv(&store, &calories_path)?;
    println!("✓ Exported {} calorie days", kcal_rows);
    println!("  CSV: {}", calories_path.display());

    let mass_waist_path = out_dir.join(MASS_WAIST_CSV);
    let mass_rows = export_mass_waist_csv(&store, &mass_waist_path)?;
    println!("✓ Exported {} measurement days", mass_rows);
    println!("  CSV: {}", mass_waist_path.display());

    Ok(())
}
