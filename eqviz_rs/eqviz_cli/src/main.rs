use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use eqviz::state::{
    HistoryPanel, LoginForm, Selection, SignupForm, Submit, UploadControl,
};
use eqviz::view::{
    distribution_lines, stat_cards, ChartModel, Histogram, Measure, TableView, TABLE_PLACEHOLDER,
};
use eqviz::{ApiClient, DatasetId, FileStore, HistoryEntry, Summary, DEFAULT_BASE_URL};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod charts;

use charts::{render_chart_guard, ChartKind};

const SESSION_DIR: &str = ".eqviz";
const SESSION_FILE: &str = "session.json";
const FALLBACK_SESSION_FILE: &str = ".eqviz_session.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "Equipment analytics dashboard CLI", long_about = None)]
struct Cli {
    /// Backend API base address
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Session file holding the login token (defaults to ~/.eqviz/session.json)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    session_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account (does not log in)
    Signup(SignupArgs),
    /// Log in and store the token in the session file
    Login(LoginArgs),
    /// Forget the stored token
    Logout,
    /// Show whether a token is stored
    Status,
    /// Upload a CSV dataset and show its summary and charts
    Upload(UploadArgs),
    /// List the most recent uploads
    History,
    /// Download the PDF report of a dataset
    Report(ReportArgs),
}

#[derive(Parser, Debug)]
struct SignupArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Parser, Debug)]
struct LoginArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[derive(Parser, Debug)]
struct UploadArgs {
    /// CSV file to upload
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output PNG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Write the preview table to this CSV path
    #[arg(long, value_hint = ValueHint::FilePath)]
    preview_csv: Option<PathBuf>,

    /// Add a histogram of one measurement to the figures
    #[arg(long, value_enum)]
    histogram: Option<HistogramOpt>,

    /// Print the raw upload response as JSON instead of the summary
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// Dataset identifier
    id: u64,

    /// Output PDF path (defaults to report_<id>.pdf)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Name the file Dataset_<id>_Report.pdf, as the history panel does
    #[arg(long, action = ArgAction::SetTrue)]
    history_name: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum HistogramOpt {
    Flowrate,
    Pressure,
    Temperature,
}

impl From<HistogramOpt> for Measure {
    fn from(value: HistogramOpt) -> Self {
        match value {
            HistogramOpt::Flowrate => Measure::Flowrate,
            HistogramOpt::Pressure => Measure::Pressure,
            HistogramOpt::Temperature => Measure::Temperature,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let session_path = cli.session_file.clone().unwrap_or_else(default_session_path);
    let client = ApiClient::new(cli.base_url.clone(), Box::new(FileStore::new(&session_path)));

    match cli.command {
        Command::Signup(args) => handle_signup(&client, args).await,
        Command::Login(args) => handle_login(&client, args).await,
        Command::Logout => handle_logout(&client),
        Command::Status => handle_status(&client, &session_path),
        Command::Upload(args) => handle_upload(&client, args).await,
        Command::History => handle_history(&client).await,
        Command::Report(args) => handle_report(&client, args).await,
    }
}

fn default_session_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(SESSION_DIR).join(SESSION_FILE))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_SESSION_FILE))
}

async fn handle_signup(client: &ApiClient, args: SignupArgs) -> Result<()> {
    let mut form = SignupForm::default();
    form.username = args.username;
    form.email = args.email;
    form.password = args.password;
    let request = match form.submit() {
        Submit::Send(request) => request,
        Submit::Rejected(_) | Submit::Busy => bail!("{}", notice_text(form.notice())),
    };
    match client
        .signup(&request.username, &request.email, &request.password)
        .await
    {
        Ok(_) => {
            form.succeeded();
            info!("{}", notice_text(form.notice()));
            Ok(())
        }
        Err(err) => {
            form.failed(&err);
            Err(anyhow::Error::new(err).context(notice_text(form.notice()).to_string()))
        }
    }
}

async fn handle_login(client: &ApiClient, args: LoginArgs) -> Result<()> {
    let mut form = LoginForm::default();
    form.username = args.username;
    form.password = args.password;
    let request = match form.submit() {
        Submit::Send(request) => request,
        Submit::Rejected(_) | Submit::Busy => bail!("{}", notice_text(form.notice())),
    };
    match client.login(&request.username, &request.password).await {
        Ok(_) => {
            form.succeeded();
            info!("Login successful");
            Ok(())
        }
        Err(err) => {
            form.failed(&err);
            Err(anyhow::Error::new(err).context(notice_text(form.notice()).to_string()))
        }
    }
}

fn handle_logout(client: &ApiClient) -> Result<()> {
    client
        .clear_credential()
        .context("failed to clear the stored session")?;
    info!("Logged out");
    Ok(())
}

fn handle_status(client: &ApiClient, session_path: &Path) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Backend:  {}", client.base_url())?;
    writeln!(out, "Session:  {}", session_path.display())?;
    let state = if client.has_credential() {
        "logged in"
    } else {
        "logged out"
    };
    writeln!(out, "Status:   {state}")?;
    Ok(())
}

async fn handle_upload(client: &ApiClient, args: UploadArgs) -> Result<()> {
    let file_name = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} is not a file", args.input.display()))?;

    let mut control = UploadControl::default();
    if let Selection::Rejected(_) | Selection::Busy = control.select(&file_name) {
        bail!("{}", notice_text(control.notice()));
    }
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    info!("{} ({})", notice_text(control.notice()), file_name);

    let response = match client.upload_dataset(&file_name, bytes).await {
        Ok(response) => {
            control.succeeded();
            response
        }
        Err(err) => {
            control.failed(&err);
            return Err(anyhow::Error::new(err).context(notice_text(control.notice()).to_string()));
        }
    };
    info!("{}: dataset {}", notice_text(control.notice()), response.dataset_id);

    if args.json {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &response)?;
        writeln!(out)?;
    } else {
        print!("{}", render_summary(Some(&response.summary)));
        println!("Report: eqviz report {}", response.dataset_id);
    }

    if let Some(path) = args.preview_csv.as_ref() {
        if write_preview_csv(&response.summary, path)? {
            info!("Wrote preview CSV: {}", path.display());
        } else {
            warn!("No preview rows to write ({})", path.display());
        }
    }

    let histogram = args
        .histogram
        .and_then(|opt| Histogram::for_measure(&response.summary, opt.into()));
    if args.histogram.is_some() && histogram.is_none() {
        warn!("Backend sent no values for the requested histogram");
    }

    let targets = [(args.png.as_ref(), ChartKind::Png), (args.svg.as_ref(), ChartKind::Svg)];
    if targets.iter().any(|(path, _)| path.is_some()) {
        match ChartModel::from_summary(Some(&response.summary)) {
            Some(model) => {
                for (path, kind) in targets {
                    let Some(path) = path else { continue };
                    if let Err(err) = render_chart_guard(&model, histogram.as_ref(), path, kind) {
                        warn!("Skipping {:?} render ({}): {}", kind, path.display(), err);
                    } else {
                        info!("Wrote plot: {}", path.display());
                    }
                }
            }
            None => warn!("Summary has no type distribution; skipping charts"),
        }
    }

    Ok(())
}

async fn handle_history(client: &ApiClient) -> Result<()> {
    let entries = client
        .fetch_history()
        .await
        .context("failed to load upload history")?;
    let mut panel = HistoryPanel::default();
    panel.load(entries);
    print!("{}", render_history(panel.entries()));
    Ok(())
}

async fn handle_report(client: &ApiClient, args: ReportArgs) -> Result<()> {
    let id = DatasetId(args.id);
    let bytes = client
        .fetch_report(id)
        .await
        .context("Could not fetch report for this dataset")?;
    let path = args.output.unwrap_or_else(|| {
        PathBuf::from(if args.history_name {
            id.history_report_file_name()
        } else {
            id.report_file_name()
        })
    });
    let mut file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(&bytes)?;
    info!("Wrote report: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn notice_text(notice: Option<&eqviz::state::Notice>) -> &str {
    notice.map(|n| n.text.as_str()).unwrap_or_default()
}

/// Terminal rendering of the dashboard: stat cards, distribution, preview
/// table and type shares.
fn render_summary(summary: Option<&Summary>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Summary Statistics");
    for card in stat_cards(summary) {
        let _ = writeln!(out, "  {:<20} {}", card.label, card.value);
    }

    let lines = distribution_lines(summary);
    if !lines.is_empty() {
        let _ = writeln!(out, "\nEquipment Distribution");
        for line in lines {
            let _ = writeln!(out, "  {line}");
        }
    }

    let _ = writeln!(out, "\nDataset Table Preview (First 10 Rows)");
    out.push_str(&render_table(&TableView::from_summary(summary)));

    if let Some(model) = ChartModel::from_summary(summary) {
        let _ = writeln!(out, "\nType Share (%)");
        for slice in &model.slices {
            let _ = writeln!(out, "  {:<16} {:>6}", slice.label, slice.percent_label());
        }
    }
    out
}

fn render_table(table: &TableView) -> String {
    let (columns, rows) = match table {
        TableView::Placeholder => return format!("  {TABLE_PLACEHOLDER}\n"),
        TableView::Table { columns, rows } => (columns, rows),
    };
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            rows.iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(col.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        format!("  {}", padded.join(" | ").trim_end())
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", format_row(columns));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "  {}", rule.join("-+-"));
    for row in rows {
        let _ = writeln!(out, "{}", format_row(row));
    }
    out
}

fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No dataset reports yet\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = write!(out, "{}", entry.label());
        if let Some(name) = entry.filename.as_deref() {
            let _ = write!(out, "  {name}");
        }
        if let Some(at) = entry.uploaded_at {
            let _ = write!(out, "  {}", at.format("%Y-%m-%d %H:%M"));
        }
        out.push('\n');
    }
    out
}

/// Returns `false` when the summary had no preview rows.
fn write_preview_csv(summary: &Summary, path: &Path) -> Result<bool> {
    let TableView::Table { columns, rows } = TableView::from_summary(Some(summary)) else {
        return Ok(false);
    };
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&columns)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_summary() -> Summary {
        serde_json::from_value(json!({
            "total_count": 4,
            "avg_flowrate": 120.26,
            "avg_pressure": 6.5,
            "avg_temperature": 110.0,
            "type_distribution": { "Pump": 3, "Valve": 1 },
            "preview_columns": ["Equipment Name", "Type", "Flowrate"],
            "data_preview": [
                { "Equipment Name": "Pump-1", "Type": "Pump", "Flowrate": 120.5 },
                { "Equipment Name": "Valve-1", "Type": "Valve", "Flowrate": null }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_cli_parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "eqviz",
            "upload",
            "plant.csv",
            "--histogram",
            "pressure",
            "--base-url",
            "http://localhost:9000/api/",
        ])
        .unwrap();
        assert_eq!(cli.base_url, "http://localhost:9000/api/");
        match cli.command {
            Command::Upload(args) => {
                assert_eq!(args.input, PathBuf::from("plant.csv"));
                assert!(matches!(args.histogram, Some(HistogramOpt::Pressure)));
                assert!(!args.json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_defaults_to_local_backend() {
        let cli = Cli::try_parse_from(["eqviz", "status"]).unwrap();
        assert_eq!(cli.base_url, DEFAULT_BASE_URL);
        assert!(cli.session_file.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_render_summary_sections() {
        let text = render_summary(Some(&sample_summary()));
        assert!(text.contains(&format!("{:<20} 4", "Total Equipment")));
        assert!(text.contains(&format!("{:<20} 120.3", "Average Flowrate")));
        assert!(text.contains(&format!("{:<20} 6.50", "Average Pressure")));
        assert!(text.contains("• Pump: 3"));
        assert!(text.contains("Pump-1 "));
        assert!(text.contains("75.0%"));
        assert!(text.contains("25.0%"));
    }

    #[test]
    fn test_render_summary_without_dataset_shows_placeholder() {
        let text = render_summary(None);
        assert!(text.contains(&format!("{:<20} 0", "Total Equipment")));
        assert!(text.contains(TABLE_PLACEHOLDER));
        assert!(!text.contains("Type Share"));
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let table = TableView::Table {
            columns: vec!["Type".into(), "Flowrate".into()],
            rows: vec![vec!["Compressor".into(), "1".into()]],
        };
        let text = render_table(&table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  Type       | Flowrate");
        assert_eq!(lines[1], "  -----------+---------");
        assert_eq!(lines[2], "  Compressor | 1");
    }

    #[test]
    fn test_render_history_empty_and_labels() {
        assert_eq!(render_history(&[]), "No dataset reports yet\n");
        let entries = vec![HistoryEntry {
            id: DatasetId(12),
            filename: Some("plant.csv".into()),
            file: None,
            uploaded_at: None,
        }];
        assert_eq!(render_history(&entries), "Dataset-report 12  plant.csv\n");
    }

    #[test]
    fn test_write_preview_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.csv");
        assert!(write_preview_csv(&sample_summary(), &path).unwrap());
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "Equipment Name,Type,Flowrate\nPump-1,Pump,120.5\nValve-1,Valve,\n"
        );

        let empty = dir.path().join("empty.csv");
        assert!(!write_preview_csv(&Summary::default(), &empty).unwrap());
        assert!(!empty.exists());
    }

    #[test]
    fn test_default_session_path_is_named() {
        let path = default_session_path();
        assert!(path.ends_with(SESSION_FILE) || path.ends_with(FALLBACK_SESSION_FILE));
    }
}
