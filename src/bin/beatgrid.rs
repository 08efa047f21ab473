//! beatgrid CLI - Command-line interface for the beatgrid engine
//!
//! Commands:
//! - reconstruct: Reconstruct one recording into an aligned table
//! - batch: Reconstruct every recording under a directory
//! - config: Print the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use walkdir::WalkDir;

use beatgrid::types::{IbiSeriesReport, RecordingOutput, TablePayload};
use beatgrid::{ReconstructionConfig, Reconstructor, SourceMode, BEATGRID_VERSION};

/// beatgrid - Align wearable IBI, barometric and GPS streams on a one-second grid
#[derive(Parser)]
#[command(name = "beatgrid")]
#[command(version = BEATGRID_VERSION)]
#[command(about = "Reconstruct wearable recordings into aligned tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct one recording
    Reconstruct {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Source mode (suunto_json or qs_json)
        #[arg(long, default_value = "suunto_json")]
        mode: String,

        /// Configuration file (JSON); missing options use defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Device summary document whose header is attached to the output
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Output format
        #[arg(long = "format", default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Reconstruct every *.json recording under a directory
    Batch {
        /// Directory to scan recursively
        #[arg(short, long)]
        dir: PathBuf,

        /// Report file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Source mode (suunto_json or qs_json)
        #[arg(long, default_value = "suunto_json")]
        mode: String,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one row per line)
    Ndjson,
    /// Complete payload as JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Comma-separated values with a header row
    Csv,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BeatgridCliError> {
    match cli.command {
        Commands::Reconstruct {
            input,
            output,
            mode,
            config,
            summary,
            output_format,
        } => cmd_reconstruct(
            &input,
            &output,
            &mode,
            config.as_deref(),
            summary.as_deref(),
            output_format,
        ),

        Commands::Batch {
            dir,
            output,
            mode,
            config,
        } => cmd_batch(&dir, &output, &mode, config.as_deref()),

        Commands::Config => {
            println!("{}", ReconstructionConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn cmd_reconstruct(
    input: &Path,
    output: &Path,
    mode: &str,
    config: Option<&Path>,
    summary: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), BeatgridCliError> {
    let reconstructor = load_reconstructor(config)?;

    let input_data = if is_std_stream(input) {
        if atty::is(atty::Stream::Stdin) {
            return Err(BeatgridCliError::StdinIsTerminal);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let summary_data = summary.map(fs::read_to_string).transpose()?;

    let output_data = match reconstructor.process_with_summary(
        &input_data,
        summary_data.as_deref(),
        mode,
    )? {
        RecordingOutput::Aligned(reconstruction) => {
            if reconstruction.unparsed_count > 0 {
                info!(
                    "{} of {} records were not parsed",
                    reconstruction.unparsed_count, reconstruction.total_events
                );
            }
            let payload = reconstructor.encode(&reconstruction);
            format_table(&payload, &output_format)?
        }
        RecordingOutput::IbiSeries(report) => format_series(&report, &output_format)?,
    };

    write_output(output, &output_data)
}

fn cmd_batch(
    dir: &Path,
    output: &Path,
    mode: &str,
    config: Option<&Path>,
) -> Result<(), BeatgridCliError> {
    let reconstructor = load_reconstructor(config)?;
    // Reject an unknown mode before walking the directory
    mode.parse::<SourceMode>()?;

    let mut entries = Vec::new();

    for entry in WalkDir::new(dir).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(|e| BeatgridCliError::Io(e.into()))?;
        let path = entry.path();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !entry.file_type().is_file() || !is_json {
            continue;
        }

        let report = match fs::read_to_string(path) {
            Ok(data) => BatchEntry::from_result(path, reconstructor.process(&data, mode)),
            Err(e) => BatchEntry::failed(path, e.to_string()),
        };
        if let Some(error) = &report.error {
            warn!("{}: {}", path.display(), error);
        }
        entries.push(report);
    }

    if entries.is_empty() {
        return Err(BeatgridCliError::NoRecordings);
    }

    let mut output_data = String::new();
    for entry in &entries {
        output_data.push_str(&serde_json::to_string(entry)?);
        output_data.push('\n');
    }

    write_output(output, &output_data)
}

fn load_reconstructor(config: Option<&Path>) -> Result<Reconstructor, BeatgridCliError> {
    let mut reconstructor = Reconstructor::new();
    if let Some(config_path) = config {
        let config_json = fs::read_to_string(config_path)?;
        reconstructor.load_config(&config_json)?;
    }
    Ok(reconstructor)
}

fn is_std_stream(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn write_output(output: &Path, data: &str) -> Result<(), BeatgridCliError> {
    if is_std_stream(output) {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_table(payload: &TablePayload, format: &OutputFormat) -> Result<String, BeatgridCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for row in &payload.rows {
                let mut object = serde_json::Map::new();
                object.insert("time".to_string(), row.time.clone().into());
                for (name, value) in payload.columns.iter().zip(&row.values) {
                    object.insert(name.clone(), (*value).into());
                }
                output.push_str(&serde_json::to_string(&object)?);
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(serde_json::to_string(payload)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(payload)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            let mut header = vec!["time".to_string()];
            header.extend(payload.columns.iter().cloned());
            writer.write_record(&header)?;

            for row in &payload.rows {
                let mut record = vec![row.time.clone()];
                record.extend(row.values.iter().map(cell));
                writer.write_record(&record)?;
            }
            csv_string(writer)
        }
    }
}

fn format_series(report: &IbiSeriesReport, format: &OutputFormat) -> Result<String, BeatgridCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut output = String::new();
            for i in 0..report.ibi_raw.len() {
                let line = serde_json::json!({
                    "beat": i,
                    "ibi_raw": report.ibi_raw[i],
                    "ibi_filtered": report.ibi_filtered[i],
                    "hr_raw": report.hr_raw[i],
                    "hr_filtered": report.hr_filtered[i],
                });
                output.push_str(&line.to_string());
                output.push('\n');
            }
            Ok(output)
        }
        OutputFormat::Json => Ok(serde_json::to_string(report)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(["beat", "ibi_raw", "ibi_filtered", "hr_raw", "hr_filtered"])?;
            for i in 0..report.ibi_raw.len() {
                writer.write_record(&[
                    i.to_string(),
                    report.ibi_raw[i].to_string(),
                    cell(&report.ibi_filtered[i]),
                    cell(&report.hr_raw[i]),
                    cell(&report.hr_filtered[i]),
                ])?;
            }
            csv_string(writer)
        }
    }
}

fn cell(value: &Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_string(writer: csv::Writer<Vec<u8>>) -> Result<String, BeatgridCliError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| BeatgridCliError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| BeatgridCliError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

// Batch report

#[derive(serde::Serialize)]
struct BatchEntry {
    path: String,
    rows: Option<usize>,
    beats: Option<usize>,
    unparsed_count: Option<usize>,
    drift_warnings: Option<usize>,
    error: Option<String>,
}

impl BatchEntry {
    fn from_result(
        path: &Path,
        result: Result<RecordingOutput, beatgrid::ReconstructError>,
    ) -> Self {
        match result {
            Ok(RecordingOutput::Aligned(rec)) => BatchEntry {
                path: path.display().to_string(),
                rows: Some(rec.table.len()),
                beats: Some(rec.beats.len()),
                unparsed_count: Some(rec.unparsed_count),
                drift_warnings: Some(rec.drift.len()),
                error: None,
            },
            Ok(RecordingOutput::IbiSeries(report)) => BatchEntry {
                path: path.display().to_string(),
                rows: None,
                beats: Some(report.ibi_raw.len()),
                unparsed_count: None,
                drift_warnings: None,
                error: None,
            },
            Err(e) => Self::failed(path, e.to_string()),
        }
    }

    fn failed(path: &Path, error: String) -> Self {
        BatchEntry {
            path: path.display().to_string(),
            rows: None,
            beats: None,
            unparsed_count: None,
            drift_warnings: None,
            error: Some(error),
        }
    }
}

// Error types

#[derive(Debug)]
enum BeatgridCliError {
    Io(io::Error),
    Reconstruct(beatgrid::ReconstructError),
    Json(serde_json::Error),
    Csv(csv::Error),
    StdinIsTerminal,
    NoRecordings,
}

impl From<io::Error> for BeatgridCliError {
    fn from(e: io::Error) -> Self {
        BeatgridCliError::Io(e)
    }
}

impl From<beatgrid::ReconstructError> for BeatgridCliError {
    fn from(e: beatgrid::ReconstructError) -> Self {
        BeatgridCliError::Reconstruct(e)
    }
}

impl From<serde_json::Error> for BeatgridCliError {
    fn from(e: serde_json::Error) -> Self {
        BeatgridCliError::Json(e)
    }
}

impl From<csv::Error> for BeatgridCliError {
    fn from(e: csv::Error) -> Self {
        BeatgridCliError::Csv(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<BeatgridCliError> for CliError {
    fn from(e: BeatgridCliError) -> Self {
        use beatgrid::ReconstructError as R;

        match e {
            BeatgridCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            BeatgridCliError::Reconstruct(e) => {
                let (code, hint) = match &e {
                    R::MalformedInput(_) => ("MALFORMED_INPUT", "Check that --mode matches the document"),
                    R::EmptyInput(_) => ("EMPTY_INPUT", "Set \"heart_rate\": false to skip heart rate"),
                    R::UnsupportedSource(_) => ("UNSUPPORTED_SOURCE", "Use suunto_json or qs_json"),
                    R::TimelineDrift { .. } => ("TIMELINE_DRIFT", "Use the lenient drift policy to keep overlapping bursts"),
                    R::InvalidConfig(_) => ("INVALID_CONFIG", "Run 'beatgrid config' for a valid example"),
                    R::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            BeatgridCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            BeatgridCliError::Csv(e) => CliError {
                code: "CSV_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            BeatgridCliError::StdinIsTerminal => CliError {
                code: "STDIN_IS_TERMINAL".to_string(),
                message: "Refusing to read a recording from an interactive terminal".to_string(),
                hint: Some("Pipe a document into stdin or pass --input <file>".to_string()),
            },
            BeatgridCliError::NoRecordings => CliError {
                code: "NO_RECORDINGS".to_string(),
                message: "No *.json recordings found".to_string(),
                hint: Some("Check the --dir path".to_string()),
            },
        }
    }
}
