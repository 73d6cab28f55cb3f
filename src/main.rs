//! identify: report the content type of files from their magic signatures

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use sift::config::MAGIC_ENV;
use sift::{MagicSource, MatchResult, Options, Report, SignatureStore, Subject, format, identify_all};

#[derive(Parser, Debug)]
#[command(name = "identify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files to identify; `-` reads standard input
    #[arg(value_name = "PATH")]
    files: Vec<String>,

    /// Print MIME type strings instead of descriptions
    #[arg(short = 'i', long)]
    mime: bool,

    /// Print only the top-level description
    #[arg(short, long)]
    brief: bool,

    /// Do not fall back to text/binary heuristics
    #[arg(short, long)]
    raw: bool,

    /// Magic files or directories to load instead of the built-in database
    #[arg(short, long = "magic-file", env = MAGIC_ENV, value_delimiter = ':')]
    magic_file: Vec<PathBuf>,

    /// Read the names of the files to identify from this file, one per line
    #[arg(short, long = "files-from")]
    files_from: Option<PathBuf>,

    /// Do not prefix output lines with file names
    #[arg(short = 'N', long = "no-filename")]
    no_filename: bool,

    /// Print the known extensions for the detected type
    #[arg(long)]
    extension: bool,

    /// Append the MIME type to the description
    #[arg(long = "with-mime")]
    with_mime: bool,

    /// Emit one JSON array describing every input
    #[arg(long)]
    json: bool,

    /// Number of leading bytes to read from each input
    #[arg(short = 'P', long = "bytes-max")]
    bytes_max: Option<usize>,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    dereference: bool,

    /// List the loaded rules with their strengths and exit
    #[arg(short, long)]
    list: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("identify: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let store = load_store(&cli.magic_file).context("failed to load magic database")?;
    tracing::info!(rules = store.len(), prefix_len = store.prefix_len(), "magic database ready");

    let mut out = io::stdout().lock();
    if cli.list {
        for (strength, rule) in store.list() {
            writeln!(
                out,
                "Strength = {strength:>3} @ line {:>4}: {} [{}]",
                rule.line(),
                rule.description(),
                rule.mime().unwrap_or("")
            )?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let subjects = collect_subjects(cli)?;
    if subjects.is_empty() {
        anyhow::bail!("no files to identify (use `-` for standard input)");
    }

    let options = Options::new()
        .with_mime_only(cli.mime)
        .with_brief(cli.brief)
        .with_raw(cli.raw)
        .with_mime_annotation(cli.with_mime)
        .with_extension(cli.extension)
        .with_dereference(cli.dereference)
        .with_max_bytes(cli.bytes_max);

    let reports = identify_all(&subjects, &store, &options);

    if cli.json {
        write_json(&mut out, &reports, &options)?;
    } else {
        write_lines(&mut out, &reports, &options, cli.no_filename)?;
    }
    out.flush()?;

    if reports.iter().all(Report::is_ok) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn load_store(paths: &[PathBuf]) -> Result<SignatureStore> {
    if paths.is_empty() {
        return Ok(SignatureStore::builtin()?);
    }
    let sources: Vec<MagicSource> = paths.iter().cloned().map(MagicSource::Path).collect();
    Ok(SignatureStore::load_all(&sources)?)
}

fn collect_subjects(cli: &Cli) -> Result<Vec<Subject>> {
    let mut subjects = Vec::new();
    if let Some(list) = &cli.files_from {
        subjects.extend(read_names(list)?);
    }
    subjects.extend(cli.files.iter().map(|arg| Subject::parse(arg)));
    Ok(subjects)
}

fn read_names(list: &Path) -> Result<Vec<Subject>> {
    let reader: Box<dyn BufRead> = if list == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(list)
            .with_context(|| format!("cannot open file list {}", list.display()))?;
        Box::new(BufReader::new(file))
    };

    let mut subjects = Vec::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("cannot read file list {}", list.display()))?;
        let name = line.trim_end_matches('\r');
        if !name.is_empty() {
            subjects.push(Subject::parse(name));
        }
    }
    Ok(subjects)
}

fn write_lines(
    out: &mut impl Write,
    reports: &[Report],
    options: &Options,
    no_filename: bool,
) -> Result<()> {
    let width = reports.iter().map(|report| report.name.len()).max().unwrap_or(0);

    for report in reports {
        match &report.outcome {
            Ok(result) => {
                let text = format(result, options);
                if no_filename {
                    writeln!(out, "{text}")?;
                } else {
                    let label = format!("{}:", report.name);
                    writeln!(out, "{label:<pad$} {text}", pad = width + 1)?;
                }
            }
            Err(err) => eprintln!("identify: {err}"),
        }
    }
    Ok(())
}

fn write_json(out: &mut impl Write, reports: &[Report], options: &Options) -> Result<()> {
    let entries: Vec<JsonEntry<'_>> = reports
        .iter()
        .map(|report| match &report.outcome {
            Ok(result) => JsonEntry {
                name: &report.name,
                output: Some(format(result, options)),
                result: Some(result),
                error: None,
            },
            Err(err) => JsonEntry {
                name: &report.name,
                output: None,
                result: None,
                error: Some(err.to_string()),
            },
        })
        .collect();

    serde_json::to_writer_pretty(&mut *out, &entries).context("failed to write JSON output")?;
    writeln!(out)?;
    Ok(())
}
