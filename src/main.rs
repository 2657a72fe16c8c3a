use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

use fuzzytail_color::ColorEngine;
use fuzzytail_logs::{
    FilterSpec, HeaderMode, OutputFormat, OutputSink, Pipeline, SinkError, SourceSpec,
    StreamOptions, StreamProcessor, TailMode,
};

mod config;
mod theme;

use config::{CliOverrides, EnvVars, FileConfig, Settings};

/// Exit status when a source failed or output could not be written
const EXIT_FAILURE: i32 = 1;

/// Exit status for bad configuration, detected before anything is read
const EXIT_CONFIG: i32 = 2;

/// Logs shown when no file is given and stdin is a terminal
const DEFAULT_LOGS: &[&str] = &[
    "/var/log/syslog",
    "/var/log/messages",
    "/var/log/auth.log",
    "/var/log/kern.log",
];

/// ft - a colorful tail with rule-based highlighting
#[derive(Parser, Debug)]
#[command(name = "ft")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files to read; `-` reads standard input
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Number of lines to show from the end of each file
    #[arg(short = 'n', long, default_value = "10")]
    lines: usize,

    /// Show the last NUM bytes instead of lines
    #[arg(short = 'c', long, value_name = "NUM", conflicts_with = "lines")]
    bytes: Option<u64>,

    /// Keep reading as the files grow
    #[arg(short, long)]
    follow: bool,

    /// Never print file name headers
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Always print file name headers
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Theme name
    #[arg(long, value_name = "NAME")]
    theme: Option<String>,

    /// Read rules from this file instead of a named theme
    #[arg(long, value_name = "PATH")]
    theme_file: Option<PathBuf>,

    /// Disable colors
    #[arg(long)]
    no_color: bool,

    /// Only show lines matching this regex
    #[arg(long, value_name = "REGEX")]
    include: Option<String>,

    /// Hide lines matching this regex
    #[arg(long, value_name = "REGEX")]
    exclude: Option<String>,

    /// Only show lines at or above this level
    #[arg(long, value_name = "LEVEL")]
    level: Option<String>,

    /// Output format: text, json or csv
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Read buffer size in bytes
    #[arg(long, value_name = "BYTES")]
    buffer_size: Option<usize>,

    /// Wait between checks for new data in follow mode, in milliseconds
    #[arg(long, value_name = "MS")]
    retry_interval: Option<u64>,

    /// Print debug diagnostics to stderr
    #[arg(long)]
    debug: bool,

    /// List the built-in themes and exit
    #[arg(long)]
    list_themes: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    let code = run(args).await;

    // A pending stdin read would keep the runtime from shutting down
    std::process::exit(code);
}

fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> i32 {
    if args.list_themes {
        for name in theme::builtin_names() {
            println!("{}", name);
        }
        return 0;
    }

    let (settings, pipeline) = match prepare(&args) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("ft: {:#}", e);
            return EXIT_CONFIG;
        }
    };

    let Some(sources) = resolve_sources(&args.files) else {
        print_hints();
        return 0;
    };

    let headers = HeaderMode::from_flags(args.quiet, args.verbose).enabled(sources.len());
    let sink = OutputSink::stdout(args.format).with_headers(headers);
    let options = StreamOptions {
        tail: match args.bytes {
            Some(bytes) => TailMode::Bytes(bytes),
            None => TailMode::Lines(args.lines),
        },
        follow: args.follow,
        retry_interval: settings.retry_interval,
        buffer_size: settings.buffer_size,
    };
    let processor = StreamProcessor::new(pipeline, sink, options);

    let cancel = processor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted");
            cancel.cancel();
        }
    });

    match processor.run(&sources).await {
        Ok(summary) => {
            debug!(
                lines_read = summary.lines_read,
                lines_emitted = summary.lines_emitted,
                failures = summary.failures.len(),
                "done"
            );
            if summary.is_success() { 0 } else { EXIT_FAILURE }
        }
        Err(SinkError::Closed) => 0,
        Err(e) => {
            eprintln!("ft: {}", e);
            EXIT_FAILURE
        }
    }
}

/// Resolve settings and compile filter and color rules
fn prepare(args: &Args) -> Result<(Settings, Pipeline)> {
    let env = EnvVars::from_env();
    let cli = CliOverrides {
        config: args.config.clone(),
        theme: args.theme.clone(),
        buffer_size: args.buffer_size,
        retry_interval_ms: args.retry_interval,
        no_color: args.no_color,
    };

    let file = match config::config_path(&cli, &env) {
        Some((path, explicit)) => FileConfig::load(&path, explicit)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&cli, &env, &file)?;
    debug!(?settings, "resolved settings");

    let filter = FilterSpec::new(
        args.include.as_deref(),
        args.exclude.as_deref(),
        args.level.as_deref(),
    )?;

    let engine = if settings.color && args.format.colorizes() {
        let rules = theme::load_rules(&settings, args.theme_file.as_deref())?;
        Some(ColorEngine::new(Arc::new(rules)))
    } else {
        None
    };

    Ok((settings, Pipeline::new(filter, engine)))
}

/// Sources named on the command line, stdin when it is piped, or the first
/// readable system log
fn resolve_sources(files: &[PathBuf]) -> Option<Vec<SourceSpec>> {
    if !files.is_empty() {
        return Some(files.iter().map(|f| SourceSpec::from_arg(f)).collect());
    }

    if !std::io::stdin().is_terminal() {
        return Some(vec![SourceSpec::Stdin]);
    }

    let path = DEFAULT_LOGS.iter().map(PathBuf::from).find(|path| {
        std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
            && std::fs::File::open(path).is_ok()
    })?;
    eprintln!("ft: no files given, showing {}", path.display());
    Some(vec![SourceSpec::File(path)])
}

fn print_hints() {
    eprintln!("ft: no files given and no readable system log found. Try:");
    eprintln!("  ft /var/log/syslog       show the end of a log");
    eprintln!("  ft -f app.log            follow a log as it grows");
    eprintln!("  some-command | ft        colorize piped output");
    eprintln!("  ft --help                list all options");
}
