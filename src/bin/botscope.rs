use anyhow::Context;
use botscope::aggregate::{ActivityAggregator, AggregateOpts, Granularity};
use botscope::config::PipelineOpts;
use botscope::{Classifier, Encoding, ParseDiagnostics, ParsedRecord, Pipeline, SignatureTable};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON record per line
    Records,
    /// Activity summary plus per-input diagnostics
    Summary,
    /// Per-input diagnostics only
    Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BucketArg {
    #[value(name = "1min")]
    Minute,
    #[value(name = "5min")]
    FiveMinutes,
    #[value(name = "1h")]
    Hour,
}

impl From<BucketArg> for Granularity {
    fn from(b: BucketArg) -> Self {
        match b {
            BucketArg::Minute => Granularity::Minute,
            BucketArg::FiveMinutes => Granularity::FiveMinutes,
            BucketArg::Hour => Granularity::Hour,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "botscope", version, about = "Access-log ingestion with bot and AI-agent classification")]
struct Cli {
    /// Input files (`-` for stdin). Each file is decoded on its own.
    #[arg(required = false)]
    input: Vec<String>,

    /// Skip detection and decode as this encoding (utf-8, utf-16le, utf-16be, latin-1, cp1252)
    #[arg(long = "encoding")]
    encoding: Option<String>,

    /// Extra signature rows (JSON array), appended to their tier. May be repeated.
    #[arg(long = "signatures")]
    signatures: Vec<PathBuf>,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Records)]
    format: OutputFormat,

    /// Stop after this many records
    #[arg(long = "limit")]
    limit: Option<usize>,

    /// Assemble records on a thread pool (`--jobs` alone uses every core)
    #[arg(long = "jobs", num_args = 0..=1, default_missing_value = "0")]
    jobs: Option<usize>,
    /// Entries per parallel chunk
    #[arg(long = "chunk-entries", default_value_t = 10_000)]
    chunk_entries: usize,

    // Summary options
    #[arg(long = "granularity", value_enum, default_value_t = BucketArg::Minute)]
    granularity: BucketArg,
    #[arg(long = "spike-k", default_value_t = 3.0)]
    spike_k: f64,
    #[arg(long = "min-samples", default_value_t = 10)]
    min_samples: usize,
    #[arg(long = "top", default_value_t = 50)]
    top: usize,
    /// Leave Other/Unknown traffic out of the path, IP and section tables
    #[arg(long = "exclude-other", default_value_t = false)]
    exclude_other: bool,

    /// Session fingerprint window in seconds
    #[arg(long = "session-window", default_value_t = botscope::config::DEFAULT_SESSION_WINDOW_SECS)]
    session_window: i64,
    /// Failed entries kept per input for inspection
    #[arg(long = "failure-samples", default_value_t = botscope::config::DEFAULT_FAILURE_SAMPLES)]
    failure_samples: usize,

    /// Diagnostic log format on stderr (filter with RUST_LOG)
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Debug, Serialize)]
struct InputReport {
    input: String,
    encoding: Encoding,
    diagnostics: ParseDiagnostics,
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let ansi = atty::is(atty::Stream::Stderr);
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(io::stderr)).try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(ansi).with_writer(io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_ansi(ansi).with_writer(io::stderr))
            .try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

fn init_parallelism(jobs: usize) {
    let n = if jobs == 0 { num_cpus::get() } else { jobs };
    if let Err(err) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
        tracing::warn!(%err, "rayon pool already initialized");
    }
}

fn build_classifier(paths: &[PathBuf], cache: usize) -> anyhow::Result<Classifier> {
    let mut table = SignatureTable::builtin();
    for p in paths {
        let rows = SignatureTable::load_json_file(p)
            .with_context(|| format!("loading signatures from {}", p.display()))?;
        table.extend(rows);
    }
    Ok(Classifier::new(table, cache)?)
}

fn open_source(path: &str) -> anyhow::Result<Box<dyn Read>> {
    if path == "-" {
        Ok(Box::new(io::stdin()))
    } else {
        let f = File::open(path).with_context(|| format!("opening {path}"))?;
        Ok(Box::new(f))
    }
}

fn write_json<W: Write, T: Serialize>(mut w: W, value: &T, pretty: bool) -> anyhow::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut w, value)?;
    } else {
        serde_json::to_writer(&mut w, value)?;
    }
    w.write_all(b"\n")?;
    Ok(())
}

/// Where records go: JSON lines on stdout, or the summary aggregator.
struct Sink {
    format: OutputFormat,
    limit: Option<usize>,
    emitted: usize,
    out: BufWriter<io::Stdout>,
    aggregator: ActivityAggregator,
    pretty: bool,
}

impl Sink {
    fn new(cli: &Cli) -> Self {
        let opts = AggregateOpts {
            granularity: cli.granularity.into(),
            spike_multiplier: cli.spike_k,
            min_samples: cli.min_samples,
            top_n: cli.top,
            include_other: !cli.exclude_other,
        };
        Self {
            format: cli.format,
            limit: cli.limit,
            emitted: 0,
            out: BufWriter::new(io::stdout()),
            aggregator: ActivityAggregator::new(opts),
            pretty: atty::is(atty::Stream::Stdout),
        }
    }

    fn full(&self) -> bool {
        self.limit.map_or(false, |l| self.emitted >= l)
    }

    fn accept(&mut self, rec: &ParsedRecord) -> anyhow::Result<()> {
        self.emitted += 1;
        match self.format {
            OutputFormat::Records => {
                serde_json::to_writer(&mut self.out, rec)?;
                self.out.write_all(b"\n")?;
            }
            OutputFormat::Summary => self.aggregator.push(rec),
            OutputFormat::Diagnostics => {}
        }
        Ok(())
    }

    fn finish(mut self, reports: Vec<InputReport>) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Records => {
                self.out.flush()?;
                // stdout carries records only; diagnostics go beside the logs
                write_json(io::stderr().lock(), &reports, atty::is(atty::Stream::Stderr))?;
            }
            OutputFormat::Summary => {
                let summary = self.aggregator.finish();
                let doc = serde_json::json!({ "inputs": reports, "summary": summary });
                write_json(&mut self.out, &doc, self.pretty)?;
            }
            OutputFormat::Diagnostics => write_json(&mut self.out, &reports, self.pretty)?,
        }
        self.out.flush()?;
        Ok(())
    }
}

fn run_streaming<R: Read>(
    pipeline: &Pipeline,
    src: R,
    sink: &mut Sink,
    running: &AtomicBool,
) -> anyhow::Result<(Encoding, ParseDiagnostics)> {
    let mut stream = pipeline.stream(src)?;
    while running.load(Ordering::SeqCst) && !sink.full() {
        match stream.next() {
            Some(rec) => sink.accept(&rec?)?,
            None => break,
        }
    }
    Ok((stream.encoding(), stream.into_diagnostics()))
}

fn run_chunked<R: Read>(
    pipeline: &Pipeline,
    src: R,
    chunk_entries: usize,
    sink: &mut Sink,
    running: &AtomicBool,
) -> anyhow::Result<(Encoding, ParseDiagnostics)> {
    let mut write_err: Option<anyhow::Error> = None;
    let result = pipeline.parse_in_chunks(src, chunk_entries, |records| {
        for rec in &records {
            if !running.load(Ordering::SeqCst) || sink.full() {
                return ControlFlow::Break(());
            }
            if let Err(e) = sink.accept(rec) {
                write_err = Some(e);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    })?;
    match write_err {
        Some(e) => Err(e),
        None => Ok(result),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;
    if let Some(jobs) = cli.jobs {
        init_parallelism(jobs);
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        if let Err(err) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
            tracing::warn!(%err, "Ctrl-C handler not installed");
        }
    }

    let forced = match cli.encoding.as_deref() {
        Some(label) => Some(Encoding::from_label(label).with_context(|| format!("unknown encoding '{label}'"))?),
        None => None,
    };
    let opts = PipelineOpts {
        failure_samples: cli.failure_samples,
        session_window_secs: cli.session_window,
        ..PipelineOpts::default()
    };
    let classifier = build_classifier(&cli.signatures, opts.classifier_cache)?;
    let pipeline = Pipeline::new(classifier, opts).with_encoding(forced);

    let inputs = if cli.input.is_empty() { vec!["-".to_string()] } else { cli.input.clone() };
    let mut sink = Sink::new(&cli);
    let mut reports = Vec::with_capacity(inputs.len());
    for input in &inputs {
        if !running.load(Ordering::SeqCst) || sink.full() {
            break;
        }
        let src = open_source(input)?;
        let (encoding, diagnostics) = if cli.jobs.is_some() {
            run_chunked(&pipeline, src, cli.chunk_entries, &mut sink, &running)?
        } else {
            run_streaming(&pipeline, src, &mut sink, &running)?
        };
        reports.push(InputReport { input: input.clone(), encoding, diagnostics });
    }
    if !running.load(Ordering::SeqCst) {
        tracing::warn!("interrupted; reporting partial results");
    }
    sink.finish(reports)
}
