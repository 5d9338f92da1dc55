use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagetext::export::{Exporter, JsonExporter, TextExporter};
use pagetext::ocr::{
    OcrError, PopplerRasterizer, Rasterizer, RecognizeOptions, RecognizerChain,
    ScriptRecognizer, TesseractRecognizer, DEFAULT_LINE_THRESHOLD,
};
use pagetext::pipeline::{
    InputKind, Pipeline, PipelineConfig, DEFAULT_MIN_CONFIDENCE, DEFAULT_SCALE,
};
use pagetext::server::{self, AppState, ErrorResponse};

#[derive(Parser, Debug)]
#[command(name = "pagetext")]
#[command(version, about = "Extract reading-order text from PDFs and images with external OCR engines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recognize a single PDF or image and print the result
    Extract {
        /// Input PDF or image path
        input: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Write `document.<ext>` into this directory instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON and include error chains in failure reports
        #[arg(short, long)]
        debug: bool,

        #[command(flatten)]
        engines: EngineArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Serve the OCR pipeline over HTTP
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(short, long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// Per-request processing limit in seconds
        #[arg(long, env = "PAGETEXT_REQUEST_TIMEOUT", default_value_t = 300)]
        request_timeout: u64,

        #[command(flatten)]
        engines: EngineArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show the detected input kind and page count
    Info {
        /// Input PDF or image path
        input: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Format {
    Json,
    Text,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Engine {
    /// External recognizer script (PaddleOCR, EasyOCR, DocTR wrappers)
    Script,
    /// Local tesseract binary
    Tesseract,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Engines to try, in priority order
    #[arg(long = "engine", value_enum, value_delimiter = ',', default_values_t = vec![Engine::Script, Engine::Tesseract])]
    engines: Vec<Engine>,

    /// Recognizer script for the `script` engine
    #[arg(long, env = "PAGETEXT_SCRIPT", default_value = "ocr/bridge/ocr_bridge.py")]
    script: PathBuf,

    /// Interpreter used to run the recognizer script
    #[arg(long, env = "PAGETEXT_PYTHON", default_value = "python3")]
    python: PathBuf,

    /// Tesseract language when a request names none
    #[arg(long, env = "PAGETEXT_TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Language hints passed to the engine (comma separated)
    #[arg(long, value_delimiter = ',')]
    lang: Vec<String>,

    /// Ask the engine to run on GPU
    #[arg(long)]
    gpu: bool,

    /// Drop detections below this confidence (0 keeps everything)
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f64,

    /// Drop detections with fewer characters than this
    #[arg(long, default_value_t = 1)]
    min_text_chars: usize,

    /// Vertical pixel distance that starts a new line
    #[arg(long, default_value_t = DEFAULT_LINE_THRESHOLD)]
    line_threshold: f32,

    /// PDF rasterization zoom (1.0 = 72 DPI)
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    scale: f32,

    /// Otsu-binarize page images before recognition
    #[arg(long)]
    binarize: bool,
}

impl EngineArgs {
    fn chain(&self) -> RecognizerChain {
        self.engines
            .iter()
            .fold(RecognizerChain::new(), |chain, engine| match engine {
                Engine::Script => chain.push(Arc::new(
                    ScriptRecognizer::new(self.script.clone())
                        .with_interpreter(self.python.clone()),
                )),
                Engine::Tesseract => {
                    chain.push(Arc::new(TesseractRecognizer::new(&self.tesseract_lang)))
                }
            })
    }
}

impl PipelineArgs {
    fn config(&self) -> Result<PipelineConfig> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            anyhow::bail!("--min-confidence must be within [0, 1]");
        }
        if !self.line_threshold.is_finite() || self.line_threshold < 0.0 {
            anyhow::bail!("--line-threshold must be a non-negative number");
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            anyhow::bail!("--scale must be positive");
        }
        Ok(PipelineConfig {
            line_threshold: self.line_threshold,
            min_confidence: self.min_confidence,
            min_text_chars: self.min_text_chars,
            scale: self.scale,
            binarize: self.binarize,
            recognize: RecognizeOptions {
                languages: self.lang.clone(),
                gpu: self.gpu,
            },
        })
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results only.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagetext=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let debug = matches!(cli.command, Commands::Extract { debug: true, .. });

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = ErrorResponse {
                error: format!("{e:#}"),
                traceback: debug.then(|| format!("{e:?}")),
            };
            match serde_json::to_string(&report) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Extract {
            input,
            format,
            output,
            debug,
            engines,
            pipeline,
        } => extract(input, format, output, debug, &engines, &pipeline),
        Commands::Serve {
            host,
            port,
            request_timeout,
            engines,
            pipeline,
        } => serve(
            SocketAddr::new(host, port),
            Duration::from_secs(request_timeout),
            &engines,
            &pipeline,
        ),
        Commands::Info { input } => show_info(input),
    }
}

fn extract(
    input: PathBuf,
    format: Format,
    output: Option<PathBuf>,
    debug: bool,
    engines: &EngineArgs,
    args: &PipelineArgs,
) -> Result<()> {
    let config = args.config()?;
    let engine = engines
        .chain()
        .select()
        .context("OCR engine initialization failed")?;
    let pipeline = Pipeline::new(engine).with_config(config);

    let document = pipeline
        .process_file(&input)
        .with_context(|| format!("failed to process {}", input.display()))?;

    let exporter: Box<dyn Exporter> = match format {
        Format::Json => Box::new(JsonExporter::new().pretty(debug)),
        Format::Text => Box::new(TextExporter::new()),
    };

    match output {
        Some(dir) => {
            let path = exporter
                .export(&document, &dir)
                .with_context(|| format!("failed to export to: {}", dir.display()))?;
            tracing::info!(path = %path.display(), "result written");
        }
        None => {
            let rendered = exporter.render(&document)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if format == Format::Json {
                writeln!(stdout)?;
            }
        }
    }

    Ok(())
}

fn serve(
    addr: SocketAddr,
    request_timeout: Duration,
    engines: &EngineArgs,
    args: &PipelineArgs,
) -> Result<()> {
    let config = args.config()?;

    tracing::info!("starting pagetext server v{}", env!("CARGO_PKG_VERSION"));
    let state = match engines.chain().select() {
        Ok(engine) => AppState::new(Pipeline::new(engine).with_config(config), request_timeout),
        Err(OcrError::NoEngine(attempts)) => {
            tracing::error!("no OCR engine could be initialized; /process_document will answer 503");
            AppState::unavailable(attempts, request_timeout)
        }
        Err(e) => return Err(e).context("OCR engine initialization failed"),
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(server::serve(state, addr))
}

fn show_info(input: PathBuf) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let kind = InputKind::from_path(&input)?;
    let page_count = match kind {
        InputKind::Pdf => PopplerRasterizer::new()
            .page_count(&input)
            .with_context(|| format!("Failed to open PDF: {}", input.display()))?,
        InputKind::Image => 1,
    };

    println!("Input Information");
    println!("=================");
    println!("File: {}", input.display());
    println!("Kind: {:?}", kind);
    println!("Pages: {}", page_count);

    Ok(())
}
