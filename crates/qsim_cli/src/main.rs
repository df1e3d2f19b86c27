use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use qsim_core::{
    collect_documents, read_paragraphs, write_report, AnalysisConfig, Analyzer,
    CachedEmbeddingProvider, CaseMode, EmbeddingProvider, HashEmbeddingProvider, MergeStrategy,
    MiniLmEmbeddingProvider, QsimError, QuestionClassifier, ReportFormat, ReportOptions,
    SourceLabel, DEFAULT_EMBEDDING_DIM,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "qsim", version)]
#[command(about = "Find questions repeated across exam papers")]
struct Cli {
    /// Path to the all-MiniLM-L6-v2 .safetensors file. Without it a hashed
    /// bag-of-words embedding is used.
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Path to the tokenizer.json file. Required when --model-path is set.
    #[arg(long, global = true)]
    tokenizer_path: Option<PathBuf>,

    /// Compute each distinct text's embedding only once per run.
    #[arg(long, global = true)]
    cache: bool,

    /// JSON file with analysis settings; flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Group similar questions across two or more papers.
    Analyze {
        /// Paper files or directories containing them.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        merge: Option<MergeStrategy>,
        #[arg(long = "case")]
        case_mode: Option<CaseMode>,
        /// Accepted document extension (repeatable).
        #[arg(long = "extension")]
        extensions: Vec<String>,
        #[arg(long, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// JSON only: include per-paper counts around the groups.
        #[arg(long)]
        with_summary: bool,
        /// Write the report here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List the questions found in one paper.
    Extract {
        path: PathBuf,
        #[arg(long = "case")]
        case_mode: Option<CaseMode>,
        /// Show which rule accepted each paragraph.
        #[arg(long)]
        explain: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("QSIM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn make_embedder(cli: &Cli) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match (&cli.model_path, &cli.tokenizer_path) {
        (Some(model), Some(tokenizer)) => {
            info!(model = %model.display(), "loading embedding model");
            Box::new(MiniLmEmbeddingProvider::load(model, tokenizer)?)
        }
        (None, None) => Box::new(HashEmbeddingProvider::new(DEFAULT_EMBEDDING_DIM)),
        _ => anyhow::bail!("--model-path and --tokenizer-path must both be provided"),
    };

    if cli.cache {
        Ok(Box::new(CachedEmbeddingProvider::new(provider)))
    } else {
        Ok(provider)
    }
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("load config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;

    match &cli.command {
        Commands::Analyze {
            paths,
            threshold,
            merge,
            case_mode,
            extensions,
            format,
            with_summary,
            output,
        } => {
            if let Some(t) = threshold {
                config.threshold = *t;
            }
            if let Some(m) = merge {
                config.merge = *m;
            }
            if let Some(c) = case_mode {
                config.case_mode = *c;
            }
            if !extensions.is_empty() {
                config.extensions = extensions.clone();
            }

            let analyzer = Analyzer::new(config, make_embedder(cli)?)?;
            let documents = collect_documents(paths);
            let analysis = analyzer.analyze_files(&documents)?;

            let options = ReportOptions {
                format: *format,
                with_summary: *with_summary,
                ..ReportOptions::default()
            };
            match output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("create {}", path.display()))?;
                    let mut out = BufWriter::new(file);
                    write_report(&mut out, &analysis, &options)?;
                    out.flush().context("flush report")?;
                    eprintln!(
                        "groups={} questions={} report={}",
                        analysis.groups.len(),
                        analysis.unique_question_count,
                        path.display()
                    );
                }
                None => {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    write_report(&mut out, &analysis, &options)?;
                }
            }
        }
        Commands::Extract {
            path,
            case_mode,
            explain,
        } => {
            let classifier = QuestionClassifier::new(case_mode.unwrap_or(config.case_mode));
            let paragraphs = read_paragraphs(path)?;
            let questions = classifier.classify(&paragraphs, &SourceLabel::paper(0));

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for q in &questions {
                match classifier.matched_rule(&q.text).filter(|_| *explain) {
                    Some(rule) => writeln!(out, "[{}] {}", rule.as_str(), q.text)?,
                    None => writeln!(out, "{}", q.text)?,
                }
            }
        }
    }

    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<QsimError>() {
        Some(e) if e.is_client_error() => 2,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}
