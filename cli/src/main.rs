use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::config;
use grader::{GeminiClient, RunOptions};

#[derive(Parser)]
#[command(name = "grader", version, about = "Grade assignment submissions using AI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    grade: GradeArgs,
}

#[derive(Args)]
struct GradeArgs {
    /// Data folder with one subfolder per submission.
    #[arg(short, long, default_value = "data")]
    data: PathBuf,

    /// Grading rubric markdown file.
    #[arg(short = 'p', long, default_value = "prompts/grading_prompt.md")]
    rubric: PathBuf,

    /// Output directory for feedback files.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Maximum number of submissions graded concurrently.
    #[arg(short = 'j', long, default_value_t = 5)]
    concurrency: usize,

    /// Extra gitignore-style exclude pattern (repeatable).
    #[arg(short = 'e', long = "exclude")]
    exclude: Vec<String>,

    /// Log level when LOG_LEVEL is not set (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze grading outputs and display statistics.
    Analyze {
        /// Output directory containing feedback files.
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Also save the report to <output>/stats.md.
        #[arg(short, long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    match cli.command {
        Some(Command::Analyze { output, save }) => run_analyze(&output, save),
        None => {
            let _log_guard = init_logging(&cli.grade.log_level);
            run_grade(cli.grade).await
        }
    }
}

async fn run_grade(args: GradeArgs) -> ExitCode {
    if !args.data.is_dir() {
        error!("data folder not found: {}", args.data.display());
        info!("create a data folder with one subfolder per submission, or pass --data");
        return ExitCode::FAILURE;
    }
    if !args.rubric.is_file() {
        error!("grading rubric not found: {}", args.rubric.display());
        info!(
            "create {} with your grading criteria, or pass --rubric",
            args.rubric.display()
        );
        return ExitCode::FAILURE;
    }

    let client = match GeminiClient::from_config() {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("{err}");
            info!("set GEMINI_API_KEY in .env or the environment");
            return ExitCode::FAILURE;
        }
    };

    // Let in-flight gradings finish on ctrl-c; just stop admitting new ones.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; waiting for in-flight gradings to finish");
                cancel.cancel();
            }
        });
    }

    let options = RunOptions {
        concurrency: args.concurrency.max(1),
        exclude_patterns: args.exclude,
        ..Default::default()
    };
    let result = match grader::run(
        &args.data,
        &args.rubric,
        &args.output,
        client,
        options,
        cancel,
    )
    .await
    {
        Ok(result) => result,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if result.total() == 0 {
        warn!(
            "no submissions found; add subfolders under {} with supported files",
            args.data.display()
        );
        return ExitCode::FAILURE;
    }

    info!(
        "grading complete: {}/{} succeeded",
        result.succeeded,
        result.total()
    );
    for failure in &result.failures {
        warn!(
            "{} failed during {}: {}",
            failure.submission, failure.stage, failure.error
        );
    }
    ExitCode::SUCCESS
}

fn run_analyze(output: &Path, save: bool) -> ExitCode {
    if !output.is_dir() {
        eprintln!("output directory not found: {}", output.display());
        return ExitCode::FAILURE;
    }

    let analysis = match analyzer::analyze_outputs(output) {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("failed to read {}: {err}", output.display());
            return ExitCode::FAILURE;
        }
    };

    let report = analyzer::format_stats_report(&analysis, output);
    println!("{report}");

    if save {
        let path = output.join("stats.md");
        if let Err(err) = std::fs::write(&path, &report) {
            eprintln!("failed to save {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
        println!("\nStats saved to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn init_logging(fallback_level: &str) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    std::fs::create_dir_all("logs").ok();

    let file_appender = tracing_appender::rolling::daily("logs", config::log_file());
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false);

    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(fallback_level.to_string()));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if config::log_to_stdout() {
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}
