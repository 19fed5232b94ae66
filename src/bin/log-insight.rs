use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log_insight::{
    Analyzer, AnalyzerOptions, Collaborators, FileResultSink, FsUploadSource, JobOptions,
    JobOrchestrator, JobStatus, MemoryStore, UploadId,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "log-insight", version, about = "Explain what went wrong in a log file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full analysis job over a log file and print the stored result
    Analyze {
        /// Log file to analyze
        file: PathBuf,

        /// Owner recorded on ingested lines and the report
        #[arg(long, default_value = "local")]
        owner: String,

        /// Write `job-{id}.json` here instead of keeping the result in memory
        #[arg(long = "results-dir")]
        results_dir: Option<PathBuf>,

        /// Seconds allowed for the generation call
        #[arg(long, default_value_t = 25)]
        timeout: u64,

        /// Lines of the file sent for analysis
        #[arg(long = "sample-lines", default_value_t = 200)]
        sample_lines: usize,

        /// Print the whole result envelope as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Get quick suggestions for a snippet of log text
    Query {
        /// Text to inspect
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = AnalyzerOptions::from_env();
    log::debug!("analyzer options: {:?}", options);

    let analyzer = Analyzer::new(options).context("failed to configure generation backend")?;
    if !analyzer.is_generation_enabled() {
        log::info!("no generation backend configured; results will be heuristic");
    }

    match cli.command {
        Command::Analyze {
            file,
            owner,
            results_dir,
            timeout,
            sample_lines,
            json,
        } => {
            analyze_file(
                analyzer,
                file,
                owner,
                results_dir,
                JobOptions::default()
                    .with_generation_timeout(Duration::from_secs(timeout))
                    .with_sample_lines(sample_lines),
                json,
            )
            .await
        }
        Command::Query { text } => {
            for suggestion in analyzer.suggest(&text).await? {
                println!("- {}", suggestion);
            }
            Ok(())
        }
    }
}

async fn analyze_file(
    analyzer: Analyzer,
    file: PathBuf,
    owner: String,
    results_dir: Option<PathBuf>,
    options: JobOptions,
    json: bool,
) -> anyhow::Result<()> {
    let upload_id = UploadId(1);
    let uploads = Arc::new(FsUploadSource::new());
    uploads.register(upload_id, &file, None);

    let mut collaborators = Collaborators::in_memory(Arc::new(MemoryStore::new()));
    collaborators.uploads = uploads.clone();
    if let Some(dir) = results_dir {
        collaborators = collaborators.with_results(Arc::new(FileResultSink::new(dir)));
    }

    let orchestrator = JobOrchestrator::new(Arc::new(analyzer), options, collaborators);
    let job = orchestrator.run(upload_id, owner).await?;

    if job.status == JobStatus::Failed {
        bail!(
            "job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        );
    }

    let envelope = orchestrator
        .result(job.id)
        .await?
        .with_context(|| format!("job {} finished without a stored result", job.id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    println!("{} [{}]", file.display(), envelope.result.source());
    println!("parsed lines: {}", uploads.parsed_count(upload_id));
    println!();
    println!("{}", envelope.result.summary());

    let suggestions = envelope.result.suggestions();
    if !suggestions.is_empty() {
        println!();
        for suggestion in suggestions {
            println!("- {}", suggestion);
        }
    }

    if let Some(report) = orchestrator.report(job.id).await? {
        println!();
        println!("{}", report.title);
        println!("{}", report.summary);
    }

    Ok(())
}
