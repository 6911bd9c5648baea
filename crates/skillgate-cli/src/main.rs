//! skillgate CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(
    name = "skillgate",
    version,
    about = "Multi-level skill assessments generated per candidate"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and sample inputs
    Init,

    /// Extract a structured job description or resume from free text
    Parse {
        /// What the input document is: job or resume
        #[arg(long)]
        kind: String,

        /// Free-text input file
        #[arg(long)]
        input: PathBuf,

        /// Write the JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Start an assessment and print the level 1 questions
    Start {
        /// Candidate identifier
        #[arg(long)]
        candidate_id: String,

        /// Structured job description (JSON)
        #[arg(long)]
        job: PathBuf,

        /// Structured resume (JSON)
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Write the question sheet here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Submit answers for the level awaiting them
    Submit {
        /// Assessment id
        #[arg(long)]
        assessment: Uuid,

        /// Level the answers are for (1, 2, 3 or its name)
        #[arg(long)]
        level: String,

        /// JSON object mapping question id to an option or list of options
        #[arg(long)]
        answers: PathBuf,

        /// Write the outcome here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show one assessment, or list all of them
    Status {
        /// Assessment id; omit to list every stored assessment
        #[arg(long)]
        assessment: Option<Uuid>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Finish a level whose generation was interrupted
    Recover {
        /// Assessment id
        #[arg(long)]
        assessment: Uuid,
    },

    /// Render the report of an assessment
    Report {
        /// Assessment id
        #[arg(long)]
        assessment: Uuid,

        /// Output format: json, markdown
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("skillgate=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Parse {
            kind,
            input,
            output,
        } => commands::parse::execute(kind, input, output, config).await,
        Commands::Start {
            candidate_id,
            job,
            resume,
            output,
        } => commands::start::execute(candidate_id, job, resume, output, config).await,
        Commands::Submit {
            assessment,
            level,
            answers,
            output,
        } => commands::submit::execute(assessment, level, answers, output, config).await,
        Commands::Status { assessment, format } => {
            commands::status::execute(assessment, format, config).await
        }
        Commands::Recover { assessment } => commands::recover::execute(assessment, config).await,
        Commands::Report {
            assessment,
            format,
            output,
        } => commands::report::execute(assessment, format, output, config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
