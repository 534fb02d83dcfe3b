//! CLI commands and argument parsing

use crate::types::ErrorPolicy;
use clap::{Parser, Subcommand};

/// Batch ETL for video trending statistics
#[derive(Parser, Debug)]
#[command(name = "trending-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job definition: a built-in job name or a YAML file
    #[arg(short = 'j', long, global = true, default_value = "youtube-statistics")]
    pub job_def: String,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the job and publish the dataset
    Run {
        /// Name of this run, recorded in logs; output file names use the run id
        #[arg(long)]
        job_name: String,

        /// Override the source location (local path or s3://, gs://, az:// URL)
        #[arg(long)]
        source: Option<String>,

        /// Override the destination location
        #[arg(short, long)]
        destination: Option<String>,

        /// Override the error policy
        #[arg(long)]
        policy: Option<ErrorPolicy>,

        /// Override the quarantine location for rejected records
        #[arg(long)]
        quarantine: Option<String>,

        /// Files read, mapped and written in parallel
        #[arg(long)]
        concurrency: Option<usize>,

        /// Stage everything, then discard instead of publishing
        #[arg(long)]
        no_commit: bool,
    },

    /// Validate the job definition
    Validate,

    /// Show the output schema of the job
    Schema,

    /// Summarize a published dataset
    Inspect {
        /// Dataset location (local path or cloud URL)
        path: String,

        /// Sample rows to print per partition
        #[arg(long, default_value = "0")]
        rows: usize,
    },

    /// List built-in jobs
    List,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "trending-etl",
            "run",
            "--job-name",
            "daily",
            "--destination",
            "/tmp/out",
            "--policy",
            "lenient",
            "--quarantine",
            "/tmp/rejected",
            "--no-commit",
        ])
        .unwrap();

        assert_eq!(cli.job_def, "youtube-statistics");
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Run {
                job_name,
                destination,
                policy,
                no_commit,
                source,
                ..
            } => {
                assert_eq!(job_name, "daily");
                assert_eq!(destination.as_deref(), Some("/tmp/out"));
                assert_eq!(policy, Some(ErrorPolicy::Lenient));
                assert!(no_commit);
                assert!(source.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_job_name() {
        assert!(Cli::try_parse_from(["trending-etl", "run"]).is_err());
    }

    #[test]
    fn test_job_name_help_describes_logging_only() {
        let command = Cli::command();
        let run = command.find_subcommand("run").unwrap();
        let help = run
            .get_arguments()
            .find(|arg| arg.get_id() == "job_name")
            .and_then(|arg| arg.get_help())
            .unwrap()
            .to_string();
        assert!(help.contains("recorded in logs"), "{help}");
        assert!(!help.contains("used in logs and output file names"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trending-etl",
            "validate",
            "--job-def",
            "jobs/custom.yaml",
            "--format",
            "pretty",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.job_def, "jobs/custom.yaml");
        assert_eq!(cli.format, OutputFormat::Pretty);
        assert!(cli.verbose);
    }
}
