//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use medirag::AppConfig;

/// Main CLI structure
#[derive(Debug, Parser)]
#[command(name = "medirag")]
#[command(about = "Educational health-information assistant backed by a local knowledge base", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the vector index (overrides PERSIST_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub persist_dir: Option<PathBuf>,

    /// Collection to read and write (overrides COLLECTION)
    #[arg(long, global = true, value_name = "NAME")]
    pub collection: Option<String>,

    /// Emit logs as JSON lines (same as LOG_FORMAT=json)
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index the documents in the data directory
    Ingest {
        /// Directory to scan for PDF, TXT and MD files (overrides DATA_DIR)
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,
        /// Replace the collection contents instead of adding to them
        #[arg(long)]
        rebuild: bool,
    },
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        #[arg(value_name = "QUESTION")]
        question: String,
    },
    /// Start the HTTP chat server
    Serve {
        /// Address to bind
        #[arg(long, env = "HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 5000)]
        port: u16,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.persist_dir {
            config.persist_dir = dir.clone();
        }
        if let Some(collection) = &self.collection {
            config.collection = collection.clone();
        }
        if let Commands::Ingest { data_dir: Some(dir), .. } = &self.command {
            config.data_dir = dir.clone();
        }
    }

    /// Whether logs should be JSON, from the flag or `LOG_FORMAT`.
    pub fn wants_json_logs(&self, log_format: Option<&str>) -> bool {
        self.log_json || log_format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_flags_override_config() {
        let cli = Cli::try_parse_from([
            "medirag",
            "ingest",
            "--data-dir",
            "docs",
            "--collection",
            "clinic",
            "--rebuild",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.data_dir, PathBuf::from("docs"));
        assert_eq!(config.collection, "clinic");
        assert!(matches!(cli.command, Commands::Ingest { rebuild: true, .. }));
    }

    #[test]
    fn ask_takes_question_verbatim() {
        let cli = Cli::try_parse_from(["medirag", "ask", "What is a fever?"]).unwrap();
        match cli.command {
            Commands::Ask { question } => assert_eq!(question, "What is a fever?"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::try_parse_from(["medirag", "ask", "q"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn json_logs_from_flag_or_env() {
        let cli = Cli::try_parse_from(["medirag", "--log-json", "ask", "q"]).unwrap();
        assert!(cli.wants_json_logs(None));

        let cli = Cli::try_parse_from(["medirag", "ask", "q"]).unwrap();
        assert!(cli.wants_json_logs(Some("JSON")));
        assert!(!cli.wants_json_logs(Some("pretty")));
        assert!(!cli.wants_json_logs(None));
    }

    #[test]
    fn question_is_required() {
        assert!(Cli::try_parse_from(["medirag", "ask"]).is_err());
    }
}
