use clap::{Parser, Subcommand};
use docqa::Result;
use docqa::commands::{ask, ingest_file, init_config, list_documents, show_config, show_status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Per-user PDF question answering backed by retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current configuration, or write a default one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a PDF document into a user's index
    Ingest {
        /// Path to the PDF file to index
        file: PathBuf,
        /// User identifier owning the index
        #[arg(long)]
        user: String,
    },
    /// Ask a question against a user's indexed documents
    Ask {
        /// The question to answer
        question: String,
        /// User identifier owning the index
        #[arg(long)]
        user: String,
        /// How many chunks to retrieve for context
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List the documents indexed for a user
    List {
        /// User identifier owning the index
        #[arg(long)]
        user: String,
    },
    /// Show connectivity to external services and storage state
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Ingest { file, user } => {
            ingest_file(&file, &user)?;
        }
        Commands::Ask {
            question,
            user,
            top_k,
        } => {
            ask(&question, &user, top_k)?;
        }
        Commands::List { user } => {
            list_documents(&user)?;
        }
        Commands::Status => {
            show_status()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docqa", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_with_user() {
        let cli = Cli::try_parse_from(["docqa", "ingest", "report.pdf", "--user", "a@b.com"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { file, user } = parsed.command {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert_eq!(user, "a@b.com");
            }
        }
    }

    #[test]
    fn ingest_requires_user() {
        let cli = Cli::try_parse_from(["docqa", "ingest", "report.pdf"]);
        assert!(cli.is_err());
    }

    #[test]
    fn ask_command_with_top_k() {
        let cli = Cli::try_parse_from([
            "docqa",
            "ask",
            "what is alpha?",
            "--user",
            "a@b.com",
            "--top-k",
            "5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                question,
                user,
                top_k,
            } = parsed.command
            {
                assert_eq!(question, "what is alpha?");
                assert_eq!(user, "a@b.com");
                assert_eq!(top_k, Some(5));
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docqa", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docqa", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docqa", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
