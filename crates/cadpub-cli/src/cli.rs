use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cadpub",
    about = "cadpub: CAD derivative publishing toolkit",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print every storage key of a project revision
    Keys(KeysArgs),
    /// Recover the project name from a storage key
    ParseKey(ParseKeyArgs),
    /// Load and validate a settings file
    CheckConfig(CheckConfigArgs),
    /// Assemble the descriptor of a revision from a filesystem store
    Describe(DescribeArgs),
}

#[derive(Args)]
pub struct KeysArgs {
    pub project: String,
    pub hash: String,
}

#[derive(Args)]
pub struct ParseKeyArgs {
    pub key: String,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct DescribeArgs {
    pub project: String,
    pub hash: String,
    /// Root directory of the filesystem object store
    #[arg(long)]
    pub store: PathBuf,
    /// Bucket below the store root
    #[arg(long, default_value = "models")]
    pub bucket: String,
    /// Base URL of signed download links
    #[arg(long, default_value = "http://localhost:8080/")]
    pub signing_base: String,
    /// The model is an assembly
    #[arg(long)]
    pub assembly: bool,
    /// The model has drawing sheets
    #[arg(long)]
    pub has_drawings: bool,
    /// Settings file; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_describe() {
        let cli = Cli::try_parse_from([
            "cadpub", "describe", "Wrench", "h1", "--store", "/srv/oss", "--assembly", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let Command::Describe(args) = cli.command else {
            panic!("expected describe");
        };
        assert_eq!(args.project, "Wrench");
        assert_eq!(args.bucket, "models");
        assert!(args.assembly);
        assert!(!args.has_drawings);
        assert!(args.config.is_none());
    }

    #[test]
    fn parses_global_flags_anywhere() {
        let cli = Cli::try_parse_from(["cadpub", "-v", "parse-key", "projects-Wrench"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn describe_requires_store() {
        assert!(Cli::try_parse_from(["cadpub", "describe", "Wrench", "h1"]).is_err());
    }
}
