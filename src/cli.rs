use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the build described by the given profile
    Build(BuildArgs),

    /// Validate the given YAML profile
    Validate(ValidateArgs),

    /// Print the steps the build would run
    Plan(PlanArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

/// Arguments shared by every profile-based subcommand.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the YAML file defining the profile
    #[arg(short, long, default_value = "profile.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Verbosity of the log output, mapped onto `tracing` levels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Commands {
    /// The log level requested on the command line; completions log at `warn`.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Build(opts) => opts.common.log_level,
            Self::Validate(opts) => opts.common.log_level,
            Self::Plan(opts) => opts.common.log_level,
            Self::Completions(_) => LogLevel::Warn,
        }
    }
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
