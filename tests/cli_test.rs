use anyhow::Result;
use clap::Parser;
use packstep::cli::{Cli, Commands, LogLevel};

#[test]
fn test_parse_build_command() -> Result<()> {
    let args = Cli::parse_from(["packstep", "build", "--file", "hyperv.yml"]);

    match args.command {
        Commands::Build(opts) => {
            assert_eq!(opts.common.file, "hyperv.yml");
            assert_eq!(opts.common.log_level, LogLevel::Info);
        }
        _ => panic!("Expected Build command"),
    }

    Ok(())
}

#[test]
fn test_parse_build_command_with_log_level() -> Result<()> {
    let args = Cli::parse_from(["packstep", "build", "-f", "hyperv.yml", "--log-level", "debug"]);

    assert_eq!(args.command.log_level(), LogLevel::Debug);
    match args.command {
        Commands::Build(opts) => assert_eq!(opts.common.file, "hyperv.yml"),
        _ => panic!("Expected Build command"),
    }

    Ok(())
}

#[test]
fn test_parse_validate_command_defaults_file() -> Result<()> {
    let args = Cli::parse_from(["packstep", "validate"]);

    match args.command {
        Commands::Validate(opts) => assert_eq!(opts.common.file, "profile.yaml"),
        _ => panic!("Expected Validate command"),
    }

    Ok(())
}

#[test]
fn test_parse_plan_command() -> Result<()> {
    let args = Cli::parse_from(["packstep", "plan", "--file", "osc.yml", "-l", "warn"]);

    match args.command {
        Commands::Plan(opts) => {
            assert_eq!(opts.common.file, "osc.yml");
            assert_eq!(opts.common.log_level, LogLevel::Warn);
        }
        _ => panic!("Expected Plan command"),
    }

    Ok(())
}

#[test]
fn test_completions_log_quietly() {
    let args = Cli::parse_from(["packstep", "completions", "bash"]);
    assert_eq!(args.command.log_level(), LogLevel::Warn);
}

#[test]
fn test_invalid_log_level_rejected() {
    let result = Cli::try_parse_from(["packstep", "build", "--log-level", "verbose"]);
    assert!(result.is_err());
}

#[test]
fn test_missing_subcommand_rejected() {
    assert!(Cli::try_parse_from(["packstep"]).is_err());
}
