use std::io;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::CommandFactory;
use packstep::cli::{self, Cli, Commands};
use packstep::executor::RealCommandExecutor;
use tracing::error;

fn main() -> Result<()> {
    let args = cli::parse_args()?;
    packstep::init_logging(args.command.log_level())?;

    let result = match &args.command {
        Commands::Build(opts) => packstep::run_build(opts, Arc::new(RealCommandExecutor)),
        Commands::Validate(opts) => packstep::run_validate(opts),
        Commands::Plan(opts) => packstep::run_plan(opts),
        Commands::Completions(opts) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(opts.shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
    Ok(())
}
