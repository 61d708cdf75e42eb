pub mod artifact;
pub mod builder;
pub mod builders;
pub mod cli;
pub mod communicator;
pub mod config;
pub mod error;
pub mod executor;
pub mod multistep;
pub mod provisioners;
pub mod steps;
pub mod ui;

pub use error::PackstepError;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::builder::Builder;
use crate::builders::hyperv::{HypervBuilder, PowerShellDriver};
use crate::communicator::CommunicatorConfig;
use crate::config::{BuilderConfig, Profile};
use crate::executor::CommandExecutor;
use crate::provisioners::{Hook, ProvisionerHook};
use crate::ui::{TracingUi, Ui};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads and prepares a profile, logging its warnings.
fn prepared_profile(opts: &cli::CommonArgs) -> Result<Profile> {
    let mut profile = config::load_profile(&opts.file)
        .with_context(|| format!("failed to load profile from {}", opts.file))?;
    let warnings = profile.prepare().context("profile validation failed")?;
    for warning in &warnings {
        warn!("{}", warning);
    }
    Ok(profile)
}

/// Creates a builder whose provider backend is available on this machine.
///
/// Only Hyper-V qualifies: its driver runs PowerShell through `executor`.
/// Cloud builders and the SSH communicator need client and connector
/// implementations supplied through the library API.
pub fn local_builder(
    profile: &Profile,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Box<dyn Builder>, PackstepError> {
    if profile.communicator != CommunicatorConfig::None {
        return Err(PackstepError::Config(format!(
            "the {} communicator needs a connector and cannot be used from the command line",
            profile.communicator.name()
        )));
    }
    match &profile.builder {
        BuilderConfig::HypervVmcx(config) => {
            let driver = PowerShellDriver::new(executor, config.powershell.clone());
            Ok(Box::new(HypervBuilder::new(
                config.clone(),
                profile.communicator.clone(),
                Arc::new(driver),
            )))
        }
        other => Err(PackstepError::Config(format!(
            "the {} builder needs a provider client and cannot be run from the command line",
            other.name()
        ))),
    }
}

pub fn run_build(opts: &cli::BuildArgs, executor: Arc<dyn CommandExecutor>) -> Result<()> {
    let profile = prepared_profile(&opts.common)?;
    let builder = local_builder(&profile, executor)?;

    let ui: Arc<dyn Ui> = Arc::new(TracingUi::default());
    let hook: Arc<dyn Hook> = Arc::new(ProvisionerHook::new(profile.provisioners.clone()));

    info!(builder = builder.name(), "starting build");
    match builder.run(ui, hook).context("build failed")? {
        Some(artifact) => info!(builder_id = artifact.builder_id(), "{}", artifact),
        None => info!("build finished without an artifact"),
    }
    Ok(())
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = prepared_profile(&opts.common)?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}

pub fn run_plan(opts: &cli::PlanArgs) -> Result<()> {
    let profile = prepared_profile(&opts.common)?;
    let plan = profile.plan();
    println!("{} build plan ({} steps):", profile.builder.name(), plan.len());
    for (index, step) in plan.iter().enumerate() {
        println!("  {}. {}", index + 1, step);
    }
    Ok(())
}
