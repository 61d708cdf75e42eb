//! Provisioning: running user-supplied configuration against the machine.
//!
//! Builders do not know about provisioners. They insert a [`StepProvision`]
//! into their sequence, which fires the [`Hook`] seeded in the state bag
//! with the communicator session opened by the connect step.

pub mod shell;

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

pub use shell::ShellProvisioner;

use crate::communicator::{SESSION, Session};
use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, StateKey, Step, StepAction};
use crate::try_step;
use crate::ui::Ui;

/// The hook fired by [`StepProvision`], seeded by the builder.
pub const HOOK: StateKey<Arc<dyn Hook>> = StateKey::new("hook");

/// Points in a build where hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum HookEvent {
    Provision,
}

/// What a hook gets to work with.
pub struct HookContext<'a> {
    pub ui: Arc<dyn Ui>,
    /// `None` when the build uses the `none` communicator.
    pub session: Option<&'a mut dyn Session>,
    pub cancel: &'a CancelToken,
}

/// Something to run at a [`HookEvent`].
pub trait Hook: Send + Sync {
    fn run(&self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()>;
}

/// A hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl Hook for NoopHook {
    fn run(&self, _event: HookEvent, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Provisioner definition. The `type` field selects the variant.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProvisionerConfig {
    /// Runs inline shell commands over the communicator.
    Shell(ShellProvisioner),
}

impl ProvisionerConfig {
    /// Returns a human-readable name with type prefix.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Self::Shell(p) => Cow::Owned(format!("shell:{}", p.name())),
        }
    }

    pub fn validate(&self) -> Result<(), PackstepError> {
        match self {
            Self::Shell(p) => p.validate(),
        }
    }

    pub fn provision(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        match self {
            Self::Shell(p) => p.provision(ctx),
        }
    }
}

/// Runs configured provisioners, in order, on [`HookEvent::Provision`].
#[derive(Debug, Default, Clone)]
pub struct ProvisionerHook {
    provisioners: Vec<ProvisionerConfig>,
}

impl ProvisionerHook {
    pub fn new(provisioners: Vec<ProvisionerConfig>) -> Self {
        Self { provisioners }
    }
}

impl Hook for ProvisionerHook {
    fn run(&self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        if event != HookEvent::Provision {
            return Ok(());
        }
        let total = self.provisioners.len();
        for (index, provisioner) in self.provisioners.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(PackstepError::Cancelled {
                    what: "provisioning".to_string(),
                }
                .into());
            }
            info!("running provisioner {}/{}: {}", index + 1, total, provisioner.name());
            ctx.ui
                .say(&format!("Provisioning with {}...", provisioner.name()));
            provisioner
                .provision(ctx)
                .with_context(|| format!("provisioner {} failed", provisioner.name()))?;
        }
        Ok(())
    }
}

/// Fires the provision hook against the connected machine.
#[derive(Debug, Default)]
pub struct StepProvision;

impl Step for StepProvision {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("provision")
    }

    fn run(&mut self, cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let hook = try_step!(state, state.get(HOOK).cloned());
        let ui = state.ui();
        let result = {
            let session = state.get_mut(SESSION).ok().map(|s| &mut **s as &mut dyn Session);
            let mut ctx = HookContext { ui, session, cancel };
            hook.run(HookEvent::Provision, &mut ctx)
        };
        try_step!(state, result);
        StepAction::Continue
    }
}
