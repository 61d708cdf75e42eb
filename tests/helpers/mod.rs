//! Shared fakes for the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use packstep::communicator::{Connector, Endpoint, Session};
use packstep::config::{Profile, load_profile};
use packstep::multistep::CancelToken;
use packstep::provisioners::{Hook, HookContext, HookEvent};
use packstep::ui::Ui;

/// A `Ui` that keeps everything it was told.
#[derive(Debug, Default)]
pub struct RecordingUi {
    lines: Mutex<Vec<(&'static str, String)>>,
}

#[allow(dead_code)]
impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines_of("error")
    }

    pub fn said(&self) -> Vec<String> {
        self.lines_of("say")
    }

    fn lines_of(&self, kind: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        self.lines.lock().unwrap().push(("say", message.to_string()));
    }

    fn message(&self, message: &str) {
        self.lines.lock().unwrap().push(("message", message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(("error", message.to_string()));
    }
}

/// Shared log of everything sent through fake sessions.
pub type CommandLog = Arc<Mutex<Vec<String>>>;

pub struct FakeSession {
    log: CommandLog,
    exit_code: i32,
}

impl Session for FakeSession {
    fn run(&mut self, command: &str) -> Result<i32> {
        self.log.lock().unwrap().push(command.to_string());
        Ok(self.exit_code)
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("<close>".to_string());
        Ok(())
    }
}

/// A connector that refuses the first `failures` attempts.
#[derive(Default)]
pub struct FakeConnector {
    pub failures: usize,
    pub exit_code: i32,
    pub attempts: AtomicUsize,
    pub endpoints: Mutex<Vec<Endpoint>>,
    pub log: CommandLog,
}

#[allow(dead_code)]
impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Self::default()
        })
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, endpoint: &Endpoint, _cancel: &CancelToken) -> Result<Box<dyn Session>> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            bail!("connection refused");
        }
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            exit_code: self.exit_code,
        }))
    }
}

/// A hook that counts its invocations and optionally fails or cancels.
#[derive(Default)]
pub struct RecordingHook {
    pub calls: AtomicUsize,
    pub had_session: Mutex<Vec<bool>>,
    pub fail: bool,
    /// Cancels the build from inside the hook, like an operator's interrupt.
    pub cancel_build: bool,
}

#[allow(dead_code)]
impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn cancelling() -> Arc<Self> {
        Arc::new(Self {
            cancel_build: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Hook for RecordingHook {
    fn run(&self, _event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.had_session.lock().unwrap().push(ctx.session.is_some());
        if self.cancel_build {
            ctx.cancel.cancel();
        }
        if self.fail {
            bail!("provisioner failed");
        }
        Ok(())
    }
}

/// Ordered log of calls made to a fake provider client.
#[derive(Debug, Default, Clone)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

/// Writes `yaml` to a temporary file and loads it as a profile.
#[allow(dead_code)]
pub fn load_profile_from_yaml(yaml: &str) -> Result<Profile> {
    let dir = tempfile::tempdir()?;
    let path = Utf8PathBuf::from_path_buf(dir.path().join("profile.yaml"))
        .map_err(|p| anyhow::anyhow!("non-utf8 temp path: {}", p.display()))?;
    std::fs::write(&path, yaml)?;
    Ok(load_profile(&path)?)
}
