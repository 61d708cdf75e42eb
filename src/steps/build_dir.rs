use std::borrow::Cow;
use std::fs;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::PackstepError;
use crate::multistep::{CancelToken, StateBag, StateKey, Step, StepAction};
use crate::try_step;

/// Scratch directory for the build, removed on cleanup whatever the outcome.
pub const BUILD_DIR: StateKey<Utf8PathBuf> = StateKey::new("build_dir");

/// Creates a uniquely named scratch directory (`packstep-<uuid>`).
///
/// The directory is created under `temp_path` when set, otherwise under the
/// system temporary directory.
#[derive(Debug)]
pub struct StepCreateBuildDir {
    temp_path: Option<Utf8PathBuf>,
    created: Option<Utf8PathBuf>,
}

impl StepCreateBuildDir {
    pub fn new(temp_path: Option<Utf8PathBuf>) -> Self {
        Self {
            temp_path,
            created: None,
        }
    }

    fn parent(&self) -> Result<Utf8PathBuf> {
        match &self.temp_path {
            Some(path) => Ok(path.clone()),
            None => Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|p| {
                PackstepError::Config(format!(
                    "system temporary directory is not valid UTF-8: {}",
                    p.display()
                ))
                .into()
            }),
        }
    }

    fn create(parent: &Utf8Path) -> Result<Utf8PathBuf> {
        fs::create_dir_all(parent)
            .map_err(|e| PackstepError::io(format!("failed to create {}", parent), e))?;
        let dir = parent.join(format!("packstep-{}", uuid::Uuid::new_v4()));
        fs::create_dir(&dir)
            .map_err(|e| PackstepError::io(format!("failed to create build directory {}", dir), e))?;
        Ok(dir)
    }
}

impl Step for StepCreateBuildDir {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("create-build-dir")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        state.ui().say("Creating build directory...");
        let parent = try_step!(state, self.parent());
        let dir = try_step!(state, Self::create(&parent));
        state.ui().message(&format!("Created build directory: {}", dir));

        self.created = Some(dir.clone());
        state.put(BUILD_DIR, dir);
        StepAction::Continue
    }

    fn cleanup(&mut self, state: &mut StateBag) -> Result<()> {
        let Some(dir) = self.created.take() else {
            return Ok(());
        };
        state.ui().say("Deleting build directory...");
        debug!("removing build directory {}", dir);
        state.remove(BUILD_DIR);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PackstepError::io(format!("failed to remove {}", dir), e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::TracingUi;
    use std::sync::Arc;

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .expect("path should be valid UTF-8");
        (temp, path)
    }

    #[test]
    fn test_creates_and_always_removes() {
        let (_temp, root) = utf8_tempdir();
        let mut step = StepCreateBuildDir::new(Some(root.clone()));
        let mut state = StateBag::new(Arc::new(TracingUi::default()));

        assert_eq!(step.run(&CancelToken::new(), &mut state), StepAction::Continue);
        let dir = state.get(BUILD_DIR).unwrap().clone();
        assert!(dir.is_dir());
        assert!(dir.file_name().unwrap().starts_with("packstep-"));
        assert!(dir.starts_with(&root));

        step.cleanup(&mut state).unwrap();
        assert!(!dir.exists());
        assert!(!state.contains(BUILD_DIR));
    }

    #[test]
    fn test_cleanup_without_run_is_noop() {
        let mut step = StepCreateBuildDir::new(None);
        let mut state = StateBag::new(Arc::new(TracingUi::default()));
        step.cleanup(&mut state).unwrap();
    }
}
