use std::fs;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use crate::artifact::Artifact;
use crate::error::PackstepError;

pub const BUILDER_ID: &str = "hyperv.vmcx";

/// An exported Hyper-V machine in a local directory.
#[derive(Debug, Clone)]
pub struct HypervArtifact {
    dir: Utf8PathBuf,
    files: Vec<Utf8PathBuf>,
}

fn collect_files(dir: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> Result<(), PackstepError> {
    let entries = dir
        .read_dir_utf8()
        .map_err(|e| PackstepError::io(format!("failed to read {}", dir), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PackstepError::io(format!("failed to read {}", dir), e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| PackstepError::io(format!("failed to stat {}", entry.path()), e))?;
        if file_type.is_dir() {
            collect_files(entry.path(), files)?;
        } else {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(())
}

impl HypervArtifact {
    /// Lists every file below `dir`.
    pub fn from_dir(dir: impl Into<Utf8PathBuf>) -> Result<Self, PackstepError> {
        let dir = dir.into();
        let mut files = Vec::new();
        collect_files(&dir, &mut files)?;
        files.sort();
        Ok(Self { dir, files })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

impl Artifact for HypervArtifact {
    fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    fn id(&self) -> String {
        "VM".to_string()
    }

    fn files(&self) -> Vec<Utf8PathBuf> {
        self.files.clone()
    }

    fn string(&self) -> String {
        format!("VM files in directory: {}", self.dir)
    }

    fn destroy(&self) -> Result<()> {
        tracing::info!(dir = %self.dir, "removing exported virtual machine");
        fs::remove_dir_all(&self.dir).with_context(|| format!("failed to remove {}", self.dir))
    }
}
