use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::HcloudClient;
use crate::artifact::Artifact;

pub const BUILDER_ID: &str = "hcloud.snapshot";

/// A Hetzner Cloud snapshot.
pub struct HcloudArtifact {
    pub snapshot_id: String,
    pub snapshot_name: String,
    client: Arc<dyn HcloudClient>,
}

impl HcloudArtifact {
    pub fn new(snapshot_id: String, snapshot_name: String, client: Arc<dyn HcloudClient>) -> Self {
        Self {
            snapshot_id,
            snapshot_name,
            client,
        }
    }
}

impl fmt::Debug for HcloudArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HcloudArtifact")
            .field("snapshot_id", &self.snapshot_id)
            .field("snapshot_name", &self.snapshot_name)
            .finish_non_exhaustive()
    }
}

impl Artifact for HcloudArtifact {
    fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    fn id(&self) -> String {
        self.snapshot_id.clone()
    }

    fn string(&self) -> String {
        format!("A snapshot was created: '{}' (ID: {})", self.snapshot_name, self.snapshot_id)
    }

    fn destroy(&self) -> Result<()> {
        tracing::info!(snapshot_id = %self.snapshot_id, "destroying snapshot");
        self.client
            .delete_image(&self.snapshot_id)
            .with_context(|| format!("failed to delete snapshot {}", self.snapshot_id))
    }
}
