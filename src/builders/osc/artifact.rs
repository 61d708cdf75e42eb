use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::OscClient;
use crate::artifact::Artifact;

pub const BUILDER_ID: &str = "osc.omi";

/// An OMI registered in one region.
pub struct OscArtifact {
    pub omi_id: String,
    pub region: String,
    client: Arc<dyn OscClient>,
}

impl OscArtifact {
    pub fn new(omi_id: String, region: String, client: Arc<dyn OscClient>) -> Self {
        Self {
            omi_id,
            region,
            client,
        }
    }
}

impl fmt::Debug for OscArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OscArtifact")
            .field("omi_id", &self.omi_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl Artifact for OscArtifact {
    fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    fn id(&self) -> String {
        format!("{}:{}", self.region, self.omi_id)
    }

    fn string(&self) -> String {
        format!("OMIs were created:\n{}: {}", self.region, self.omi_id)
    }

    fn destroy(&self) -> Result<()> {
        tracing::info!(omi = %self.omi_id, region = %self.region, "deregistering OMI");
        self.client
            .delete_omi(&self.omi_id)
            .with_context(|| format!("failed to deregister OMI {}", self.omi_id))
    }
}
