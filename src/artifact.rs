//! Durable build outputs.

use std::fmt;

use anyhow::Result;
use camino::Utf8PathBuf;

/// The result of a successful build: an image, snapshot, template or a set
/// of exported files.
///
/// `id` and `string` are pure functions of the artifact's immutable fields.
/// `destroy` performs a real delete through the provider client the artifact
/// was created with, and surfaces the provider's error if the resource is
/// already gone.
pub trait Artifact: fmt::Debug + Send {
    /// Identifies the builder that produced this artifact (e.g. `hcloud.snapshot`).
    fn builder_id(&self) -> &'static str;

    /// Provider identifier of the artifact.
    fn id(&self) -> String;

    /// Local files belonging to the artifact, if any.
    fn files(&self) -> Vec<Utf8PathBuf> {
        Vec::new()
    }

    /// Human-readable description.
    fn string(&self) -> String;

    /// Deletes the artifact.
    fn destroy(&self) -> Result<()>;
}

impl fmt::Display for dyn Artifact + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string())
    }
}
