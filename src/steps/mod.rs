//! Steps shared by builders that work on the local filesystem.

mod build_dir;
mod output_dir;

pub use build_dir::{BUILD_DIR, StepCreateBuildDir};
pub use output_dir::{OUTPUT_DIR, StepOutputDir};
