//! Everything that happens to a capture file after the profiler stops.

pub mod compress;
pub mod guard;
pub mod path;
pub mod pipeline;

pub use guard::{Cleanup, DeletionGuard};
pub use path::{resolve, CapturePath};
pub use pipeline::{Artifact, ArtifactJob, ArtifactPipeline, PipelineOutcome};
