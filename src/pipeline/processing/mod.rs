// Pipeline processing: merging listing and detail data, then versioning it

pub mod dedupe;
pub mod reconcile;

pub use dedupe::{DedupeVersioner, VersionOutcome};
pub use reconcile::RecordReconciler;
