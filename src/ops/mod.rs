//! Package operations: short-hash resolution, export, registry sync

mod export;
mod resolve;
mod sync;

pub use export::{ExportOptions, Exporter};
pub use resolve::resolve_prefix;
pub use sync::{PullSummary, PushSummary, RegistrySync};
