//! Dashboard assembly and polling

pub mod orchestrator;
pub mod poller;

pub use orchestrator::{DashboardOrchestrator, SnapshotSource};
pub use poller::{DashboardState, Poller, PollerHandle};
