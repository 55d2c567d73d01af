//! Getting the local index in step with the remote star set.
//!
//! [`reconcile::SyncReconciler`] works out what to add and remove,
//! [`pipeline::FetchPipeline`] turns new stars into indexed records, and
//! [`governor::RateLimitGovernor`] keeps every remote call inside the budget.

pub mod governor;
pub mod pipeline;
pub mod progress;
pub mod reconcile;

pub use governor::{RateBudget, RateLimitGovernor};
pub use pipeline::{FailedCandidate, FetchPipeline, RunReport};
pub use progress::{NoopObserver, ProgressObserver};
pub use reconcile::{SyncMode, SyncPlan, SyncReconciler, SyncReport};
