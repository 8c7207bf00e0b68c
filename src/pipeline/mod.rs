pub mod client;
pub mod dispatcher;
pub mod identity;
pub mod models;
pub mod queue;
pub mod transform;

pub use client::{BillingClient, DeliveryOutcome};
pub use dispatcher::{
    deliver_entry, run_cycle, spawn as spawn_dispatcher, CycleStats, DispatcherConfig,
    DispatcherHandle,
};
pub use identity::IdentityResolver;
pub use models::{BillingEvent, CustomerMapping, QueueEntry, QueueStatus, UsageRecord};
pub use queue::{EnqueueOutcome, QueueStats, QueueStore};
pub use transform::transform;
