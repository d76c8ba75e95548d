//! Live ingestion of producer data into an observation database.
//!
//! Producers are registered in a [`ProducerRegistry`] and publish their
//! events on an [`EventBus`]. An [`IngestPipeline`] attaches every enabled
//! producer it handles: it stores the producer's description, one
//! datastream per enabled output and its feature of interest, then turns
//! each published record into an observation.
//!
//! Writes are batched into commits by a [`CommitScheduler`]; a
//! [`PurgePolicy`] can trim old records in the background.

pub mod bus;
pub mod commit;
pub mod error;
pub mod pipeline;
pub mod producer;
pub mod purge;
pub mod registry;

pub use bus::{EventBus, SubscriptionHandle};
pub use commit::{run_flush_task, CommitScheduler};
pub use error::IngestError;
pub use pipeline::{IngestPipeline, IngestSettings, PurgeSchedule, MAX_MEMBER_DEPTH};
pub use producer::{OutputDescriptor, Producer, ProducerEvent};
pub use purge::{run_purge_task, MaxAgePurgePolicy, PurgePolicy, PurgeReport};
pub use registry::{ProducerRegistry, RegistryEvent};
