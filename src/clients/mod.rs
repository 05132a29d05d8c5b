//! # External Clients
//!
//! Capability traits for the services the lifecycle engine calls out to, each with a
//! process-local implementation. Remote failures surface as
//! [`SampleError::Upstream`](crate::error::SampleError::Upstream) so they abort only the
//! order being processed.

pub mod collection_sequence;
pub mod kv;
pub mod lis;
pub mod master_data;
pub mod tickets;

pub use collection_sequence::{
    CollectionDetails, CollectionSequenceClient, CollectionSequenceRequest,
    StaticCollectionSequence,
};
pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use lis::{
    LisCancellation, LisClient, LisModification, LisSyncRequest, RecordingLisClient,
};
pub use master_data::{InMemoryMasterData, MasterDataCache, VialType};
pub use tickets::{RecordingTicketService, SupportTicket, TicketService};
