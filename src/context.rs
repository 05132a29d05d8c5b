//! # Lifecycle Context
//!
//! The explicitly constructed set of collaborators every workflow service runs against.
//! Nothing in the crate reaches for a global client; services hold an
//! `Arc<LifecycleContext>` and call through its capability traits.

use std::sync::Arc;

use sqlx::PgPool;

use crate::clients::{
    CollectionSequenceClient, KeyValueStore, LisClient, MasterDataCache, TicketService,
};
use crate::config::SampleLifecycleConfig;
use crate::events::EventBus;
use crate::guard::IdempotencyGuard;
use crate::lookups::{OrderLookup, PatientLookup, PgLookups, TaskService, TestLookup};
use crate::state_machine::SampleStateMachine;
use crate::store::{PgSampleStore, SampleStore};

pub struct LifecycleContext {
    pub config: SampleLifecycleConfig,
    pub store: Arc<dyn SampleStore>,
    pub orders: Arc<dyn OrderLookup>,
    pub patients: Arc<dyn PatientLookup>,
    pub tests: Arc<dyn TestLookup>,
    pub tasks: Arc<dyn TaskService>,
    pub collection_sequence: Arc<dyn CollectionSequenceClient>,
    pub master_data: Arc<dyn MasterDataCache>,
    pub lis: Arc<dyn LisClient>,
    pub tickets: Arc<dyn TicketService>,
    pub events: Arc<dyn EventBus>,
    pub kv: Arc<dyn KeyValueStore>,
    pub state_machine: SampleStateMachine,
}

/// Remote collaborators that have no Postgres backing in this crate
pub struct ExternalClients {
    pub collection_sequence: Arc<dyn CollectionSequenceClient>,
    pub master_data: Arc<dyn MasterDataCache>,
    pub lis: Arc<dyn LisClient>,
    pub tickets: Arc<dyn TicketService>,
    pub events: Arc<dyn EventBus>,
    pub kv: Arc<dyn KeyValueStore>,
}

impl LifecycleContext {
    /// Wire the Postgres store and lookups over one pool
    pub fn with_postgres(
        config: SampleLifecycleConfig,
        pool: PgPool,
        clients: ExternalClients,
    ) -> Self {
        let lookups = Arc::new(PgLookups::new(pool.clone()));
        Self {
            config,
            store: Arc::new(PgSampleStore::new(pool)),
            orders: lookups.clone(),
            patients: lookups.clone(),
            tests: lookups.clone(),
            tasks: lookups,
            collection_sequence: clients.collection_sequence,
            master_data: clients.master_data,
            lis: clients.lis,
            tickets: clients.tickets,
            events: clients.events,
            kv: clients.kv,
            state_machine: SampleStateMachine::new(),
        }
    }

    /// Per-order receive guard built from the receiving config
    pub fn receive_guard(&self) -> IdempotencyGuard {
        IdempotencyGuard::new(
            self.kv.clone(),
            self.config.receiving.lock_key_prefix.clone(),
            self.config.receiving.lock_ttl(),
        )
    }
}
