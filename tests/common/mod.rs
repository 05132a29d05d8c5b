//! Shared in-memory world for integration tests.
//!
//! Every collaborator of [`LifecycleContext`] is a process-local fake, so the suites run
//! without a database or network. The fakes stay reachable through [`TestWorld`] for
//! seeding and for asserting on the calls the services made.

#![allow(dead_code)]

pub mod builders;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sample_lifecycle::clients::{
    InMemoryKeyValueStore, InMemoryMasterData, RecordingLisClient, RecordingTicketService,
    StaticCollectionSequence,
};
use sample_lifecycle::models::{Lab, MasterTest, SampleRecord, TestLabMeta};
use sample_lifecycle::samples::{Accession, AddBarcodesRequest, MarkCollectedRequest, TaskType};
use sample_lifecycle::store::InMemoryStore;
use sample_lifecycle::{
    CollectionPlanner, EventPublisher, LabId, LifecycleContext, MasterTestId, ReceivingDesk,
    RejectionService, SampleLifecycleConfig, SampleService, SampleStateMachine, UserId,
    VialTypeId,
};

pub use builders::{OrderBuilder, TestBuilder};

/// Receiving lab of most scenarios
pub const LAB_MAIN: LabId = LabId(10);
/// In-house sister lab
pub const LAB_SISTER: LabId = LabId(20);
/// Third-party lab
pub const LAB_PARTNER: LabId = LabId(30);

pub const VIAL_EDTA: VialTypeId = VialTypeId(5);
pub const VIAL_SERUM: VialTypeId = VialTypeId(6);

pub const MASTER_CBC: MasterTestId = MasterTestId(100);
pub const MASTER_ESR: MasterTestId = MasterTestId(101);
pub const MASTER_LIPID: MasterTestId = MasterTestId(102);
pub const MASTER_GTT: MasterTestId = MasterTestId(103);

pub const DESK_USER: UserId = UserId(42);

pub struct TestWorld {
    pub ctx: Arc<LifecycleContext>,
    pub store: Arc<InMemoryStore>,
    pub sequences: Arc<StaticCollectionSequence>,
    pub master_data: Arc<InMemoryMasterData>,
    pub lis: Arc<RecordingLisClient>,
    pub tickets: Arc<RecordingTicketService>,
    pub events: Arc<EventPublisher>,
    pub kv: Arc<InMemoryKeyValueStore>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(SampleLifecycleConfig::default())
    }

    /// World whose receiving desk accepts batches spanning several orders
    pub fn multi_order() -> Self {
        let mut config = SampleLifecycleConfig::default();
        config.receiving.multi_order_receiving_enabled = true;
        Self::with_config(config)
    }

    pub fn with_config(config: SampleLifecycleConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let sequences = Arc::new(StaticCollectionSequence::new());
        let master_data = Arc::new(InMemoryMasterData::new());
        let lis = Arc::new(RecordingLisClient::new());
        let tickets = Arc::new(RecordingTicketService::new());
        let events = Arc::new(EventPublisher::new(config.events.channel_capacity));
        let kv = Arc::new(InMemoryKeyValueStore::new());

        let ctx = Arc::new(LifecycleContext {
            config,
            store: store.clone(),
            orders: store.clone(),
            patients: store.clone(),
            tests: store.clone(),
            tasks: store.clone(),
            collection_sequence: sequences.clone(),
            master_data: master_data.clone(),
            lis: lis.clone(),
            tickets: tickets.clone(),
            events: events.clone(),
            kv: kv.clone(),
            state_machine: SampleStateMachine::new(),
        });

        let world = Self {
            ctx,
            store,
            sequences,
            master_data,
            lis,
            tickets,
            events,
            kv,
        };
        world.seed_catalogue();
        world
    }

    /// Three labs and four master tests:
    ///
    /// - CBC and ESR share an EDTA draw in sequence 1
    /// - Lipid needs a serum vial in sequence 1
    /// - GTT needs two EDTA draws in sequence 2
    ///
    /// Every test handed over by the main lab moves on to the sister lab.
    fn seed_catalogue(&self) {
        self.master_data.add_lab(Lab {
            id: LAB_MAIN,
            name: "Main".to_string(),
            inhouse: true,
        });
        self.master_data.add_lab(Lab {
            id: LAB_SISTER,
            name: "Sister".to_string(),
            inhouse: true,
        });
        self.master_data.add_lab(Lab {
            id: LAB_PARTNER,
            name: "Partner".to_string(),
            inhouse: false,
        });

        self.add_master_test(MASTER_CBC, "CBC", 1, 1, vec![VIAL_EDTA]);
        self.add_master_test(MASTER_ESR, "ESR", 1, 1, vec![VIAL_EDTA]);
        self.add_master_test(MASTER_LIPID, "Lipid Profile", 1, 1, vec![VIAL_SERUM]);
        self.add_master_test(MASTER_GTT, "GTT", 2, 2, vec![VIAL_EDTA]);
    }

    pub fn add_master_test(
        &self,
        id: MasterTestId,
        name: &str,
        sequence: i32,
        collections_count: u32,
        vials: Vec<VialTypeId>,
    ) {
        let test_lab_meta: HashMap<LabId, TestLabMeta> = [
            (
                LAB_MAIN,
                TestLabMeta {
                    lab_id: LAB_SISTER,
                    lab_tat: 6.0,
                },
            ),
            (
                LAB_SISTER,
                TestLabMeta {
                    lab_id: LAB_SISTER,
                    lab_tat: 12.5,
                },
            ),
        ]
        .into_iter()
        .collect();
        self.master_data.add_master_test(MasterTest {
            id,
            name: name.to_string(),
            collections_count,
            test_lab_meta,
        });
        self.sequences.register(id, sequence, vials);
    }

    pub fn planner(&self) -> CollectionPlanner {
        CollectionPlanner::new(self.ctx.clone())
    }

    pub fn samples(&self) -> SampleService {
        SampleService::new(self.ctx.clone())
    }

    pub fn desk(&self) -> ReceivingDesk {
        ReceivingDesk::new(self.ctx.clone())
    }

    pub fn rejections(&self) -> RejectionService {
        RejectionService::new(self.ctx.clone())
    }

    /// Live samples of an order in sample-number order, roots before derivatives
    pub fn live_samples(&self, oms_order_id: &str) -> Vec<SampleRecord> {
        let mut samples: Vec<SampleRecord> = self
            .store
            .all_samples_for_order(oms_order_id)
            .into_iter()
            .filter(|r| !r.sample.is_deleted())
            .collect();
        samples.sort_by_key(|r| (r.sample.sample_number, r.sample.parent_sample_id.is_some()));
        samples
    }

    pub fn root_samples(&self, oms_order_id: &str) -> Vec<SampleRecord> {
        self.live_samples(oms_order_id)
            .into_iter()
            .filter(|r| r.sample.is_root())
            .collect()
    }

    /// Plan the order, barcode every root sample as `<prefix>-<number>` and close the
    /// primary collection task. Returns the collected roots.
    pub async fn plan_and_collect(&self, oms_order_id: &str, barcode_prefix: &str) -> Vec<SampleRecord> {
        self.planner()
            .create_samples_for_order(oms_order_id, None)
            .await
            .expect("planning should succeed");

        let roots = self.root_samples(oms_order_id);
        let accessions = roots
            .iter()
            .map(|r| scanned(r, &format!("{barcode_prefix}-{}", r.sample.sample_number)))
            .collect();
        self.samples()
            .add_barcode_details(AddBarcodesRequest { accessions })
            .await
            .expect("barcodes should be accepted");

        let oms_request_id = roots[0].sample.oms_request_id.clone();
        self.samples()
            .mark_samples_collected(MarkCollectedRequest {
                oms_request_id,
                task_type: TaskType::Primary,
                task_sequence: None,
                collected_at: None,
            })
            .await
            .expect("collection should succeed");
        settle().await;
        self.root_samples(oms_order_id)
    }
}

/// A collector's scan of `barcode` onto `record`
pub fn scanned(record: &SampleRecord, barcode: &str) -> Accession {
    Accession {
        sample_id: record.id(),
        barcode: barcode.to_string(),
        barcode_image_url: format!("https://images.test/{barcode}.png"),
        barcode_scanned_at: Some(Utc::now()),
        collect_later_reason: String::new(),
    }
}

/// Wait for tasks spawned by the services (events, tickets, ETA updates) to run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}
