//! Builders for the order-management rows the lifecycle services read.

use chrono::{DateTime, NaiveDate, Utc};
use sample_lifecycle::models::{OrderDetails, PatientDetails, TestStatus};
use sample_lifecycle::{LabId, MasterTestId, TestDetail};

use super::{TestWorld, LAB_MAIN};

pub struct OrderBuilder {
    order: OrderDetails,
}

impl OrderBuilder {
    /// Home-collection order at the main lab; the request id is `R-<order id>`
    pub fn new(oms_order_id: &str) -> Self {
        Self {
            order: OrderDetails {
                id: 0,
                oms_order_id: oms_order_id.to_string(),
                oms_request_id: format!("R-{oms_order_id}"),
                uuid: None,
                city_code: "BLR".to_string(),
                patient_details_id: 7,
                trf_id: None,
                servicing_lab_id: LAB_MAIN,
                collection_type: 0,
                bulk_order_id: None,
                collected_on: None,
            },
        }
    }

    pub fn request(mut self, oms_request_id: &str) -> Self {
        self.order.oms_request_id = oms_request_id.to_string();
        self
    }

    pub fn servicing_lab(mut self, lab_id: LabId) -> Self {
        self.order.servicing_lab_id = lab_id;
        self
    }

    pub fn trf(mut self, trf_id: &str) -> Self {
        self.order.trf_id = Some(trf_id.to_string());
        self
    }

    pub fn bulk(mut self, bulk_order_id: i64, collected_on: Option<DateTime<Utc>>) -> Self {
        self.order.bulk_order_id = Some(bulk_order_id);
        self.order.collected_on = collected_on;
        self
    }

    /// Store the order and its patient
    pub fn insert(self, world: &TestWorld) -> OrderDetails {
        world.store.insert_patient(PatientDetails {
            id: self.order.patient_details_id,
            name: "Asha Rao".to_string(),
            dob: NaiveDate::from_ymd_opt(1990, 4, 12),
            expected_dob: None,
            gender: "female".to_string(),
        });
        world.store.insert_order(self.order.clone());
        self.order
    }
}

pub struct TestBuilder {
    test: TestDetail,
}

impl TestBuilder {
    pub fn new(oms_order_id: &str, oms_test_id: &str, master_test_id: MasterTestId) -> Self {
        Self {
            test: TestDetail {
                id: 0,
                oms_order_id: oms_order_id.to_string(),
                oms_test_id: oms_test_id.to_string(),
                test_name: format!("Test {oms_test_id}"),
                city_code: "BLR".to_string(),
                task_id: None,
                lab_id: LAB_MAIN,
                processing_lab_id: LAB_MAIN,
                master_test_id,
                status: TestStatus::Requested,
                lab_eta: None,
                lab_tat: None,
            },
        }
    }

    pub fn processing_lab(mut self, lab_id: LabId) -> Self {
        self.test.processing_lab_id = lab_id;
        self
    }

    pub fn insert(self, world: &TestWorld) -> TestDetail {
        world.store.insert_test(self.test)
    }
}
