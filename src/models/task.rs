//! # Task Model
//!
//! The lab-side work item that owns an order's in-house tests once its samples sync to
//! the LIS. At most one task exists per order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ids::{LabId, TaskId};
use super::order::OrderDetails;

pub const TASK_STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: TaskId,
    pub oms_order_id: String,
    pub oms_request_id: String,
    pub lab_id: LabId,
    pub city_code: String,
    pub status: String,
    pub previous_status: String,
    pub order_type: String,
    pub patient_details_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub oms_order_id: String,
    pub oms_request_id: String,
    pub lab_id: LabId,
    pub city_code: String,
    pub order_type: String,
    pub patient_details_id: i64,
}

impl NewTask {
    /// Pending, active task for an order, owned by its servicing lab
    pub fn for_order(order: &OrderDetails) -> Self {
        Self {
            oms_order_id: order.oms_order_id.clone(),
            oms_request_id: order.oms_request_id.clone(),
            lab_id: order.servicing_lab_id,
            city_code: order.city_code.clone(),
            order_type: order
                .collection_type()
                .map(|ct| ct.order_type().to_string())
                .unwrap_or_default(),
            patient_details_id: order.patient_details_id,
        }
    }

    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            oms_order_id: self.oms_order_id,
            oms_request_id: self.oms_request_id,
            lab_id: self.lab_id,
            city_code: self.city_code,
            status: TASK_STATUS_PENDING.to_string(),
            previous_status: TASK_STATUS_PENDING.to_string(),
            order_type: self.order_type,
            patient_details_id: self.patient_details_id,
            is_active: true,
            created_at: now,
        }
    }
}

/// Companion row created with every task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskMetadata {
    pub task_id: TaskId,
    pub contains_package: bool,
    pub is_critical: bool,
    pub last_event_sent_at: Option<DateTime<Utc>>,
}
