//! # Order and Patient Models
//!
//! Read-only views of order-management records used for planning and receiving.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ids::LabId;

/// How the order's samples reach the lab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    HomeCollection,
    PartnerDropOff,
    PickUpFromPartner,
    Camp,
}

impl CollectionType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::HomeCollection),
            1 => Some(Self::PartnerDropOff),
            2 => Some(Self::PickUpFromPartner),
            3 => Some(Self::Camp),
            _ => None,
        }
    }

    /// Order type recorded on tasks
    pub fn order_type(&self) -> &'static str {
        match self {
            Self::HomeCollection => "at_home",
            Self::PartnerDropOff => "lab_dropoff",
            Self::PickUpFromPartner => "at_clinic",
            Self::Camp => "at_camp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderDetails {
    pub id: i64,
    pub oms_order_id: String,
    pub oms_request_id: String,
    pub uuid: Option<Uuid>,
    pub city_code: String,
    pub patient_details_id: i64,
    pub trf_id: Option<String>,
    pub servicing_lab_id: LabId,
    pub collection_type: i32,
    pub bulk_order_id: Option<i64>,
    pub collected_on: Option<DateTime<Utc>>,
}

impl OrderDetails {
    /// Orders created from a paper test requisition form
    pub fn is_trf_order(&self) -> bool {
        self.trf_id.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_bulk_order(&self) -> bool {
        self.bulk_order_id.is_some_and(|id| id != 0)
    }

    pub fn collection_type(&self) -> Option<CollectionType> {
        CollectionType::from_code(self.collection_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PatientDetails {
    pub id: i64,
    pub name: String,
    pub dob: Option<NaiveDate>,
    pub expected_dob: Option<NaiveDate>,
    pub gender: String,
}

impl PatientDetails {
    /// Completed years at `today`, from the recorded or the expected date of birth
    pub fn age_years(&self, today: NaiveDate) -> u32 {
        let Some(dob) = self.dob.or(self.expected_dob) else {
            return 0;
        };
        if dob > today {
            return 0;
        }
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).unwrap_or(0)
    }
}
