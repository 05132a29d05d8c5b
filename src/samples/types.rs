use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::messages;
use crate::error::{Result, SampleError};
use crate::models::{LabId, SampleId, SampleRecord, TestSampleMapping, UserId};

/// Which collection task a collector is closing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Primary,
    Recollection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkCollectedRequest {
    pub oms_request_id: String,
    pub task_type: TaskType,
    /// Required for recollection tasks
    pub task_sequence: Option<i64>,
    pub collected_at: Option<DateTime<Utc>>,
}

impl MarkCollectedRequest {
    pub fn validate(&self) -> Result<()> {
        if self.oms_request_id.trim().is_empty() {
            return Err(SampleError::validation(messages::REQUEST_ID_REQUIRED));
        }
        if self.task_type == TaskType::Recollection && self.task_sequence.is_none() {
            return Err(SampleError::validation(messages::TASK_ID_REQUIRED));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceCollectedRequest {
    pub oms_order_id: String,
    pub sample_numbers: Vec<i32>,
    pub collected_at: Option<DateTime<Utc>>,
    pub user_id: UserId,
}

impl ForceCollectedRequest {
    pub fn validate(&self) -> Result<()> {
        if self.oms_order_id.trim().is_empty() || self.sample_numbers.is_empty() {
            return Err(SampleError::validation(messages::INVALID_PARAMETERS));
        }
        Ok(())
    }
}

/// Barcode details captured by a collector for one sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accession {
    pub sample_id: SampleId,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub barcode_image_url: String,
    pub barcode_scanned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub collect_later_reason: String,
}

impl Accession {
    pub fn barcode(&self) -> Option<&str> {
        Some(self.barcode.trim()).filter(|b| !b.is_empty())
    }

    pub fn collect_later_reason(&self) -> Option<&str> {
        Some(self.collect_later_reason.trim()).filter(|r| !r.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.sample_id.is_unset() {
            return Err(SampleError::validation(messages::SAMPLE_ID_REQUIRED));
        }
        match self.barcode() {
            None if self.collect_later_reason().is_none() => Err(SampleError::validation(
                messages::BARCODE_OR_REASON_REQUIRED,
            )),
            Some(_)
                if self.barcode_image_url.trim().is_empty()
                    || self.barcode_scanned_at.is_none() =>
            {
                Err(SampleError::validation(messages::BARCODE_IMAGE_REQUIRED))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddBarcodesRequest {
    pub accessions: Vec<Accession>,
}

impl AddBarcodesRequest {
    /// Field checks, then barcode uniqueness within the batch
    pub fn validate(&self) -> Result<()> {
        if self.accessions.is_empty() {
            return Err(SampleError::validation(messages::INVALID_PARAMETERS));
        }
        for accession in &self.accessions {
            accession.validate()?;
        }
        let mut seen = HashSet::new();
        if self
            .accessions
            .iter()
            .filter_map(Accession::barcode)
            .any(|barcode| !seen.insert(barcode))
        {
            return Err(SampleError::conflict(messages::DUPLICATE_BARCODE));
        }
        Ok(())
    }

    pub fn barcodes(&self) -> Vec<String> {
        self.accessions
            .iter()
            .filter_map(Accession::barcode)
            .map(str::to_string)
            .collect()
    }
}

/// The request and order a volume update landed on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeAdded {
    pub oms_request_id: String,
    pub oms_order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskSequenceRequest {
    pub oms_request_id: String,
    pub task_id: i64,
    pub oms_test_ids: Vec<String>,
}

impl UpdateTaskSequenceRequest {
    pub fn validate(&self) -> Result<()> {
        if self.oms_request_id.trim().is_empty() {
            return Err(SampleError::validation(messages::REQUEST_ID_REQUIRED));
        }
        if self.task_id == 0 {
            return Err(SampleError::validation(messages::TASK_ID_REQUIRED));
        }
        if self.oms_test_ids.is_empty() {
            return Err(SampleError::validation(messages::TEST_IDS_REQUIRED));
        }
        Ok(())
    }
}

/// One LIS visit of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitDetails {
    pub visit_id: String,
    pub lab_id: Option<LabId>,
    pub collected_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Every live sample of an order with its mappings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleDetails {
    pub samples: Vec<SampleRecord>,
    pub mappings: Vec<TestSampleMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accession(barcode: &str, reason: &str) -> Accession {
        Accession {
            sample_id: SampleId(1),
            barcode: barcode.to_string(),
            barcode_image_url: "https://img/1.png".to_string(),
            barcode_scanned_at: Some(Utc::now()),
            collect_later_reason: reason.to_string(),
        }
    }

    #[test]
    fn test_accession_needs_barcode_or_reason() {
        let request = AddBarcodesRequest {
            accessions: vec![accession("", "")],
        };
        assert_eq!(
            request.validate().unwrap_err(),
            SampleError::validation(messages::BARCODE_OR_REASON_REQUIRED)
        );

        let request = AddBarcodesRequest {
            accessions: vec![accession("", "Patient unavailable")],
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_barcode_needs_image_and_scan_time() {
        let mut only_barcode = accession("BC1", "");
        only_barcode.barcode_scanned_at = None;
        let request = AddBarcodesRequest {
            accessions: vec![only_barcode],
        };
        assert_eq!(
            request.validate().unwrap_err(),
            SampleError::validation(messages::BARCODE_IMAGE_REQUIRED)
        );
    }

    #[test]
    fn test_duplicate_barcodes_in_batch_conflict() {
        let mut second = accession(" BC1", "");
        second.sample_id = SampleId(2);
        let request = AddBarcodesRequest {
            accessions: vec![accession("BC1", ""), second],
        };
        assert_eq!(
            request.validate().unwrap_err(),
            SampleError::conflict(messages::DUPLICATE_BARCODE)
        );
    }

    #[test]
    fn test_recollection_needs_task_sequence() {
        let request = MarkCollectedRequest {
            oms_request_id: "R1".to_string(),
            task_type: TaskType::Recollection,
            task_sequence: None,
            collected_at: None,
        };
        assert_eq!(
            request.validate().unwrap_err(),
            SampleError::validation(messages::TASK_ID_REQUIRED)
        );
    }
}
