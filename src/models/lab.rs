//! # Labs and Master Tests
//!
//! Master data used for routing. Both maps are built once per request from the
//! master-data cache and are not mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::ids::{LabId, MasterTestId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub id: LabId,
    pub name: String,
    /// Operated by the organisation itself (a sister facility when not the session lab)
    pub inhouse: bool,
}

/// Routing classification of a destination lab relative to the receiving lab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabType {
    Inhouse,
    Interlab,
    Outsource,
}

impl fmt::Display for LabType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inhouse => write!(f, "inhouse"),
            Self::Interlab => write!(f, "interlab"),
            Self::Outsource => write!(f, "outsource"),
        }
    }
}

/// Immutable `LabId -> Lab` lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabDirectory {
    labs: HashMap<LabId, Lab>,
}

impl LabDirectory {
    pub fn new(labs: impl IntoIterator<Item = Lab>) -> Self {
        Self {
            labs: labs.into_iter().map(|lab| (lab.id, lab)).collect(),
        }
    }

    pub fn get(&self, id: LabId) -> Option<&Lab> {
        self.labs.get(&id)
    }

    pub fn is_inhouse(&self, id: LabId) -> bool {
        self.labs.get(&id).is_some_and(|lab| lab.inhouse)
    }

    pub fn name(&self, id: LabId) -> &str {
        self.labs.get(&id).map(|lab| lab.name.as_str()).unwrap_or("")
    }

    /// Classify `new_lab_id` from the point of view of `session_lab_id`
    pub fn lab_type(&self, new_lab_id: LabId, session_lab_id: LabId) -> LabType {
        if new_lab_id == session_lab_id {
            LabType::Inhouse
        } else if self.is_inhouse(new_lab_id) {
            LabType::Interlab
        } else {
            LabType::Outsource
        }
    }

    pub fn len(&self) -> usize {
        self.labs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labs.is_empty()
    }
}

/// Per-lab routing data for a master test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestLabMeta {
    /// Lab the work moves on to when this lab hands the test over
    pub lab_id: LabId,
    /// Turnaround in hours at this lab
    pub lab_tat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterTest {
    pub id: MasterTestId,
    pub name: String,
    /// Number of repeat draws the test needs; zero is treated as one
    pub collections_count: u32,
    pub test_lab_meta: HashMap<LabId, TestLabMeta>,
}

impl MasterTest {
    pub fn effective_collections_count(&self) -> u32 {
        self.collections_count.max(1)
    }

    pub fn lab_meta(&self, lab_id: LabId) -> Option<&TestLabMeta> {
        self.test_lab_meta.get(&lab_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> LabDirectory {
        LabDirectory::new(vec![
            Lab {
                id: LabId(1),
                name: "Central".to_string(),
                inhouse: true,
            },
            Lab {
                id: LabId(2),
                name: "North".to_string(),
                inhouse: true,
            },
            Lab {
                id: LabId(3),
                name: "Partner".to_string(),
                inhouse: false,
            },
        ])
    }

    #[test]
    fn test_lab_type_classification() {
        let labs = directory();
        assert_eq!(labs.lab_type(LabId(1), LabId(1)), LabType::Inhouse);
        assert_eq!(labs.lab_type(LabId(2), LabId(1)), LabType::Interlab);
        assert_eq!(labs.lab_type(LabId(3), LabId(1)), LabType::Outsource);
        assert_eq!(labs.lab_type(LabId(99), LabId(1)), LabType::Outsource);
    }

    #[test]
    fn test_collections_count_defaults_to_one() {
        let test = MasterTest {
            id: MasterTestId(1),
            name: "Glucose".to_string(),
            collections_count: 0,
            test_lab_meta: HashMap::new(),
        };
        assert_eq!(test.effective_collections_count(), 1);
    }
}
