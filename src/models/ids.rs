//! # Typed Identifiers
//!
//! Newtype wrappers over database keys so routing tables (`LabId -> Lab`,
//! `MasterTestId -> MasterTest`) cannot be indexed with the wrong kind of id.
//! All of them are transparent to serde and sqlx (`BIGINT` columns).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            /// Zero is never a persisted key; requests use it to mean "missing".
            pub const fn is_unset(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

typed_id!(
    /// Primary key of a `samples` row
    SampleId
);
typed_id!(
    /// A laboratory (processing, servicing or receiving)
    LabId
);
typed_id!(
    /// Catalogue id of a test definition
    MasterTestId
);
typed_id!(
    /// Container type a sample is drawn into
    VialTypeId
);
typed_id!(
    /// Lab-side work item that groups an order's in-house tests
    TaskId
);
typed_id!(
    /// Operator or system account performing a change
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_ids_are_transparent_in_json() {
        let id = LabId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let parsed: SampleId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, SampleId(7));
    }

    #[test]
    fn test_unset_detection() {
        assert!(SampleId::default().is_unset());
        assert!(!SampleId::new(1).is_unset());
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut labs = BTreeMap::new();
        labs.insert(LabId(10), "b");
        labs.insert(LabId(2), "a");
        let keys: Vec<_> = labs.keys().copied().collect();
        assert_eq!(keys, vec![LabId(2), LabId(10)]);
    }
}
