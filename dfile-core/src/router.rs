//! Partition routing.
//!
//! Routing happens on a fully transcoded record, before any of its blocks
//! are written, so a record always lands whole in exactly one partition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::DfileError,
    layout::{NUMBERS_PARTITION, OTHER_PARTITION},
    source::{FieldDescriptor, FieldType},
    transcoder::TranscodedRecord,
    DfileResult,
};

/// One independent store/index pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartitionId {
    /// The single partition used when no routing field is configured
    Default,
    /// Records whose routing key starts with this lowercase ASCII letter
    Letter(u8),
    Numbers,
    Other,
}

impl PartitionId {
    /// Bucket for a transcoded routing value, keyed on its first character.
    pub fn for_key(key: &str) -> Self {
        match key.bytes().next().map(|byte| byte.to_ascii_lowercase()) {
            Some(byte @ b'a'..=b'z') => Self::Letter(byte),
            Some(b'0'..=b'9') => Self::Numbers,
            _ => Self::Other,
        }
    }

    /// File stem shared by this partition's store and index.
    pub fn file_stem(&self, destination: &str) -> String {
        match self {
            Self::Default => destination.to_string(),
            Self::Letter(letter) => char::from(*letter).to_string(),
            Self::Numbers => NUMBERS_PARTITION.to_string(),
            Self::Other => OTHER_PARTITION.to_string(),
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Letter(letter) => write!(f, "{}", char::from(*letter)),
            Self::Numbers => write!(f, "{NUMBERS_PARTITION}"),
            Self::Other => write!(f, "{OTHER_PARTITION}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    /// 0-based index of the routing field
    field: Option<usize>,
}

impl Router {
    /// A router that sends every record to [`PartitionId::Default`].
    pub fn single() -> Self {
        Self { field: None }
    }

    /// Build a router from a 1-based field selector, validating it against
    /// the source fields. The routing field must be `Text`.
    pub fn new(selector: Option<usize>, fields: &[FieldDescriptor]) -> DfileResult<Self> {
        let Some(selector) = selector else {
            return Ok(Self::single());
        };

        let descriptor = selector
            .checked_sub(1)
            .and_then(|index| fields.get(index))
            .ok_or(DfileError::RoutingFieldOutOfRange {
                field: selector,
                available: fields.len(),
            })?;

        if descriptor.field_type != FieldType::Text {
            return Err(DfileError::InvalidRoutingField {
                field: selector,
                name: descriptor.name.clone(),
                field_type: descriptor.field_type,
            });
        }

        tracing::info!(field = %descriptor.name, "splitting on field {selector}");
        Ok(Self {
            field: Some(selector - 1),
        })
    }

    pub fn route(&self, record: &TranscodedRecord) -> PartitionId {
        match self.field {
            None => PartitionId::Default,
            Some(index) => PartitionId::for_key(record.text(index).unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcoder::FieldValue;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("ID", FieldType::Number, 4),
            FieldDescriptor::new("NAME", FieldType::Text, 10),
            FieldDescriptor::new("NOTES", FieldType::MemoRef, 10),
        ]
    }

    fn record(name: &str) -> TranscodedRecord {
        TranscodedRecord::new(vec![
            FieldValue::Text("1".into()),
            FieldValue::Text(name.into()),
            FieldValue::Memo(None),
        ])
    }

    #[test]
    fn buckets_follow_the_first_character() {
        assert_eq!(PartitionId::for_key("apple"), PartitionId::Letter(b'a'));
        assert_eq!(PartitionId::for_key("Zebra"), PartitionId::Letter(b'z'));
        assert_eq!(PartitionId::for_key("42 street"), PartitionId::Numbers);
        assert_eq!(PartitionId::for_key("{brace"), PartitionId::Other);
        assert_eq!(PartitionId::for_key("|pipe"), PartitionId::Other);
        assert_eq!(PartitionId::for_key(""), PartitionId::Other);
    }

    #[test]
    fn file_stems() {
        assert_eq!(PartitionId::Default.file_stem("parcels"), "parcels");
        assert_eq!(PartitionId::Letter(b'q').file_stem("parcels"), "q");
        assert_eq!(PartitionId::Numbers.file_stem("parcels"), "numbers");
        assert_eq!(PartitionId::Other.file_stem("parcels"), "other");
    }

    #[test]
    fn routes_on_the_selected_field() {
        let router = Router::new(Some(2), &fields()).unwrap();
        assert_eq!(router.route(&record("Bob")), PartitionId::Letter(b'b'));
        assert_eq!(router.route(&record("")), PartitionId::Other);

        let router = Router::new(None, &fields()).unwrap();
        assert_eq!(router.route(&record("Bob")), PartitionId::Default);
    }

    #[test]
    fn rejects_bad_selectors() {
        assert!(matches!(
            Router::new(Some(0), &fields()),
            Err(DfileError::RoutingFieldOutOfRange { field: 0, .. })
        ));
        assert!(matches!(
            Router::new(Some(4), &fields()),
            Err(DfileError::RoutingFieldOutOfRange { field: 4, available: 3 })
        ));
        assert!(matches!(
            Router::new(Some(1), &fields()),
            Err(DfileError::InvalidRoutingField {
                field_type: FieldType::Number,
                ..
            })
        ));
    }
}
