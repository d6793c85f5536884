//! Historical event model
//!
//! An event is a named interval with an optional parent. Duration is always
//! derived from the interval and never stored.

use annals_common::time::minutes_between;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::validation::{validate_description, validate_interval, validate_name, ValidationError};

/// Maximum event name length in characters
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum event description length in characters
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Open key/value bag attached to every event
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A persisted historical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalEvent {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoricalEvent {
    /// Length of the event in fractional minutes
    pub fn duration_minutes(&self) -> f64 {
        minutes_between(self.start_date, self.end_date)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating an event. The id is assigned when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewEvent {
    pub fn new(name: impl Into<String>, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            start_date,
            end_date,
            parent_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check every request-level rule: name, description, interval and self-parenting
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name, MAX_NAME_LENGTH)?;
        validate_description(self.description.as_deref(), MAX_DESCRIPTION_LENGTH)?;
        validate_interval(self.start_date, self.end_date)?;

        if let (Some(id), Some(parent_id)) = (self.id, self.parent_id) {
            if id == parent_id {
                return Err(ValidationError::SelfParent(id));
            }
        }

        Ok(())
    }

    /// Validate and turn into a storable record, assigning an id if needed
    pub fn into_event(self, now: DateTime<Utc>) -> Result<HistoricalEvent, ValidationError> {
        self.validate()?;

        Ok(HistoricalEvent {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name: self.name.trim().to_string(),
            description: normalize_description(self.description),
            start_date: self.start_date,
            end_date: self.end_date,
            parent_id: self.parent_id,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of an event.
///
/// Only the mutable fields are listed; anything else in a payload is rejected.
/// `description` and `parentId` accept an explicit `null` to clear the value,
/// which is distinct from leaving them out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl EventPatch {
    /// Whether the patch moves the event under a different parent
    pub fn changes_parent(&self, current: &HistoricalEvent) -> bool {
        matches!(self.parent_id, Some(parent) if parent != current.parent_id)
    }

    /// Produce the patched event, validating the merged result.
    ///
    /// Parent existence and acyclicity depend on the rest of the graph and are
    /// checked by the store.
    pub fn apply(
        &self,
        current: &HistoricalEvent,
        now: DateTime<Utc>,
    ) -> Result<HistoricalEvent, ValidationError> {
        let mut updated = current.clone();

        if let Some(ref name) = self.name {
            validate_name(name, MAX_NAME_LENGTH)?;
            updated.name = name.trim().to_string();
        }

        if let Some(ref description) = self.description {
            validate_description(description.as_deref(), MAX_DESCRIPTION_LENGTH)?;
            updated.description = normalize_description(description.clone());
        }

        if let Some(start) = self.start_date {
            updated.start_date = start;
        }
        if let Some(end) = self.end_date {
            updated.end_date = end;
        }
        validate_interval(updated.start_date, updated.end_date)?;

        if let Some(parent_id) = self.parent_id {
            if parent_id == Some(current.id) {
                return Err(ValidationError::SelfParent(current.id));
            }
            updated.parent_id = parent_id;
        }

        if let Some(ref metadata) = self.metadata {
            updated.metadata = metadata.clone();
        }

        updated.updated_at = now;
        Ok(updated)
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Deserialize a present field (including `null`) as `Some(..)`
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_duration_is_derived() {
        let event = NewEvent::new("Battle", at(10, 0), at(11, 30))
            .into_event(Utc::now())
            .unwrap();
        assert_eq!(event.duration_minutes(), 90.0);
    }

    #[test]
    fn test_into_event_assigns_id_and_trims() {
        let event = NewEvent::new("  Treaty  ", at(9, 0), at(10, 0))
            .with_description("   ")
            .into_event(Utc::now())
            .unwrap();
        assert_eq!(event.name, "Treaty");
        assert!(event.description.is_none());
        assert!(!event.id.is_nil());
    }

    #[test]
    fn test_end_must_follow_start() {
        let err = NewEvent::new("Backwards", at(11, 0), at(10, 0)).validate().unwrap_err();
        assert!(matches!(err, ValidationError::EndNotAfterStart { .. }));

        let err = NewEvent::new("Instant", at(10, 0), at(10, 0)).validate().unwrap_err();
        assert!(matches!(err, ValidationError::EndNotAfterStart { .. }));
    }

    #[test]
    fn test_self_parent_rejected() {
        let id = Uuid::new_v4();
        let err = NewEvent::new("Loop", at(9, 0), at(10, 0))
            .with_id(id)
            .with_parent(id)
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::SelfParent(id));
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let absent: EventPatch = serde_json::from_str(r#"{"name": "Renamed"}"#).unwrap();
        assert!(absent.description.is_none());
        assert!(absent.parent_id.is_none());

        let cleared: EventPatch =
            serde_json::from_str(r#"{"description": null, "parentId": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));
        assert_eq!(cleared.parent_id, Some(None));
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let result = serde_json::from_str::<EventPatch>(r#"{"durationMinutes": 5}"#);
        assert!(result.is_err());
        let result = serde_json::from_str::<EventPatch>(r#"{"id": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_patch_apply_validates_merged_interval() {
        let event = NewEvent::new("Siege", at(9, 0), at(10, 0))
            .into_event(Utc::now())
            .unwrap();

        let patch = EventPatch {
            start_date: Some(at(10, 30)),
            ..Default::default()
        };
        assert!(matches!(
            patch.apply(&event, Utc::now()),
            Err(ValidationError::EndNotAfterStart { .. })
        ));

        let patch = EventPatch {
            start_date: Some(at(8, 0)),
            description: Some(Some("Extended".to_string())),
            ..Default::default()
        };
        let updated = patch.apply(&event, Utc::now()).unwrap();
        assert_eq!(updated.duration_minutes(), 120.0);
        assert_eq!(updated.description.as_deref(), Some("Extended"));
    }

    #[test]
    fn test_patch_apply_rejects_self_parent() {
        let event = NewEvent::new("Siege", at(9, 0), at(10, 0))
            .into_event(Utc::now())
            .unwrap();
        let patch = EventPatch {
            parent_id: Some(Some(event.id)),
            ..Default::default()
        };
        assert_eq!(
            patch.apply(&event, Utc::now()).unwrap_err(),
            ValidationError::SelfParent(event.id)
        );
    }
}
