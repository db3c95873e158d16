use serde_json::Value;
use std::sync::Arc;

use crate::config::RuntimeMode;
use crate::error::MatchingError;
use crate::models::{EntityPreview, EntityProfile, EntityType, GeoPoint, MatchableEntity};
use crate::services::store::{RecordStore, StoreError};

/// Build a matchable entity from a raw record
///
/// `id` is lifted out of the record, `location` is normalized to `[lat, lng]`
/// and every other field lands in the profile.
pub fn entity_from_record(record: Value, entity_type: EntityType) -> Result<MatchableEntity, StoreError> {
    let Value::Object(mut fields) = record else {
        return Err(StoreError::InvalidRecord("entity record is not an object".to_string()));
    };

    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(StoreError::InvalidRecord("entity record without an id".to_string())),
    };

    let location = fields.remove("location").as_ref().and_then(GeoPoint::from_stored);
    let mut profile: EntityProfile = serde_json::from_value(Value::Object(fields))?;
    profile.location = location;

    Ok(MatchableEntity {
        id,
        entity_type,
        profile,
    })
}

/// Loads requesters and match participants from the record store
pub struct EntityResolver {
    store: Arc<dyn RecordStore>,
    mode: RuntimeMode,
    default_location: GeoPoint,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn RecordStore>, mode: RuntimeMode, default_location: GeoPoint) -> Self {
        Self {
            store,
            mode,
            default_location,
        }
    }

    /// Load an entity by id and type
    ///
    /// Outside production a missing or unreadable entity is replaced by a
    /// stand-in located at the default location.
    pub async fn resolve(&self, id: &str, entity_type: EntityType) -> Result<MatchableEntity, MatchingError> {
        let lookup = self
            .store
            .fetch_entity(id, entity_type)
            .await
            .and_then(|record| record.map(|r| entity_from_record(r, entity_type)).transpose());

        match lookup {
            Ok(Some(entity)) => Ok(entity),
            Ok(None) if self.mode.allows_fallback() => {
                tracing::warn!("{} {} not found, using stand-in entity", entity_type.as_str(), id);
                Ok(self.stand_in(id, entity_type))
            }
            Ok(None) => Err(MatchingError::NotFound(format!("{} {}", entity_type.as_str(), id))),
            Err(e) if self.mode.allows_fallback() => {
                tracing::warn!("Failed to load {} {}: {}, using stand-in entity", entity_type.as_str(), id, e);
                Ok(self.stand_in(id, entity_type))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Display details for one side of a match; never fails
    pub async fn describe(&self, id: &str, entity_type: EntityType) -> EntityPreview {
        match self.store.fetch_entity(id, entity_type).await {
            Ok(Some(record)) => match entity_from_record(record, entity_type) {
                Ok(entity) => return EntityPreview::from_entity(&entity),
                Err(e) => tracing::debug!("Unreadable {} record {}: {}", entity_type.as_str(), id, e),
            },
            Ok(None) => {}
            Err(e) => tracing::debug!("Failed to load {} {} for display: {}", entity_type.as_str(), id, e),
        }

        let name = self
            .mode
            .allows_fallback()
            .then(|| format!("Sample {} {}", entity_type.as_str(), id.chars().take(4).collect::<String>()));

        EntityPreview {
            id: id.to_string(),
            entity_type,
            name,
            avatar_url: None,
            location: None,
        }
    }

    fn stand_in(&self, id: &str, entity_type: EntityType) -> MatchableEntity {
        MatchableEntity {
            id: id.to_string(),
            entity_type,
            profile: EntityProfile {
                location: Some(self.default_location),
                ..EntityProfile::default()
            },
        }
    }
}
