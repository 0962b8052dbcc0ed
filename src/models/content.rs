//! Represents a content object, a domain record cloud files attach to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::FromRow;
use uuid::Uuid;

/// A minimal link target identified by its content type key.
///
/// The optional coordinates feed the distance filter on list views.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ContentObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Content type key this object belongs to, e.g. `app.post`.
    pub content_key: String,

    /// Display name.
    pub name: String,

    /// Actor who created the object.
    pub owner_id: Option<Uuid>,

    /// Optional latitude in degrees.
    pub latitude: Option<f64>,

    /// Optional longitude in degrees.
    pub longitude: Option<f64>,

    pub created_at: DateTime<Utc>,
}

impl ContentObject {
    /// Full JSON form of the record, narrowed by projections per actor.
    pub fn representation(&self) -> Value {
        json!({
            "id": self.id,
            "content_key": self.content_key,
            "name": self.name,
            "owner_id": self.owner_id,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "created_at": self.created_at,
        })
    }
}
