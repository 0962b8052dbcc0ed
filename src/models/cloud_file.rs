//! Represents an uploaded cloud file and its backend metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata record for a file uploaded to the storage backend.
///
/// A cloud file is created in a pending state (`url` empty, `upload_resp`
/// NULL) and only carries upload results once the backend call succeeded.
/// It addresses its attachment point through a (content_key, content_field)
/// target pair and an optional object id.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct CloudFile {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Display name; defaults to the original filename.
    pub name: String,

    /// MIME type reported at upload time.
    pub content_type: Option<String>,

    /// Public URL of the uploaded payload. Empty until the upload succeeds.
    pub url: String,

    /// Raw JSON response metadata from the storage backend.
    pub upload_resp: Option<String>,

    /// Target content type key, e.g. `app.post`.
    pub content_key: String,

    /// Target field on the content type, e.g. `attachments`.
    pub content_field: String,

    /// Target object id when the file is linked to a content object.
    pub object_id: Option<Uuid>,

    /// Actor who uploaded the file.
    pub owner_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend response payload persisted alongside the file record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadResponse {
    /// Namespaced storage directory the payload lives under.
    pub prefix: String,

    /// Final (derived) filename in the backend.
    pub name: String,

    /// Backend kind that performed the upload, e.g. `s3`.
    pub storage: String,

    /// MD5 etag of the uploaded bytes.
    pub etag: String,
}

impl CloudFile {
    /// Parse the persisted backend response, if the upload completed.
    pub fn upload_response(&self) -> Option<UploadResponse> {
        self.upload_resp
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Full JSON form of the record, with `upload_resp` expanded into an
    /// object. Projections narrow this down per actor and action.
    pub fn representation(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "content_type": self.content_type,
            "url": self.url,
            "upload_resp": self.upload_response(),
            "content_key": self.content_key,
            "content_field": self.content_field,
            "object_id": self.object_id,
            "owner_id": self.owner_id,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}
