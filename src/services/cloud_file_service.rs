//! CloudFileService: cloud file metadata backed by SQLite, payloads
//! uploaded through a swappable storage backend.
//!
//! The upload-and-link workflow is one atomic unit: the pending metadata
//! row, the upload results, and the optional content link commit or roll
//! back together. The remote upload itself is an irrevocable side effect
//! performed inside the transaction window; a rollback after it succeeded
//! orphans the remote object (known limitation of this design).

use crate::models::actor::Actor;
use crate::models::cloud_file::{CloudFile, UploadResponse};
use crate::models::content::ContentObject;
use crate::services::lock::LockProvider;
use crate::storage::{StorageBackend, StorageError};
use crate::views::geo::DistanceFilter;
use crate::views::pagination::Pagination;
use bytes::Bytes;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("file `{0}` not found")]
    FileNotFound(Uuid),
    #[error("content object `{0}` not found")]
    ContentNotFound(Uuid),
    #[error("target `{0}` is not registered")]
    UnknownTarget(String),
    #[error("invalid target `{0}`: expected `app.model.field`")]
    InvalidTarget(String),
    #[error("{0}")]
    Invalid(String),
    #[error("not allowed to modify this record")]
    Forbidden,
    #[error("cannot acquire the lock; the same job might be in progress (key `{0}`)")]
    LockHeld(String),
    #[error("storage backend `{0}` is not supported")]
    UnsupportedBackend(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Whether a target field holds one file or many.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cardinality {
    One,
    Many,
}

/// Explicit table of registered upload targets, supplied at configuration
/// time. Plays the role the content-type framework played upstream: an
/// unregistered target is rejected the same way a missing content type was.
#[derive(Clone, Default, Debug)]
pub struct TargetRegistry {
    entries: HashMap<(String, String), Cardinality>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, content_key: &str, field: &str, cardinality: Cardinality) -> Self {
        self.entries.insert(
            (content_key.to_lowercase(), field.to_lowercase()),
            cardinality,
        );
        self
    }

    /// Parse a config spec such as
    /// `app.post.attachments:many,app.profile.avatar:one`.
    pub fn from_spec(spec: &str) -> Result<Self, String> {
        let mut registry = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (target, cardinality) = entry
                .split_once(':')
                .ok_or_else(|| format!("target entry `{entry}` is missing `:one` or `:many`"))?;
            let (content_key, field) = parse_target(target)
                .map_err(|_| format!("target `{target}` must look like `app.model.field`"))?;
            let cardinality = match cardinality.trim() {
                "one" => Cardinality::One,
                "many" => Cardinality::Many,
                other => return Err(format!("unknown cardinality `{other}` in `{entry}`")),
            };
            registry = registry.register(&content_key, &field, cardinality);
        }
        Ok(registry)
    }

    pub fn get(&self, content_key: &str, field: &str) -> Option<Cardinality> {
        self.entries
            .get(&(content_key.to_lowercase(), field.to_lowercase()))
            .copied()
    }

    /// True when any field is registered under this content key.
    pub fn has_content_key(&self, content_key: &str) -> bool {
        let content_key = content_key.to_lowercase();
        self.entries.keys().any(|(key, _)| *key == content_key)
    }
}

/// Input to the upload workflow. Either `target` (`app.model.field`) or
/// both `content_key` and `content_field` must be set.
#[derive(Debug)]
pub struct UploadRequest {
    pub data: Bytes,
    pub filename: String,
    pub content_type: Option<String>,
    pub name: Option<String>,
    pub target: Option<String>,
    pub content_key: Option<String>,
    pub content_field: Option<String>,
    pub object_id: Option<Uuid>,
    pub use_original_filename: bool,
    pub link_to_content: bool,
}

/// The core service. Owns the metadata pool, the storage backend, the lock
/// provider, and the target registry.
#[derive(Clone)]
pub struct CloudFileService {
    pub db: Arc<SqlitePool>,
    backend: Arc<dyn StorageBackend>,
    locks: LockProvider,
    targets: TargetRegistry,
}

const CLOUD_FILE_COLUMNS: &str = "id, name, content_type, url, upload_resp, content_key, \
     content_field, object_id, owner_id, created_at, updated_at";

const CONTENT_COLUMNS: &str = "id, content_key, name, owner_id, latitude, longitude, created_at";

impl CloudFileService {
    pub fn new(
        db: Arc<SqlitePool>,
        backend: Arc<dyn StorageBackend>,
        locks: LockProvider,
        targets: TargetRegistry,
    ) -> Self {
        Self {
            db,
            backend,
            locks,
            targets,
        }
    }

    /// Resolve the upload target into (content_key, field, cardinality),
    /// from either the combined `target` string or the direct pair.
    fn resolve_target(&self, req: &UploadRequest) -> ServiceResult<(String, String, Cardinality)> {
        let (content_key, field) = match (&req.target, &req.content_key, &req.content_field) {
            (Some(target), _, _) => parse_target(target)?,
            (None, Some(key), Some(field)) => (key.to_lowercase(), field.to_lowercase()),
            _ => {
                return Err(ServiceError::Invalid(
                    "either `target` or both `content_key` and `content_field` must be provided"
                        .into(),
                ));
            }
        };

        let cardinality = self
            .targets
            .get(&content_key, &field)
            .ok_or_else(|| ServiceError::UnknownTarget(format!("{content_key}.{field}")))?;

        Ok((content_key, field, cardinality))
    }

    /// Upload a file and persist its metadata, optionally linking it to a
    /// content object, as one atomic unit. Any failure after the pending
    /// row is created rolls the whole record back.
    pub async fn upload_and_link(
        &self,
        actor: &Actor,
        req: UploadRequest,
    ) -> ServiceResult<CloudFile> {
        let (content_key, content_field, cardinality) = self.resolve_target(&req)?;
        let upload_dir = upload_dir(&content_key, &content_field);
        let upload_name = derive_upload_filename(&req.filename, req.use_original_filename);

        let link_target = if req.link_to_content {
            Some(req.object_id.ok_or_else(|| {
                ServiceError::Invalid("`object_id` is required when `link_to_content` is set".into())
            })?)
        } else {
            None
        };

        // Keyed on the caller-supplied name, not the derived one: the
        // random collision token would give every request a unique key.
        let lock_key = format!(
            "upload:{upload_dir}/{}",
            path_leaf(&req.filename).to_lowercase()
        );
        let _guard = self
            .locks
            .try_acquire(&lock_key)
            .ok_or_else(|| ServiceError::LockHeld(lock_key.clone()))?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let display_name = match &req.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => path_leaf(&req.filename).to_string(),
        };
        let etag = format!("{:x}", md5::compute(&req.data));

        let mut tx = self.db.begin().await?;

        // Pending record: url empty and upload_resp NULL until the backend
        // call succeeds.
        sqlx::query(
            "INSERT INTO cloud_files (id, name, content_type, url, upload_resp, content_key, \
             content_field, object_id, owner_id, created_at, updated_at) \
             VALUES (?, ?, ?, '', NULL, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&display_name)
        .bind(&req.content_type)
        .bind(&content_key)
        .bind(&content_field)
        .bind(req.object_id)
        .bind(actor.id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Irrevocable side effect inside the transaction window: a failure
        // below this point rolls the row back but cannot un-upload.
        let url = self
            .backend
            .upload(
                req.data,
                &upload_name,
                &upload_dir,
                req.content_type.as_deref(),
            )
            .await?;

        let response = UploadResponse {
            prefix: upload_dir,
            name: upload_name,
            storage: self.backend.kind().to_string(),
            etag,
        };
        sqlx::query("UPDATE cloud_files SET url = ?, upload_resp = ?, updated_at = ? WHERE id = ?")
            .bind(&url)
            .bind(serde_json::to_string(&response)?)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(object_id) = link_target {
            self.link_to_content(&mut tx, &content_key, &content_field, object_id, id, cardinality)
                .await?;
        }

        tx.commit().await?;

        self.fetch_file(id).await
    }

    /// Attach the file to the located content object: multi-valued fields
    /// append, single-valued fields replace the previous link.
    async fn link_to_content(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        content_key: &str,
        field: &str,
        object_id: Uuid,
        file_id: Uuid,
        cardinality: Cardinality,
    ) -> ServiceResult<()> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM content_objects WHERE id = ? AND content_key = ?)",
        )
        .bind(object_id)
        .bind(content_key)
        .fetch_one(&mut **tx)
        .await?;

        if exists == 0 {
            return Err(ServiceError::ContentNotFound(object_id));
        }

        if cardinality == Cardinality::One {
            sqlx::query(
                "DELETE FROM content_links WHERE content_key = ? AND field_name = ? AND object_id = ?",
            )
            .bind(content_key)
            .bind(field)
            .bind(object_id)
            .execute(&mut **tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO content_links (id, content_key, field_name, object_id, file_id, linked_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(content_key)
        .bind(field)
        .bind(object_id)
        .bind(file_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Fetch a file the actor is allowed to see. Records outside the
    /// actor's owned subset read as not-found for non-staff, the same way
    /// an owner-filtered lookup would miss them.
    pub async fn get_file(&self, actor: &Actor, id: Uuid) -> ServiceResult<CloudFile> {
        let file = self.fetch_file(id).await?;
        if !can_view(actor, file.owner_id) {
            return Err(ServiceError::FileNotFound(id));
        }
        Ok(file)
    }

    async fn fetch_file(&self, id: Uuid) -> ServiceResult<CloudFile> {
        sqlx::query_as::<_, CloudFile>(&format!(
            "SELECT {CLOUD_FILE_COLUMNS} FROM cloud_files WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => ServiceError::FileNotFound(id),
            other => ServiceError::Sqlx(other),
        })
    }

    /// List files, restricted to the actor's owned subset unless the actor
    /// is staff or admin. Anonymous actors own nothing and see nothing.
    pub async fn list_files(
        &self,
        actor: &Actor,
        pagination: Pagination,
    ) -> ServiceResult<(i64, Vec<CloudFile>)> {
        let owner = match owner_restriction(actor) {
            OwnerRestriction::None => None,
            OwnerRestriction::Owner(id) => Some(id),
            OwnerRestriction::Nothing => return Ok((0, Vec::new())),
        };

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM cloud_files");
        if let Some(id) = owner {
            count.push(" WHERE owner_id = ");
            count.push_bind(id);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&*self.db).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CLOUD_FILE_COLUMNS} FROM cloud_files"
        ));
        if let Some(id) = owner {
            builder.push(" WHERE owner_id = ");
            builder.push_bind(id);
        }
        builder.push(" ORDER BY created_at DESC, id LIMIT ");
        builder.push_bind(pagination.limit());
        builder.push(" OFFSET ");
        builder.push_bind(pagination.offset());

        let rows = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok((total, rows))
    }

    /// Rename a file. Only the owner or an admin may modify a record.
    pub async fn update_file_name(
        &self,
        actor: &Actor,
        id: Uuid,
        name: &str,
    ) -> ServiceResult<CloudFile> {
        let file = self.get_file(actor, id).await?;
        ensure_can_modify(actor, file.owner_id)?;

        sqlx::query("UPDATE cloud_files SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name.trim())
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.db)
            .await?;

        self.fetch_file(id).await
    }

    /// Delete the metadata row and its links, then remove the remote object
    /// best-effort.
    pub async fn delete_file(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        let file = self.get_file(actor, id).await?;
        ensure_can_modify(actor, file.owner_id)?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM content_links WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cloud_files WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.delete_remote(&file).await;
        Ok(())
    }

    /// Fetch the file's bytes from the backend that uploaded it. Records
    /// produced by a different backend are refused explicitly rather than
    /// guessed at.
    pub async fn download(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> ServiceResult<(CloudFile, UploadResponse, Bytes)> {
        let file = self.get_file(actor, id).await?;
        let response = file.upload_response().ok_or_else(|| {
            ServiceError::Invalid(format!("file `{id}` has no completed upload"))
        })?;

        if response.storage != self.backend.kind() {
            return Err(ServiceError::UnsupportedBackend(response.storage));
        }

        let data = self.backend.download(&response.name, &response.prefix).await?;
        Ok((file, response, data))
    }

    /// Best-effort remote removal; failures are logged, never surfaced.
    pub async fn delete_remote(&self, file: &CloudFile) {
        let Some(response) = file.upload_response() else {
            return;
        };
        if response.storage != self.backend.kind() {
            debug!(
                file_id = %file.id,
                storage = %response.storage,
                "skipping remote delete for foreign backend"
            );
            return;
        }
        if let Err(err) = self.backend.delete(&response.name, &response.prefix).await {
            debug!(file_id = %file.id, error = %err, "failed to remove remote object");
        }
    }

    /// Create a content object under a registered content key.
    pub async fn create_content(
        &self,
        actor: &Actor,
        content_key: &str,
        name: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> ServiceResult<ContentObject> {
        let content_key = content_key.to_lowercase();
        if !self.targets.has_content_key(&content_key) {
            return Err(ServiceError::UnknownTarget(content_key));
        }

        let object = ContentObject {
            id: Uuid::new_v4(),
            content_key,
            name: name.trim().to_string(),
            owner_id: actor.id,
            latitude,
            longitude,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO content_objects (id, content_key, name, owner_id, latitude, longitude, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(object.id)
        .bind(&object.content_key)
        .bind(&object.name)
        .bind(object.owner_id)
        .bind(object.latitude)
        .bind(object.longitude)
        .bind(object.created_at)
        .execute(&*self.db)
        .await?;

        Ok(object)
    }

    /// Fetch a content object with its links, one (field, file id) pair per
    /// linked file. Visibility follows the owner filter, like files.
    pub async fn get_content(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> ServiceResult<(ContentObject, Vec<(String, Uuid)>)> {
        let object = sqlx::query_as::<_, ContentObject>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_objects WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => ServiceError::ContentNotFound(id),
            other => ServiceError::Sqlx(other),
        })?;

        if !can_view(actor, object.owner_id) {
            return Err(ServiceError::ContentNotFound(id));
        }

        let links: Vec<(String, Uuid)> = sqlx::query_as(
            "SELECT field_name, file_id FROM content_links WHERE object_id = ? AND content_key = ? \
             ORDER BY linked_at, file_id",
        )
        .bind(id)
        .bind(&object.content_key)
        .fetch_all(&*self.db)
        .await?;

        Ok((object, links))
    }

    /// List content objects with the owner filter and the optional distance
    /// filter. With a geo filter active the candidates are filtered,
    /// annotated with their distance in meters, sorted by it, and paginated
    /// in memory.
    pub async fn list_contents(
        &self,
        actor: &Actor,
        pagination: Pagination,
        geo: Option<DistanceFilter>,
    ) -> ServiceResult<(i64, Vec<(ContentObject, Option<f64>)>)> {
        let owner = match owner_restriction(actor) {
            OwnerRestriction::None => None,
            OwnerRestriction::Owner(id) => Some(id),
            OwnerRestriction::Nothing => return Ok((0, Vec::new())),
        };

        if let Some(filter) = geo {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {CONTENT_COLUMNS} FROM content_objects"
            ));
            if let Some(id) = owner {
                builder.push(" WHERE owner_id = ");
                builder.push_bind(id);
            }
            builder.push(" ORDER BY created_at DESC, id");

            let rows: Vec<ContentObject> =
                builder.build_query_as().fetch_all(&*self.db).await?;

            let mut matched: Vec<(ContentObject, Option<f64>)> = rows
                .into_iter()
                .filter_map(|row| {
                    let distance = filter.distance_to(row.latitude, row.longitude)?;
                    filter.matches(distance).then_some((row, Some(distance)))
                })
                .collect();
            matched.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let total = matched.len() as i64;
            return Ok((total, pagination.slice(matched)));
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM content_objects");
        if let Some(id) = owner {
            count.push(" WHERE owner_id = ");
            count.push_bind(id);
        }
        let total: i64 = count.build_query_scalar().fetch_one(&*self.db).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {CONTENT_COLUMNS} FROM content_objects"
        ));
        if let Some(id) = owner {
            builder.push(" WHERE owner_id = ");
            builder.push_bind(id);
        }
        builder.push(" ORDER BY created_at DESC, id LIMIT ");
        builder.push_bind(pagination.limit());
        builder.push(" OFFSET ");
        builder.push_bind(pagination.offset());

        let rows: Vec<ContentObject> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok((total, rows.into_iter().map(|row| (row, None)).collect()))
    }
}

enum OwnerRestriction {
    /// Staff and admins see everything.
    None,
    Owner(Uuid),
    /// Anonymous actors own nothing.
    Nothing,
}

fn owner_restriction(actor: &Actor) -> OwnerRestriction {
    if actor.is_staff() {
        OwnerRestriction::None
    } else {
        match actor.id {
            Some(id) => OwnerRestriction::Owner(id),
            None => OwnerRestriction::Nothing,
        }
    }
}

/// Detail visibility: staff see everything, everyone else only their own
/// records. Anonymous-owned records are visible to staff only.
fn can_view(actor: &Actor, owner_id: Option<Uuid>) -> bool {
    if actor.is_staff() {
        return true;
    }
    matches!((actor.id, owner_id), (Some(a), Some(o)) if a == o)
}

fn ensure_can_modify(actor: &Actor, owner_id: Option<Uuid>) -> ServiceResult<()> {
    if actor.is_admin() {
        return Ok(());
    }
    match (actor.id, owner_id) {
        (Some(actor_id), Some(owner_id)) if actor_id == owner_id => Ok(()),
        _ => Err(ServiceError::Forbidden),
    }
}

/// Parse `app.model.field` into (`app.model`, `field`), lowercased.
pub fn parse_target(target: &str) -> ServiceResult<(String, String)> {
    let target = target.trim().to_lowercase();
    let parts: Vec<&str> = target.split('.').collect();
    match parts.as_slice() {
        [app, model, field] if !app.is_empty() && !model.is_empty() && !field.is_empty() => {
            Ok((format!("{app}.{model}"), field.to_string()))
        }
        _ => Err(ServiceError::InvalidTarget(target)),
    }
}

/// Namespaced storage directory for a target, e.g.
/// `app.post` + `attachments` → `app__post__attachments`. Trailing
/// underscores are trimmed when the field is empty.
pub fn upload_dir(content_key: &str, field: &str) -> String {
    format!("{}__{}", content_key.replace('.', "__"), field)
        .trim_end_matches('_')
        .to_string()
}

/// Derive the name the payload is stored under. Unless the caller asked to
/// keep the original filename, a short random token is prepended to avoid
/// collisions. The stem is slugified; the full extension chain survives
/// untouched (`archive.tar.gz` keeps `.tar.gz`).
pub fn derive_upload_filename(filename: &str, use_original_filename: bool) -> String {
    let leaf = path_leaf(filename);
    let named = if use_original_filename {
        leaf.to_string()
    } else {
        format!("{}_{}", random_token(), leaf)
    };

    let (stem, chain) = split_suffix_chain(&named);
    format!("{}{}", slugify(stem), chain)
}

/// Extract the file name from a path, tolerating either separator and a
/// trailing slash.
pub fn path_leaf(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(path)
}

/// Split a filename into (stem, suffix chain). Leading dots belong to the
/// stem, so `.hidden` has no suffix and `a.tar.gz` splits as
/// (`a`, `.tar.gz`).
fn split_suffix_chain(name: &str) -> (&str, &str) {
    let lead = name.len() - name.trim_start_matches('.').len();
    match name[lead..].find('.') {
        Some(pos) => name.split_at(lead + pos),
        None => (name, ""),
    }
}

/// Lowercase, keep alphanumerics and underscores, collapse whitespace and
/// hyphen runs into single hyphens, drop everything else.
fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_hyphen = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }
    out
}

/// 5-character collision-avoidance token.
fn random_token() -> String {
    Uuid::new_v4().simple().to_string()[..5].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actor::Role;
    use crate::services::apply_schema;
    use crate::storage::StorageResult;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex;

    struct MockBackend {
        fail_uploads: bool,
        objects: Mutex<HashMap<String, Bytes>>,
    }

    impl MockBackend {
        fn new(fail_uploads: bool) -> Self {
            Self {
                fail_uploads,
                objects: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl StorageBackend for MockBackend {
        fn kind(&self) -> &'static str {
            "s3"
        }

        async fn upload(
            &self,
            data: Bytes,
            name: &str,
            prefix: &str,
            _content_type: Option<&str>,
        ) -> StorageResult<String> {
            if self.fail_uploads {
                return Err(StorageError::Upload("simulated backend outage".into()));
            }
            let key = format!("{prefix}/{name}");
            self.objects.lock().unwrap().insert(key.clone(), data);
            Ok(format!("https://mock.local/{key}"))
        }

        async fn download(&self, name: &str, prefix: &str) -> StorageResult<Bytes> {
            let key = format!("{prefix}/{name}");
            self.objects
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(StorageError::NotFound(key))
        }

        async fn delete(&self, name: &str, prefix: &str) -> StorageResult<()> {
            self.objects
                .lock()
                .unwrap()
                .remove(&format!("{prefix}/{name}"));
            Ok(())
        }
    }

    fn registry() -> TargetRegistry {
        TargetRegistry::new()
            .register("app.profile", "avatar", Cardinality::One)
            .register("app.post", "attachments", Cardinality::Many)
    }

    async fn service(fail_uploads: bool) -> (CloudFileService, LockProvider) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();

        let locks = LockProvider::new();
        let service = CloudFileService::new(
            Arc::new(pool),
            Arc::new(MockBackend::new(fail_uploads)),
            locks.clone(),
            registry(),
        );
        (service, locks)
    }

    fn user() -> Actor {
        Actor {
            id: Some(Uuid::new_v4()),
            role: Role::User,
        }
    }

    fn admin() -> Actor {
        Actor {
            id: Some(Uuid::new_v4()),
            role: Role::Admin,
        }
    }

    fn request(target: &str, object_id: Option<Uuid>, link: bool) -> UploadRequest {
        UploadRequest {
            data: Bytes::from_static(b"payload"),
            filename: "Report Final.pdf".into(),
            content_type: Some("application/pdf".into()),
            name: None,
            target: Some(target.into()),
            content_key: None,
            content_field: None,
            object_id,
            use_original_filename: false,
            link_to_content: link,
        }
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_success_records_url_and_response() {
        let (service, _) = service(false).await;
        let actor = user();

        let file = service
            .upload_and_link(&actor, request("app.post.attachments", None, false))
            .await
            .unwrap();

        assert!(file.url.starts_with("https://mock.local/app__post__attachments/"));
        assert_eq!(file.owner_id, actor.id);
        assert_eq!(file.name, "Report Final.pdf");

        let response = file.upload_response().unwrap();
        assert_eq!(response.storage, "s3");
        assert_eq!(response.prefix, "app__post__attachments");
        assert!(response.name.ends_with("_report-final.pdf"));
        assert_eq!(response.etag, format!("{:x}", md5::compute(b"payload")));
    }

    #[tokio::test]
    async fn upload_failure_leaves_zero_rows() {
        let (service, _) = service(true).await;

        let err = service
            .upload_and_link(&user(), request("app.post.attachments", None, false))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Storage(StorageError::Upload(_))));
        assert_eq!(count(&service.db, "cloud_files").await, 0);
        assert_eq!(count(&service.db, "content_links").await, 0);
    }

    #[tokio::test]
    async fn linking_missing_object_rolls_everything_back() {
        let (service, _) = service(false).await;

        let err = service
            .upload_and_link(
                &user(),
                request("app.post.attachments", Some(Uuid::new_v4()), true),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::ContentNotFound(_)));
        assert_eq!(count(&service.db, "cloud_files").await, 0);
        assert_eq!(count(&service.db, "content_links").await, 0);
    }

    #[tokio::test]
    async fn multi_valued_field_appends_links() {
        let (service, _) = service(false).await;
        let actor = user();
        let post = service
            .create_content(&actor, "app.post", "post", None, None)
            .await
            .unwrap();

        let first = service
            .upload_and_link(&actor, request("app.post.attachments", Some(post.id), true))
            .await
            .unwrap();
        let second = service
            .upload_and_link(&actor, request("app.post.attachments", Some(post.id), true))
            .await
            .unwrap();

        let (_, links) = service.get_content(&actor, post.id).await.unwrap();
        let linked: Vec<Uuid> = links.iter().map(|(_, id)| *id).collect();
        assert_eq!(links.len(), 2);
        assert!(linked.contains(&first.id));
        assert!(linked.contains(&second.id));
    }

    #[tokio::test]
    async fn single_valued_field_overwrites_previous_link() {
        let (service, _) = service(false).await;
        let actor = user();
        let profile = service
            .create_content(&actor, "app.profile", "profile", None, None)
            .await
            .unwrap();

        service
            .upload_and_link(&actor, request("app.profile.avatar", Some(profile.id), true))
            .await
            .unwrap();
        let replacement = service
            .upload_and_link(&actor, request("app.profile.avatar", Some(profile.id), true))
            .await
            .unwrap();

        let (_, links) = service.get_content(&actor, profile.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0], ("avatar".to_string(), replacement.id));
    }

    #[tokio::test]
    async fn unregistered_target_is_rejected() {
        let (service, _) = service(false).await;
        let err = service
            .upload_and_link(&user(), request("app.page.header", None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownTarget(_)));
        assert_eq!(count(&service.db, "cloud_files").await, 0);
    }

    #[tokio::test]
    async fn held_lock_rejects_duplicate_job() {
        let (service, locks) = service(false).await;

        // The key derives from the original filename, so the guard holds
        // even while the random-token path is in effect.
        let guard = locks
            .try_acquire("upload:app__post__attachments/report final.pdf")
            .unwrap();

        let err = service
            .upload_and_link(&user(), request("app.post.attachments", None, false))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::LockHeld(_)));
        assert_eq!(count(&service.db, "cloud_files").await, 0);

        drop(guard);
        service
            .upload_and_link(&user(), request("app.post.attachments", None, false))
            .await
            .unwrap();
        assert_eq!(count(&service.db, "cloud_files").await, 1);
    }

    #[tokio::test]
    async fn owner_filter_restricts_listing() {
        let (service, _) = service(false).await;
        let alice = user();
        let bob = user();

        service
            .upload_and_link(&alice, request("app.post.attachments", None, false))
            .await
            .unwrap();
        service
            .upload_and_link(&bob, request("app.post.attachments", None, false))
            .await
            .unwrap();

        let pagination = Pagination::from_params(None, None);
        let (count_alice, rows) = service.list_files(&alice, pagination).await.unwrap();
        assert_eq!(count_alice, 1);
        assert_eq!(rows[0].owner_id, alice.id);

        let (count_admin, _) = service.list_files(&admin(), pagination).await.unwrap();
        assert_eq!(count_admin, 2);

        let (count_anon, rows) = service
            .list_files(&Actor::anonymous(), pagination)
            .await
            .unwrap();
        assert_eq!(count_anon, 0);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_respect_ownership() {
        let (service, _) = service(false).await;
        let owner = user();
        let stranger = user();
        let staff = Actor {
            id: Some(Uuid::new_v4()),
            role: Role::Staff,
        };

        let file = service
            .upload_and_link(&owner, request("app.post.attachments", None, false))
            .await
            .unwrap();

        // Strangers cannot even see the record; staff see it but cannot
        // modify it.
        let err = service
            .update_file_name(&stranger, file.id, "hijacked")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::FileNotFound(_)));

        let err = service
            .update_file_name(&staff, file.id, "hijacked")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        let renamed = service
            .update_file_name(&owner, file.id, "renamed")
            .await
            .unwrap();
        assert_eq!(renamed.name, "renamed");

        service.delete_file(&admin(), file.id).await.unwrap();
        assert_eq!(count(&service.db, "cloud_files").await, 0);
        assert_eq!(count(&service.db, "content_links").await, 0);
    }

    #[tokio::test]
    async fn download_round_trips_through_the_backend() {
        let (service, _) = service(false).await;
        let actor = user();
        let file = service
            .upload_and_link(&actor, request("app.post.attachments", None, false))
            .await
            .unwrap();

        let (_, response, data) = service.download(&actor, file.id).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"payload"));
        assert_eq!(response.storage, "s3");

        // A different non-staff actor cannot reach the record at all.
        let err = service.download(&user(), file.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn download_refuses_foreign_backend_records() {
        let (service, _) = service(false).await;
        let actor = user();
        let file = service
            .upload_and_link(&actor, request("app.post.attachments", None, false))
            .await
            .unwrap();

        sqlx::query("UPDATE cloud_files SET upload_resp = ? WHERE id = ?")
            .bind(r#"{"prefix":"p","name":"n","storage":"gcs","etag":"x"}"#)
            .bind(file.id)
            .execute(&*service.db)
            .await
            .unwrap();

        let err = service.download(&actor, file.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedBackend(ref s) if s.as_str() == "gcs"));
    }

    #[tokio::test]
    async fn geo_filter_annotates_and_sorts_by_distance() {
        let (service, _) = service(false).await;
        let actor = user();

        // ~0 m, ~157 km, and no coordinates at all.
        service
            .create_content(&actor, "app.post", "here", Some(0.0), Some(0.0))
            .await
            .unwrap();
        service
            .create_content(&actor, "app.post", "near", Some(1.0), Some(1.0))
            .await
            .unwrap();
        service
            .create_content(&actor, "app.post", "nowhere", None, None)
            .await
            .unwrap();

        let filter = DistanceFilter::from_params(
            Some("200000"),
            Some("0,0"),
            crate::views::geo::DistanceUnit::Meter,
        )
        .unwrap();

        let (total, rows) = service
            .list_contents(&actor, Pagination::from_params(None, None), Some(filter))
            .await
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(rows[0].0.name, "here");
        assert!(rows[0].1.unwrap() < 1.0);
        assert!(rows[1].1.unwrap() > 150_000.0);
    }

    #[test]
    fn multi_part_extension_chain_is_preserved() {
        let name = derive_upload_filename("archive.tar.gz", true);
        assert_eq!(name, "archive.tar.gz");

        let name = derive_upload_filename("My Backup.tar.gz", false);
        assert!(name.ends_with("_my-backup.tar.gz"), "got {name}");
    }

    #[test]
    fn random_token_prefixes_by_exactly_token_and_separator() {
        let name = derive_upload_filename("photo.jpg", false);
        assert_eq!(name.len(), "photo.jpg".len() + 6);
        assert!(name.ends_with("_photo.jpg"));
        let token = &name[..5];
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn filenames_without_extension_and_hidden_files() {
        assert_eq!(derive_upload_filename("README", true), "readme");
        assert_eq!(derive_upload_filename(".env", true), "env");
        assert_eq!(split_suffix_chain(".hidden"), (".hidden", ""));
        assert_eq!(split_suffix_chain("a.tar.gz"), ("a", ".tar.gz"));
    }

    #[test]
    fn path_leaf_handles_separators() {
        assert_eq!(path_leaf("/tmp/uploads/file.txt"), "file.txt");
        assert_eq!(path_leaf("C:\\data\\file.txt"), "file.txt");
        assert_eq!(path_leaf("dir/sub/"), "sub");
        assert_eq!(path_leaf("plain.txt"), "plain.txt");
    }

    #[test]
    fn target_parsing_and_upload_dir() {
        assert_eq!(
            parse_target("App.Post.Attachments").unwrap(),
            ("app.post".to_string(), "attachments".to_string())
        );
        assert!(parse_target("app.post").is_err());
        assert!(parse_target("a.b.c.d").is_err());

        assert_eq!(upload_dir("app.post", "attachments"), "app__post__attachments");
        assert_eq!(upload_dir("app.post", ""), "app__post");
    }

    #[test]
    fn registry_spec_parsing() {
        let registry =
            TargetRegistry::from_spec("app.post.attachments:many, app.profile.avatar:one")
                .unwrap();
        assert_eq!(
            registry.get("app.post", "attachments"),
            Some(Cardinality::Many)
        );
        assert_eq!(registry.get("app.profile", "avatar"), Some(Cardinality::One));
        assert!(registry.has_content_key("app.post"));
        assert!(!registry.has_content_key("app.page"));

        assert!(TargetRegistry::from_spec("app.post.attachments").is_err());
        assert!(TargetRegistry::from_spec("app.post:many").is_err());
        assert!(TargetRegistry::from_spec("").unwrap().entries.is_empty());
    }
}
