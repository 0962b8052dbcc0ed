//! Cloud file endpoints: upload, list, retrieve, rename, delete, download.

use crate::errors::ApiError;
use crate::handlers::{parse_bool, render};
use crate::models::actor::Actor;
use crate::services::cloud_file_service::UploadRequest;
use crate::state::AppState;
use crate::views::fields::parse_fields_param;
use crate::views::pagination::{Page, Pagination};
use crate::views::resolver::Action;
use crate::extract::{Json, Path, Query};
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, Response, StatusCode, header};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct ListQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    fields: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DetailQuery {
    fields: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DownloadQuery {
    delete: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateFileRequest {
    name: String,
}

/// POST /files: multipart upload-and-link.
///
/// Parts: `file` (required), `name`, `target` or `content_key` +
/// `content_field`, `object_id`, `use_original_filename`,
/// `link_to_content`.
pub async fn upload_file(
    State(state): State<AppState>,
    actor: Actor,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut file: Option<(bytes::Bytes, String, Option<String>)> = None;
    let mut name = None;
    let mut target = None;
    let mut content_key = None;
    let mut content_field = None;
    let mut object_id = None;
    let mut use_original_filename = false;
    let mut link_to_content = false;

    while let Some(field) = multipart.next_field().await? {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        ApiError::Validation("the `file` part must carry a filename".into())
                    })?;
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                file = Some((data, filename, content_type));
            }
            "name" => name = Some(field.text().await?),
            "target" => target = Some(field.text().await?),
            "content_key" => content_key = Some(field.text().await?),
            "content_field" => content_field = Some(field.text().await?),
            "object_id" => {
                let raw = field.text().await?;
                let id = Uuid::parse_str(raw.trim()).map_err(|_| {
                    ApiError::Validation(format!("`object_id` is not a valid UUID: `{raw}`"))
                })?;
                object_id = Some(id);
            }
            "use_original_filename" => use_original_filename = parse_bool(&field.text().await?),
            "link_to_content" => link_to_content = parse_bool(&field.text().await?),
            other => {
                tracing::debug!(part = %other, "ignoring unknown multipart part");
            }
        }
    }

    let (data, filename, content_type) =
        file.ok_or_else(|| ApiError::Validation("missing `file` part".into()))?;

    let uploaded = state
        .files
        .upload_and_link(
            &actor,
            UploadRequest {
                data,
                filename,
                content_type,
                name,
                target,
                content_key,
                content_field,
                object_id,
                use_original_filename,
                link_to_content,
            },
        )
        .await?;

    let body = render(
        &state.views.files,
        &actor,
        Action::Create,
        uploaded.representation(),
        true,
        None,
    );
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /files: paginated, owner-filtered list.
pub async fn list_files(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let pagination = Pagination::from_params(query.page, query.page_size);
    let fields = query.fields.as_deref().and_then(parse_fields_param);

    let (count, rows) = state.files.list_files(&actor, pagination).await?;

    let results: Vec<Value> = rows
        .into_iter()
        .map(|file| {
            render(
                &state.views.files,
                &actor,
                Action::List,
                file.representation(),
                false,
                fields.as_ref(),
            )
        })
        .collect();

    let page = Page {
        count,
        page: pagination.page,
        page_size: pagination.page_size,
        results,
    };
    Ok(Json(serde_json::to_value(page).map_err(|e| ApiError::Unexpected(e.to_string()))?))
}

/// GET /files/{id}
pub async fn get_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<Value>, ApiError> {
    let file = state.files.get_file(&actor, id).await?;
    let fields = query.fields.as_deref().and_then(parse_fields_param);

    let body = render(
        &state.views.files,
        &actor,
        Action::Retrieve,
        file.representation(),
        true,
        fields.as_ref(),
    );
    Ok(Json(body))
}

/// PATCH /files/{id}: rename; owner or admin only.
pub async fn update_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFileRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("`name` must not be empty".into()));
    }

    let file = state.files.update_file_name(&actor, id, &req.name).await?;
    let body = render(
        &state.views.files,
        &actor,
        Action::Update,
        file.representation(),
        true,
        None,
    );
    Ok(Json(body))
}

/// DELETE /files/{id}
pub async fn delete_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.files.delete_file(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /files/{id}/download: stream the payload back as an attachment.
///
/// `?delete=true` removes the remote object after serving, best-effort.
pub async fn download_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response<Body>, ApiError> {
    let (file, upload, data) = state.files.download(&actor, id).await?;

    if query.delete.as_deref().is_some_and(parse_bool) {
        state.files.delete_remote(&file).await;
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let disposition = content_disposition(&upload.name, user_agent);
    let content_type = file
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(data))
        .map_err(|e| ApiError::Unexpected(e.to_string()))
}

/// Attachment disposition header, varied by user agent the way browsers
/// expect: WebKit takes a bare filename, old IE chokes on any filename
/// parameter, everything else gets the RFC 5987 encoded form.
fn content_disposition(filename: &str, user_agent: &str) -> String {
    if user_agent.contains("WebKit") {
        format!("attachment; filename={filename}")
    } else if user_agent.contains("MSIE") {
        "attachment; ".to_string()
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            utf8_percent_encode(filename, NON_ALPHANUMERIC)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webkit_gets_a_bare_filename() {
        let header = content_disposition(
            "report.pdf",
            "Mozilla/5.0 AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
        );
        assert_eq!(header, "attachment; filename=report.pdf");
    }

    #[test]
    fn msie_gets_no_filename_at_all() {
        let header = content_disposition("report.pdf", "Mozilla/4.0 (compatible; MSIE 8.0)");
        assert_eq!(header, "attachment; ");
    }

    #[test]
    fn everyone_else_gets_rfc5987_encoding() {
        let header = content_disposition("r sum .pdf", "curl/8.0");
        assert_eq!(header, "attachment; filename*=UTF-8''r%20sum%20%2Epdf");
    }
}
