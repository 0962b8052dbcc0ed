//! Content object endpoints: the records cloud files link to.

use crate::errors::ApiError;
use crate::handlers::render;
use crate::models::actor::Actor;
use crate::state::AppState;
use crate::views::fields::parse_fields_param;
use crate::views::geo::DistanceFilter;
use crate::views::pagination::{Page, Pagination};
use crate::views::resolver::Action;
use crate::extract::{Json, Path, Query};
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct CreateContentRequest {
    content_key: String,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct ContentListQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    fields: Option<String>,
    distance: Option<String>,
    point: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DetailQuery {
    fields: Option<String>,
}

/// POST /content
pub async fn create_content(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateContentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("`name` must not be empty".into()));
    }

    let object = state
        .files
        .create_content(&actor, &req.content_key, &req.name, req.latitude, req.longitude)
        .await?;

    let body = render(
        &state.views.contents,
        &actor,
        Action::Create,
        object.representation(),
        true,
        None,
    );
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /content: paginated, owner-filtered, optionally distance-filtered.
///
/// With `?distance=` and `?point=lat,lng` set, results are annotated with a
/// `distance` field in meters and ordered nearest first. Malformed geo
/// parameters switch the filter off rather than erroring.
pub async fn list_contents(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ContentListQuery>,
) -> Result<Json<Value>, ApiError> {
    let pagination = Pagination::from_params(query.page, query.page_size);
    let fields = query.fields.as_deref().and_then(parse_fields_param);
    let geo = DistanceFilter::from_params(
        query.distance.as_deref(),
        query.point.as_deref(),
        state.distance_unit,
    );

    let (count, rows) = state.files.list_contents(&actor, pagination, geo).await?;

    let results: Vec<Value> = rows
        .into_iter()
        .map(|(object, distance)| {
            let mut value = object.representation();
            if let (Value::Object(map), Some(distance)) = (&mut value, distance) {
                map.insert("distance".to_string(), distance.into());
            }
            render(
                &state.views.contents,
                &actor,
                Action::List,
                value,
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

/// GET /content/{id}: the object plus its links, grouped by field name.
pub async fn get_content(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<Value>, ApiError> {
    let (object, links) = state.files.get_content(&actor, id).await?;
    let fields = query.fields.as_deref().and_then(parse_fields_param);

    let mut grouped: BTreeMap<String, Vec<Uuid>> = BTreeMap::new();
    for (field, file_id) in links {
        grouped.entry(field).or_default().push(file_id);
    }

    let mut value = object.representation();
    if let Value::Object(map) = &mut value {
        map.insert(
            "links".to_string(),
            serde_json::to_value(grouped).map_err(|e| ApiError::Unexpected(e.to_string()))?,
        );
    }

    let body = render(
        &state.views.contents,
        &actor,
        Action::Retrieve,
        value,
        true,
        fields.as_ref(),
    );
    Ok(Json(body))
}
