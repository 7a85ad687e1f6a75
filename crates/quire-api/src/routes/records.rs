//! # Record Routes
//!
//! - `GET    /api/records`              : paginated listing
//! - `GET    /api/records/:id`          : one record
//! - `POST   /api/records`              : create
//! - `PUT    /api/records/:id`          : update
//! - `POST   /api/records/:id/publish`  : publish
//! - `POST   /api/records/:id/unpublish`: back to draft
//! - `DELETE /api/records/:id`          : delete
//!
//! Anonymous readers see published records only. Admins and editors see
//! every draft; an author also sees their own drafts. Authors may write but
//! not publish.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use quire_core::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_any_role, require_role, OptionalPrincipal, Principal, Role};
use crate::db;
use crate::db::records::{NewRecord, RecordChanges, RecordRow};
use crate::error::AppError;
use crate::extractors::{extract_path, extract_validated_json, Validate};
use crate::response::{ApiResponse, ApiResult, Created};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records).post(create_record))
        .route(
            "/records/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/records/:id/publish", post(publish_record))
        .route("/records/:id/unpublish", post(unpublish_record))
}

const MAX_PER_PAGE: u32 = 100;
const MAX_SLUG_LEN: usize = 200;

const EDITORS: &[Role] = &[Role::Admin, Role::Editor];
const WRITERS: &[Role] = &[Role::Admin, Role::Editor, Role::Author];

/// Lowercase, hyphen-separated slug of `title`, or `None` when nothing usable remains.
pub fn slugify(title: &str) -> Option<String> {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    (!slug.is_empty()).then_some(slug)
}

fn record_not_found() -> AppError {
    AppError::NotFound("Record not found".to_string())
}

fn is_editor(principal: Option<&Principal>) -> bool {
    principal.is_some_and(|p| p.has_any_role(EDITORS))
}

/// Whether `principal` may see `record` in its current state.
fn can_view(record: &RecordRow, principal: Option<&Principal>) -> bool {
    record.is_published
        || is_editor(principal)
        || principal.is_some_and(|p| record.author_id == Some(p.id))
}

/// Map a slug uniqueness violation to a readable conflict.
fn slug_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Slug is already in use".to_string())
        }
        _ => AppError::from(err),
    }
}

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, at most 100. Defaults to the `records_per_page` setting.
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRecord {
    pub title: String,
    /// Derived from the title when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

impl Validate for CreateRecord {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::record_create()
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    /// `""` clears the excerpt.
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

impl Validate for UpdateRecord {
    fn schema() -> &'static Schema {
        quire_core::validation::schemas::record_update()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl UpdateRecord {
    fn into_changes(self) -> RecordChanges {
        RecordChanges {
            title: non_blank(self.title),
            slug: non_blank(self.slug),
            excerpt: self.excerpt.map(|e| non_blank(Some(e))),
            content: self.content,
            is_published: self.is_published,
        }
    }
}

// ── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordPage {
    pub items: Vec<RecordRow>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: u32,
}

// ── Handlers ────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/records",
    params(ListParams),
    responses(
        (status = 200, description = "One page of visible records", body = RecordPage),
        (status = 422, description = "Invalid paging parameters", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn list_records(
    State(state): State<AppState>,
    OptionalPrincipal(principal): OptionalPrincipal,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<RecordPage> {
    let Query(params) =
        params.map_err(|_| AppError::validation("page and per_page must be positive integers"))?;

    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::validation("page must be at least 1"));
    }
    let per_page = match params.per_page {
        Some(n) if (1..=MAX_PER_PAGE).contains(&n) => n,
        Some(_) => {
            return Err(AppError::validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )))
        }
        None => db::settings::records_per_page(&state.pool).await?,
    };

    let include_drafts = is_editor(principal.as_ref());
    let offset = i64::from(page - 1) * i64::from(per_page);
    let (items, total) =
        db::records::page(&state.pool, include_drafts, i64::from(per_page), offset).await?;
    let total_pages = u32::try_from((total + i64::from(per_page) - 1) / i64::from(per_page))
        .unwrap_or(u32::MAX);

    Ok(Json(ApiResponse::ok(RecordPage {
        items,
        page,
        per_page,
        total,
        total_pages,
    })))
}

#[utoipa::path(
    get,
    path = "/api/records/{id}",
    params(("id" = Uuid, Path, description = "Record ID")),
    responses(
        (status = 200, description = "The record", body = RecordRow),
        (status = 404, description = "Not found or not visible", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn get_record(
    State(state): State<AppState>,
    OptionalPrincipal(principal): OptionalPrincipal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<RecordRow> {
    let id = extract_path(id, "Record")?;
    let record = db::records::get(&state.pool, id)
        .await?
        .filter(|r| can_view(r, principal.as_ref()))
        .ok_or_else(record_not_found)?;
    Ok(Json(ApiResponse::ok(record)))
}

#[utoipa::path(
    post,
    path = "/api/records",
    request_body = CreateRecord,
    responses(
        (status = 201, description = "Record created", body = RecordRow),
        (status = 403, description = "Role missing, or author tried to publish", body = crate::response::ErrorBody),
        (status = 409, description = "Slug already in use", body = crate::response::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn create_record(
    State(state): State<AppState>,
    principal: Principal,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Created<RecordRow>, AppError> {
    require_any_role(&principal, WRITERS)?;
    let req: CreateRecord = extract_validated_json(body)?;

    let is_published = req.is_published.unwrap_or(false);
    if is_published && !principal.has_any_role(EDITORS) {
        return Err(AppError::Forbidden(
            "Only admins and editors may publish".to_string(),
        ));
    }

    let title = req.title.trim().to_string();
    let slug = match non_blank(req.slug) {
        Some(slug) => slug,
        None => slugify(&title).ok_or_else(|| {
            AppError::validation("slug is required when the title has no letters or digits")
        })?,
    };

    let new = NewRecord {
        title,
        slug,
        excerpt: non_blank(req.excerpt),
        content: req.content.unwrap_or_default(),
        author_id: principal.id,
        is_published,
    };
    let record = db::records::insert(&state.pool, &new, state.now())
        .await
        .map_err(slug_conflict)?;
    tracing::info!(record_id = %record.id, author = %principal.id, slug = %record.slug, "record created");

    Ok(Created(ApiResponse::ok(record).with_message("Record created")))
}

#[utoipa::path(
    put,
    path = "/api/records/{id}",
    params(("id" = Uuid, Path, description = "Record ID")),
    request_body = UpdateRecord,
    responses(
        (status = 200, description = "Record updated", body = RecordRow),
        (status = 403, description = "Not permitted", body = crate::response::ErrorBody),
        (status = 404, description = "Record not found", body = crate::response::ErrorBody),
        (status = 409, description = "Slug already in use", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn update_record(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<RecordRow> {
    require_any_role(&principal, WRITERS)?;
    let id = extract_path(id, "Record")?;
    let req: UpdateRecord = extract_validated_json(body)?;

    let existing = db::records::get(&state.pool, id)
        .await?
        .ok_or_else(record_not_found)?;

    if !principal.has_any_role(EDITORS) {
        if existing.author_id != Some(principal.id) {
            return Err(AppError::Forbidden(
                "Authors may only edit their own records".to_string(),
            ));
        }
        if req.is_published.is_some_and(|p| p != existing.is_published) {
            return Err(AppError::Forbidden(
                "Only admins and editors may publish".to_string(),
            ));
        }
    }

    let record = db::records::update(&state.pool, id, &req.into_changes(), state.now())
        .await
        .map_err(slug_conflict)?
        .ok_or_else(record_not_found)?;
    tracing::info!(record_id = %id, actor = %principal.id, "record updated");

    Ok(Json(ApiResponse::ok(record).with_message("Record updated")))
}

async fn set_published(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
    published: bool,
) -> Result<RecordRow, AppError> {
    require_any_role(principal, EDITORS)?;
    let record = db::records::set_published(&state.pool, id, published, state.now())
        .await?
        .ok_or_else(record_not_found)?;
    tracing::info!(record_id = %id, actor = %principal.id, published, "publication state changed");
    Ok(record)
}

#[utoipa::path(
    post,
    path = "/api/records/{id}/publish",
    params(("id" = Uuid, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record published", body = RecordRow),
        (status = 403, description = "Admin or editor role required", body = crate::response::ErrorBody),
        (status = 404, description = "Record not found", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn publish_record(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<RecordRow> {
    let id = extract_path(id, "Record")?;
    let record = set_published(&state, &principal, id, true).await?;
    Ok(Json(ApiResponse::ok(record).with_message("Record published")))
}

#[utoipa::path(
    post,
    path = "/api/records/{id}/unpublish",
    params(("id" = Uuid, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record unpublished", body = RecordRow),
        (status = 403, description = "Admin or editor role required", body = crate::response::ErrorBody),
        (status = 404, description = "Record not found", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn unpublish_record(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<RecordRow> {
    let id = extract_path(id, "Record")?;
    let record = set_published(&state, &principal, id, false).await?;
    Ok(Json(ApiResponse::ok(record).with_message("Record unpublished")))
}

#[utoipa::path(
    delete,
    path = "/api/records/{id}",
    params(("id" = Uuid, Path, description = "Record ID")),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 401, description = "Not authenticated", body = crate::response::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::response::ErrorBody),
        (status = 404, description = "Record not found", body = crate::response::ErrorBody),
    ),
    tag = "records"
)]
pub(crate) async fn delete_record(
    State(state): State<AppState>,
    principal: Principal,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    require_role(&principal, Role::Admin)?;
    let id = extract_path(id, "Record")?;
    if !db::records::delete(&state.pool, id).await? {
        return Err(record_not_found());
    }
    tracing::info!(record_id = %id, actor = %principal.id, "record deleted");
    Ok(StatusCode::NO_CONTENT)
}
