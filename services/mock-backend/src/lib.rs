//! # Mock Backend
//!
//! In-memory stand-in for the device-management and support-engagement
//! APIs. Every table lives in a [`MemoryRecordSource`] so scenarios can
//! verify API payloads against the same rows the handlers wrote.
//!
//! [`MemoryRecordSource`]: record_verifier::MemoryRecordSource

pub mod state;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use probe_core::resource::DEVICE_MANAGEMENT_DB;
use probe_core::{ResourceKind, VERSION};
use record_verifier::{normalize_query_params, source::row_matches, Record};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub use state::AppState;

pub const HEALTH: &str = "/health";
pub const LOGIN: &str = "/api/v1/auth/login";
pub const DEVICE_REGISTER: &str = "/api/v1/devices/register";
pub const DEVICE_DETAILS: &str = "/api/v1/devices/{device_id}";
pub const MAP_DEVICE: &str = "/api/v1/organisations/{organisation_code}/devices/{device_id}/map";

const DEVICE_TABLE: &str = "device_registration";
const DEVICE_MAPPING_TABLE: &str = "device_mapping";

/// Query keys that shape the listing instead of filtering it.
const LISTING_KEYS: [&str; 3] = ["page", "limit", "is_shuffle"];

/// Collection kinds served by the generic CRUD routes, with their paths.
pub const COLLECTIONS: [(ResourceKind, &str); 6] = [
    (ResourceKind::FaqCategory, "/api/v1/faq-categories"),
    (ResourceKind::FaqSubcategory, "/api/v1/faq-subcategories"),
    (ResourceKind::Faq, "/api/v1/faqs"),
    (ResourceKind::Issue, "/api/v1/issues"),
    (ResourceKind::Quote, "/api/v1/quotes"),
    (ResourceKind::MarketingCarousel, "/api/v1/marketing-carousel"),
];

/// `*_ENDPOINT` variable → path, as a client of this backend would configure it.
pub fn endpoint_vars() -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = COLLECTIONS
        .iter()
        .map(|(kind, path)| (kind.config().endpoint_var.to_string(), path.to_string()))
        .collect();
    vars.insert("LOGIN_ENDPOINT".into(), LOGIN.into());
    vars.insert("DEVICE_REGISTER_ENDPOINT".into(), DEVICE_REGISTER.into());
    vars.insert("GET_DEVICE_DETAILS_ENDPOINT".into(), DEVICE_DETAILS.into());
    vars.insert("MAP_DEVICE_ENDPOINT".into(), MAP_DEVICE.into());
    vars
}

fn required_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::FaqCategory => &["category_name"],
        ResourceKind::FaqSubcategory => &["sub_category_name", "category_id"],
        ResourceKind::Faq => &["question", "answer", "sub_category_id"],
        ResourceKind::Issue => &["category", "description"],
        ResourceKind::Quote => &["quote_text"],
        ResourceKind::MarketingCarousel => &["image_url", "active_from", "active_to"],
        _ => &[],
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("{} {}", self.status, self.message);
        (
            self.status,
            Json(json!({ "status": false, "message": self.message })),
        )
            .into_response()
    }
}

type ApiResult = Result<(StatusCode, Json<Value>), ApiError>;

fn ok(status: StatusCode, message: &str, data: Value) -> ApiResult {
    Ok((
        status,
        Json(json!({ "status": true, "message": message, "data": data })),
    ))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Value, ApiError> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authorization header is required"))?;
    state
        .user_for(header)
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

fn body_object(body: Value) -> Result<Record, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn id_filter(field: &str, id: Value) -> Record {
    let mut filter = Map::new();
    filter.insert(field.to_string(), id);
    filter
}

/// Path ids arrive as text; numeric ones are matched as numbers.
fn path_id(raw: &str) -> Value {
    raw.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Builds the full router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route(HEALTH, get(health_check))
        .route(LOGIN, post(login))
        .route(DEVICE_REGISTER, post(register_device))
        .route(DEVICE_DETAILS, get(device_details))
        .route(MAP_DEVICE, post(map_device));

    for (kind, path) in COLLECTIONS {
        let collection = Collection {
            app: state.clone(),
            kind,
        };
        app = app
            .route(path, get(list_records).post(create_record).with_state(collection.clone()))
            .route(
                &format!("{}/{{id}}", path),
                get(fetch_record)
                    .patch(update_record)
                    .delete(delete_record)
                    .with_state(collection),
            );
    }

    app.with_state(state)
}

#[instrument]
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "mock-backend",
        "version": VERSION
    }))
}

#[instrument(skip(state, body))]
async fn login(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> ApiResult {
    let username = body.get("username").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let user = state
        .users()
        .user_details(username)
        .cloned()
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials"))?;
    if let Some(expected) = user.get("password").and_then(Value::as_str) {
        if expected != password {
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials"));
        }
    }

    let user_id = user.get("user_id").cloned().unwrap_or(Value::Null);
    let token = state.open_session(user_id.clone());
    info!("Opened session for {}", username);
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": true,
            "user_id": user_id,
            "jwt": { "accessToken": token }
        })),
    ))
}

#[instrument(skip(state, headers, body))]
async fn register_device(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let mut device = body_object(body)?;

    for field in ["mobile_number", "unique_device_id"] {
        if is_blank(device.get(field)) {
            return Err(ApiError::bad_request(format!("{} is required", field)));
        }
    }
    if is_blank(device.get("device_configuration").and_then(|c| c.get("os"))) {
        return Err(ApiError::bad_request("device_configuration.os is required"));
    }

    let device_id = uuid::Uuid::new_v4().to_string();
    let now = state.timestamp();
    device.insert("device_id".into(), Value::String(device_id.clone()));
    device.insert("created_at".into(), Value::String(now.clone()));
    device.insert("updated_at".into(), Value::String(now));

    state
        .records
        .insert_row(DEVICE_MANAGEMENT_DB, DEVICE_TABLE, device.clone());
    info!("Registered device {}", device_id);
    ok(StatusCode::CREATED, "Device registered successfully", Value::Object(device))
}

#[instrument(skip(state, headers))]
async fn device_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
) -> ApiResult {
    authorize(&state, &headers)?;
    let filter = id_filter("device_id", Value::String(device_id.clone()));
    let mut device = state
        .records
        .rows(DEVICE_MANAGEMENT_DB, DEVICE_TABLE)
        .into_iter()
        .find(|row| row_matches(row, &filter))
        .ok_or_else(|| ApiError::not_found(format!("Device {}", device_id)))?;

    let mappings: Vec<Value> = state
        .records
        .rows(DEVICE_MANAGEMENT_DB, DEVICE_MAPPING_TABLE)
        .into_iter()
        .filter(|row| row_matches(row, &filter))
        .map(Value::Object)
        .collect();
    device.insert("mappings".into(), Value::Array(mappings));

    ok(StatusCode::OK, "Device details fetched", Value::Object(device))
}

#[instrument(skip(state, headers))]
async fn map_device(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((organisation_code, device_id)): Path<(String, String)>,
) -> ApiResult {
    authorize(&state, &headers)?;
    if organisation_code.trim().is_empty() {
        return Err(ApiError::bad_request("organisation_code is required"));
    }

    let filter = id_filter("device_id", Value::String(device_id.clone()));
    let registered = state
        .records
        .rows(DEVICE_MANAGEMENT_DB, DEVICE_TABLE)
        .iter()
        .any(|row| row_matches(row, &filter));
    if !registered {
        return Err(ApiError::not_found(format!("Device {}", device_id)));
    }

    let mapping = json!({
        "device_id": device_id,
        "organisation_code": organisation_code,
        "mapped_at": state.timestamp(),
    });
    if let Value::Object(row) = &mapping {
        state
            .records
            .insert_row(DEVICE_MANAGEMENT_DB, DEVICE_MAPPING_TABLE, row.clone());
    }
    ok(StatusCode::OK, "Device mapped successfully", mapping)
}

/// Route state of one CRUD collection.
#[derive(Clone)]
struct Collection {
    app: Arc<AppState>,
    kind: ResourceKind,
}

impl Collection {
    fn database(&self) -> &'static str {
        self.kind.config().database
    }

    fn table(&self) -> &'static str {
        self.kind.config().table
    }

    fn find(&self, id: &Value) -> Option<Record> {
        let filter = id_filter(self.kind.id_field(), id.clone());
        self.app
            .records
            .rows(self.database(), self.table())
            .into_iter()
            .find(|row| row_matches(row, &filter))
    }

    /// Attaches dependent rows (FAQ resources) to a record.
    fn with_dependents(&self, mut record: Record) -> Record {
        if let Some(dependent) = self.kind.config().dependent {
            let config = dependent.config();
            let Some(id) = record.get(self.kind.id_field()).cloned() else {
                return record;
            };
            let filter = id_filter(self.kind.id_field(), id);
            let rows: Vec<Value> = self
                .app
                .records
                .rows(config.database, config.table)
                .into_iter()
                .filter(|row| row_matches(row, &filter))
                .map(Value::Object)
                .collect();
            record.insert("resources".into(), Value::Array(rows));
        }
        record
    }

    /// Stores `items` as dependent rows of `parent_id` and returns them.
    fn store_dependents(&self, parent_id: &Value, items: Vec<Value>, now: &str) -> Vec<Value> {
        let Some(dependent) = self.kind.config().dependent else {
            return Vec::new();
        };
        let config = dependent.config();

        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(mut row) => {
                    row.insert(config.id_field.into(), Value::from(self.app.next_id()));
                    row.insert(self.kind.id_field().into(), parent_id.clone());
                    row.insert("created_at".into(), Value::String(now.to_string()));
                    row.insert("updated_at".into(), Value::String(now.to_string()));
                    self.app
                        .records
                        .insert_row(config.database, config.table, row.clone());
                    Some(Value::Object(row))
                }
                _ => None,
            })
            .collect()
    }
}

async fn list_records(
    State(collection): State<Collection>,
    headers: HeaderMap,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult {
    authorize(&collection.app, &headers)?;

    let raw: Map<String, Value> = params
        .into_iter()
        .filter(|(key, value)| !LISTING_KEYS.contains(&key.as_str()) && !value.is_empty())
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    let filter = normalize_query_params(&raw);

    let rows: Vec<Value> = collection
        .app
        .records
        .rows(collection.database(), collection.table())
        .into_iter()
        .filter(|row| row_matches(row, &filter))
        .map(|row| Value::Object(collection.with_dependents(row)))
        .collect();

    info!("Listing {} {} rows", rows.len(), collection.kind);
    ok(StatusCode::OK, "Records fetched", Value::Array(rows))
}

async fn create_record(
    State(collection): State<Collection>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    let user_id = authorize(&collection.app, &headers)?;
    let mut record = body_object(body)?;
    let kind = collection.kind;

    for field in required_fields(kind) {
        if is_blank(record.get(*field)) {
            return Err(ApiError::bad_request(format!("{} is required", field)));
        }
    }

    if let Some(parent) = kind.config().parent {
        let parent_id = record.get(parent.id_field()).cloned().unwrap_or(Value::Null);
        let parents = Collection {
            app: collection.app.clone(),
            kind: parent,
        };
        if parents.find(&parent_id).is_none() {
            return Err(ApiError::not_found(parent));
        }
    }

    let id = Value::from(collection.app.next_id());
    let now = collection.app.timestamp();
    let dependents = match record.remove("resources") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    record.insert(kind.id_field().into(), id.clone());
    record.insert("created_by".into(), user_id);
    record.insert("created_at".into(), Value::String(now.clone()));
    record.insert("updated_at".into(), Value::String(now.clone()));
    collection
        .app
        .records
        .insert_row(collection.database(), collection.table(), record.clone());

    let stored = collection.store_dependents(&id, dependents, &now);
    info!("Created {} {}", kind, id);

    if kind.config().dependent.is_some() {
        let mut payload = vec![Value::Object(record)];
        payload.extend(stored);
        return ok(StatusCode::CREATED, "Created successfully", Value::Array(payload));
    }
    ok(StatusCode::CREATED, "Created successfully", Value::Object(record))
}

async fn fetch_record(
    State(collection): State<Collection>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> ApiResult {
    authorize(&collection.app, &headers)?;
    let record = collection
        .find(&path_id(&raw_id))
        .ok_or_else(|| ApiError::not_found(format!("{} {}", collection.kind, raw_id)))?;

    let mut record = collection.with_dependents(record);
    record.insert("retrieved_at".into(), Value::String(collection.app.timestamp()));
    ok(StatusCode::OK, "Record fetched", Value::Object(record))
}

async fn update_record(
    State(collection): State<Collection>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    authorize(&collection.app, &headers)?;
    let mut changes = body_object(body)?;
    let kind = collection.kind;
    let id = path_id(&raw_id);

    for field in required_fields(kind) {
        if changes.contains_key(*field) && is_blank(changes.get(*field)) {
            return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
        }
    }
    for protected in [kind.id_field(), "created_at", "created_by"] {
        changes.remove(protected);
    }
    let dependents = changes.remove("resources");

    let now = collection.app.timestamp();
    let filter = id_filter(kind.id_field(), id.clone());
    let updated = collection.app.records.update_rows(
        collection.database(),
        collection.table(),
        &filter,
        |row| {
            for (key, value) in &changes {
                row.insert(key.clone(), value.clone());
            }
            row.insert("updated_at".into(), Value::String(now.clone()));
        },
    );
    let Some(record) = updated.into_iter().next() else {
        return Err(ApiError::not_found(format!("{} {}", kind, raw_id)));
    };

    if let (Some(Value::Array(items)), Some(dependent)) = (dependents, kind.config().dependent) {
        let config = dependent.config();
        collection
            .app
            .records
            .delete_matching(config.database, config.table, &filter);
        collection.store_dependents(&id, items, &now);
    }

    info!("Updated {} {}", kind, raw_id);
    ok(
        StatusCode::OK,
        "Updated successfully",
        Value::Object(collection.with_dependents(record)),
    )
}

async fn delete_record(
    State(collection): State<Collection>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> ApiResult {
    authorize(&collection.app, &headers)?;
    let filter = id_filter(collection.kind.id_field(), path_id(&raw_id));
    let removed = collection
        .app
        .records
        .delete_matching(collection.database(), collection.table(), &filter);
    if removed == 0 {
        return Err(ApiError::not_found(format!("{} {}", collection.kind, raw_id)));
    }

    if let Some(dependent) = collection.kind.config().dependent {
        let config = dependent.config();
        collection
            .app
            .records
            .delete_matching(config.database, config.table, &filter);
    }

    info!("Deleted {} {}", collection.kind, raw_id);
    ok(StatusCode::OK, "Deleted successfully", Value::Null)
}
