//! Per-scenario state: last response, auth, created resources and update snapshots

use crate::registry::{payload_of, primary_record, ResourceRegistry};
use http_facade::{ApiClient, ApiResponse, HttpMethod};
use probe_core::{env, FixtureStore, ProbeError, ResourceKind, Result, Settings};
use record_verifier::{verify_timestamps, verify_unchanged_fields, verify_updated_fields};
use request_engine::{
    encode_component, final_request_body, MapSource, OverrideSet, Resolver, ValueSource,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Everything one scenario accumulates between steps. Created fresh for
/// every scenario; the fixture store and settings are shared.
#[derive(Debug)]
pub struct ScenarioContext {
    store: Arc<FixtureStore>,
    settings: Arc<Settings>,
    auth_token: Option<String>,
    current_username: Option<String>,
    last_response: Option<ApiResponse>,
    last_latency: Option<Duration>,
    registry: ResourceRegistry,
    last_request_body: Option<Value>,
    vars: Map<String, Value>,
    last_query_params: Map<String, Value>,
    last_requested_id: Option<Value>,
    before_update: BTreeMap<ResourceKind, Map<String, Value>>,
    after_update: BTreeMap<ResourceKind, Map<String, Value>>,
    expected_update: Option<Map<String, Value>>,
}

impl ScenarioContext {
    pub fn new(store: Arc<FixtureStore>, settings: Arc<Settings>) -> Self {
        Self {
            store,
            settings,
            auth_token: None,
            current_username: None,
            last_response: None,
            last_latency: None,
            registry: ResourceRegistry::new(),
            last_request_body: None,
            vars: Map::new(),
            last_query_params: Map::new(),
            last_requested_id: None,
            before_update: BTreeMap::new(),
            after_update: BTreeMap::new(),
            expected_update: None,
        }
    }

    pub fn store(&self) -> &FixtureStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Replaces the `Authorization` value sent with authenticated requests.
    pub fn set_auth_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    /// Uses `ACCESS_TOKEN` from the settings.
    pub fn use_valid_token(&mut self) -> Result<()> {
        let token = self.settings.access_token.clone().ok_or_else(|| ProbeError::Config {
            reason: format!("{} environment variable is not defined", env::ACCESS_TOKEN),
        })?;
        self.auth_token = Some(token);
        Ok(())
    }

    /// Uses `INVALID_ACCESS_TOKEN`, else `invalid_auth_token` from the test data.
    pub fn use_invalid_token(&mut self) -> Result<()> {
        let token = match self.settings.invalid_access_token.clone() {
            Some(token) => token,
            None => self
                .store
                .test_data()?
                .get_str("invalid_auth_token")
                .ok_or_else(|| ProbeError::fixture("invalid_auth_token is not in the test data"))?,
        };
        self.auth_token = Some(token);
        Ok(())
    }

    pub fn current_username(&self) -> Option<&str> {
        self.current_username.as_deref()
    }

    /// Sends one request through `client` and records the response and its
    /// latency as the scenario's last response.
    #[instrument(skip(self, client, body, headers))]
    pub async fn make_timed_request(
        &mut self,
        client: &ApiClient,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        headers: &[(String, String)],
        auth_required: bool,
    ) -> Result<&ApiResponse> {
        let method: HttpMethod = method.parse()?;
        let authorization = if auth_required {
            self.auth_token.as_deref()
        } else {
            None
        };

        let timed = client
            .send(method, endpoint, body, headers, authorization)
            .await?;
        info!("Request completed in {}ms", timed.elapsed_ms());

        self.last_latency = Some(timed.elapsed);
        Ok(self.last_response.insert(timed.response))
    }

    pub fn last_response(&self) -> Result<&ApiResponse> {
        self.last_response
            .as_ref()
            .ok_or_else(|| ProbeError::invalid("No response received yet"))
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    pub fn last_status(&self) -> Option<u16> {
        self.last_response.as_ref().map(|r| r.status)
    }

    /// The resource part of the last response body.
    pub fn response_payload(&self) -> Result<&Value> {
        Ok(payload_of(&self.last_response()?.data))
    }

    /// Records of `kind` in the last response: an array payload as is, a
    /// single or keyed object as a one-element list.
    pub fn response_records(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        let payload = self.response_payload()?;
        Ok(match payload {
            Value::Array(items) => items.clone(),
            other => primary_record(other, kind.id_field())
                .map(|record| vec![Value::Object(record.clone())])
                .unwrap_or_else(|| vec![other.clone()]),
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Registers the created resource from the last response. Only 200 and
    /// 201 responses are considered.
    pub fn store_created_resource(&mut self, kind: ResourceKind) -> Option<Value> {
        let response = self.last_response.as_ref()?;
        if response.status != 200 && response.status != 201 {
            warn!(
                "Not storing {}: response status was {}",
                kind, response.status
            );
            return None;
        }
        self.registry.store(kind, payload_of(&response.data))
    }

    pub fn created_resource_id(&self, type_name: &str) -> Result<Value> {
        self.registry.primary_id(type_name)
    }

    /// Sets the registered parent's id on a create body (FAQ Subcategory
    /// gets `category_id`, FAQ gets `sub_category_id`).
    pub fn inject_parent_id(&self, kind: ResourceKind, body: &mut Value) {
        let Some(parent) = kind.config().parent else {
            return;
        };
        let Ok(id) = self.registry.primary_id(&parent.registry_key()) else {
            return;
        };
        if let Some(map) = body.as_object_mut() {
            info!("Injected {}: {}", parent.id_field(), id);
            map.insert(parent.id_field().to_string(), id);
        }
    }

    /// Create body for `kind`: its fixture template, the table overrides,
    /// then the parent id.
    pub fn create_body(&self, kind: ResourceKind, overrides: Option<&OverrideSet>) -> Result<Value> {
        let key = kind.config().fixture_key;
        if key.is_empty() {
            return Err(ProbeError::invalid(format!("{} has no create template", kind)));
        }
        let mut body = final_request_body(&self.store, Some(key), overrides)?;
        self.inject_parent_id(kind, &mut body);
        Ok(body)
    }

    /// Update body for `kind` from its `-update` template.
    pub fn update_body(&self, kind: ResourceKind, overrides: Option<&OverrideSet>) -> Result<Value> {
        let key = kind.update_fixture_key();
        final_request_body(&self.store, Some(&key), overrides)
    }

    /// Collection endpoint of `kind`, with `/{id}` appended when given.
    pub fn resource_endpoint(&self, kind: ResourceKind, id: Option<&Value>) -> Result<String> {
        let base = self.settings.endpoint_for(kind)?;
        Ok(match id {
            Some(Value::String(text)) => format!("{}/{}", base, encode_component(text)),
            Some(other) => format!("{}/{}", base, encode_component(&other.to_string())),
            None => base.to_string(),
        })
    }

    pub fn last_request_body(&self) -> Option<&Value> {
        self.last_request_body.as_ref()
    }

    pub fn set_last_request_body(&mut self, body: Value) {
        self.last_request_body = Some(body);
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn last_query_params(&self) -> &Map<String, Value> {
        &self.last_query_params
    }

    pub fn set_last_query_params(&mut self, params: Map<String, Value>) {
        self.last_query_params = params;
    }

    pub fn last_requested_id(&self) -> Option<&Value> {
        self.last_requested_id.as_ref()
    }

    pub fn set_last_requested_id(&mut self, id: Option<Value>) {
        self.last_requested_id = id;
    }

    /// Runs `f` with a resolver over, in order: created resources, the last
    /// request body, scenario variables and the global test data.
    pub fn with_resolver<R>(&self, f: impl FnOnce(&Resolver<'_>) -> R) -> Result<R> {
        let test_data = self.store.test_data()?;
        let body = ValueSource::new("last request body", self.last_request_body.as_ref());
        let vars = MapSource::new("scenario variables", &self.vars);
        let resolver = Resolver::new()
            .with_source(&self.registry)
            .with_source(&body)
            .with_source(&vars)
            .with_source(&test_data);
        Ok(f(&resolver))
    }

    fn snapshot(&self, kind: ResourceKind) -> Result<Map<String, Value>> {
        primary_record(self.response_payload()?, kind.id_field())
            .cloned()
            .ok_or_else(|| {
                ProbeError::invalid(format!("Last response does not contain a {} record", kind))
            })
    }

    /// Keeps the `kind` record of the last response as the pre-update state.
    pub fn store_before_update(&mut self, kind: ResourceKind) -> Result<()> {
        let record = self.snapshot(kind)?;
        self.before_update.insert(kind, record);
        Ok(())
    }

    /// Keeps the `kind` record of the last response as the post-update state.
    pub fn store_after_update(&mut self, kind: ResourceKind) -> Result<()> {
        let record = self.snapshot(kind)?;
        self.after_update.insert(kind, record);
        Ok(())
    }

    pub fn before_update(&self, kind: ResourceKind) -> Option<&Map<String, Value>> {
        self.before_update.get(&kind)
    }

    pub fn after_update(&self, kind: ResourceKind) -> Option<&Map<String, Value>> {
        self.after_update.get(&kind)
    }

    pub fn set_expected_update(&mut self, body: Map<String, Value>) {
        self.expected_update = Some(body);
    }

    /// Runs the update contract against the stored snapshots. All three
    /// checks run and their failures are reported together.
    pub fn verify_update(&self, kind: ResourceKind) -> Result<()> {
        let missing = |what: &str| ProbeError::invalid(format!("No {} data stored for {}", what, kind));
        let before = self.before_update(kind).ok_or_else(|| missing("before-update"))?;
        let after = self.after_update(kind).ok_or_else(|| missing("after-update"))?;
        let expected = self.expected_update.as_ref().ok_or_else(|| missing("expected update"))?;

        let mut failures = Vec::new();
        for outcome in [
            verify_updated_fields(expected, after),
            verify_unchanged_fields(before, after, expected, expected),
            verify_timestamps(before, after),
        ] {
            match outcome {
                Ok(()) => {}
                Err(ProbeError::VerificationFailed { failures: more }) => failures.extend(more),
                Err(other) => return Err(other),
            }
        }

        if !failures.is_empty() {
            return Err(ProbeError::VerificationFailed { failures });
        }
        info!("{} data updated correctly", kind);
        Ok(())
    }

    /// Logs in through `LOGIN_ENDPOINT`. On a 200 response the access token
    /// becomes the scenario's `Bearer` token; other statuses are left for
    /// the scenario to assert on.
    #[instrument(skip(self, client, password))]
    pub async fn authenticate(&mut self, client: &ApiClient, username: &str, password: &str) -> Result<()> {
        let endpoint = self.settings.endpoint(env::LOGIN_ENDPOINT)?.to_string();
        let body = json!({ "username": username, "password": password });
        let response = self
            .make_timed_request(client, "post", &endpoint, Some(&body), &[], false)
            .await?;
        if response.status != 200 {
            warn!("Login for {} returned {}", username, response.status);
            return Ok(());
        }

        let token = response
            .data
            .pointer("/jwt/accessToken")
            .and_then(Value::as_str)
            .ok_or_else(|| ProbeError::Http {
                reason: "Access token not found in the response".to_string(),
            })?
            .to_string();
        self.auth_token = Some(format!("Bearer {}", token));
        self.current_username = Some(username.to_string());
        info!("Logged in as {}", username);
        Ok(())
    }

    /// `created_by` of the `kind` record in the last response equals the
    /// logged-in user's id.
    pub fn verify_created_by(&self, kind: ResourceKind) -> Result<()> {
        let username = self
            .current_username
            .as_deref()
            .ok_or_else(|| ProbeError::invalid("No user is logged in"))?;
        let users = self.store.users()?;
        let expected = users
            .user_details(username)
            .and_then(|user| user.get("user_id"))
            .cloned()
            .ok_or_else(|| ProbeError::fixture(format!("No user_id for {}", username)))?;

        let record = self.snapshot(kind)?;
        let actual = record.get("created_by").ok_or_else(|| ProbeError::VerificationFailed {
            failures: vec![format!("{} response missing created_by", kind)],
        })?;

        if *actual != expected {
            return Err(ProbeError::VerificationFailed {
                failures: vec![format!(
                    "{} created_by mismatch. Expected: {} ({}), Got: {}",
                    kind, expected, username, actual
                )],
            });
        }
        info!("{} created_by matches logged-in user: {}", kind, username);
        Ok(())
    }
}
