//! Test utilities and an in-process mock Paygate gateway.
//!
//! The mock implements the slice of the gateway API the SDK talks to:
//! device issuance, tokenization, transaction/preauthorization creation,
//! listing, get-by-id and consumption. It enforces the same contract rules
//! as the real gateway (single-use tokens, monotonic consumption,
//! device-scoped listings) so the integration tests can exercise them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use paygate_sdk::{Mode, Paygate, PaygateOptions, PaymentMethod, PaymentParams, StorageAdapter};

pub const TEST_PUBLIC_KEY: &str = "tpk_test_1";

/// Card number the mock declines at tokenization time.
pub const DECLINED_CARD: &str = "4000000000000002";

type Shared = Arc<Mutex<GatewayState>>;
type ErrorReply = (StatusCode, Json<Value>);

#[derive(Clone, Serialize)]
pub struct StoredEntity {
    pub id: String,
    pub device_id: String,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub status: String,
    pub consumable: bool,
    pub consumed: bool,
    pub created_at: i64,
}

#[derive(Default)]
pub struct GatewayState {
    clock: i64,
    pub devices: Vec<String>,
    /// token -> used
    pub tokens: HashMap<String, bool>,
    pub transactions: Vec<StoredEntity>,
    pub preauthorizations: Vec<StoredEntity>,
    /// "METHOD /path" per incoming request, in order
    pub requests: Vec<String>,
}

pub struct MockGateway {
    pub base_url: String,
    state: Shared,
}

impl MockGateway {
    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Number of requests whose "METHOD /path" starts with `prefix`.
    pub fn requests_to(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    pub fn token_count(&self) -> usize {
        self.state.lock().unwrap().tokens.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    pub fn preauthorization_count(&self) -> usize {
        self.state.lock().unwrap().preauthorizations.len()
    }
}

/// Bind the mock gateway on an ephemeral port and serve it in the
/// background for the rest of the test.
pub async fn spawn_gateway() -> MockGateway {
    let state: Shared = Arc::new(Mutex::new(GatewayState::default()));

    let app = Router::new()
        .route("/devices", post(create_device))
        .route("/tokens", post(create_token))
        .route(
            "/transactions",
            post(create_transaction).get(list_transactions),
        )
        .route("/transactions/{id}", get(get_transaction))
        .route("/transactions/{id}/consume", post(consume_transaction))
        .route(
            "/preauthorizations",
            post(create_preauthorization).get(list_preauthorizations),
        )
        .route("/preauthorizations/{id}", get(get_preauthorization))
        .route(
            "/preauthorizations/{id}/consume",
            post(consume_preauthorization),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock gateway");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockGateway {
        base_url: format!("http://{addr}"),
        state,
    }
}

/// A fresh client pointed at the mock, with in-memory storage.
pub fn gateway_client(gateway: &MockGateway) -> Paygate {
    Paygate::new(PaygateOptions {
        base_url: Some(gateway.base_url.clone()),
        ..Default::default()
    })
    .expect("Failed to build client")
}

/// A client over caller-provided storage, for simulated-restart tests.
pub fn gateway_client_with_storage(
    gateway: &MockGateway,
    storage: Arc<dyn StorageAdapter>,
) -> Paygate {
    Paygate::new(PaygateOptions {
        base_url: Some(gateway.base_url.clone()),
        storage: Some(storage),
        ..Default::default()
    })
    .expect("Failed to build client")
}

/// A client already initialized in test mode with a generated device id.
pub async fn initialized_client(gateway: &MockGateway) -> Paygate {
    let client = gateway_client(gateway);
    client
        .initialize(Mode::Test, TEST_PUBLIC_KEY, None)
        .await
        .expect("Failed to initialize client");
    client
}

pub fn test_card() -> PaymentMethod {
    PaymentMethod::card("4242424242424242", 12, 2030, Some("Jane Doe"), Some("123"))
}

pub fn declined_card() -> PaymentMethod {
    PaymentMethod::card(DECLINED_CARD, 12, 2030, None, Some("123"))
}

pub fn eur(amount: i64) -> PaymentParams {
    PaymentParams::new(amount, "EUR")
}

// ==================== Handlers ====================

fn error_reply(status: StatusCode, error: &str, details: Option<&str>) -> ErrorReply {
    (
        status,
        Json(json!({ "error": error, "details": details })),
    )
}

fn check_key(key: &str) -> Result<(), ErrorReply> {
    if key.is_empty() || key.starts_with("bad_") {
        return Err(error_reply(
            StatusCode::UNAUTHORIZED,
            "Invalid public key",
            None,
        ));
    }
    Ok(())
}

fn fresh_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Deserialize)]
struct DeviceRequest {
    public_key: String,
}

async fn create_device(
    State(state): State<Shared>,
    Json(body): Json<DeviceRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push("POST /devices".into());
    check_key(&body.public_key)?;

    let device_id = fresh_id("dev");
    state.devices.push(device_id.clone());
    Ok(Json(json!({ "device_id": device_id })))
}

#[derive(Deserialize)]
struct TokenRequest {
    public_key: String,
    test: bool,
    device_id: String,
    method: Value,
    #[serde(default)]
    amount: Option<i64>,
}

async fn create_token(
    State(state): State<Shared>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push("POST /tokens".into());
    check_key(&body.public_key)?;

    if body.test != body.public_key.starts_with("tpk_") {
        return Err(error_reply(
            StatusCode::UNAUTHORIZED,
            "Public key does not match mode",
            None,
        ));
    }
    if body.device_id.is_empty() {
        return Err(error_reply(StatusCode::BAD_REQUEST, "Missing device id", None));
    }
    if body.method["type"] == "card" && body.method["number"] == DECLINED_CARD {
        return Err(error_reply(
            StatusCode::FORBIDDEN,
            "Card declined",
            Some("The card was declined by the issuer"),
        ));
    }
    if let Some(amount) = body.amount {
        if amount <= 0 {
            return Err(error_reply(StatusCode::BAD_REQUEST, "Invalid amount", None));
        }
    }

    let token = fresh_id("tok");
    state.tokens.insert(token.clone(), false);
    Ok(Json(json!({ "token": token })))
}

#[derive(Deserialize)]
struct CreateRequest {
    public_key: String,
    device_id: String,
    token: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    description: Option<String>,
    consumable: bool,
}

fn create_entity(
    state: &mut GatewayState,
    body: CreateRequest,
    prefix: &str,
    status: &str,
) -> Result<StoredEntity, ErrorReply> {
    check_key(&body.public_key)?;

    match state.tokens.get_mut(&body.token) {
        None => {
            return Err(error_reply(
                StatusCode::BAD_REQUEST,
                "Unknown token",
                None,
            ))
        }
        Some(used) if *used => {
            return Err(error_reply(
                StatusCode::CONFLICT,
                "Token already used",
                None,
            ))
        }
        Some(used) => *used = true,
    }

    state.clock += 1;
    Ok(StoredEntity {
        id: fresh_id(prefix),
        device_id: body.device_id,
        amount: body.amount,
        currency: body.currency,
        description: body.description,
        status: status.to_string(),
        consumable: body.consumable,
        consumed: false,
        created_at: state.clock,
    })
}

async fn create_transaction(
    State(state): State<Shared>,
    Json(body): Json<CreateRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push("POST /transactions".into());

    let entity = create_entity(&mut state, body, "txn", "closed")?;
    state.transactions.push(entity.clone());
    Ok(Json(serde_json::to_value(entity).unwrap()))
}

async fn create_preauthorization(
    State(state): State<Shared>,
    Json(body): Json<CreateRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push("POST /preauthorizations".into());

    let entity = create_entity(&mut state, body, "pre", "open")?;
    state.preauthorizations.push(entity.clone());
    Ok(Json(serde_json::to_value(entity).unwrap()))
}

fn list_entities(
    entities: &[StoredEntity],
    query: &HashMap<String, String>,
) -> Result<Json<Value>, ErrorReply> {
    let key = query.get("public_key").map(String::as_str).unwrap_or("");
    check_key(key)?;
    let device_id = query.get("device_id").map(String::as_str).unwrap_or("");
    let not_consumed_only = query.get("filter").map(String::as_str) == Some("not_consumed");

    let data: Vec<&StoredEntity> = entities
        .iter()
        .filter(|e| e.device_id == device_id)
        .filter(|e| !not_consumed_only || !e.consumed)
        .collect();
    Ok(Json(json!({ "data": data })))
}

async fn list_transactions(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push("GET /transactions".into());
    list_entities(&state.transactions, &query)
}

async fn list_preauthorizations(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push("GET /preauthorizations".into());
    list_entities(&state.preauthorizations, &query)
}

fn find_entity<'a>(
    entities: &'a [StoredEntity],
    id: &str,
    query: &HashMap<String, String>,
) -> Result<&'a StoredEntity, ErrorReply> {
    let key = query.get("public_key").map(String::as_str).unwrap_or("");
    check_key(key)?;

    entities
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "Not found", None))
}

async fn get_transaction(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push(format!("GET /transactions/{id}"));
    let entity = find_entity(&state.transactions, &id, &query)?;
    Ok(Json(serde_json::to_value(entity).unwrap()))
}

async fn get_preauthorization(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push(format!("GET /preauthorizations/{id}"));
    let entity = find_entity(&state.preauthorizations, &id, &query)?;
    Ok(Json(serde_json::to_value(entity).unwrap()))
}

#[derive(Deserialize)]
struct ConsumeRequest {
    public_key: String,
}

fn consume_entity(
    entities: &mut [StoredEntity],
    id: &str,
    key: &str,
) -> Result<Json<Value>, ErrorReply> {
    check_key(key)?;

    let entity = entities
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| error_reply(StatusCode::NOT_FOUND, "Not found", None))?;

    if !entity.consumable {
        return Err(error_reply(
            StatusCode::BAD_REQUEST,
            "Not consumable",
            None,
        ));
    }

    // Idempotent: consuming twice reports the id again.
    entity.consumed = true;
    Ok(Json(json!({ "id": entity.id })))
}

async fn consume_transaction(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state.requests.push(format!("POST /transactions/{id}/consume"));
    consume_entity(&mut state.transactions, &id, &body.public_key)
}

async fn consume_preauthorization(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let mut state = state.lock().unwrap();
    state
        .requests
        .push(format!("POST /preauthorizations/{id}/consume"));
    consume_entity(&mut state.preauthorizations, &id, &body.public_key)
}
