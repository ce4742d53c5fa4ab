//! In-process stand-in for the Maldo API, bound to an ephemeral port.
//!
//! It keeps just enough state to follow deals through approval, escrow and
//! delivery, and counts the calls tests need to assert on.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const PAY_TO: &str = "0x5aFE00000000000000000000000000000000cafe";
pub const APPROVAL_THRESHOLD: u64 = 100_000_000;

#[derive(Debug, Clone)]
pub struct DealEntry {
    pub status: String,
    pub approval_id: Option<u64>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub agents: Vec<Value>,
    pub deals: Vec<(String, DealEntry)>,
    pub next_id: u64,
    pub price: String,
    pub payment_posts: u32,
    pub requirement_gets: u32,
    pub evaluations: u32,
    pub last_payment_headers: HashMap<String, String>,
    /// `X-Maldo-Service-Id` seen on each x402 call, in order.
    pub service_id_headers: Vec<Option<String>>,
    pub last_query: HashMap<String, String>,
    pub last_body: Value,
    pub polls: HashMap<String, u32>,
    pub deliver_after: u32,
    pub criteria: HashMap<String, Value>,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn deal_mut(&mut self, nonce: &str) -> Option<&mut DealEntry> {
        self.deals.iter_mut().find(|(n, _)| n == nonce).map(|(_, d)| d)
    }

    fn open_deal(&mut self, status: &str, approval_id: Option<u64>) -> String {
        let nonce = format!("0xdeal{:04}", self.next());
        self.deals.push((
            nonce.clone(),
            DealEntry {
                status: status.to_string(),
                approval_id,
            },
        ));
        nonce
    }
}

pub type Shared = Arc<Mutex<MockState>>;

pub struct MockMaldo {
    pub url: String,
    pub state: Shared,
}

impl MockMaldo {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            price: "50000000".to_string(),
            deliver_after: 2,
            ..Default::default()
        }));

        let app = Router::new()
            .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
            .route("/api/v1/services/register", post(register))
            .route("/api/v1/services/discover", get(discover))
            .route("/api/v1/agents", get(list_agents))
            .route("/api/v1/agents/:id", get(get_agent))
            .route("/api/v1/agents/:id/reputation", get(reputation))
            .route("/api/v1/agents/:id/rate", post(rate))
            .route("/api/v1/agents/:id/vouch", post(|| async { Json(json!({ "success": true })) }))
            .route("/api/v1/agents/:id/vouches", get(vouches))
            .route("/api/v1/deals", get(list_deals))
            .route("/api/v1/deals/*rest", get(deals_dispatch).post(deals_dispatch))
            .route("/api/v1/principals/:principal/criteria", get(get_criteria).put(put_criteria))
            .route("/api/v1/criteria/evaluate", post(evaluate))
            .route("/x402/services/:capability", get(requirements).post(submit))
            .route("/x402/deals/:nonce/result", get(result))
            .route("/errors/teapot", get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }))
            .route(
                "/errors/maintenance",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "maintenance" }))) }),
            )
            .route(
                "/errors/payment",
                get(|| async { (StatusCode::PAYMENT_REQUIRED, Json(json!({ "error": "pay first" }))) })
                    .post(|| async {
                        (
                            StatusCode::PAYMENT_REQUIRED,
                            Json(json!({ "maxAmountRequired": "5", "payTo": PAY_TO })),
                        )
                    })
                    .put(|| async { (StatusCode::PAYMENT_REQUIRED, Json(json!({ "error": "pay first" }))) }),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn client(&self) -> maldo::MaldoClient {
        // Trailing slash on purpose: the client must normalize it away.
        maldo::MaldoClient::new(format!("{}/", self.url))
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_agent(&self, name: &str, capability: &str, base_price: u64) -> String {
        self.with_state(|s| {
            let service_id = s.next();
            let id = format!("agent-{}", service_id);
            s.agents.push(json!({
                "agentId": id,
                "serviceId": service_id,
                "name": name,
                "capabilities": [capability],
                "basePrice": base_price,
                "reputation": { "score": 4.8, "bayesianScore": 4.6, "reviewCount": 3, "disputeRate": 0.0 }
            }));
            id
        })
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

async fn register(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let name = body["name"].as_str().unwrap_or_default();
    if name.is_empty() {
        return error(StatusCode::BAD_REQUEST, "name is required");
    }
    let mut s = state.lock().unwrap();
    let id = format!("agent-{}", s.next());
    let mut agent = body.clone();
    agent["agentId"] = json!(id);
    s.agents.push(agent.clone());
    s.last_body = body;
    (StatusCode::CREATED, Json(agent)).into_response()
}

async fn discover(State(state): State<Shared>, Query(query): Query<HashMap<String, String>>) -> Response {
    let mut s = state.lock().unwrap();
    let capability = query.get("capability").cloned().unwrap_or_default();
    let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
    let agents: Vec<Value> = s
        .agents
        .iter()
        .filter(|a| {
            a["capabilities"]
                .as_array()
                .map_or(false, |caps| caps.iter().any(|c| c == capability.as_str()))
        })
        .take(limit)
        .cloned()
        .collect();
    s.last_query = query;
    Json(json!({ "agents": agents })).into_response()
}

async fn list_agents(State(state): State<Shared>) -> Response {
    let s = state.lock().unwrap();
    Json(json!({ "agents": s.agents })).into_response()
}

async fn get_agent(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let s = state.lock().unwrap();
    match s.agents.iter().find(|a| a["agentId"] == id.as_str()) {
        Some(agent) => Json(agent.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "Agent not found"),
    }
}

async fn reputation(Path(id): Path<String>) -> Response {
    Json(json!({
        "agentId": id,
        "score": 4.8,
        "bayesianScore": 4.6,
        "reviewCount": 3,
        "disputeRate": 0.0
    }))
    .into_response()
}

async fn rate(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let score = body["score"].as_u64().unwrap_or(0);
    state.lock().unwrap().last_body = body;
    if !(1..=5).contains(&score) {
        return error(StatusCode::BAD_REQUEST, "score must be between 1 and 5");
    }
    Json(json!({ "success": true })).into_response()
}

async fn vouches(Path(id): Path<String>) -> Response {
    Json(json!({ "vouches": [{ "voucherAgentId": "agent-voucher", "voucherWallet": "0xv", "voucheeAgentId": id }] }))
        .into_response()
}

async fn list_deals(State(state): State<Shared>) -> Response {
    let s = state.lock().unwrap();
    let deals: Vec<Value> = s
        .deals
        .iter()
        .map(|(nonce, d)| json!({ "nonce": nonce, "status": d.status }))
        .collect();
    Json(json!({ "deals": deals })).into_response()
}

/// Everything under /api/v1/deals/, routed by hand to keep static and dynamic
/// segments from colliding in the router.
async fn deals_dispatch(
    State(state): State<Shared>,
    method: Method,
    Path(rest): Path<String>,
    body: Bytes,
) -> Response {
    let mut s = state.lock().unwrap();
    let parts: Vec<String> = rest
        .trim_start_matches('/')
        .split('/')
        .map(str::to_string)
        .collect();
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();

    match (method.as_str(), parts.as_slice()) {
        ("POST", ["create"]) => {
            let body = parse_body(&body);
            let price = body["priceUSDC"].as_u64().unwrap_or(0);
            let has_principal = body.get("principal").is_some();
            s.last_body = body;
            if has_principal && price > APPROVAL_THRESHOLD {
                let approval_id = s.next();
                let nonce = s.open_deal("pending_approval", Some(approval_id));
                Json(json!({
                    "requiresHumanApproval": true,
                    "pendingApprovalId": approval_id,
                    "failedChecks": ["maxPrice"],
                    "nonce": nonce
                }))
                .into_response()
            } else {
                let nonce = s.open_deal("escrowed", None);
                Json(json!({ "nonce": nonce, "status": "escrowed", "dealId": s.next_id })).into_response()
            }
        }
        ("GET", [nonce, "status"]) => {
            let nonce = nonce.to_string();
            match s.deal_mut(&nonce) {
                Some(deal) => Json(json!({ "nonce": nonce, "status": deal.status })).into_response(),
                None => error(StatusCode::NOT_FOUND, "Deal not found"),
            }
        }
        ("POST", [decision @ ("approve" | "reject"), id]) => {
            let id: u64 = match id.parse() {
                Ok(id) => id,
                Err(_) => return error(StatusCode::BAD_REQUEST, "invalid approval id"),
            };
            let new_status = if *decision == "approve" { "escrowed" } else { "rejected" };
            let found = s
                .deals
                .iter_mut()
                .find(|(_, d)| d.approval_id == Some(id) && d.status == "pending_approval");
            match found {
                Some((nonce, deal)) => {
                    deal.status = new_status.to_string();
                    Json(json!({ "nonce": nonce, "status": new_status })).into_response()
                }
                None => error(StatusCode::NOT_FOUND, "Pending approval not found"),
            }
        }
        ("GET", ["pending", _principal]) => {
            let pending: Vec<Value> = s
                .deals
                .iter()
                .filter(|(_, d)| d.status == "pending_approval")
                .map(|(nonce, d)| json!({ "approvalId": d.approval_id, "nonce": nonce }))
                .collect();
            Json(json!({ "pending": pending })).into_response()
        }
        ("POST", [nonce, "complete"]) => {
            let nonce = nonce.to_string();
            match s.deal_mut(&nonce) {
                Some(deal) if deal.status == "delivered" || deal.status == "escrowed" => {
                    deal.status = "completed".to_string();
                    Json(json!({ "nonce": nonce, "status": "completed" })).into_response()
                }
                Some(deal) => error(
                    StatusCode::CONFLICT,
                    &format!("Deal cannot be completed from {}", deal.status),
                ),
                None => error(StatusCode::NOT_FOUND, "Deal not found"),
            }
        }
        _ => error(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn get_criteria(State(state): State<Shared>, Path(principal): Path<String>) -> Response {
    let s = state.lock().unwrap();
    let policy = s
        .criteria
        .get(&principal)
        .cloned()
        .unwrap_or_else(|| json!({ "preset": "balanced", "maxPrice": APPROVAL_THRESHOLD }));
    Json(policy).into_response()
}

async fn put_criteria(
    State(state): State<Shared>,
    Path(principal): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let preset = body["preset"].as_str().unwrap_or_default().to_string();
    let max_price = match preset.as_str() {
        "conservative" => 10_000_000,
        "balanced" => APPROVAL_THRESHOLD,
        "aggressive" => 1_000_000_000,
        _ => return error(StatusCode::BAD_REQUEST, &format!("Unknown preset: {}", preset)),
    };
    let policy = json!({ "preset": preset, "maxPrice": max_price });
    state.lock().unwrap().criteria.insert(principal, policy.clone());
    Json(policy).into_response()
}

async fn evaluate(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut s = state.lock().unwrap();
    s.evaluations += 1;
    let principal = body["principal"].as_str().unwrap_or_default();
    let max_price = s
        .criteria
        .get(principal)
        .and_then(|p| p["maxPrice"].as_u64())
        .unwrap_or(APPROVAL_THRESHOLD);
    let price = body["price"].as_u64().unwrap_or(0);
    let failed: Vec<&str> = if price > max_price { vec!["maxPrice"] } else { vec![] };
    Json(json!({ "autoApprove": failed.is_empty(), "failedChecks": failed })).into_response()
}

fn service_id_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-maldo-service-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn requirements_json(price: &str) -> Value {
    json!({
        "scheme": "exact",
        "network": "base-sepolia",
        "maxAmountRequired": price,
        "payTo": PAY_TO
    })
}

async fn requirements(
    State(state): State<Shared>,
    Path(capability): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut s = state.lock().unwrap();
    s.requirement_gets += 1;
    s.service_id_headers.push(service_id_header(&headers));
    let price = s.price.clone();
    match capability.as_str() {
        "free" => Json(json!({ "ok": true })).into_response(),
        "body-only" => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "error": "Payment required", "requirements": { "amount": price, "payTo": PAY_TO } })),
        )
            .into_response(),
        "broken" => (
            StatusCode::PAYMENT_REQUIRED,
            [("payment-required", "%%%not-base64%%%".to_string())],
            Json(json!({ "error": "Payment required" })),
        )
            .into_response(),
        "missing" => error(StatusCode::NOT_FOUND, "No agent offers this capability"),
        _ => {
            let encoded = STANDARD.encode(serde_json::to_vec(&requirements_json(&price)).unwrap());
            (
                StatusCode::PAYMENT_REQUIRED,
                [("payment-required", encoded)],
                Json(json!({ "error": "Payment required" })),
            )
                .into_response()
        }
    }
}

async fn submit(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut s = state.lock().unwrap();
    s.payment_posts += 1;
    s.last_body = body;
    s.service_id_headers.push(service_id_header(&headers));
    s.last_payment_headers = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("payment-"))
        .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string()))
        .collect();

    if !s.last_payment_headers.contains_key("payment-signature") {
        let price = s.price.clone();
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({ "x402Version": 1, "accepts": [requirements_json(&price)] })),
        )
            .into_response();
    }

    let nonce = s.open_deal("escrowed", None);
    Json(json!({ "nonce": nonce, "dealId": s.next_id })).into_response()
}

async fn result(State(state): State<Shared>, Path(nonce): Path<String>) -> Response {
    let mut s = state.lock().unwrap();
    let deliver_after = s.deliver_after;
    let polls = s.polls.entry(nonce.clone()).or_insert(0);
    *polls += 1;
    if *polls <= deliver_after {
        return Json(json!({ "status": "pending" })).into_response();
    }
    if let Some(deal) = s.deal_mut(&nonce) {
        if deal.status == "escrowed" {
            deal.status = "delivered".to_string();
        }
    }
    Json(json!({
        "status": "delivered",
        "result": { "content": "Soy exports up 12% quarter over quarter." }
    }))
    .into_response()
}
