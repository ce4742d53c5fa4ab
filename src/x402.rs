//! x402 web-native payments: read the 402 payment requirements, submit the task
//! with a signed proof in the `Payment-*` headers, then poll for delivery.

use crate::{
    client::{segment, MaldoClient},
    error::{MaldoError, Result},
    model::{Extra, ServiceId},
};
use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, RequestBuilder, StatusCode,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{fmt, time::Duration};

pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";
pub const X_PAYMENT_REQUIRED_HEADER: &str = "x-payment-required";
pub const PAYMENT_SIGNATURE_HEADER: &str = "payment-signature";
pub const PAYMENT_NONCE_HEADER: &str = "payment-nonce";
pub const PAYMENT_AMOUNT_HEADER: &str = "payment-amount";
pub const PAYMENT_TO_HEADER: &str = "payment-to";
pub const SERVICE_ID_HEADER: &str = "x-maldo-service-id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    #[serde(alias = "amount", deserialize_with = "amount_string")]
    pub max_amount_required: String,
    pub pay_to: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl PaymentRequirements {
    pub fn amount(&self) -> Result<u64> {
        self.max_amount_required
            .trim()
            .parse()
            .map_err(|_| MaldoError::InvalidAmount(self.max_amount_required.clone()))
    }
}

fn amount_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected amount as string or number, got {}",
            other
        ))),
    }
}

/// Produces the signature sent in `Payment-Signature`. The nonce is fresh per
/// request and must be bound into the signed message.
pub trait PaymentAuthorizer: Send + Sync {
    fn authorize(&self, requirements: &PaymentRequirements, nonce: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProof {
    pub signature: String,
    pub nonce: String,
    pub amount: String,
    pub pay_to: String,
}

impl PaymentProof {
    pub fn authorize(authorizer: &dyn PaymentAuthorizer, requirements: &PaymentRequirements) -> Result<Self> {
        let nonce = random_nonce();
        let signature = authorizer.authorize(requirements, &nonce)?;
        Ok(Self {
            signature,
            nonce,
            amount: requirements.max_amount_required.clone(),
            pay_to: requirements.pay_to.clone(),
        })
    }

    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            (PAYMENT_SIGNATURE_HEADER, &self.signature),
            (PAYMENT_NONCE_HEADER, &self.nonce),
            (PAYMENT_AMOUNT_HEADER, &self.amount),
            (PAYMENT_TO_HEADER, &self.pay_to),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|e| MaldoError::authorization(format!("{} is not a valid header value: {}", name, e)))?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(headers)
    }
}

pub fn random_nonce() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Decode a `Payment-Required` header value. Padding is optional.
pub fn decode_requirements_header(value: &str) -> Result<PaymentRequirements> {
    let trimmed = value.trim().trim_end_matches('=');
    let bytes = STANDARD_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
        .map_err(|e| MaldoError::MalformedPaymentRequirements(format!("invalid base64: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| MaldoError::MalformedPaymentRequirements(format!("invalid JSON: {}", e)))
}

/// Requirements from a 402: the payment header first, then the JSON body
/// (`requirements`, the first entry of `accepts`, or the body itself).
pub fn parse_requirements(headers: &HeaderMap, body: &[u8]) -> Result<PaymentRequirements> {
    for name in [PAYMENT_REQUIRED_HEADER, X_PAYMENT_REQUIRED_HEADER] {
        if let Some(value) = headers.get(name) {
            let value = value.to_str().map_err(|e| {
                MaldoError::MalformedPaymentRequirements(format!("{} header is not valid text: {}", name, e))
            })?;
            return decode_requirements_header(value);
        }
    }

    let body: Value = serde_json::from_slice(body).map_err(|e| {
        MaldoError::MalformedPaymentRequirements(format!("no payment header and body is not JSON: {}", e))
    })?;
    let candidate = body
        .get("requirements")
        .filter(|v| v.is_object())
        .or_else(|| body.get("accepts").and_then(|accepts| accepts.get(0)))
        .unwrap_or(&body);
    serde_json::from_value(candidate.clone())
        .map_err(|e| MaldoError::MalformedPaymentRequirements(e.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub task_description: String,
    pub client_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price_usdc: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<ServiceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealTicket {
    pub nonce: String,
    #[serde(default)]
    pub deal_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone)]
pub enum X402Outcome {
    Accepted(DealTicket),
    /// The server still wants payment; the body says what it requires.
    PaymentRequired(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Expired,
    #[serde(other)]
    Unknown,
}

impl DeliveryStatus {
    pub fn is_final(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Expired)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Expired => "expired",
            DeliveryStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryContent {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub result: Option<DeliveryContent>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl DeliveryResult {
    pub fn content(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.content.as_deref())
    }
}

#[derive(Clone, Copy)]
pub struct X402<'a> {
    client: &'a MaldoClient,
    authorizer: Option<&'a dyn PaymentAuthorizer>,
    service_id: Option<&'a ServiceId>,
}

impl<'a> X402<'a> {
    pub fn new(client: &'a MaldoClient) -> Self {
        Self {
            client,
            authorizer: None,
            service_id: None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: &'a dyn PaymentAuthorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Pin requirements and payment to one agent's listing instead of letting
    /// the server pick a provider for the capability.
    pub fn with_service_id(mut self, service_id: &'a ServiceId) -> Self {
        self.service_id = Some(service_id);
        self
    }

    fn service_request(&self, method: Method, capability: &str) -> RequestBuilder {
        let request = self.client.request(method, &service_path(capability));
        match self.service_id {
            Some(id) => request.header(SERVICE_ID_HEADER, id.to_string()),
            None => request,
        }
    }

    pub async fn get_requirements(&self, capability: &str) -> Result<PaymentRequirements> {
        let response = self
            .client
            .execute(self.service_request(Method::GET, capability))
            .await?;

        if response.status.is_success() {
            return Err(MaldoError::PaymentNotRequired {
                status: response.status.as_u16(),
            });
        }
        if response.status != StatusCode::PAYMENT_REQUIRED {
            return Err(response.into_api_error());
        }

        let requirements = parse_requirements(&response.headers, &response.body)?;
        tracing::debug!(
            "{} requires {} to {}",
            capability,
            requirements.max_amount_required,
            requirements.pay_to
        );
        Ok(requirements)
    }

    /// Fetch fresh requirements, refuse locally if they exceed `max_price`, then
    /// submit the task with payment proof.
    pub async fn request(
        &self,
        capability: &str,
        task_description: &str,
        client_address: &str,
        max_price: Option<u64>,
    ) -> Result<X402Outcome> {
        let requirements = self.get_requirements(capability).await?;
        if let Some(max_price) = max_price {
            let amount = requirements.amount()?;
            if amount > max_price {
                tracing::warn!("Refusing to pay {} for {}: max is {}", amount, capability, max_price);
                return Err(MaldoError::api(
                    402,
                    format!("Price {} exceeds max {}", amount, max_price),
                ));
            }
        }

        let mut request = self
            .service_request(Method::POST, capability)
            .json(&ServiceRequest {
                task_description: task_description.to_string(),
                client_address: client_address.to_string(),
                max_price_usdc: max_price,
                service_id: self.service_id.cloned(),
            });
        if let Some(authorizer) = self.authorizer {
            let proof = PaymentProof::authorize(authorizer, &requirements)?;
            request = request.headers(proof.headers()?);
        }

        let response = self.client.execute(request).await?;
        if response.status == StatusCode::PAYMENT_REQUIRED {
            return Ok(X402Outcome::PaymentRequired(response.into_json()?));
        }
        let ticket: DealTicket = response.into_json()?;
        tracing::info!("x402 deal {} opened for {}", ticket.nonce, capability);
        Ok(X402Outcome::Accepted(ticket))
    }

    pub async fn poll_result(&self, nonce: &str) -> Result<DeliveryResult> {
        self.client
            .get(&format!("/x402/deals/{}/result", segment(nonce)))
            .await
    }
}

fn service_path(capability: &str) -> String {
    format!("/x402/services/{}", segment(capability))
}

/// Caller-side wait for delivery. Interval and bound are the caller's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPoller {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for DeliveryPoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

impl DeliveryPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self { interval, max_attempts }
    }

    /// After `max_attempts` the last, still pending, result is returned.
    pub async fn wait(&self, x402: &X402<'_>, nonce: &str) -> Result<DeliveryResult> {
        if self.max_attempts == 0 {
            return Err(MaldoError::Config("max_attempts must be at least 1".to_string()));
        }

        let mut attempt = 1;
        loop {
            let result = x402.poll_result(nonce).await?;
            if result.status.is_final() || attempt >= self.max_attempts {
                return Ok(result);
            }
            tracing::debug!("Deal {} is {} ({}/{})", nonce, result.status, attempt, self.max_attempts);
            attempt += 1;
            tokio::time::sleep(self.interval).await;
        }
    }
}
