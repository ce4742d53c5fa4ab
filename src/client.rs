use crate::{
    agents::Agents,
    config::ClientConfig,
    criteria::Criteria,
    deals::Deals,
    error::{MaldoError, Result},
    model::HealthStatus,
    x402::X402,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, RequestBuilder, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

const DEFAULT_USER_AGENT: &str = concat!("maldo-rust/", env!("CARGO_PKG_VERSION"));

/// Handle on a Maldo API deployment.
///
/// Holds nothing but the normalized base URL and a pooled `reqwest::Client`,
/// so it is cheap to clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct MaldoClient {
    base_url: String,
    http: Client,
}

impl MaldoClient {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::with_http_client(base_url, Client::new())
    }

    /// Use a preconfigured `reqwest::Client` (proxies, TLS roots, ...).
    pub fn with_http_client(base_url: impl AsRef<str>, http: Client) -> Self {
        Self {
            base_url: normalize_base_url(base_url.as_ref()),
            http,
        }
    }

    pub fn builder(base_url: impl AsRef<str>) -> MaldoClientBuilder {
        MaldoClientBuilder::new(base_url)
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::builder(&config.api.base_url);
        if let Some(secs) = config.api.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(user_agent) = &config.api.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn agents(&self) -> Agents<'_> {
        Agents::new(self)
    }

    pub fn deals(&self) -> Deals<'_> {
        Deals::new(self)
    }

    pub fn criteria(&self) -> Criteria<'_> {
        Criteria::new(self)
    }

    pub fn x402(&self) -> X402<'_> {
        X402::new(self)
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.get("/health").await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::GET, path))
            .await?
            .into_json()
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(self.request(Method::GET, path).query(query))
            .await?
            .into_json()
    }

    /// POST a JSON body. A 402 answer is returned as data rather than raised,
    /// since x402 endpoints use it to carry payment requirements.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(self.request(Method::POST, path).json(body))
            .await?
            .into_json()
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(self.request(Method::PUT, path).json(body))
            .await?
            .into_json()
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::DELETE, path))
            .await?
            .into_json()
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// One round trip. Only transport failures are errors at this level.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<RawResponse> {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(%method, %url, "sending request");

        let response = self.http.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(%method, %url, status = status.as_u16(), bytes = body.len(), "received response");

        Ok(RawResponse {
            method,
            status,
            headers,
            body,
        })
    }
}

pub struct MaldoClientBuilder {
    base_url: String,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    headers: Vec<(String, String)>,
}

impl MaldoClientBuilder {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().to_string(),
            timeout: None,
            user_agent: None,
            headers: Vec::new(),
        }
    }

    /// Transport timeout per request. Unset means reqwest's default (none).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Default header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<MaldoClient> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| MaldoError::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| MaldoError::Config(format!("Invalid value for header '{}': {}", name, e)))?;
            default_headers.insert(name, value);
        }

        let mut http = Client::builder()
            .default_headers(default_headers)
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }

        Ok(MaldoClient::with_http_client(&self.base_url, http.build()?))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Status, headers and body of a completed round trip, not yet interpreted.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub method: Method,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// 2xx, or 402 answering a POST, is data. Everything else is an API error.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        if self.is_data() {
            decode_body(&self.body)
        } else {
            Err(self.into_api_error())
        }
    }

    pub fn is_data(&self) -> bool {
        self.status.is_success()
            || (self.method == Method::POST && self.status == StatusCode::PAYMENT_REQUIRED)
    }

    pub fn into_api_error(self) -> MaldoError {
        let message = serde_json::from_slice::<ErrorBody>(&self.body)
            .ok()
            .and_then(|body| body.error)
            .and_then(|error| match error {
                serde_json::Value::Null => None,
                serde_json::Value::String(message) => Some(message),
                other => Some(other.to_string()),
            })
            .unwrap_or_else(|| reason_phrase(self.status));
        tracing::warn!(method = %self.method, status = self.status.as_u16(), %message, "Maldo API returned an error");
        MaldoError::Api {
            status: self.status.as_u16(),
            message,
        }
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_slice(b"null").map_err(Into::into);
    }
    serde_json::from_slice(body).map_err(Into::into)
}

pub(crate) fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_string()
}

pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Percent-encode a value interpolated into a path segment.
pub(crate) fn segment(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}
