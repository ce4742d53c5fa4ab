use thiserror::Error;

pub type Result<T> = std::result::Result<T, MaldoError>;

#[derive(Error, Debug)]
pub enum MaldoError {
    /// Non-success response from the Maldo API.
    #[error("[{status}] {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Malformed payment requirements: {0}")]
    MalformedPaymentRequirements(String),

    #[error("Service answered {status} without requesting payment")]
    PaymentNotRequired { status: u16 },

    #[error("Invalid amount '{0}'. Expected an integer amount in USDC atomic units.")]
    InvalidAmount(String),

    #[error("Payment authorization failed: {0}")]
    Authorization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl MaldoError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        MaldoError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        MaldoError::Authorization(msg.into())
    }

    /// HTTP status carried by an API error. Transport-level failures have none.
    pub fn status(&self) -> Option<u16> {
        match self {
            MaldoError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }

    pub fn is_payment_required(&self) -> bool {
        self.status() == Some(402)
    }
}

impl From<serde_json::Error> for MaldoError {
    fn from(err: serde_json::Error) -> Self {
        MaldoError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for MaldoError {
    fn from(err: toml::de::Error) -> Self {
        MaldoError::Config(err.to_string())
    }
}

impl From<std::io::Error> for MaldoError {
    fn from(err: std::io::Error) -> Self {
        MaldoError::Io(err.to_string())
    }
}
