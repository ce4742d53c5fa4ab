use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Fields the server sent that have no typed counterpart here.
pub type Extra = Map<String, Value>;

pub type ApprovalId = u64;

/// Identifies one agent's service listing. The server issues numeric ids;
/// string ids are passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceId {
    Numeric(u64),
    Text(String),
}

impl std::str::FromStr for ServiceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse() {
            Ok(id) => ServiceId::Numeric(id),
            Err(_) => ServiceId::Text(s.to_string()),
        })
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceId::Numeric(id) => write!(f, "{}", id),
            ServiceId::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ==================== Agents ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgent {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    /// USDC atomic units (6 decimals).
    pub base_price: u64,
    pub endpoint: String,
    pub wallet: String,
}

impl RegisterAgent {
    pub fn new(name: impl Into<String>, capabilities: Vec<String>, wallet: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            capabilities,
            base_price: 0,
            endpoint: String::new(),
            wallet: wallet.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn base_price(mut self, base_price: u64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    #[serde(alias = "id")]
    pub agent_id: String,
    #[serde(default)]
    pub service_id: Option<ServiceId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub base_price: u64,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub reputation: Option<Reputation>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Agent {
    /// Base price in whole USDC.
    pub fn base_price_usdc(&self) -> f64 {
        self.base_price as f64 / 1e6
    }
}

/// Agents returned by discovery (ranked) or by the full listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentList {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub bayesian_score: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub dispute_rate: Option<f64>,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateAgent {
    pub deal_nonce: String,
    pub rater_address: String,
    pub score: u8,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VouchRequest {
    pub voucher_agent_id: String,
    pub voucher_wallet: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vouch {
    #[serde(default)]
    pub voucher_agent_id: Option<String>,
    #[serde(default)]
    pub voucher_wallet: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VouchList {
    #[serde(default)]
    pub vouches: Vec<Vouch>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Generic write acknowledgement (ratings, vouches, registrations of side records).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ==================== Deals ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeal {
    pub agent_id: String,
    pub client_address: String,
    #[serde(rename = "priceUSDC")]
    pub price_usdc: u64,
    pub task_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

/// Lifecycle of a deal. The server owns every transition:
/// `created -> (pending_approval -> approved|rejected) -> escrowed -> delivered
/// -> completed|disputed|refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealState {
    Created,
    PendingApproval,
    Approved,
    Rejected,
    Escrowed,
    Delivered,
    Completed,
    Disputed,
    Refunded,
    #[serde(other)]
    Unknown,
}

impl DealState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DealState::Rejected | DealState::Completed | DealState::Disputed | DealState::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DealState::Created => "created",
            DealState::PendingApproval => "pending_approval",
            DealState::Approved => "approved",
            DealState::Rejected => "rejected",
            DealState::Escrowed => "escrowed",
            DealState::Delivered => "delivered",
            DealState::Completed => "completed",
            DealState::Disputed => "disputed",
            DealState::Refunded => "refunded",
            DealState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `deals.create`: the deal either went straight to escrow or is
/// parked until the principal signs off. Callers must branch on this.
#[derive(Debug, Clone)]
pub enum DealCreation {
    Created(DealReceipt),
    PendingApproval(PendingApproval),
}

impl DealCreation {
    pub fn requires_human_approval(&self) -> bool {
        matches!(self, DealCreation::PendingApproval(_))
    }

    pub fn nonce(&self) -> Option<&str> {
        match self {
            DealCreation::Created(receipt) => Some(&receipt.nonce),
            DealCreation::PendingApproval(_) => None,
        }
    }

    pub fn approval_id(&self) -> Option<ApprovalId> {
        match self {
            DealCreation::Created(_) => None,
            DealCreation::PendingApproval(pending) => Some(pending.approval_id),
        }
    }
}

impl<'de> Deserialize<'de> for DealCreation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(default)]
            requires_human_approval: bool,
            #[serde(default, alias = "approvalId")]
            pending_approval_id: Option<ApprovalId>,
            #[serde(default)]
            nonce: Option<String>,
            #[serde(default)]
            status: Option<DealState>,
            #[serde(flatten)]
            extra: Extra,
        }

        let raw = Raw::deserialize(deserializer)?;
        if raw.requires_human_approval {
            let approval_id = raw.pending_approval_id.ok_or_else(|| {
                serde::de::Error::custom("deal requires human approval but carries no approval id")
            })?;
            Ok(DealCreation::PendingApproval(PendingApproval {
                approval_id,
                nonce: raw.nonce,
                extra: raw.extra,
            }))
        } else {
            let nonce = raw
                .nonce
                .ok_or_else(|| serde::de::Error::custom("created deal carries no nonce"))?;
            Ok(DealCreation::Created(DealReceipt {
                nonce,
                status: raw.status,
                extra: raw.extra,
            }))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealReceipt {
    pub nonce: String,
    #[serde(default)]
    pub status: Option<DealState>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    #[serde(alias = "pendingApprovalId", alias = "id")]
    pub approval_id: ApprovalId,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealStatus {
    #[serde(default)]
    pub nonce: Option<String>,
    pub status: DealState,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Response to approve, reject and complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealUpdate {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub status: Option<DealState>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub status: Option<DealState>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default, rename = "priceUSDC")]
    pub price_usdc: Option<u64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealList {
    #[serde(default)]
    pub deals: Vec<DealRecord>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingList {
    #[serde(default, alias = "approvals")]
    pub pending: Vec<PendingApproval>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ==================== Criteria ====================

/// A principal's stored auto-approval policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriteriaPolicy {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(flatten)]
    pub rules: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPreset {
    pub preset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateCriteria {
    pub principal: String,
    pub agent_id: String,
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaEvaluation {
    pub auto_approve: bool,
    #[serde(default)]
    pub failed_checks: Vec<String>,
}
