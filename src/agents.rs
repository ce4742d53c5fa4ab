use crate::{
    client::{segment, MaldoClient},
    error::Result,
    model::{Acknowledgement, Agent, AgentList, RateAgent, RegisterAgent, Reputation, VouchList, VouchRequest},
};

pub const DEFAULT_DISCOVER_LIMIT: u32 = 10;

/// Agent registration, discovery and reputation.
#[derive(Debug, Clone, Copy)]
pub struct Agents<'a> {
    client: &'a MaldoClient,
}

impl<'a> Agents<'a> {
    pub fn new(client: &'a MaldoClient) -> Self {
        Self { client }
    }

    pub async fn register(&self, agent: &RegisterAgent) -> Result<Agent> {
        tracing::info!("Registering agent {} with capabilities {:?}", agent.name, agent.capabilities);
        self.client.post("/api/v1/services/register", agent).await
    }

    /// Agents offering `capability`, ranked by the server. An empty catalog is
    /// an empty list, not an error.
    pub async fn discover(
        &self,
        capability: &str,
        min_rep: Option<f64>,
        limit: Option<u32>,
    ) -> Result<AgentList> {
        let mut query = vec![
            ("capability", capability.to_string()),
            ("limit", limit.unwrap_or(DEFAULT_DISCOVER_LIMIT).to_string()),
        ];
        if let Some(min_rep) = min_rep {
            query.push(("minRep", min_rep.to_string()));
        }
        self.client
            .get_with_query("/api/v1/services/discover", &query)
            .await
    }

    pub async fn get(&self, agent_id: &str) -> Result<Agent> {
        self.client
            .get(&format!("/api/v1/agents/{}", segment(agent_id)))
            .await
    }

    pub async fn list(&self) -> Result<AgentList> {
        self.client.get("/api/v1/agents").await
    }

    pub async fn reputation(&self, agent_id: &str) -> Result<Reputation> {
        self.client
            .get(&format!("/api/v1/agents/{}/reputation", segment(agent_id)))
            .await
    }

    pub async fn rate(
        &self,
        agent_id: &str,
        deal_nonce: &str,
        rater_address: &str,
        score: u8,
        comment: Option<&str>,
    ) -> Result<Acknowledgement> {
        let body = RateAgent {
            deal_nonce: deal_nonce.to_string(),
            rater_address: rater_address.to_string(),
            score,
            comment: comment.unwrap_or_default().to_string(),
        };
        self.client
            .post(&format!("/api/v1/agents/{}/rate", segment(agent_id)), &body)
            .await
    }

    /// Vouch for `vouchee_agent_id` on behalf of `voucher_agent_id`. The signature
    /// is produced by the voucher's wallet; the server verifies it.
    pub async fn vouch(
        &self,
        vouchee_agent_id: &str,
        voucher_agent_id: &str,
        voucher_wallet: &str,
        signature: &str,
    ) -> Result<Acknowledgement> {
        let body = VouchRequest {
            voucher_agent_id: voucher_agent_id.to_string(),
            voucher_wallet: voucher_wallet.to_string(),
            signature: signature.to_string(),
        };
        self.client
            .post(&format!("/api/v1/agents/{}/vouch", segment(vouchee_agent_id)), &body)
            .await
    }

    pub async fn vouches(&self, agent_id: &str) -> Result<VouchList> {
        self.client
            .get(&format!("/api/v1/agents/{}/vouches", segment(agent_id)))
            .await
    }
}
