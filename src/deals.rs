use crate::{
    client::{segment, MaldoClient},
    error::Result,
    model::{ApprovalId, CreateDeal, DealCreation, DealList, DealStatus, DealUpdate, PendingList},
};

/// Escrowed hires. The client only requests transitions; it never assumes one
/// happened without reading the server's answer.
#[derive(Debug, Clone, Copy)]
pub struct Deals<'a> {
    client: &'a MaldoClient,
}

impl<'a> Deals<'a> {
    pub fn new(client: &'a MaldoClient) -> Self {
        Self { client }
    }

    pub async fn create(
        &self,
        agent_id: &str,
        client_address: &str,
        price_usdc: u64,
        task_description: &str,
        principal: Option<&str>,
    ) -> Result<DealCreation> {
        let body = CreateDeal {
            agent_id: agent_id.to_string(),
            client_address: client_address.to_string(),
            price_usdc,
            task_description: task_description.to_string(),
            principal: principal.filter(|p| !p.is_empty()).map(str::to_string),
        };

        let creation: DealCreation = self.client.post("/api/v1/deals/create", &body).await?;
        match &creation {
            DealCreation::Created(receipt) => {
                tracing::info!("Deal {} created for agent {}", receipt.nonce, agent_id)
            }
            DealCreation::PendingApproval(pending) => tracing::info!(
                "Deal for agent {} awaits human approval (approval id {})",
                agent_id,
                pending.approval_id
            ),
        }
        Ok(creation)
    }

    pub async fn status(&self, nonce: &str) -> Result<DealStatus> {
        self.client
            .get(&format!("/api/v1/deals/{}/status", segment(nonce)))
            .await
    }

    pub async fn approve(&self, approval_id: ApprovalId) -> Result<DealUpdate> {
        self.client
            .post(&format!("/api/v1/deals/approve/{}", approval_id), &serde_json::json!({}))
            .await
    }

    pub async fn reject(&self, approval_id: ApprovalId) -> Result<DealUpdate> {
        self.client
            .post(&format!("/api/v1/deals/reject/{}", approval_id), &serde_json::json!({}))
            .await
    }

    pub async fn pending(&self, principal: &str) -> Result<PendingList> {
        self.client
            .get(&format!("/api/v1/deals/pending/{}", segment(principal)))
            .await
    }

    pub async fn list(&self) -> Result<DealList> {
        self.client.get("/api/v1/deals").await
    }

    /// Confirm delivery, releasing escrow to the service agent.
    pub async fn complete(&self, nonce: &str) -> Result<DealUpdate> {
        self.client
            .post(&format!("/api/v1/deals/{}/complete", segment(nonce)), &serde_json::json!({}))
            .await
    }
}
