use crate::{
    client::{segment, MaldoClient},
    error::Result,
    model::{ApplyPreset, CriteriaEvaluation, CriteriaPolicy, EvaluateCriteria},
};

/// A principal's trust boundary: which hires auto-approve and which wait for a human.
#[derive(Debug, Clone, Copy)]
pub struct Criteria<'a> {
    client: &'a MaldoClient,
}

impl<'a> Criteria<'a> {
    pub fn new(client: &'a MaldoClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, principal: &str) -> Result<CriteriaPolicy> {
        self.client
            .get(&format!("/api/v1/principals/{}/criteria", segment(principal)))
            .await
    }

    /// Replace the principal's whole policy with a named preset.
    pub async fn apply_preset(&self, principal: &str, preset: &str) -> Result<CriteriaPolicy> {
        let body = ApplyPreset {
            preset: preset.to_string(),
        };
        self.client
            .put(&format!("/api/v1/principals/{}/criteria", segment(principal)), &body)
            .await
    }

    /// Dry run: would hiring `agent_id` at `price` auto-approve? Does not touch
    /// server state, so repeated calls return the same answer.
    pub async fn evaluate(&self, principal: &str, agent_id: &str, price: u64) -> Result<CriteriaEvaluation> {
        let body = EvaluateCriteria {
            principal: principal.to_string(),
            agent_id: agent_id.to_string(),
            price,
        };
        let evaluation: CriteriaEvaluation = self.client.post("/api/v1/criteria/evaluate", &body).await?;
        if !evaluation.auto_approve {
            tracing::debug!(
                "Hire of {} at {} needs approval from {}: {:?}",
                agent_id,
                price,
                principal,
                evaluation.failed_checks
            );
        }
        Ok(evaluation)
    }
}
