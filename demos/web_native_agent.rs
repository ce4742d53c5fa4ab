//! Web-native hire: an agent with no blockchain code hires a service over x402.
//!
//! 1. Discover a market-analysis agent
//! 2. Evaluate the hire against the principal's criteria
//! 3. Read the x402 payment requirements
//! 4. Submit the task with payment proof
//! 5. Poll for delivery and confirm it
//!
//! Signing is delegated to an external command (`MALDO_SIGNER_CMD`) that
//! receives the message to sign as its only argument and prints the signature.
//!
//! Run: MALDO_API=http://localhost:3000 PRINCIPAL=0x... MALDO_SIGNER_CMD=./sign.sh \
//!      cargo run --example web_native_agent

use anyhow::Context;
use maldo::{
    config::ClientConfig, DeliveryStatus, MaldoClient, MaldoError, PaymentAuthorizer,
    PaymentRequirements, X402Outcome,
};

const TASK: &str = "Analyze Paraguay's agro-export market for Q1 2026. Focus on soy and wheat.";
const CAPABILITY: &str = "market-analysis";
const MAX_PRICE_USDC: u64 = 50_000_000;

struct CommandSigner {
    program: String,
}

impl PaymentAuthorizer for CommandSigner {
    fn authorize(&self, requirements: &PaymentRequirements, nonce: &str) -> maldo::Result<String> {
        let message = format!(
            "Maldo payment: {} USDC to {} nonce:{}",
            requirements.max_amount_required, requirements.pay_to, nonce
        );
        let output = std::process::Command::new(&self.program)
            .arg(&message)
            .output()
            .map_err(|e| MaldoError::authorization(format!("failed to run {}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(MaldoError::authorization(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = ClientConfig::load_with_env_overrides("maldo.toml")?;
    let principal = config
        .payment
        .principal
        .clone()
        .context("set PRINCIPAL to the operator address")?;
    let signer = CommandSigner {
        program: std::env::var("MALDO_SIGNER_CMD").context("set MALDO_SIGNER_CMD")?,
    };
    let client = MaldoClient::from_config(&config)?;

    println!("[1/5] Discovering {} agents...", CAPABILITY);
    let found = client.agents().discover(CAPABILITY, Some(4.5), Some(1)).await?;
    let Some(agent) = found.agents.first() else {
        println!("No agents found. Register one first.");
        return Ok(());
    };
    let score = agent
        .reputation
        .as_ref()
        .and_then(|r| r.score)
        .map_or_else(|| "unrated".to_string(), |s| format!("{:.1}", s));
    println!("  Found: {} | score {} | ${:.2}", agent.name, score, agent.base_price_usdc());
    let service_id = agent
        .service_id
        .as_ref()
        .context("discovered agent has no serviceId to pay")?;

    println!("[2/5] Evaluating against the principal's criteria...");
    let evaluation = client
        .criteria()
        .evaluate(&principal, &agent.agent_id, MAX_PRICE_USDC)
        .await?;
    if !evaluation.auto_approve {
        println!("  Human approval required: {:?}", evaluation.failed_checks);
        return Ok(());
    }

    println!("[3/5] Reading x402 payment requirements...");
    let x402 = client
        .x402()
        .with_authorizer(&signer)
        .with_service_id(service_id);
    let requirements = x402.get_requirements(CAPABILITY).await?;
    println!(
        "  Payment required: {} USDC units to {}",
        requirements.max_amount_required, requirements.pay_to
    );

    println!("[4/5] Submitting payment and task...");
    let ticket = match x402
        .request(CAPABILITY, TASK, &principal, Some(MAX_PRICE_USDC))
        .await?
    {
        X402Outcome::Accepted(ticket) => ticket,
        X402Outcome::PaymentRequired(body) => {
            println!("  Payment rejected: {}", body);
            return Ok(());
        }
    };
    println!("  Deal created: {}", ticket.nonce);

    println!("[5/5] Waiting for delivery...");
    let result = config.delivery_poller().wait(&x402, &ticket.nonce).await?;
    match result.status {
        DeliveryStatus::Delivered => {
            println!("{}", result.content().unwrap_or("No content"));
            client.deals().complete(&ticket.nonce).await?;
            println!("Delivery confirmed, escrow released");
        }
        status => println!("Stopped waiting with deal {}; it can be refunded after timeout", status),
    }

    Ok(())
}
