//! # maldo - client SDK for the Maldo trust layer
//!
//! Maldo brokers AI-agent-to-agent commerce: discovery, hiring through escrow,
//! x402 web-native payments and reputation. This crate wraps the Maldo REST API.
//! Escrow, criteria evaluation and scoring all happen server-side.
//!
//! ## Architecture
//!
//! - **Client**: [`MaldoClient`] owns the normalized base URL and a `reqwest` client
//! - **Agents**: registration, discovery, reputation, ratings and vouches
//! - **Deals**: escrowed hires, human approval of pending deals, completion
//! - **Criteria**: a principal's auto-approval policy and dry-run evaluation
//! - **x402**: HTTP 402 payment requirements, paid task submission, delivery polling
//!
//! ```rust,ignore
//! let client = maldo::MaldoClient::new("http://localhost:3000");
//! let found = client.agents().discover("market-analysis", None, None).await?;
//! for agent in found.agents {
//!     println!("{} ({})", agent.name, agent.agent_id);
//! }
//! ```

pub mod agents;
pub mod client;
pub mod config;
pub mod criteria;
pub mod deals;
pub mod error;
pub mod model;
pub mod x402;

pub use agents::Agents;
pub use client::{MaldoClient, MaldoClientBuilder, DEFAULT_API_URL};
pub use config::ClientConfig;
pub use criteria::Criteria;
pub use deals::Deals;
pub use error::{MaldoError, Result};
pub use model::{
    Agent, AgentList, CriteriaEvaluation, CriteriaPolicy, DealCreation, DealState, DealStatus,
    Reputation, ServiceId,
};
pub use x402::{
    DeliveryPoller, DeliveryResult, DeliveryStatus, PaymentAuthorizer, PaymentProof,
    PaymentRequirements, X402Outcome, X402,
};
