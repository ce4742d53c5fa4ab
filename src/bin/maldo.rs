use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use maldo::{
    config::ClientConfig,
    config::LogFormat,
    model::{DealCreation, RegisterAgent, ServiceId},
    MaldoClient, MaldoError, X402Outcome,
};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "maldo")]
#[command(about = "Command-line client for the Maldo agent trust layer")]
struct Cli {
    #[arg(short, long, default_value = "maldo.toml")]
    config: String,

    /// Overrides api.base_url from the config file
    #[arg(long, env = "MALDO_API")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the API is reachable
    Health,
    /// Write a default config file to --config
    InitConfig,
    #[command(subcommand)]
    Agents(AgentCommand),
    #[command(subcommand)]
    Deals(DealCommand),
    #[command(subcommand)]
    Criteria(CriteriaCommand),
    #[command(subcommand)]
    X402(X402Command),
}

#[derive(Subcommand)]
enum AgentCommand {
    Register {
        #[arg(long)]
        name: String,
        /// Comma-separated capabilities
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
        #[arg(long)]
        wallet: String,
        #[arg(long, default_value = "")]
        description: String,
        /// USDC atomic units
        #[arg(long, default_value_t = 0)]
        base_price: u64,
        #[arg(long, default_value = "")]
        endpoint: String,
    },
    Discover {
        capability: String,
        #[arg(long)]
        min_rep: Option<f64>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Get {
        agent_id: String,
    },
    List,
    Reputation {
        agent_id: String,
    },
    Rate {
        agent_id: String,
        #[arg(long)]
        deal_nonce: String,
        #[arg(long)]
        rater: String,
        #[arg(long)]
        score: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    Vouch {
        vouchee_agent_id: String,
        #[arg(long)]
        voucher_agent_id: String,
        #[arg(long)]
        voucher_wallet: String,
        #[arg(long)]
        signature: String,
    },
    Vouches {
        agent_id: String,
    },
}

#[derive(Subcommand)]
enum DealCommand {
    Create {
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        client_address: String,
        /// USDC atomic units
        #[arg(long)]
        price_usdc: u64,
        #[arg(long)]
        task: String,
        /// Defaults to payment.principal from the config
        #[arg(long)]
        principal: Option<String>,
    },
    Status {
        nonce: String,
    },
    Approve {
        approval_id: u64,
    },
    Reject {
        approval_id: u64,
    },
    Pending {
        principal: Option<String>,
    },
    List,
    Complete {
        nonce: String,
    },
}

#[derive(Subcommand)]
enum CriteriaCommand {
    Get {
        principal: Option<String>,
    },
    Preset {
        preset: String,
        #[arg(long)]
        principal: Option<String>,
    },
    Evaluate {
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        price: u64,
        #[arg(long)]
        principal: Option<String>,
    },
}

#[derive(Subcommand)]
enum X402Command {
    Requirements {
        capability: String,
        /// Target one agent's listing
        #[arg(long)]
        service_id: Option<ServiceId>,
    },
    Request(X402RequestArgs),
    Poll {
        nonce: String,
    },
    /// Poll until delivered or expired, using the configured interval and bound
    Wait {
        nonce: String,
    },
}

#[derive(Args)]
struct X402RequestArgs {
    capability: String,
    #[arg(long)]
    task: String,
    #[arg(long)]
    client_address: Option<String>,
    /// USDC atomic units; defaults to payment.max_price_usdc
    #[arg(long)]
    max_price: Option<u64>,
    /// Target one agent's listing
    #[arg(long)]
    service_id: Option<ServiceId>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<MaldoError>() {
            Some(MaldoError::Api { .. }) => eprintln!("API error: {}", e),
            _ => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::load_with_env_overrides(&cli.config)
        .with_context(|| format!("loading {}", cli.config))?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    config.validate()?;
    init_tracing(&config);

    let client = MaldoClient::from_config(&config)?;
    tracing::debug!("Using Maldo API at {}", client.base_url());

    match cli.command {
        Command::InitConfig => {
            maldo::config::create_default_config_file(&cli.config)?;
            println!("Wrote default config to {}", cli.config);
            Ok(())
        }
        Command::Health => print_json(&client.health().await?),
        Command::Agents(cmd) => run_agents(&client, cmd).await,
        Command::Deals(cmd) => run_deals(&client, &config, cmd).await,
        Command::Criteria(cmd) => run_criteria(&client, &config, cmd).await,
        Command::X402(cmd) => run_x402(&client, &config, cmd).await,
    }
}

async fn run_agents(client: &MaldoClient, cmd: AgentCommand) -> anyhow::Result<()> {
    let agents = client.agents();
    match cmd {
        AgentCommand::Register {
            name,
            capabilities,
            wallet,
            description,
            base_price,
            endpoint,
        } => {
            let request = RegisterAgent::new(name, capabilities, wallet)
                .description(description)
                .base_price(base_price)
                .endpoint(endpoint);
            print_json(&agents.register(&request).await?)
        }
        AgentCommand::Discover {
            capability,
            min_rep,
            limit,
        } => {
            let found = agents.discover(&capability, min_rep, limit).await?;
            if found.agents.is_empty() {
                eprintln!("No agents found for capability '{}'", capability);
            }
            print_json(&found)
        }
        AgentCommand::Get { agent_id } => print_json(&agents.get(&agent_id).await?),
        AgentCommand::List => print_json(&agents.list().await?),
        AgentCommand::Reputation { agent_id } => print_json(&agents.reputation(&agent_id).await?),
        AgentCommand::Rate {
            agent_id,
            deal_nonce,
            rater,
            score,
            comment,
        } => print_json(
            &agents
                .rate(&agent_id, &deal_nonce, &rater, score, comment.as_deref())
                .await?,
        ),
        AgentCommand::Vouch {
            vouchee_agent_id,
            voucher_agent_id,
            voucher_wallet,
            signature,
        } => print_json(
            &agents
                .vouch(&vouchee_agent_id, &voucher_agent_id, &voucher_wallet, &signature)
                .await?,
        ),
        AgentCommand::Vouches { agent_id } => print_json(&agents.vouches(&agent_id).await?),
    }
}

async fn run_deals(client: &MaldoClient, config: &ClientConfig, cmd: DealCommand) -> anyhow::Result<()> {
    let deals = client.deals();
    match cmd {
        DealCommand::Create {
            agent_id,
            client_address,
            price_usdc,
            task,
            principal,
        } => {
            let principal = principal.or_else(|| config.payment.principal.clone());
            let creation = deals
                .create(&agent_id, &client_address, price_usdc, &task, principal.as_deref())
                .await?;
            match creation {
                DealCreation::Created(receipt) => print_json(&json!({
                    "requiresHumanApproval": false,
                    "deal": receipt,
                })),
                DealCreation::PendingApproval(pending) => print_json(&json!({
                    "requiresHumanApproval": true,
                    "pending": pending,
                })),
            }
        }
        DealCommand::Status { nonce } => print_json(&deals.status(&nonce).await?),
        DealCommand::Approve { approval_id } => print_json(&deals.approve(approval_id).await?),
        DealCommand::Reject { approval_id } => print_json(&deals.reject(approval_id).await?),
        DealCommand::Pending { principal } => {
            let principal = require_principal(principal, config)?;
            print_json(&deals.pending(&principal).await?)
        }
        DealCommand::List => print_json(&deals.list().await?),
        DealCommand::Complete { nonce } => print_json(&deals.complete(&nonce).await?),
    }
}

async fn run_criteria(
    client: &MaldoClient,
    config: &ClientConfig,
    cmd: CriteriaCommand,
) -> anyhow::Result<()> {
    let criteria = client.criteria();
    match cmd {
        CriteriaCommand::Get { principal } => {
            let principal = require_principal(principal, config)?;
            print_json(&criteria.get(&principal).await?)
        }
        CriteriaCommand::Preset { preset, principal } => {
            let principal = require_principal(principal, config)?;
            print_json(&criteria.apply_preset(&principal, &preset).await?)
        }
        CriteriaCommand::Evaluate {
            agent_id,
            price,
            principal,
        } => {
            let principal = require_principal(principal, config)?;
            print_json(&criteria.evaluate(&principal, &agent_id, price).await?)
        }
    }
}

async fn run_x402(client: &MaldoClient, config: &ClientConfig, cmd: X402Command) -> anyhow::Result<()> {
    let x402 = client.x402();
    match cmd {
        X402Command::Requirements {
            capability,
            service_id,
        } => {
            let x402 = match &service_id {
                Some(id) => x402.with_service_id(id),
                None => x402,
            };
            print_json(&x402.get_requirements(&capability).await?)
        }
        X402Command::Request(args) => {
            let x402 = match &args.service_id {
                Some(id) => x402.with_service_id(id),
                None => x402,
            };
            let client_address = args
                .client_address
                .or_else(|| config.payment.client_address.clone())
                .context("--client-address or payment.client_address is required")?;
            let max_price = args.max_price.or(config.payment.max_price_usdc);
            let outcome = x402
                .request(&args.capability, &args.task, &client_address, max_price)
                .await?;
            match outcome {
                X402Outcome::Accepted(ticket) => print_json(&ticket),
                X402Outcome::PaymentRequired(body) => {
                    eprintln!("Server still requires payment; attach a payment authorizer to pay");
                    print_json(&body)
                }
            }
        }
        X402Command::Poll { nonce } => print_json(&x402.poll_result(&nonce).await?),
        X402Command::Wait { nonce } => {
            let result = config.delivery_poller().wait(&x402, &nonce).await?;
            if !result.status.is_final() {
                eprintln!("Gave up waiting; deal {} is still {}", nonce, result.status);
            }
            print_json(&result)
        }
    }
}

fn require_principal(principal: Option<String>, config: &ClientConfig) -> anyhow::Result<String> {
    principal
        .or_else(|| config.payment.principal.clone())
        .context("a principal is required (argument, PRINCIPAL or payment.principal)")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(config: &ClientConfig) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.logging.level.clone().into()),
    );
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Full => registry.with(layer).init(),
        LogFormat::Compact => registry.with(layer.compact()).init(),
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
    }
}
