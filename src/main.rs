use std::sync::Arc;

use clap::{Parser, Subcommand};
use solidb_sql_driver::coordination::{ConsistencyMode, NodeConfig};
use solidb_sql_driver::{Config, CoordinationClient, ExecuteOptions, QueryClient, TcpTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "solidb-sql")]
#[command(about = "SoliDB SQL driver command line", long_about = None)]
struct Args {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:6747")]
    addr: String,

    /// Disable automatic retries
    #[arg(long)]
    no_retry: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a statement and discard its rows
    Exec {
        sql: String,
        /// Allow the statement to be retried
        #[arg(long)]
        idempotent: bool,
    },
    /// Run a statement and print every result set as JSON
    Query { sql: String },
    /// Manage coordination nodes
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(Subcommand, Debug)]
enum NodeAction {
    Create {
        path: String,
        #[arg(long, default_value_t = 1000)]
        self_check_period_ms: u32,
        #[arg(long, default_value_t = 10000)]
        session_grace_period_ms: u32,
        /// Use strict read consistency
        #[arg(long)]
        strict: bool,
    },
    Alter {
        path: String,
        #[arg(long, default_value_t = 1000)]
        self_check_period_ms: u32,
        #[arg(long, default_value_t = 10000)]
        session_grace_period_ms: u32,
        #[arg(long)]
        strict: bool,
    },
    Drop {
        path: String,
    },
    Describe {
        path: String,
    },
}

fn node_config(path: &str, self_check: u32, grace: u32, strict: bool) -> NodeConfig {
    let consistency = if strict {
        ConsistencyMode::Strict
    } else {
        ConsistencyMode::Relaxed
    };
    NodeConfig {
        path: path.to_string(),
        self_check_period_millis: self_check,
        session_grace_period_millis: grace,
        read_consistency_mode: consistency,
        attach_consistency_mode: consistency,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solidb_sql_driver=info,solidb_sql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::from_env();
    if args.no_retry {
        config.auto_retry = false;
    }

    let transport = Arc::new(TcpTransport::connect_with_config(&args.addr, &config).await?);
    tracing::debug!("Connected to {}", transport.addr());

    match args.command {
        Command::Exec { sql, idempotent } => {
            let client = QueryClient::new(transport, config);
            let options = ExecuteOptions::new().idempotent(idempotent);
            client.exec(&sql, &options).await?;
            tracing::info!("Statement executed");
        }
        Command::Query { sql } => {
            let client = QueryClient::new(transport, config);
            let options = ExecuteOptions::new().idempotent(true);
            for set in client.query_rows(&sql, &options).await? {
                println!("{}", serde_json::to_string_pretty(&set)?);
            }
        }
        Command::Node { action } => {
            let client = CoordinationClient::new(transport, config);
            let result = run_node_action(&client, action).await;
            client.close().await?;
            result?;
        }
    }

    Ok(())
}

async fn run_node_action(client: &CoordinationClient, action: NodeAction) -> anyhow::Result<()> {
    match action {
        NodeAction::Create {
            path,
            self_check_period_ms,
            session_grace_period_ms,
            strict,
        } => {
            let config = node_config(&path, self_check_period_ms, session_grace_period_ms, strict);
            client.create_node(&path, config).await?;
            tracing::info!("Coordination node {} created", path);
        }
        NodeAction::Alter {
            path,
            self_check_period_ms,
            session_grace_period_ms,
            strict,
        } => {
            let config = node_config(&path, self_check_period_ms, session_grace_period_ms, strict);
            client.alter_node(&path, config).await?;
            tracing::info!("Coordination node {} altered", path);
        }
        NodeAction::Drop { path } => {
            client.drop_node(&path).await?;
            tracing::info!("Coordination node {} dropped", path);
        }
        NodeAction::Describe { path } => {
            let (entry, config) = client.describe_node(&path).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
