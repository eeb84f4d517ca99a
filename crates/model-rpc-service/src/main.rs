// model-rpc-service/src/main.rs

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use dotenvy::dotenv;
#[cfg(feature = "cli")]
use model_rpc_service::{config::DEFAULT_CLIENT_ENDPOINT, run_rpc_server, Config, RpcClient};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "model-rpc-service", version, about = "Host predictive models behind a single RPC server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Load the configured models and serve them until interrupted.
    Serve,
    /// List the models hosted by a running service.
    GetModels {
        #[arg(long, env = "RPC_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
        endpoint: String,
    },
    /// Show metadata for one hosted model.
    GetModelMetadata {
        qualified_name: String,
        #[arg(long, env = "RPC_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
        endpoint: String,
    },
    /// Run a prediction; DATA is a JSON document passed to the model as is.
    Predict {
        qualified_name: String,
        data: String,
        #[arg(long, env = "RPC_ENDPOINT", default_value = DEFAULT_CLIENT_ENDPOINT)]
        endpoint: String,
    },
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    dotenv().ok();

    match Cli::parse().command {
        Command::Serve => {
            let cfg = Config::from_env()?;
            run_rpc_server(cfg).await
        }
        Command::GetModels { endpoint } => {
            let models = RpcClient::connect(&endpoint)?.get_models().await?;
            println!("Result: {}", serde_json::to_string_pretty(&models)?);
            Ok(())
        }
        Command::GetModelMetadata { qualified_name, endpoint } => {
            let metadata = RpcClient::connect(&endpoint)?
                .get_model_metadata(&qualified_name)
                .await?;
            println!("Result: {}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }
        Command::Predict { qualified_name, data, endpoint } => {
            let data: serde_json::Value = serde_json::from_str(&data).context("DATA must be valid JSON")?;
            let result = RpcClient::connect(&endpoint)?.predict(&qualified_name, data).await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
