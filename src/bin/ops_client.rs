//! Operator CLI for the OpsService tool server
//!
//! Lets a human invoke the same three tools the triage pipeline uses:
//!
//! ```text
//! sentinel-ops list
//! sentinel-ops logs <name> [--tail N]
//! sentinel-ops restart <name>
//! ```

use clap::{Parser, Subcommand};
use tonic::Request;

use sentinel::grpc::ops::ops_service_client::OpsServiceClient;
use sentinel::grpc::ops::{GetContainerLogsRequest, ListContainersRequest, RestartServiceRequest};

#[derive(Parser)]
#[command(name = "sentinel-ops", version, about = "Call OpsService tools by hand")]
struct Cli {
    /// OpsService endpoint
    #[arg(short, long, env = "SENTINEL_OPS_ENDPOINT", default_value = "http://127.0.0.1:50061")]
    endpoint: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List running containers
    List,
    /// Print the last lines of a container's logs
    Logs {
        name: String,
        #[arg(short, long, default_value_t = 50)]
        tail: u32,
    },
    /// Restart a container
    Restart { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let mut client = OpsServiceClient::connect(cli.endpoint.clone()).await?;

    match cli.command {
        Command::List => {
            let response = client
                .list_active_containers(Request::new(ListContainersRequest {}))
                .await?
                .into_inner();
            if response.containers.is_empty() {
                println!("No active containers found.");
            } else {
                println!("ACTIVE CONTAINERS:");
                for container in response.containers {
                    println!("- {}: {}", container.name, container.status);
                }
            }
        }
        Command::Logs { name, tail } => {
            let response = client
                .get_container_logs(Request::new(GetContainerLogsRequest { name, tail }))
                .await?
                .into_inner();
            if response.logs.is_empty() {
                println!("Logs are empty.");
            } else {
                println!("{}", response.logs);
            }
        }
        Command::Restart { name } => {
            let response = client
                .restart_service(Request::new(RestartServiceRequest { name: name.clone() }))
                .await?
                .into_inner();
            if response.restarted {
                println!("Service '{}' restarted successfully.", name);
            } else {
                return Err(format!("restart of '{}' was not confirmed by the runtime", name).into());
            }
        }
    }

    Ok(())
}
