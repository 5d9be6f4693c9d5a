//! Sentinel command-line entry point
//!
//! ```text
//! sentinel triage [--target NAME]   one-shot cycle(s), JSON on stdout
//! sentinel serve                    HTTP API
//! sentinel ops-server               OpsService gRPC tools
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sentinel::api::{create_router, ApiState};
use sentinel::config::{ClassifierKind, GatewayKind, SentinelConfig};
use sentinel::grpc::ops::ops_service_server::OpsServiceServer;
use sentinel::grpc::OpsServer;
use sentinel::tracing::{init_tracing, shutdown_tracing, TracingOptions};
use sentinel::triage::{Escalation, IncidentHistory, SessionArchive, SweepEntry, TriageController};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "sentinel", version, about = "Incident triage for containerized services")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Override gateway.kind
    #[arg(long, global = true, value_enum)]
    gateway: Option<GatewayKind>,

    /// Override classifier.kind
    #[arg(long, global = true, value_enum)]
    classifier: Option<ClassifierKind>,

    /// Override classifier.model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override telemetry.otlp_endpoint
    #[arg(long, global = true, env = "SENTINEL_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Triage one target, or every running target when none is given
    Triage {
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Override server.http_addr
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Serve the container tools over gRPC
    OpsServer {
        /// Override server.ops_addr
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<SentinelConfig, BoxError> {
        let mut config = SentinelConfig::load(self.config.as_deref())?;
        if let Some(kind) = self.gateway {
            config.gateway.kind = kind;
        }
        if let Some(kind) = self.classifier {
            config.classifier.kind = kind;
        }
        if let Some(model) = &self.model {
            config.classifier.model = model.clone();
        }
        if let Some(endpoint) = &self.otlp_endpoint {
            config.telemetry.otlp_endpoint = Some(endpoint.clone());
        }
        if self.json_logs {
            config.telemetry.json_logs = true;
        }
        match &self.command {
            Command::Serve { addr: Some(addr) } => config.server.http_addr = *addr,
            Command::OpsServer { addr: Some(addr) } => config.server.ops_addr = *addr,
            _ => {}
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(
        "sentinel",
        &TracingOptions {
            log_filter: Some(&config.telemetry.log_filter),
            otlp_endpoint: config.telemetry.otlp_endpoint.as_deref(),
            json: config.telemetry.json_logs,
        },
    )?;

    let result = match &cli.command {
        Command::Triage { target } => triage(&config, target.as_deref()).await,
        Command::Serve { .. } => serve(&config).await,
        Command::OpsServer { .. } => ops_server(&config).await,
    };

    shutdown_tracing();
    result
}

/// Build the controller plus a task that logs every escalation
fn build_controller(config: &SentinelConfig) -> Result<(TriageController, JoinHandle<()>), BoxError> {
    let gateway = config.gateway.build()?;
    let classifier = config.classifier.build(config.triage_config().classify_timeout)?;
    info!(
        gateway = ?config.gateway.kind,
        classifier = classifier.name(),
        "Triage pipeline ready"
    );

    let (tx, rx) = unbounded_channel();
    let controller = TriageController::new(
        gateway,
        classifier,
        Arc::new(IncidentHistory::new()),
        config.triage_config(),
    )
    .with_escalations(tx);

    Ok((controller, tokio::spawn(log_escalations(rx))))
}

async fn log_escalations(mut rx: UnboundedReceiver<Escalation>) {
    while let Some(escalation) = rx.recv().await {
        warn!(
            target = %escalation.target_id,
            record_id = %escalation.record_id,
            severity = ?escalation.severity,
            root_cause = escalation.root_cause.as_deref().unwrap_or("-"),
            reason = %escalation.reason,
            "Escalation raised"
        );
    }
}

async fn triage(config: &SentinelConfig, target: Option<&str>) -> Result<(), BoxError> {
    let (controller, escalations) = build_controller(config)?;

    let entries = controller.run(target).await?;
    let failed = entries.iter().filter(|(_, result)| result.is_err()).count();

    println!("{}", serde_json::to_string_pretty(&render_entries(&entries)?)?);

    // Closing the sender lets the logger drain and stop
    drop(controller);
    escalations.await?;

    if failed > 0 {
        return Err(format!("{} of {} triage cycles failed", failed, entries.len()).into());
    }
    Ok(())
}

/// One JSON value per cycle: the report, or `{target_id, error, message}`
fn render_entries(entries: &[SweepEntry]) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    entries
        .iter()
        .map(|(target_id, result)| match result {
            Ok(report) => serde_json::to_value(report),
            Err(e) => Ok(serde_json::json!({
                "target_id": target_id,
                "error": e.kind(),
                "message": e.to_string(),
            })),
        })
        .collect()
}

async fn serve(config: &SentinelConfig) -> Result<(), BoxError> {
    let (controller, _escalations) = build_controller(config)?;
    let controller = Arc::new(controller);
    let archive = config.server.session_dir.as_ref().map(SessionArchive::new).transpose()?;

    let router = create_router(ApiState {
        controller: Arc::clone(&controller),
        archive: archive.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.server.http_addr).await?;
    info!(addr = %config.server.http_addr, "HTTP API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(archive) = archive {
        let session = controller.history().snapshot();
        if !session.records.is_empty() {
            archive.save(&session)?;
            info!(session_id = %session.id, dir = %archive.base_dir().display(), "Session archived");
        }
    }
    Ok(())
}

async fn ops_server(config: &SentinelConfig) -> Result<(), BoxError> {
    let gateway = config.gateway.build()?;
    let server = OpsServer::new(gateway, config.triage_config().fetch_timeout);

    info!(addr = %config.server.ops_addr, gateway = ?config.gateway.kind, "OpsService listening");
    tonic::transport::Server::builder()
        .add_service(OpsServiceServer::new(server))
        .serve_with_shutdown(config.server.ops_addr, shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel::gateway::GatewayError;
    use sentinel::{MemoryGateway, RuleClassifier, TriageConfig};

    #[tokio::test]
    async fn test_render_entries() {
        let controller = TriageController::new(
            Arc::new(MemoryGateway::new().with_target("frontend-ui", "INFO: Cache hit.")),
            Arc::new(RuleClassifier::default()),
            Arc::new(IncidentHistory::new()),
            TriageConfig::default(),
        );
        let mut entries = controller.run(Some("frontend-ui")).await.unwrap();
        entries.push(("ghost".to_string(), Err(GatewayError::TargetNotFound("ghost".into()).into())));

        let output = render_entries(&entries).unwrap();
        assert_eq!(output[0]["target_id"], "frontend-ui");
        assert_eq!(output[0]["decision"]["action"], "no_op");
        assert_eq!(output[1]["target_id"], "ghost");
        assert_eq!(output[1]["error"], "TargetNotFound");
    }
}
