pub mod config;
pub mod logging_system;

pub use config::{AgentConfig, ConfigError, DEFAULT_HOST, LogLevel};
pub use logging_system::{LoggingError, build_filter_string, setup_logging};

use crate::agent::Agent;
use crate::capture::lookup_server_address;
use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, error, info, warn};

/// Demo server recording its own traffic.
#[derive(Parser, Debug)]
#[command(name = "apianalytics-agent", author, version, about, long_about = None)]
pub struct Cli {
    /// Service token issued by the collector
    #[arg(long, env = "APIANALYTICS_SERVICE_TOKEN", hide_env_values = true)]
    pub service_token: Option<String>,

    /// Address the demo server listens on
    #[arg(long, env = "APIANALYTICS_LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Configuration file path (optional, replaces agent flags)
    #[arg(long, env = "APIANALYTICS_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub agent: AgentConfig,
}

impl Cli {
    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        if let Some(path) = &self.config_file {
            return AgentConfig::from_file(path);
        }

        let mut config = self.agent.clone();
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }
}

pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = cli.agent_config().context("invalid agent configuration")?;

    if let Err(e) = setup_logging(config.log_level, config.log_json) {
        eprintln!("Warning: {e}");
    }

    if config.server_address.is_none() {
        let address = tokio::task::spawn_blocking(lookup_server_address)
            .await
            .context("server address lookup failed")?;
        config.server_address = Some(address);
    }

    let agent = Agent::start(cli.service_token.clone().unwrap_or_default(), config)
        .context("failed to start agent")?;

    serve(cli.listen, &agent).await?;

    agent.shutdown().await;
    Ok(())
}

/// Serves the demo handler through the capture layer until Ctrl+C.
async fn serve(listen: SocketAddr, agent: &Agent) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!("Demo server listening on http://{listen}. Press Ctrl+C to stop.");

    let service = ServiceBuilder::new()
        .layer(agent.layer())
        .service(tower::service_fn(handle));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl+C: {e}");
                }
                info!("Received shutdown signal");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        warn!("Failed to accept connection: {e}");
                        continue;
                    }
                };

                let service = TowerToHyperService::new(service.clone());
                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!(%peer, "Connection ended with error: {e}");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn handle(request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (request.method(), request.uri().path()) {
        (&Method::GET, "/") => text(StatusCode::OK, "Hello, World!"),
        (&Method::POST, "/echo") => match request.into_body().collect().await {
            Ok(collected) => Response::new(Full::new(collected.to_bytes())),
            Err(e) => text(StatusCode::BAD_REQUEST, &format!("Failed to read body: {e}")),
        },
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
