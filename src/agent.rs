//! One recording agent: capture front end, pipeline worker and collector
//! connection, wired together at start and torn down by [`Agent::shutdown`].

use crate::app::AgentConfig;
use crate::buffer::{BatchBuffer, Envelope};
use crate::capture::{CaptureLayer, CaptureSettings, Recorder, server_address};
use crate::domain::{AgentError, ServiceToken, StatusLogger, tracing_logger};
use crate::pipeline::{Coordinator, PipelineStats};
use crate::transport::{
    BatchTransport, CollectorClient, ConnectionListener, ConnectionState, TransportStats,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Links collector connectivity to the pipeline run state.
struct PipelineGate {
    coordinator: Coordinator,
    logger: StatusLogger,
    host: String,
}

impl ConnectionListener for PipelineGate {
    fn on_connected(&self) {
        (self.logger)(&format!("Connected to {}", self.host));
        self.coordinator.resume();
    }

    fn on_disconnected(&self) {
        self.coordinator.pause();
        (self.logger)("Disconnected");
    }
}

pub struct AgentBuilder {
    service_token: String,
    config: AgentConfig,
    logger: Option<StatusLogger>,
}

impl AgentBuilder {
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Receives status lines instead of the default `tracing` forwarder.
    pub fn logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Validates everything before creating any queue, task or connection.
    pub fn start(self) -> Result<Agent, AgentError> {
        let service_token = ServiceToken::new(self.service_token)?;

        let mut config = self.config;
        config.post_process()?;
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AgentError::NoRuntime)?;

        let logger = self.logger.unwrap_or_else(tracing_logger);
        let buffer = BatchBuffer::new(Envelope::new(service_token), config.batch)?;
        let (coordinator, worker) = Coordinator::new(buffer, config.max_queued, logger.clone());

        let gate = Arc::new(PipelineGate {
            coordinator: coordinator.clone(),
            logger: logger.clone(),
            host: config.host.clone(),
        });
        let client = Arc::new(CollectorClient::connect(config.client_config(), gate)?);

        let shutdown = CancellationToken::new();
        let transport: Arc<dyn BatchTransport> = client.clone();
        let worker = runtime.spawn(worker.run(transport, shutdown.clone()));

        let settings = CaptureSettings {
            send_body: config.send_body,
            server_address: config
                .server_address
                .clone()
                .unwrap_or_else(|| server_address().to_string()),
            logger,
        };
        let recorder = Recorder::new(settings, coordinator.clone());

        info!(
            collector = %client.url(),
            batch = config.batch,
            send_body = config.send_body,
            "API analytics agent started"
        );

        Ok(Agent {
            coordinator,
            client,
            recorder,
            shutdown,
            worker: Mutex::new(Some(worker)),
            config,
        })
    }
}

/// A running agent.
///
/// Install [`Agent::layer`] in a tower stack, or wrap push-style writers with
/// [`Recorder::attach`] through [`Agent::recorder`].
pub struct Agent {
    coordinator: Coordinator,
    client: Arc<CollectorClient>,
    recorder: Recorder,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: AgentConfig,
}

impl Agent {
    /// Starts an agent with the default status logger.
    ///
    /// Fails with [`AgentError::MissingServiceToken`] on an empty token and
    /// with [`AgentError::NoRuntime`] outside a Tokio runtime.
    pub fn start(
        service_token: impl Into<String>,
        config: AgentConfig,
    ) -> Result<Agent, AgentError> {
        Self::builder(service_token).config(config).start()
    }

    pub fn builder(service_token: impl Into<String>) -> AgentBuilder {
        AgentBuilder {
            service_token: service_token.into(),
            config: AgentConfig::default(),
            logger: None,
        }
    }

    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.recorder.clone())
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.coordinator.stats()
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.client.stats()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Stops the pipeline worker, flushing what it can, then closes the
    /// collector connection after writing any batches already handed over.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            error!("Pipeline worker failed: {e}");
        }

        self.client.shutdown().await;
        info!("API analytics agent stopped");
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
