//! Agent host: serves an evaluator and/or a participant over HTTP.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::contract::{AgentCard, Endpoint};
use crate::lifecycle::GreenExecutor;

use super::error::{HostError, HostResult};
use super::participant::ParticipantAgent;
use super::routes::{router, HostState};

pub struct AgentHost {
    card: AgentCard,
    evaluator: Option<GreenExecutor>,
    participant: Option<Arc<dyn ParticipantAgent>>,
}

impl AgentHost {
    pub fn new(card: AgentCard) -> Self {
        Self {
            card,
            evaluator: None,
            participant: None,
        }
    }

    pub fn with_evaluator(mut self, executor: GreenExecutor) -> Self {
        self.evaluator = Some(executor);
        self
    }

    pub fn with_participant(mut self, participant: Arc<dyn ParticipantAgent>) -> Self {
        self.participant = Some(participant);
        self
    }

    /// Bind the listener. Port 0 picks an ephemeral port.
    pub async fn bind(self, addr: SocketAddr) -> HostResult<BoundHost> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HostError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| HostError::Bind { addr, source })?;
        let endpoint = Endpoint::parse(&format!("http://{local_addr}"))
            .map_err(|e| HostError::Endpoint(e.to_string()))?;
        let shutdown = Arc::new(Notify::new());
        let state = Arc::new(HostState {
            card: self.card,
            evaluator: self.evaluator,
            participant: self.participant,
            shutdown: shutdown.clone(),
        });
        Ok(BoundHost {
            listener,
            router: router(state),
            shutdown,
            local_addr,
            endpoint,
        })
    }
}

pub struct BoundHost {
    listener: TcpListener,
    router: axum::Router,
    shutdown: Arc<Notify>,
    local_addr: SocketAddr,
    endpoint: Endpoint,
}

impl BoundHost {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Serve until `POST /shutdown` or until `signal` resolves; in-flight
    /// requests are allowed to finish.
    pub async fn serve_until<F>(self, signal: F) -> HostResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %self.local_addr, "agent listening");
        let shutdown = self.shutdown.clone();
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.notified() => {}
                    _ = signal => {}
                }
            })
            .await
            .map_err(HostError::Serve)?;
        tracing::info!(addr = %self.local_addr, "agent stopped");
        Ok(())
    }

    pub async fn serve(self) -> HostResult<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Serve on a background task.
    pub fn spawn(self) -> RunningHost {
        let endpoint = self.endpoint.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(self.serve());
        RunningHost {
            endpoint,
            shutdown,
            handle,
        }
    }
}

/// A host serving on a background task.
pub struct RunningHost {
    endpoint: Endpoint,
    shutdown: Arc<Notify>,
    handle: JoinHandle<HostResult<()>>,
}

impl RunningHost {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn stop(self) -> HostResult<()> {
        self.shutdown.notify_one();
        match self.handle.await {
            Ok(result) => result,
            Err(join) => Err(HostError::Serve(std::io::Error::other(join.to_string()))),
        }
    }
}
