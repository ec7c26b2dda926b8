//! Lazy, finite stream of status updates backed by a polling task.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::contract::{Endpoint, StatusUpdate, TaskId};

use super::agent_client::AgentClient;
use super::error::{ClientError, ClientResult};

/// Updates of one task in emission order.
///
/// Ends after the terminal update. Yields one [`ClientError::Timeout`] and then
/// ends if the watch budget elapses first. Dropping it stops the poller.
pub struct UpdateStream {
    rx: mpsc::Receiver<ClientResult<StatusUpdate>>,
    poller: JoinHandle<()>,
}

impl UpdateStream {
    pub(crate) fn new(rx: mpsc::Receiver<ClientResult<StatusUpdate>>, poller: JoinHandle<()>) -> Self {
        Self { rx, poller }
    }

    pub async fn next(&mut self) -> Option<ClientResult<StatusUpdate>> {
        self.rx.recv().await
    }
}

impl Stream for UpdateStream {
    type Item = ClientResult<StatusUpdate>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for UpdateStream {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

pub(crate) async fn poll_updates(
    client: AgentClient,
    endpoint: Endpoint,
    task_id: TaskId,
    budget: Duration,
    tx: mpsc::Sender<ClientResult<StatusUpdate>>,
) {
    let started = Instant::now();
    let deadline = started + budget;
    let poll_interval = client.config().poll_interval;
    let timed_out = || ClientError::Timeout {
        operation: format!("stream_updates({task_id})"),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    let mut cursor = 0u64;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let _ = tx.send(Err(timed_out())).await;
            return;
        }

        let batch = match tokio::time::timeout(
            remaining,
            client.updates_since(&endpoint, task_id, cursor),
        )
        .await
        {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
            Err(_) => {
                let _ = tx.send(Err(timed_out())).await;
                return;
            }
        };

        for update in batch {
            if update.seq <= cursor {
                continue;
            }
            cursor = update.seq;
            let terminal = update.is_terminal();
            if tx.send(Ok(update)).await.is_err() {
                return;
            }
            if terminal {
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval.min(remaining)) => {}
            _ = tx.closed() => return,
        }
    }
}
