//! Channel transport between the UI agent and a relay task.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{Relay, RelayClient, RelayRequest, RelayResponse};
use crate::error::{Result, TagError};

const QUEUE_DEPTH: usize = 32;

type Envelope = (RelayRequest, oneshot::Sender<RelayResponse>);

/// Client end of a spawned relay. Cloning shares the same relay task.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Envelope>,
}

/// Moves `relay` onto its own task. Requests are served one at a time in the
/// order they arrive; the task ends once every handle is dropped.
pub fn spawn(relay: Relay) -> (RelayHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Envelope>(QUEUE_DEPTH);
    let task = tokio::spawn(async move {
        while let Some((request, reply)) = rx.recv().await {
            let response = relay.handle(request).await;
            if reply.send(response).is_err() {
                tracing::debug!("Relay caller went away before the reply");
            }
        }
        tracing::debug!("Relay channel closed");
    });
    (RelayHandle { tx }, task)
}

#[async_trait]
impl RelayClient for RelayHandle {
    async fn call(&self, request: RelayRequest) -> Result<RelayResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| TagError::Relay("relay channel closed".into()))?;
        reply_rx
            .await
            .map_err(|_| TagError::Relay("relay dropped the request".into()))
    }
}
