//! Session Synchronizer: mirrors {active dataset, selected node} to the server.
//!
//! Saves are best-effort background work. [`SessionSync::save`] returns immediately; a single
//! worker task sends queued states to the server in the order they were saved, so a slow request
//! can never let an older selection overwrite a newer one. Failures are logged and otherwise
//! invisible to the caller.
//!
//! Restoration ([`crate::app::App::restore`]) reads the session once at startup via
//! [`SessionSync::load`].

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::{
    gateway::DatasetGateway,
    model::{NodeId, SessionState},
};

enum SaveRequest {
    Save(SessionState),
    Flush(oneshot::Sender<()>),
}

pub struct SessionSync {
    gateway: Arc<dyn DatasetGateway>,
    queue: Mutex<Option<mpsc::UnboundedSender<SaveRequest>>>,
}

impl SessionSync {
    pub fn new(gateway: Arc<dyn DatasetGateway>) -> Self {
        SessionSync {
            gateway,
            queue: Mutex::new(None),
        }
    }

    /// Queue a session save. Never blocks and never fails from the caller's point of view.
    pub fn save(&self, sub_name: Option<String>, selected_id: Option<NodeId>) {
        let state = SessionState::new(sub_name, selected_id);
        match self.sender() {
            Some(tx) => {
                if tx.send(SaveRequest::Save(state)).is_err() {
                    tracing::warn!("[SessionSync] save worker stopped, session state not saved");
                }
            }
            None => tracing::warn!("[SessionSync] no async runtime, session state not saved"),
        }
    }

    /// Wait until every save queued so far has been attempted.
    pub async fn flush(&self) {
        let Some(tx) = self.sender() else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(SaveRequest::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Read the server-held session. Any failure is logged and reported as `None`.
    pub async fn load(&self) -> Option<SessionState> {
        match self.gateway.get_session().await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!("[SessionSync] could not read session state: {}", e);
                None
            }
        }
    }

    /// The worker is started lazily so that a controller can be built outside a runtime.
    fn sender(&self) -> Option<mpsc::UnboundedSender<SaveRequest>> {
        let mut queue = self.queue.lock();
        if let Some(tx) = queue.as_ref() {
            if !tx.is_closed() {
                return Some(tx.clone());
            }
        }
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(save_worker(self.gateway.clone(), rx));
        *queue = Some(tx.clone());
        Some(tx)
    }
}

async fn save_worker(
    gateway: Arc<dyn DatasetGateway>,
    mut rx: mpsc::UnboundedReceiver<SaveRequest>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            SaveRequest::Save(state) => {
                if let Err(e) = gateway.set_session(&state).await {
                    tracing::warn!("[SessionSync] session save failed: {}", e);
                } else {
                    tracing::debug!(
                        "[SessionSync] saved sub={:?} selected={:?}",
                        state.sub_name,
                        state.selected_id.as_ref().map(NodeId::as_str)
                    );
                }
            }
            SaveRequest::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
