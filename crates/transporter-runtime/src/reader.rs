//! Reader runtime: startup sequence and message forwarding.
//!
//! Loads prior `State` per namespace from the store, hands it to the
//! adaptor, and forwards whatever the adaptor emits, tagging each message
//! with the `State` that should be persisted once it's durably written
//! downstream.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transporter_core::{Emitted, MessageTx, ReaderAdaptor, TransporterError};
use transporter_durability::OffsetStateStore;

use crate::writer::Fault;

/// Owns the reader adaptor behind a lock shared between the task driving
/// `start()` and whoever calls `stop()` — the supervisor retains its own
/// handle to this runtime so it can invoke `stop()` explicitly as step 1 of
/// its shutdown sequence (§4.8), not just rely on the adaptor observing
/// cancellation inside `start()`.
pub struct ReaderRuntime {
    id: String,
    adaptor: Mutex<Box<dyn ReaderAdaptor>>,
    store: Arc<Mutex<OffsetStateStore>>,
}

impl ReaderRuntime {
    pub fn new(id: impl Into<String>, adaptor: Box<dyn ReaderAdaptor>, store: Arc<Mutex<OffsetStateStore>>) -> Self {
        Self {
            id: id.into(),
            adaptor: Mutex::new(adaptor),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Loads every persisted `State`, hands the set to the adaptor, and
    /// drives it until it exhausts, is cancelled, or fails. A reader failure
    /// is reported as a [`Fault`] rather than ending the process directly —
    /// the supervisor decides the shutdown sequence, giving writers a chance
    /// to flush before the process exits.
    pub async fn run(&self, tx: MessageTx, fault_tx: mpsc::Sender<Fault>, cancel: CancellationToken) {
        let states = {
            let store = self.store.lock().await;
            match store.read_all_states() {
                Ok(states) => states,
                Err(e) => {
                    warn!(reader = %self.id, error = %e, "failed to load prior state, starting fresh");
                    Vec::new()
                }
            }
        };

        info!(reader = %self.id, namespaces = states.len(), "reader runtime starting");
        let result = {
            let mut adaptor = self.adaptor.lock().await;
            adaptor.start(states, tx, cancel).await
        };
        if let Err(e) = result {
            let _ = fault_tx
                .send(Fault {
                    node_id: self.id.clone(),
                    error: e,
                })
                .await;
            return;
        }
        info!(reader = %self.id, "reader runtime finished");
    }

    /// Idempotent. Called by the supervisor during shutdown in addition to
    /// cancelling the shared token, for adaptors that need an explicit stop
    /// action beyond observing cancellation (closing a socket/cursor,
    /// unsubscribing, etc.).
    pub async fn stop(&self) -> Result<(), TransporterError> {
        self.adaptor.lock().await.stop().await
    }
}

/// Sequences emitted by a [`ReaderAdaptor`] in tests and simple adaptors:
/// bumps `Message.sequence`/`State.timestamp` monotonically and emits
/// [`Emitted`] pairs, modelling what a real adaptor (`transporter-io`) does
/// internally during the copy-then-sync transition.
pub struct SequenceTagger {
    next: u64,
}

impl SequenceTagger {
    pub fn new(starting_at: u64) -> Self {
        Self { next: starting_at }
    }

    pub fn tag(&mut self, mut message: transporter_core::Message, state_after: transporter_core::State) -> Emitted {
        message.sequence = self.next;
        self.next += 1;
        Emitted { message, state_after }
    }
}
