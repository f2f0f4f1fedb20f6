use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditStore};

/// Upper bound on events written in one transaction.
const MAX_BATCH: usize = 64;

/// Drains the audit channel into the store.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Run until every handle is dropped and the channel is empty.
    ///
    /// Events already queued when one arrives are written with it in a
    /// single batch. A failed batch is logged and dropped.
    pub async fn run(mut self) {
        info!("Audit writer started");

        let mut batch = Vec::with_capacity(MAX_BATCH);
        while let Some(first) = self.rx.recv().await {
            batch.push(first);
            while batch.len() < MAX_BATCH {
                match self.rx.try_recv() {
                    Ok(envelope) => batch.push(envelope),
                    Err(_) => break,
                }
            }

            match self.store.append(&batch) {
                Ok(written) => debug!(written, "Audit batch stored"),
                Err(e) => error!(error = %e, dropped = batch.len(), "Failed to store audit batch"),
            }
            batch.clear();
        }

        info!("Audit writer stopped");
    }
}

/// Create the handle/writer pair around a bounded channel.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; it exits once every
/// clone of the handle is gone.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
