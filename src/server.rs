//! TCP server for receiving file batches.
//!
//! Accepts connections and runs each one as an independent tokio task, so a
//! failing or slow sender never blocks acceptance of the next connection
//! or disturbs other transfers.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::TransferSession;
use crate::storage::BatchStore;

/// Server instance
pub struct Server {
    listener: TcpListener,
    store: Arc<BatchStore>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(addr.clone(), e))?;

        Ok(Server {
            listener,
            store: Arc::new(BatchStore::new(&config.root)),
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves or accepting fails.
    ///
    /// A connection arriving while every slot is taken is closed at once.
    /// Transfers already in flight keep running on their own tasks.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!(address = %addr, root = %self.store.root().display(), "Server listening");
        }
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        return Err(ServerError::Accept(e));
                    }
                },
            };

            // Shed the connection rather than wait for a slot
            let permit = match Arc::clone(&self.connection_limit).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(peer = %peer, "Connection limit reached, dropping connection");
                    drop(stream);
                    continue;
                }
            };

            let store = Arc::clone(&self.store);
            tokio::spawn(
                serve_connection(stream, store, permit)
                    .instrument(info_span!("connection", peer = %peer)),
            );
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Run one transfer and release the socket on every exit path.
async fn serve_connection(
    mut stream: TcpStream,
    store: Arc<BatchStore>,
    permit: OwnedSemaphorePermit,
) {
    info!("Connected");

    let mut session = TransferSession::new(&store);
    match session.run(&mut stream).await {
        Ok(summary) => {
            for file in &summary.files {
                debug!(file = %file.name, path = %file.path.display(), bytes = file.size, "Stored");
            }
            info!(
                batch = %summary.batch_dir.display(),
                files = summary.files.len(),
                bytes = summary.total_bytes,
                "Transfer complete"
            );
        }
        Err(e) => warn!(
            kind = %e.kind(),
            error = %e,
            consumed = session.bytes_consumed(),
            "Transfer failed"
        ),
    }
    debug!(state = ?session.state(), "Session finished");

    drop(stream);
    drop(permit);
    info!("Disconnected");
}
