use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::http::connection::Connection;
use crate::router::Router;

/// Task-per-connection accept loop.
///
/// Each accepted connection is moved into its own task, which owns it until
/// the response is written and the socket closed. The router is the only
/// shared state.
pub async fn serve(listener: TcpListener, router: Arc<Router>, read_buffer_size: usize) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("Listening on {}", addr);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        debug!("Accepted connection from {}", peer);

        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, peer, router, read_buffer_size);
            if let Err(e) = conn.run().await {
                warn!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
