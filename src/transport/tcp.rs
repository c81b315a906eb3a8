use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::protocol::connection::ConnectionId;
use crate::server::context::ServerContext;
use crate::server::tick::TickLoop;
use crate::server::Server;
use crate::transport::connection::handle_connection;

/// Bind the configured address and serve until CTRL+C.
#[instrument(skip(config), fields(address = %config.server.address))]
pub async fn start_server(config: NetworkConfig) -> Result<()> {
    // Create internal shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx_clone.send(()).await;
        }
    });

    start_server_with_shutdown(config, shutdown_rx).await
}

/// Bind the configured address and serve until `shutdown_rx` fires.
#[instrument(skip(config, shutdown_rx), fields(address = %config.server.address))]
pub async fn start_server_with_shutdown(
    config: NetworkConfig,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(&config.server.address).await?;
    let server = Server::new(config)?;
    server.serve(listener, shutdown_rx).await
}

pub(crate) async fn serve(
    context: Arc<ServerContext>,
    tick: TickLoop,
    listener: TcpListener,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let local: SocketAddr = listener.local_addr()?;
    info!(address = %local, "Listening");

    let (stop_tx, stop_rx) = watch::channel(false);
    let tick_task = tokio::spawn(tick.run(stop_rx));

    let max_connections = context.config.server.max_connections;
    let active_connections = Arc::new(Mutex::new(0u32));
    let mut next_id: ConnectionId = 0;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Waiting for connections to close...");

                // The tick context disconnects every player on its way out.
                let _ = stop_tx.send(true);
                if let Err(e) = tick_task.await {
                    error!(error = %e, "Tick task failed");
                }

                let timeout = tokio::time::sleep(context.config.server.shutdown_timeout);
                tokio::pin!(timeout);

                loop {
                    let connections = *active_connections.lock().await;
                    if connections == 0 {
                        info!("All connections closed, shutting down");
                        break;
                    }
                    tokio::select! {
                        _ = &mut timeout => {
                            warn!(connections, "Shutdown timeout reached, forcing exit");
                            break;
                        }
                        _ = tokio::time::sleep(Duration::from_millis(50)) => {
                            debug!(connections, "Waiting for connections to close");
                        }
                    }
                }

                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        {
                            let count = active_connections.lock().await;
                            if *count as usize >= max_connections {
                                warn!(%peer, limit = max_connections, "Connection limit reached, refusing");
                                continue;
                            }
                        }

                        next_id += 1;
                        let id = next_id;
                        let active_connections = active_connections.clone();
                        let context = context.clone();

                        {
                            let mut count = active_connections.lock().await;
                            *count += 1;
                        }
                        context.metrics().connection_established();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, id, context.clone()).await {
                                debug!(%peer, error = %e, "Connection ended with error");
                            }

                            let mut count = active_connections.lock().await;
                            *count -= 1;
                            context.metrics().connection_closed();
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}
