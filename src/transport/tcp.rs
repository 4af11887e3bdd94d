//! TCP hosting for wrapped applications.
//!
//! Each accepted socket gets its own task and its own
//! [`ConnectionDriver`]. The task waits on the socket, on its
//! [`ConnectionHandle`] and on the server shutdown signal, feeds whichever fires
//! into the driver, then flushes whatever the driver queued on its
//! [`BufferedTransport`].
//!
//! On shutdown every open connection is closed through the driver, so clients
//! on binary-framed dialects receive a Close frame and applications get their
//! `on_close` before the server returns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{TransportConfig, WrapperConfig};
use crate::error::{constants, Result};
use crate::protocol::driver::{Application, ConnectionDriver};
use crate::transport::handle::{Command, ConnectionHandle};
use crate::transport::BufferedTransport;
use crate::utils::metrics::Metrics;

const READ_CHUNK: usize = 4096;

/// Start a WebSocket server that stops on CTRL+C.
///
/// `factory` builds one application instance per accepted connection and
/// receives that connection's [`ConnectionHandle`].
#[instrument(skip(config, factory), fields(address = %config.server.address))]
pub async fn start_server<A, F>(config: WrapperConfig, factory: F) -> Result<()>
where
    A: Application + Send + 'static,
    F: Fn(ConnectionHandle) -> A + Send + Sync + 'static,
{
    // Create internal shutdown channel
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(config, factory, shutdown_rx).await
}

/// Bind the configured address and serve until `shutdown_rx` fires.
#[instrument(skip(config, factory, shutdown_rx), fields(address = %config.server.address))]
pub async fn start_server_with_shutdown<A, F>(
    config: WrapperConfig,
    factory: F,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()>
where
    A: Application + Send + 'static,
    F: Fn(ConnectionHandle) -> A + Send + Sync + 'static,
{
    let listener = TcpListener::bind(&config.server.address).await?;
    serve(listener, config, factory, shutdown_rx).await
}

/// Serve connections from an already bound listener until `shutdown_rx` fires.
pub async fn serve<A, F>(
    listener: TcpListener,
    config: WrapperConfig,
    factory: F,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()>
where
    A: Application + Send + 'static,
    F: Fn(ConnectionHandle) -> A + Send + Sync + 'static,
{
    info!(address = %listener.local_addr()?, "Listening for WebSocket clients");

    let factory = Arc::new(factory);
    let metrics = Arc::new(Metrics::new());
    let settings = config.transport.clone();
    let secure = config.server.secure;
    let max_connections = config.server.max_connections;

    // Track active connections
    let active_connections = Arc::new(Mutex::new(0usize));
    let (closing_tx, closing_rx) = watch::channel(false);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Closing open connections...");
                closing_tx.send_replace(true);

                let timeout = tokio::time::sleep(config.server.shutdown_timeout);
                tokio::pin!(timeout);

                loop {
                    tokio::select! {
                        _ = &mut timeout => {
                            warn!("Shutdown timeout reached, forcing exit");
                            break;
                        }
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {
                            let connections = *active_connections.lock().await;
                            debug!(connections, "Waiting for connections to close");
                            if connections == 0 {
                                info!("All connections closed, shutting down");
                                break;
                            }
                        }
                    }
                }

                metrics.log_metrics();
                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        {
                            let mut count = active_connections.lock().await;
                            if *count >= max_connections {
                                warn!(peer = %peer, max_connections, "Connection limit reached, refusing client");
                                metrics.connection_rejected();
                                continue;
                            }
                            *count += 1;
                        }
                        metrics.connection_established();

                        let active_connections = active_connections.clone();
                        let metrics = metrics.clone();
                        let settings = settings.clone();
                        let closing = closing_rx.clone();
                        let (handle, commands) = ConnectionHandle::channel();
                        let app = factory(handle);

                        tokio::spawn(async move {
                            let signals = Signals { commands, closing };
                            let result = handle_connection(
                                stream,
                                peer,
                                app,
                                settings,
                                secure,
                                metrics.clone(),
                                signals,
                            )
                            .await;
                            if let Err(e) = result {
                                debug!(peer = %peer, error = %e, "Connection ended with error");
                            }

                            metrics.connection_closed();
                            let mut count = active_connections.lock().await;
                            *count -= 1;
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

/// Inputs a connection task waits on besides its socket.
struct Signals {
    commands: mpsc::UnboundedReceiver<Command>,
    closing: watch::Receiver<bool>,
}

/// Pump one socket through a driver until either side closes it.
async fn handle_connection<A>(
    mut stream: TcpStream,
    peer: SocketAddr,
    app: A,
    settings: TransportConfig,
    secure: bool,
    metrics: Arc<Metrics>,
    mut signals: Signals,
) -> Result<()>
where
    A: Application,
{
    info!(peer = %peer, "New connection established");
    let mut driver =
        ConnectionDriver::with_metrics(app, BufferedTransport::new(secure), settings, metrics);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        if driver.transport().has_outbound() {
            let out = driver.transport_mut().take_outbound();
            if let Err(e) = stream.write_all(&out).await {
                driver.connection_lost(&e.to_string());
                return Err(e.into());
            }
        }
        if driver.transport().is_closing() {
            stream.shutdown().await.ok();
            info!(peer = %peer, "Connection closed");
            return Ok(());
        }

        tokio::select! {
            read = stream.read(&mut chunk) => match read {
                Ok(0) => {
                    driver.connection_lost(constants::ERR_CONNECTION_CLOSED);
                    info!(peer = %peer, "Connection closed by peer");
                    return Ok(());
                }
                Ok(n) => driver.data_received(&chunk[..n]),
                Err(e) => {
                    driver.connection_lost(&e.to_string());
                    return Err(e.into());
                }
            },
            Some(command) = signals.commands.recv() => match command {
                Command::Write(payload) => driver.write_payload(payload),
                Command::Close(reason) => driver.request_close(&reason),
            },
            Ok(()) = signals.closing.changed() => {
                debug!(peer = %peer, "Closing connection for server shutdown");
                driver.request_close(constants::ERR_SERVER_SHUTDOWN);
            }
        }
    }
}
