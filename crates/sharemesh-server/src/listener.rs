//! Accept loop and per-connection handling.

use crate::context::{Mode, ServerContext};
use crate::processor::{CommandProcessor, Dispatch, Outgoing};
use crate::subscription;
use sharemesh_wire::{split, Transport, WireError, WireResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Accept connections on `listener` until the task is cancelled.
///
/// Each admitted connection runs in its own task, but at most
/// `max_connections` are processed at once per listener; the rest wait for
/// a slot.
pub async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    mode: Mode,
    transport: Arc<dyn Transport>,
) {
    let pool = Arc::new(Semaphore::new(ctx.config.max_connections.max(1)));
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(mode = %mode, error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        if !ctx.rate_limiter.check(addr.ip()) {
            drop(stream);
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let transport = Arc::clone(&transport);
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                return;
            };
            if let Err(e) = handle_connection(ctx, mode, transport.as_ref(), stream, addr).await {
                debug!(peer = %addr, mode = %mode, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Serve one accepted connection: read the request, then either stream the
/// reply and close or hand the connection over to a subscription.
pub async fn handle_connection(
    ctx: Arc<ServerContext>,
    mode: Mode,
    transport: &dyn Transport,
    stream: TcpStream,
    addr: SocketAddr,
) -> WireResult<()> {
    let read_timeout = ctx.read_timeout();
    let timeout = (!read_timeout.is_zero()).then_some(read_timeout);

    let stream = match timeout {
        Some(limit) => tokio::time::timeout(limit, transport.accept(stream))
            .await
            .map_err(|_| WireError::Timeout)??,
        None => transport.accept(stream).await?,
    };
    let (mut reader, mut writer) = split(stream, timeout);

    let frame = reader.read_frame().await?;
    debug!(peer = %addr, secure = mode.is_secure(), "RECEIVED: {}", frame);

    let processor = CommandProcessor::new(Arc::clone(&ctx));
    match processor.dispatch(&frame, mode).await {
        Dispatch::Reply(items) => {
            for item in items {
                match item {
                    Outgoing::Frame(text) => {
                        writer.write_frame(&text).await?;
                        debug!(peer = %addr, "SENT: {}", text);
                    }
                    Outgoing::File { path, size } => {
                        let sent = writer.write_file(&path, size).await?;
                        debug!(peer = %addr, bytes = sent, "SENT: file {}", path.display());
                    }
                }
            }
            writer.shutdown().await?;
        }
        Dispatch::Subscribe(request) => {
            subscription::serve(ctx, mode, request, reader, writer).await;
        }
    }
    Ok(())
}

/// Log a listener that could not be started.
pub(crate) fn report_disabled(mode: Mode, reason: &str) {
    warn!(mode = %mode, "Listener not started: {}", reason);
}
