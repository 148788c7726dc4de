//! Peer gossip.
//!
//! Each active mode runs one scheduler. Every exchange interval it picks a
//! random known peer, sends it this server's whole directory for that mode,
//! and evicts the peer if it cannot be reached or does not answer with
//! success.

use crate::context::{Mode, ServerContext};
use sharemesh_types::PeerAddress;
use sharemesh_wire::{request, Command, Reply};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// What one gossip round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No peer other than this server is known.
    Skipped,
    /// The peer acknowledged the exchange.
    Exchanged(PeerAddress),
    /// The peer failed and was removed from the directory.
    Evicted(PeerAddress),
}

/// Start the scheduler for `mode`. The first round runs one exchange
/// interval after `initial_delay`.
pub fn spawn(ctx: Arc<ServerContext>, mode: Mode, initial_delay: Duration) -> JoinHandle<()> {
    let period = ctx.config.exchange_interval().max(Duration::from_secs(1));
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;
        info!(mode = %mode, period_secs = period.as_secs(), "Gossip scheduler started");
        loop {
            tokio::time::sleep(period).await;
            exchange_round(&ctx, mode).await;
        }
    })
}

/// Run a single gossip round for `mode`.
pub async fn exchange_round(ctx: &ServerContext, mode: Mode) -> RoundOutcome {
    let directory = ctx.directory(mode);
    let Some(peer) = directory.random_other() else {
        debug!(mode = %mode, "No peers to gossip with");
        return RoundOutcome::Skipped;
    };
    let Some(transport) = ctx.transport(mode) else {
        return RoundOutcome::Skipped;
    };

    let command = Command::Exchange {
        server_list: directory.snapshot(),
    };
    let reply = request(transport.as_ref(), &peer, &command, ctx.read_timeout()).await;
    let acknowledged = match reply {
        Ok(frames) => frames
            .first()
            .and_then(|first| Reply::parse(first).ok())
            .is_some_and(|reply| reply.is_success()),
        Err(e) => {
            debug!(peer = %peer, error = %e, "Exchange failed");
            false
        }
    };

    if acknowledged {
        debug!(peer = %peer, mode = %mode, "Exchanged server list");
        RoundOutcome::Exchanged(peer)
    } else {
        directory.remove(&peer);
        info!(peer = %peer, mode = %mode, "Evicted unresponsive peer");
        RoundOutcome::Evicted(peer)
    }
}
