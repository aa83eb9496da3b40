//! Remote connection acceptor.
//!
//! The listening socket exists only while the server accepts: suspend
//! drops it, so new connections are refused by the OS, and resume binds
//! the same address again.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tracing::{debug, info, warn};

use super::table::ServerPhase;
use super::ShellServer;
use crate::session::Transport;

const REBIND_RETRY: Duration = Duration::from_secs(1);

pub(crate) async fn run_acceptor(server: ShellServer, listener: TcpListener, addr: SocketAddr) {
    let mut phase = server.subscribe();
    let mut listener = Some(listener);

    info!(%addr, "remote shell listening");

    loop {
        let current = *phase.borrow_and_update();
        match current {
            ServerPhase::Halted => break,
            ServerPhase::Suspended => {
                if listener.take().is_some() {
                    info!(%addr, "remote shell listener closed");
                }
                if phase.changed().await.is_err() {
                    break;
                }
            }
            ServerPhase::Accepting => {
                if listener.is_none() {
                    match TcpListener::bind(addr).await {
                        Ok(bound) => {
                            info!(%addr, "remote shell listener reopened");
                            listener = Some(bound);
                        }
                        Err(err) => {
                            warn!(%addr, error = %err, "failed to reopen listener");
                            select! {
                                changed = phase.changed() => {
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                                _ = tokio::time::sleep(REBIND_RETRY) => {}
                            }
                            continue;
                        }
                    }
                }
                let Some(active) = listener.as_ref() else {
                    continue;
                };

                select! {
                    changed = phase.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    accepted = active.accept() => handle_accept(&server, accepted),
                }
            }
        }
    }

    drop(listener);
    info!(%addr, "remote shell acceptor stopped");
}

fn handle_accept(server: &ShellServer, accepted: std::io::Result<(TcpStream, SocketAddr)>) {
    let (stream, peer) = match accepted {
        Ok(accepted) => accepted,
        Err(err) => {
            warn!(error = ?err, "failed to accept connection");
            return;
        }
    };

    if !server.access().permit(peer.ip()) {
        info!(%peer, "connection denied by access list");
        return;
    }

    match server.open_session(Transport::remote(stream, peer)) {
        Ok(handle) => debug!(%peer, session = %handle.id(), "remote session admitted"),
        Err(err) => debug!(%peer, error = %err, "connection refused"),
    }
}
