use crate::grid::{CellGrid, GridError};
use crate::net::{self, WireError};
use crate::shm::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("peer channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("could not reach the root worker at {addr} after {attempts} attempts")]
    Unreachable { addr: SocketAddr, attempts: u32 },
    #[error("peer sent an unexpected message during {phase}")]
    UnexpectedMessage { phase: &'static str },
    #[error("barrier iteration mismatch: expected {expected}, peer {rank} sent {got}")]
    BarrierMismatch { expected: u32, got: u32, rank: u32 },
    #[error("two peers both claim rank {0}")]
    DuplicateRank(u32),
}

/// Point-to-point traffic between the root worker and its peers: the
/// per-iteration collective barrier and the final sector gather.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    Hello { rank: u32 },
    BarrierArrive { iteration: u32 },
    BarrierRelease { iteration: u32 },
    SectorData {
        rank: u32,
        y_offset: i32,
        width: i32,
        height: i32,
        cells: Vec<u8>,
    },
}

/// Root-worker side of the peer channel. The root collects one arrival per
/// peer, then releases them all — no worker starts iteration k+1 before
/// every worker has finished iteration k.
pub struct RootChannel {
    peers: Vec<(u32, TcpStream)>,
}

impl RootChannel {
    /// Accept `expected` peers and order them by rank. Blocks until every
    /// peer has attached.
    pub fn accept_peers(listener: TcpListener, expected: usize) -> Result<Self, ClusterError> {
        let mut peers: Vec<(u32, TcpStream)> = Vec::with_capacity(expected);
        while peers.len() < expected {
            let (mut stream, addr) = listener.accept()?;
            match net::recv_message(&mut stream)? {
                PeerMessage::Hello { rank } => {
                    if peers.iter().any(|(r, _)| *r == rank) {
                        return Err(ClusterError::DuplicateRank(rank));
                    }
                    debug!(rank, %addr, "peer attached");
                    peers.push((rank, stream));
                }
                _ => return Err(ClusterError::UnexpectedMessage { phase: "handshake" }),
            }
        }
        peers.sort_by_key(|(rank, _)| *rank);
        info!(peers = peers.len(), "all peers attached");
        Ok(RootChannel { peers })
    }

    /// The root's half of the collective barrier, called after it finishes
    /// its own local sweep for `iteration`.
    pub fn barrier(&mut self, iteration: u32) -> Result<(), ClusterError> {
        for (rank, stream) in &mut self.peers {
            match net::recv_message(stream)? {
                PeerMessage::BarrierArrive { iteration: got } if got == iteration => {}
                PeerMessage::BarrierArrive { iteration: got } => {
                    return Err(ClusterError::BarrierMismatch {
                        expected: iteration,
                        got,
                        rank: *rank,
                    });
                }
                _ => return Err(ClusterError::UnexpectedMessage { phase: "barrier" }),
            }
        }
        for (_, stream) in &mut self.peers {
            net::send_message(stream, &PeerMessage::BarrierRelease { iteration })?;
        }
        Ok(())
    }

    /// Receive every peer's final sector and merge it at its row offset.
    /// Peers are drained in rank order, so the shared boundary rows end up
    /// holding the higher sector's (freshest) copy.
    pub fn gather(&mut self, global: &mut CellGrid) -> Result<(), ClusterError> {
        for (rank, stream) in &mut self.peers {
            match net::recv_message(stream)? {
                PeerMessage::SectorData {
                    rank: sender,
                    y_offset,
                    width,
                    height,
                    cells,
                } => {
                    debug!(rank = sender, y_offset, height, "sector received");
                    if sender != *rank {
                        return Err(ClusterError::UnexpectedMessage { phase: "gather" });
                    }
                    global.copy_cells(&cells, width, height, 0, y_offset)?;
                }
                _ => return Err(ClusterError::UnexpectedMessage { phase: "gather" }),
            }
        }
        Ok(())
    }
}

/// Non-root side of the peer channel.
pub struct PeerChannel {
    stream: TcpStream,
    rank: u32,
}

impl PeerChannel {
    pub fn connect(addr: SocketAddr, rank: u32, retry: RetryPolicy) -> Result<Self, ClusterError> {
        let mut attempts = 0;
        let mut stream = loop {
            match TcpStream::connect(addr) {
                Ok(stream) => break stream,
                Err(_) => {
                    attempts += 1;
                    if attempts >= retry.max_attempts {
                        return Err(ClusterError::Unreachable {
                            addr,
                            attempts,
                        });
                    }
                    thread::sleep(retry.delay);
                }
            }
        };
        net::send_message(&mut stream, &PeerMessage::Hello { rank })?;
        Ok(PeerChannel { stream, rank })
    }

    /// Arrive at the barrier for `iteration` and block until the root
    /// releases it.
    pub fn barrier(&mut self, iteration: u32) -> Result<(), ClusterError> {
        net::send_message(&mut self.stream, &PeerMessage::BarrierArrive { iteration })?;
        match net::recv_message(&mut self.stream)? {
            PeerMessage::BarrierRelease { iteration: got } if got == iteration => Ok(()),
            PeerMessage::BarrierRelease { iteration: got } => Err(ClusterError::BarrierMismatch {
                expected: iteration,
                got,
                rank: self.rank,
            }),
            _ => Err(ClusterError::UnexpectedMessage { phase: "barrier" }),
        }
    }

    /// Ship the final sector contents to the root.
    pub fn send_sector(
        &mut self,
        y_offset: i32,
        width: i32,
        height: i32,
        cells: &[u8],
    ) -> Result<(), ClusterError> {
        net::send_message(
            &mut self.stream,
            &PeerMessage::SectorData {
                rank: self.rank,
                y_offset,
                width,
                height,
                cells: cells.to_vec(),
            },
        )?;
        Ok(())
    }
}
