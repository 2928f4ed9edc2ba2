//! Distributed shared memory: a coordinator process that brokers exclusive
//! locks and row transfers over named fixed-size blocks, one block per
//! shared sector boundary row.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{RetryPolicy, SharedRow, ShmClient};
pub use protocol::{BlockId, Reply, Request};
pub use server::ShmServer;

use crate::net::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("coordinator i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not reach the coordinator at {addr} after {attempts} attempts")]
    Unreachable { addr: std::net::SocketAddr, attempts: u32 },
    #[error("lock on block {block} not granted after {attempts} attempts")]
    LockTimeout { block: BlockId, attempts: u32 },
    #[error("coordinator denied {op} on block {block}")]
    Denied { op: &'static str, block: BlockId },
    #[error("coordinator sent {got} bytes for block {block}, expected {expected}")]
    SizeMismatch {
        block: BlockId,
        got: usize,
        expected: usize,
    },
    #[error("coordinator sent an unexpected reply")]
    UnexpectedReply,
    #[error("release called while no block is held")]
    NoBlockHeld,
    #[error("obtain called while block {0} is still held")]
    BlockAlreadyHeld(BlockId),
}
