use crate::net;
use crate::shm::ShmError;
use crate::shm::protocol::{BlockId, Reply, Request};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Bounded retry for contended locks (and the initial connect). Exhaustion
/// is a reported error, not a hang, so a starved worker is observable.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 10_000,
            delay: Duration::from_micros(100),
        }
    }
}

/// One worker's channel to the coordinator.
pub struct ShmClient {
    stream: TcpStream,
    block_size: usize,
    retry: RetryPolicy,
}

impl ShmClient {
    /// Connect and attach as `rank`. The connect itself is retried under the
    /// same policy, since the coordinator process may still be starting.
    pub fn connect(
        addr: SocketAddr,
        rank: u32,
        block_size: usize,
        retry: RetryPolicy,
    ) -> Result<Self, ShmError> {
        let mut stream = connect_with_retry(addr, retry)?;
        net::send_message(&mut stream, &Request::Hello { rank })?;
        match net::recv_message(&mut stream)? {
            Reply::Ok => {}
            _ => return Err(ShmError::UnexpectedReply),
        }
        debug!(rank, %addr, "attached to coordinator");
        Ok(ShmClient {
            stream,
            block_size,
            retry,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn request(&mut self, request: &Request) -> Result<Reply, ShmError> {
        net::send_message(&mut self.stream, request)?;
        Ok(net::recv_message(&mut self.stream)?)
    }

    /// One lock attempt; `false` means the block is held by someone else.
    pub fn try_lock(&mut self, block: BlockId) -> Result<bool, ShmError> {
        match self.request(&Request::Lock { block })? {
            Reply::Ok => Ok(true),
            Reply::Denied => Ok(false),
            Reply::Data(_) => Err(ShmError::UnexpectedReply),
        }
    }

    /// Acquire the block's exclusive lock, retrying with a short fixed
    /// delay while it is contended.
    pub fn lock(&mut self, block: BlockId) -> Result<(), ShmError> {
        for attempt in 1..=self.retry.max_attempts {
            if self.try_lock(block)? {
                trace!(block, attempt, "lock granted");
                return Ok(());
            }
            thread::sleep(self.retry.delay);
        }
        Err(ShmError::LockTimeout {
            block,
            attempts: self.retry.max_attempts,
        })
    }

    /// Release a lock this caller holds. A denial means the caller never
    /// held it — a logic error, never retried.
    pub fn unlock(&mut self, block: BlockId) -> Result<(), ShmError> {
        match self.request(&Request::Unlock { block })? {
            Reply::Ok => Ok(()),
            Reply::Denied => Err(ShmError::Denied { op: "unlock", block }),
            Reply::Data(_) => Err(ShmError::UnexpectedReply),
        }
    }

    /// Read the block into `buf`; requires holding the lock.
    pub fn get_into(&mut self, block: BlockId, buf: &mut [u8]) -> Result<(), ShmError> {
        match self.request(&Request::Get { block })? {
            Reply::Data(data) if data.len() == buf.len() => {
                buf.copy_from_slice(&data);
                Ok(())
            }
            Reply::Data(data) => Err(ShmError::SizeMismatch {
                block,
                got: data.len(),
                expected: buf.len(),
            }),
            Reply::Denied => Err(ShmError::Denied { op: "get", block }),
            Reply::Ok => Err(ShmError::UnexpectedReply),
        }
    }

    pub fn get(&mut self, block: BlockId) -> Result<Vec<u8>, ShmError> {
        let mut buf = vec![0; self.block_size];
        self.get_into(block, &mut buf)?;
        Ok(buf)
    }

    /// Overwrite the block with one row of bytes; requires holding the lock.
    pub fn set(&mut self, block: BlockId, data: &[u8]) -> Result<(), ShmError> {
        match self.request(&Request::Set {
            block,
            data: data.to_vec(),
        })? {
            Reply::Ok => Ok(()),
            Reply::Denied => Err(ShmError::Denied { op: "set", block }),
            Reply::Data(_) => Err(ShmError::UnexpectedReply),
        }
    }

    /// Stop the coordinator. Consumes the client; no reply is expected.
    pub fn terminate(mut self) -> Result<(), ShmError> {
        net::send_message(&mut self.stream, &Request::Terminate)?;
        Ok(())
    }
}

fn connect_with_retry(addr: SocketAddr, retry: RetryPolicy) -> Result<TcpStream, ShmError> {
    for _ in 0..retry.max_attempts {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(_) => thread::sleep(retry.delay),
        }
    }
    Err(ShmError::Unreachable {
        addr,
        attempts: retry.max_attempts,
    })
}

/// Lock-bracketed access to one shared boundary row, mirroring how a worker
/// uses it: `init` seeds the block once at startup, then each iteration
/// brackets the row's update between `obtain` and `release`.
pub struct SharedRow {
    client: ShmClient,
    held: Option<BlockId>,
}

impl SharedRow {
    pub fn new(client: ShmClient) -> Self {
        SharedRow { client, held: None }
    }

    /// Publish the row's initial contents (lock, set, unlock).
    pub fn init(&mut self, block: BlockId, row: &[u8]) -> Result<(), ShmError> {
        self.client.lock(block)?;
        self.client.set(block, row)?;
        self.client.unlock(block)
    }

    /// Lock the block and refresh `row` from it. The lock stays held until
    /// `release`, so the caller may mutate the row exclusively.
    pub fn obtain(&mut self, block: BlockId, row: &mut [u8]) -> Result<(), ShmError> {
        if let Some(held) = self.held {
            return Err(ShmError::BlockAlreadyHeld(held));
        }
        self.client.lock(block)?;
        self.client.get_into(block, row)?;
        self.held = Some(block);
        Ok(())
    }

    /// Write `row` back to the held block and unlock it.
    pub fn release(&mut self, row: &[u8]) -> Result<(), ShmError> {
        let block = self.held.take().ok_or(ShmError::NoBlockHeld)?;
        self.client.set(block, row)?;
        self.client.unlock(block)
    }

    pub fn terminate(self) -> Result<(), ShmError> {
        self.client.terminate()
    }
}
