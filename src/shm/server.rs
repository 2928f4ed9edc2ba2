use crate::net;
use crate::shm::ShmError;
use crate::shm::protocol::{Reply, Request};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info, warn};

struct ShmState {
    blocks: Vec<Vec<u8>>,
    holders: Vec<Option<u32>>,
    block_size: usize,
}

/// The coordinator service: block storage plus the lock table.
///
/// Each connection is served on its own thread; the mutex around the lock
/// table serializes concurrent operations. Lock acquisition never blocks
/// here — a held block is simply refused and the caller retries.
pub struct ShmServer {
    listener: TcpListener,
    state: Arc<Mutex<ShmState>>,
}

impl ShmServer {
    pub fn bind(addr: SocketAddr, num_blocks: usize, block_size: usize) -> Result<Self, ShmError> {
        let listener = TcpListener::bind(addr)?;
        let state = ShmState {
            blocks: vec![vec![0; block_size]; num_blocks],
            holders: vec![None; num_blocks],
            block_size,
        };
        Ok(ShmServer {
            listener,
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ShmError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until a `Terminate` arrives. Held locks are never
    /// expired, even when their holder's connection drops; a vanished worker
    /// stalls its neighbours rather than corrupting their boundary rows.
    pub fn run(self) -> Result<(), ShmError> {
        let addr = self.local_addr()?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let state = self.state;
        let listener = self.listener;

        info!(%addr, blocks = state.lock().map(|s| s.blocks.len()).unwrap_or(0), "coordinator listening");

        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let state = Arc::clone(&state);
                        let shutdown = shutdown_tx.clone();
                        thread::spawn(move || serve_connection(stream, state, shutdown));
                    }
                    Err(err) => warn!(%err, "coordinator accept failed"),
                }
            }
        });

        // Blocks until some client sends Terminate.
        let _ = shutdown_rx.recv();
        info!("coordinator terminated");
        Ok(())
    }
}

fn serve_connection(mut stream: TcpStream, state: Arc<Mutex<ShmState>>, shutdown: mpsc::Sender<()>) {
    let mut rank: Option<u32> = None;

    loop {
        let request: Request = match net::recv_message(&mut stream) {
            Ok(request) => request,
            Err(_) => {
                // Client gone. Deliberately keep whatever it still holds.
                if let (Some(rank), Ok(state)) = (rank, state.lock()) {
                    let stuck = state.holders.iter().filter(|h| **h == Some(rank)).count();
                    if stuck > 0 {
                        warn!(rank, stuck, "worker disconnected while holding locks");
                    }
                }
                return;
            }
        };

        let reply = match request {
            Request::Hello { rank: r } => {
                debug!(rank = r, "worker attached");
                rank = Some(r);
                Reply::Ok
            }
            Request::Lock { block } => with_block(&state, rank, block, "lock", |state, rank, b| {
                if state.holders[b].is_none() {
                    state.holders[b] = Some(rank);
                    Reply::Ok
                } else {
                    Reply::Denied
                }
            }),
            Request::Unlock { block } => {
                with_block(&state, rank, block, "unlock", |state, rank, b| {
                    if state.holders[b] == Some(rank) {
                        state.holders[b] = None;
                        Reply::Ok
                    } else {
                        Reply::Denied
                    }
                })
            }
            Request::Get { block } => with_block(&state, rank, block, "get", |state, rank, b| {
                if state.holders[b] == Some(rank) {
                    Reply::Data(state.blocks[b].clone())
                } else {
                    Reply::Denied
                }
            }),
            Request::Set { block, data } => {
                with_block(&state, rank, block, "set", |state, rank, b| {
                    if state.holders[b] != Some(rank) {
                        Reply::Denied
                    } else if data.len() != state.block_size {
                        warn!(block, got = data.len(), expected = state.block_size, "set payload is not one row");
                        Reply::Denied
                    } else {
                        state.blocks[b].copy_from_slice(&data);
                        Reply::Ok
                    }
                })
            }
            Request::Terminate => {
                let _ = shutdown.send(());
                return;
            }
        };

        if net::send_message(&mut stream, &reply).is_err() {
            return;
        }
    }
}

/// Resolve the caller and block id, then run `op` under the state mutex.
/// Requests before `Hello` or against an unknown block are denied.
fn with_block<F>(
    state: &Arc<Mutex<ShmState>>,
    rank: Option<u32>,
    block: u32,
    op: &'static str,
    op_fn: F,
) -> Reply
where
    F: FnOnce(&mut ShmState, u32, usize) -> Reply,
{
    let Some(rank) = rank else {
        warn!(op, block, "request before hello");
        return Reply::Denied;
    };
    let Ok(mut state) = state.lock() else {
        return Reply::Denied;
    };
    let b = block as usize;
    if b >= state.blocks.len() {
        warn!(op, block, rank, "unknown block id");
        return Reply::Denied;
    }
    op_fn(&mut state, rank, b)
}
