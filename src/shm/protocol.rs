use serde::{Deserialize, Serialize};

pub type BlockId = u32;

/// One request to the shared-memory coordinator. Every data operation names
/// a block; `Set` additionally carries exactly one row of cell bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Sent once per connection before any other request, so the lock table
    /// can record holders by worker rank (the channel itself identifies the
    /// caller; the rank is for bookkeeping and logs).
    Hello { rank: u32 },
    Lock { block: BlockId },
    Unlock { block: BlockId },
    Get { block: BlockId },
    Set { block: BlockId, data: Vec<u8> },
    /// Shuts the coordinator down. No reply is sent.
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Ok,
    Data(Vec<u8>),
    /// The operation was refused: the block is held by someone else, the
    /// caller does not hold it, the block id is unknown, or a `Set` payload
    /// is not exactly one block wide. Lock contention is the only variant a
    /// caller retries.
    Denied,
}
