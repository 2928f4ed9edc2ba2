use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use thiserror::Error;

/// Upper bound on a single frame; a frame is at most one full sector of
/// cells plus a small header, so anything past this is a corrupt stream.
pub const MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("message channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("message encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the frame limit")]
    Oversize(u32),
}

/// Write one length-prefixed bincode frame.
pub fn send_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), WireError> {
    let bytes = bincode::serialize(message)?;
    let len = bytes.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed bincode frame, blocking until it arrives.
pub fn recv_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, WireError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(WireError::Oversize(len));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}
