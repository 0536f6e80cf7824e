// Restore frame and acknowledgment byte.
//
// A restore is the only variable-size message in the protocol. It is sent as
// a single frame: tag `'R'`, protocol version, the tick counter the state was
// captured at (u64 LE), payload length (u32 LE), then the payload. The
// payload is opaque here; the sim crate owns its encoding.
//
// The receiver answers with exactly one `RESTORE_ACK` byte once the restore
// has been fully applied. Any other byte means the peers no longer agree on
// the stream and is reported as `AckError::Mismatch` for the caller to act on.
//
// `MAX_RESTORE_SIZE` (16 MB) protects against unbounded allocation from a
// corrupt length field.

use std::io::{self, Read, Write};

use crate::error::ProtocolError;
use crate::snapshot::PROTOCOL_VERSION;

/// Maximum allowed restore payload size (16 MB).
pub const MAX_RESTORE_SIZE: u32 = 16 * 1024 * 1024;

/// The acknowledgment byte a peer sends after applying a restore.
pub const RESTORE_ACK: u8 = 0xAC;

/// First byte of a restore frame. Never the first byte of a packet.
pub const RESTORE_TAG: u8 = b'R';

/// A decoded restore frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreFrame {
    pub cycle: u64,
    pub payload: Vec<u8>,
}

/// Write a restore frame and flush.
pub fn write_restore<W: Write>(writer: &mut W, cycle: u64, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_RESTORE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "restore too large: {} bytes (max {MAX_RESTORE_SIZE})",
                    payload.len()
                ),
            )
        })?;
    let mut header = [0u8; 14];
    header[0] = RESTORE_TAG;
    header[1] = PROTOCOL_VERSION;
    header[2..10].copy_from_slice(&cycle.to_le_bytes());
    header[10..14].copy_from_slice(&len.to_le_bytes());
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one restore frame. Blocks until the whole frame has arrived.
pub fn read_restore<R: Read>(reader: &mut R) -> Result<RestoreFrame, ProtocolError> {
    let mut header = [0u8; 14];
    reader.read_exact(&mut header)?;
    if header[0] != RESTORE_TAG {
        return Err(ProtocolError::BadTag(header[0]));
    }
    if header[1] != PROTOCOL_VERSION {
        return Err(ProtocolError::Version(header[1]));
    }
    let mut cycle = [0u8; 8];
    cycle.copy_from_slice(&header[2..10]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&header[10..14]);
    let len = u32::from_le_bytes(len);
    if len > MAX_RESTORE_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(RestoreFrame {
        cycle: u64::from_le_bytes(cycle),
        payload,
    })
}

/// Send the acknowledgment byte.
pub fn write_ack<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&[RESTORE_ACK])?;
    writer.flush()
}

/// Outcome of waiting for an acknowledgment.
#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error("restore ack mismatch: expected {expected:#04x}, got {got:#04x}")]
    Mismatch { expected: u8, got: u8 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Block until exactly one byte arrives and check it is `RESTORE_ACK`.
pub fn read_ack<R: Read>(reader: &mut R) -> Result<(), AckError> {
    let mut ack = [0u8; 1];
    reader.read_exact(&mut ack)?;
    if ack[0] == RESTORE_ACK {
        Ok(())
    } else {
        Err(AckError::Mismatch {
            expected: RESTORE_ACK,
            got: ack[0],
        })
    }
}
