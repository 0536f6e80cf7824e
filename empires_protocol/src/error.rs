// Errors raised while decoding wire data.
//
// Every decoder in this crate validates sizes, magic bytes and versions
// before touching field data, so a corrupt or foreign stream surfaces as a
// `ProtocolError` instead of a garbage snapshot.

use std::io;

use thiserror::Error;

use crate::restore::MAX_RESTORE_SIZE;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated {what}: got {got} bytes, need {need}")]
    Truncated {
        what: &'static str,
        got: usize,
        need: usize,
    },

    #[error("bad magic {0:#06x}")]
    BadMagic(u16),

    #[error("unsupported protocol version {0}")]
    Version(u8),

    #[error("slot count mismatch: got {got}, expected {expected}")]
    SlotCount { got: u8, expected: u8 },

    #[error("unknown color index {0}")]
    UnknownColor(u8),

    #[error("bad frame tag {0:#04x}")]
    BadTag(u8),

    #[error("restore frame too large: {0} bytes (max {MAX_RESTORE_SIZE})")]
    FrameTooLarge(u32),

    #[error(transparent)]
    Io(#[from] io::Error),
}
