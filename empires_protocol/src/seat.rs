// Seat record sent by the relay right after it accepts a connection.
//
// Four bytes: magic `'S'`, protocol version, color index, slot count. A
// client that reads EOF instead of a seat was turned away because every slot
// was taken.

use crate::error::ProtocolError;
use crate::snapshot::PROTOCOL_VERSION;
use crate::types::{COLOR_COUNT, Color};

pub const SEAT_SIZE: usize = 4;

const SEAT_MAGIC: u8 = b'S';

/// The slot a client was bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seat {
    pub color: Color,
}

impl Seat {
    pub fn encode(&self) -> [u8; SEAT_SIZE] {
        [
            SEAT_MAGIC,
            PROTOCOL_VERSION,
            self.color.index() as u8,
            COLOR_COUNT as u8,
        ]
    }

    pub fn decode(bytes: &[u8; SEAT_SIZE]) -> Result<Self, ProtocolError> {
        let [magic, version, index, slots] = *bytes;
        if magic != SEAT_MAGIC {
            return Err(ProtocolError::BadMagic(u16::from(magic)));
        }
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::Version(version));
        }
        if usize::from(slots) != COLOR_COUNT {
            return Err(ProtocolError::SlotCount {
                got: slots,
                expected: COLOR_COUNT as u8,
            });
        }
        let color = Color::from_index(usize::from(index)).ok_or(ProtocolError::UnknownColor(index))?;
        Ok(Self { color })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_decodes_every_color() {
        for color in Color::ALL {
            let seat = Seat { color };
            assert_eq!(Seat::decode(&seat.encode()).unwrap(), seat);
        }
    }

    #[test]
    fn seat_rejects_out_of_range_color() {
        let mut bytes = Seat { color: Color::Blue }.encode();
        bytes[2] = COLOR_COUNT as u8;
        assert!(matches!(
            Seat::decode(&bytes),
            Err(ProtocolError::UnknownColor(8))
        ));
    }
}
