//! Packet header layout.

use std::io::Cursor;

use ackwire_core::{
    constants::PACKET_HEADER_SIZE,
    error::{ErrorKind, Result},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::cyclic::AckId;

/// Fixed header at the start of every datagram.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Connection index of the sender, or `INVALID_CONNECTION_INDEX` before it has one.
    pub from_index: u8,
    /// Ack id of this packet.
    pub packet_ack: AckId,
    /// Highest ack id the sender has received from us.
    pub most_recent_ack: AckId,
    /// Bit `i` set means `most_recent_ack - i - 1` was received as well.
    pub ack_bitfield: u16,
    /// Number of messages following the header.
    pub message_count: u8,
}

impl PacketHeader {
    /// Creates a header with no acknowledgment information.
    pub fn new(from_index: u8, packet_ack: AckId) -> Self {
        Self {
            from_index,
            packet_ack,
            most_recent_ack: AckId::INVALID,
            ack_bitfield: 0,
            message_count: 0,
        }
    }

    /// Writes the header into the first `PACKET_HEADER_SIZE` bytes of `buffer`.
    pub fn write_to(&self, buffer: &mut [u8]) {
        debug_assert!(buffer.len() >= PACKET_HEADER_SIZE);
        buffer[0] = self.from_index;
        buffer[1..3].copy_from_slice(&self.packet_ack.raw().to_le_bytes());
        buffer[3..5].copy_from_slice(&self.most_recent_ack.raw().to_le_bytes());
        buffer[5..7].copy_from_slice(&self.ack_bitfield.to_le_bytes());
        buffer[7] = self.message_count;
    }

    /// Appends the header to `buffer`.
    pub fn append_to(&self, buffer: &mut Vec<u8>) {
        // Writing into a Vec cannot fail.
        let _ = buffer.write_u8(self.from_index);
        let _ = buffer.write_u16::<LittleEndian>(self.packet_ack.raw());
        let _ = buffer.write_u16::<LittleEndian>(self.most_recent_ack.raw());
        let _ = buffer.write_u16::<LittleEndian>(self.ack_bitfield);
        let _ = buffer.write_u8(self.message_count);
    }

    /// Parses the header at the start of a datagram.
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(ErrorKind::ReceivedDataToShort);
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            from_index: cursor.read_u8()?,
            packet_ack: AckId::new(cursor.read_u16::<LittleEndian>()?),
            most_recent_ack: AckId::new(cursor.read_u16::<LittleEndian>()?),
            ack_bitfield: cursor.read_u16::<LittleEndian>()?,
            message_count: cursor.read_u8()?,
        })
    }

    /// Acks reported by this header: `most_recent_ack` followed by every ack flagged in the
    /// bitfield, newest first.
    pub fn reported_acks(&self) -> impl Iterator<Item = AckId> {
        let most_recent = self.most_recent_ack;
        let bitfield = if most_recent.is_valid() { self.ack_bitfield } else { 0 };
        let history = (0..16i32)
            .filter(move |bit| bitfield & (1u16 << bit) != 0)
            .map(move |bit| most_recent.offset(-(bit + 1)));
        most_recent.is_valid().then_some(most_recent).into_iter().chain(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_little_endian() {
        let header = PacketHeader {
            from_index: 3,
            packet_ack: AckId::new(0x0102),
            most_recent_ack: AckId::new(0x0304),
            ack_bitfield: 0x0506,
            message_count: 7,
        };
        let mut buffer = Vec::new();
        header.append_to(&mut buffer);
        assert_eq!(buffer, vec![3, 0x02, 0x01, 0x04, 0x03, 0x06, 0x05, 7]);

        let mut fixed = [0u8; PACKET_HEADER_SIZE];
        header.write_to(&mut fixed);
        assert_eq!(&fixed[..], &buffer[..]);
        assert_eq!(PacketHeader::read(&buffer).unwrap(), header);
    }

    #[test]
    fn test_short_data_is_rejected() {
        assert!(matches!(PacketHeader::read(&[0; 7]), Err(ErrorKind::ReceivedDataToShort)));
    }

    #[test]
    fn test_reported_acks_walk_the_bitfield() {
        let mut header = PacketHeader::new(0, AckId::new(9));
        header.most_recent_ack = AckId::new(2);
        header.ack_bitfield = 0b101;
        let acks: Vec<u16> = header.reported_acks().map(|ack| ack.raw()).collect();
        // 2 - 1 = 1, 2 - 3 wraps past the sentinel to 65534
        assert_eq!(acks, vec![2, 1, 65534]);
    }

    #[test]
    fn test_nothing_reported_before_first_receive() {
        let mut header = PacketHeader::new(0, AckId::new(1));
        header.ack_bitfield = 0xFFFF;
        assert_eq!(header.reported_acks().count(), 0);
    }
}
