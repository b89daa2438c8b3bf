//! Packet block layout
//!
//! Packet blocks are little-endian pcapng Enhanced Packet Blocks with a fixed set of options:
//!
//! ```text
//!  0                   28                          total - 24              total
//!  +-------------------+---------------------------+-----------------------+
//!  | header            | data + padding (align 4)  | footer                |
//!  +-------------------+---------------------------+-----------------------+
//! ```
//!
//! The header holds the block type, block length, interface id, timestamp, captured and
//! original lengths. The footer holds the connection id option, the process id option,
//! the end of options marker and the trailing copy of the block length.

use pcap_parser::EPB_MAGIC;

/// Size of the fixed packet block header
pub const PACKET_HEADER_SIZE: usize = 28;
/// Size of the fixed packet block footer (options and trailing block length)
pub const PACKET_FOOTER_SIZE: usize = 24;
/// Blocks are padded to a multiple of this value
pub const BLOCK_ALIGNMENT: u32 = 4;
/// Smallest valid pcapng block: type, length and trailing length
pub const MIN_BLOCK_SIZE: usize = 12;

/// Option code carrying the connection identifier
pub const OPT_CONNECTION_ID: u16 = 257;
/// Option code carrying the process identifier
pub const OPT_PROCESS_ID: u16 = 258;
const OPT_ENDOFOPT: u16 = 0;

/// Number of zero bytes needed to round `len` up to the block alignment
#[inline]
pub const fn padding_for(len: u32) -> u32 {
    (BLOCK_ALIGNMENT - len % BLOCK_ALIGNMENT) % BLOCK_ALIGNMENT
}

/// Total length of a packet block holding `captured_length` bytes of data
#[inline]
pub const fn packet_block_length(captured_length: u32) -> u32 {
    PACKET_HEADER_SIZE as u32
        + captured_length
        + padding_for(captured_length)
        + PACKET_FOOTER_SIZE as u32
}

#[inline]
fn read_u16(i: &[u8], offset: usize) -> Option<u16> {
    let b = i.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

#[inline]
fn read_u32(i: &[u8], offset: usize) -> Option<u32> {
    let b = i.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Read the block type and leading block length of any pcapng block
pub fn block_type_and_length(i: &[u8]) -> Option<(u32, u32)> {
    Some((read_u32(i, 0)?, read_u32(i, 4)?))
}

/// Packet block header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub block_type: u32,
    pub block_length: u32,
    pub interface_id: u32,
    pub timestamp_high: u32,
    pub timestamp_low: u32,
    /// Captured packet length
    pub captured_length: u32,
    /// Original packet length
    pub original_length: u32,
}

impl PacketHeader {
    /// Decode the header from the first bytes of a packet block
    pub fn parse(i: &[u8]) -> Option<PacketHeader> {
        let header = PacketHeader {
            block_type: read_u32(i, 0)?,
            block_length: read_u32(i, 4)?,
            interface_id: read_u32(i, 8)?,
            timestamp_high: read_u32(i, 12)?,
            timestamp_low: read_u32(i, 16)?,
            captured_length: read_u32(i, 20)?,
            original_length: read_u32(i, 24)?,
        };
        if header.block_type != EPB_MAGIC {
            return None;
        }
        Some(header)
    }

    pub fn to_bytes(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut v = [0u8; PACKET_HEADER_SIZE];
        let fields = [
            self.block_type,
            self.block_length,
            self.interface_id,
            self.timestamp_high,
            self.timestamp_low,
            self.captured_length,
            self.original_length,
        ];
        for (chunk, field) in v.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        v
    }
}

/// Packet block footer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketFooter {
    pub connection_id: u32,
    pub process_id: u32,
    /// Trailing copy of the block length
    pub block_length: u32,
}

impl PacketFooter {
    /// Decode the footer from the last `PACKET_FOOTER_SIZE` bytes of `i`
    ///
    /// Returns `None` if the options do not follow the fixed layout.
    pub fn parse(i: &[u8]) -> Option<PacketFooter> {
        let start = i.len().checked_sub(PACKET_FOOTER_SIZE)?;
        let f = &i[start..];
        let well_formed = read_u16(f, 0)? == OPT_CONNECTION_ID
            && read_u16(f, 2)? == 4
            && read_u16(f, 8)? == OPT_PROCESS_ID
            && read_u16(f, 10)? == 4
            && read_u16(f, 16)? == OPT_ENDOFOPT
            && read_u16(f, 18)? == 0;
        if !well_formed {
            return None;
        }
        Some(PacketFooter {
            connection_id: read_u32(f, 4)?,
            process_id: read_u32(f, 12)?,
            block_length: read_u32(f, 20)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; PACKET_FOOTER_SIZE] {
        let mut v = [0u8; PACKET_FOOTER_SIZE];
        v[0..2].copy_from_slice(&OPT_CONNECTION_ID.to_le_bytes());
        v[2..4].copy_from_slice(&4u16.to_le_bytes());
        v[4..8].copy_from_slice(&self.connection_id.to_le_bytes());
        v[8..10].copy_from_slice(&OPT_PROCESS_ID.to_le_bytes());
        v[10..12].copy_from_slice(&4u16.to_le_bytes());
        v[12..16].copy_from_slice(&self.process_id.to_le_bytes());
        // end of options: code and length are both zero
        v[20..24].copy_from_slice(&self.block_length.to_le_bytes());
        v
    }
}

/// Build a complete packet block, as the capture engine lays it out
pub fn build_packet_block(
    interface_id: u32,
    timestamp: u64,
    data: &[u8],
    process_id: u32,
    connection_id: u32,
) -> Vec<u8> {
    let captured_length = data.len() as u32;
    let block_length = packet_block_length(captured_length);
    let header = PacketHeader {
        block_type: EPB_MAGIC,
        block_length,
        interface_id,
        timestamp_high: (timestamp >> 32) as u32,
        timestamp_low: (timestamp & 0xffff_ffff) as u32,
        captured_length,
        original_length: captured_length,
    };
    let footer = PacketFooter {
        connection_id,
        process_id,
        block_length,
    };
    let mut v = Vec::with_capacity(block_length as usize);
    v.extend_from_slice(&header.to_bytes());
    v.extend_from_slice(data);
    v.resize(v.len() + padding_for(captured_length) as usize, 0);
    v.extend_from_slice(&footer.to_bytes());
    v
}
