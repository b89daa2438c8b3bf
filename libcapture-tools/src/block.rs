use crate::layout::{block_type_and_length, PacketFooter, PacketHeader, MIN_BLOCK_SIZE};
use pcap_parser::{EPB_MAGIC, IDB_MAGIC, SHB_MAGIC};
use std::fmt;
use std::sync::Arc;

/// Type tag of a capture block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    SectionHeader,
    InterfaceDescription,
    /// Packet block, with the fixed header/footer layout from [`crate::layout`]
    Packet,
    /// Any other block, streamed as an opaque byte range
    Other,
}

/// A unit of queued capture data
///
/// The payload is owned by the queue and shared between readers. Dropping a block
/// releases the reader's reference to it.
#[derive(Clone)]
pub struct CaptureBlock {
    kind: BlockKind,
    data: Arc<[u8]>,
    process_id: u32,
    connection_id: u32,
}

impl CaptureBlock {
    /// Build a non-packet block
    pub fn new(kind: BlockKind, data: Arc<[u8]>) -> Self {
        CaptureBlock {
            kind,
            data,
            process_id: 0,
            connection_id: 0,
        }
    }

    /// Build a packet block owned by `process_id`, on connection `connection_id`
    pub fn packet(data: Arc<[u8]>, process_id: u32, connection_id: u32) -> Self {
        CaptureBlock {
            kind: BlockKind::Packet,
            data,
            process_id,
            connection_id,
        }
    }

    /// Tag raw block bytes using the pcapng block type
    ///
    /// Enhanced packet blocks are tagged as packets only if they follow the fixed
    /// packet layout; identities are then read from the footer options. Data whose
    /// leading length does not match its size is always opaque.
    pub fn from_bytes<D: Into<Arc<[u8]>>>(data: D) -> Self {
        let data = data.into();
        let block_type = block_type_and_length(&data)
            .filter(|&(_, len)| data.len() >= MIN_BLOCK_SIZE && len as usize == data.len())
            .map(|(t, _)| t);
        match block_type {
            Some(SHB_MAGIC) => CaptureBlock::new(BlockKind::SectionHeader, data),
            Some(IDB_MAGIC) => CaptureBlock::new(BlockKind::InterfaceDescription, data),
            Some(EPB_MAGIC) => {
                let footer = PacketHeader::parse(&data).and(PacketFooter::parse(&data));
                match footer {
                    Some(f) => CaptureBlock::packet(data, f.process_id, f.connection_id),
                    None => CaptureBlock::new(BlockKind::Other, data),
                }
            }
            _ => CaptureBlock::new(BlockKind::Other, data),
        }
    }

    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[inline]
    pub fn is_packet(&self) -> bool {
        self.kind == BlockKind::Packet
    }

    /// Raw block bytes
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Declared block length (the length of the raw bytes)
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Owning process identity (packet blocks only)
    #[inline]
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Connection identity (packet blocks only)
    #[inline]
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }
}

impl fmt::Debug for CaptureBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBlock")
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .field("process_id", &self.process_id)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}
