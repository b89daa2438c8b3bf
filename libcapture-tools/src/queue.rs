use crate::block::CaptureBlock;
use crate::error::Error;
use serde::Serialize;
use std::fmt;

/// Identity of a reader registered with a block queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReaderId(pub u32);

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle of a data-ready notification target, as given by the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventHandle(pub u64);

/// An open connection, as known by the capture engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OpenConnection {
    pub connection_id: u32,
    pub process_id: u32,
}

/// Table of the connections open on the host
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionTable {
    pub connections: Vec<OpenConnection>,
}

impl ConnectionTable {
    /// Minimal size of an encoded table (the entry count)
    pub const MIN_SIZE: usize = 4;
    const ENTRY_SIZE: usize = 8;

    /// Decode a count-prefixed table: `u32` count, then `count` pairs of
    /// `(connection id, process id)`, all little-endian
    pub fn parse(i: &[u8]) -> Result<ConnectionTable, Error> {
        if i.len() < Self::MIN_SIZE {
            return Err(Error::buffer_too_small(Self::MIN_SIZE, i.len()));
        }
        let count = u32::from_le_bytes([i[0], i[1], i[2], i[3]]) as usize;
        let required = count
            .checked_mul(Self::ENTRY_SIZE)
            .and_then(|n| n.checked_add(Self::MIN_SIZE))
            .ok_or(Error::InvalidParameter("connection table count overflows"))?;
        if i.len() < required {
            return Err(Error::buffer_too_small(required, i.len()));
        }
        let connections = i[Self::MIN_SIZE..required]
            .chunks_exact(Self::ENTRY_SIZE)
            .map(|c| OpenConnection {
                connection_id: u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                process_id: u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
            })
            .collect();
        Ok(ConnectionTable { connections })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(Self::MIN_SIZE + self.connections.len() * Self::ENTRY_SIZE);
        v.extend_from_slice(&(self.connections.len() as u32).to_le_bytes());
        for c in &self.connections {
            v.extend_from_slice(&c.connection_id.to_le_bytes());
            v.extend_from_slice(&c.process_id.to_le_bytes());
        }
        v
    }
}

/// Statistics record returned to a reader
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub reader_id: u32,
    /// Number of registered readers
    pub active_readers: u32,
    /// Largest snap length requested by a reader (0: at least one reader wants full packets)
    pub max_snap_length: u32,
    pub enqueued_blocks: u64,
    pub enqueued_bytes: u64,
    /// Blocks dropped for this reader because its backlog was full
    pub dropped_blocks: u64,
    /// Blocks currently waiting for this reader
    pub queued_blocks: u64,
}

impl Statistics {
    /// Size of the encoded record
    pub const SIZE: usize = 48;

    /// Encode the record into the first `Statistics::SIZE` bytes of `out`
    pub fn write_to(&self, out: &mut [u8]) -> Result<usize, Error> {
        let len = out.len();
        let out = out
            .get_mut(..Self::SIZE)
            .ok_or(Error::buffer_too_small(Self::SIZE, len))?;
        out[0..4].copy_from_slice(&self.reader_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.active_readers.to_le_bytes());
        out[8..12].copy_from_slice(&self.max_snap_length.to_le_bytes());
        out[12..16].fill(0);
        out[16..24].copy_from_slice(&self.enqueued_blocks.to_le_bytes());
        out[24..32].copy_from_slice(&self.enqueued_bytes.to_le_bytes());
        out[32..40].copy_from_slice(&self.dropped_blocks.to_le_bytes());
        out[40..48].copy_from_slice(&self.queued_blocks.to_le_bytes());
        Ok(Self::SIZE)
    }

    /// Decode a record written by [`Statistics::write_to`]
    pub fn parse(i: &[u8]) -> Option<Statistics> {
        let i = i.get(..Self::SIZE)?;
        let u32_at = |o: usize| u32::from_le_bytes([i[o], i[o + 1], i[o + 2], i[o + 3]]);
        let u64_at = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&i[o..o + 8]);
            u64::from_le_bytes(b)
        };
        Some(Statistics {
            reader_id: u32_at(0),
            active_readers: u32_at(4),
            max_snap_length: u32_at(8),
            enqueued_blocks: u64_at(16),
            enqueued_bytes: u64_at(24),
            dropped_blocks: u64_at(32),
            queued_blocks: u64_at(40),
        })
    }
}

/// The queue of capture blocks, as seen by readers
///
/// The queue produces, owns and reclaims capture blocks. All functions are non-blocking
/// and may be called from any thread.
pub trait BlockQueue: Send + Sync {
    /// Register a new reader. The reader starts with the initial block set queued.
    fn register_reader(&self) -> Result<ReaderId, Error>;

    /// Remove a reader, dropping its backlog
    fn deregister_reader(&self, reader: ReaderId);

    /// Take the next block for this reader, if any
    fn dequeue_block(&self, reader: ReaderId) -> Option<CaptureBlock>;

    /// Queue the initial block set (section header, interface descriptions, ...) in front
    /// of the reader's backlog
    fn get_initial_blocks(&self, reader: ReaderId);

    /// Record the snap length used by a reader (0: disabled)
    fn set_reader_snap_length(&self, _reader: ReaderId, _snap_length: u32) {}

    /// Arm (`Some`) or disarm (`None`) the data-ready notification of a reader
    fn set_data_event(&self, reader: ReaderId, event: Option<EventHandle>) -> Result<(), Error>;

    /// Replace the table of open connections
    fn set_open_connections(&self, table: ConnectionTable);

    fn statistics(&self, reader: ReaderId) -> Statistics;
}
