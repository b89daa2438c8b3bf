use crate::block::CaptureBlock;
use crate::config::Config;
use crate::error::Error;
use crate::queue::*;
use crossbeam_channel::Sender;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct ReaderQueue {
    backlog: VecDeque<CaptureBlock>,
    /// Initial blocks at the front of the backlog, outside the `max_blocks` bound
    pinned: usize,
    snap_length: u32,
    event: Option<Sender<ReaderId>>,
    dropped: u64,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    readers: BTreeMap<ReaderId, ReaderQueue>,
    initial_blocks: Vec<CaptureBlock>,
    notifiers: HashMap<EventHandle, Sender<ReaderId>>,
    connections: ConnectionTable,
    enqueued_blocks: u64,
    enqueued_bytes: u64,
}

/// In-memory block queue
///
/// Every enqueued block is shared by all registered readers. Each reader has a bounded
/// backlog: when it is full, the oldest block is dropped and counted. Initial blocks
/// queued on registration or restart are never dropped and do not count toward the bound.
///
/// Data-ready notifications are delivered on `crossbeam_channel` senders, registered
/// under an [`EventHandle`] with [`MemoryQueue::register_event`].
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    max_blocks: usize,
    max_readers: usize,
}

impl MemoryQueue {
    pub fn new(config: &Config) -> Self {
        let max_blocks = config.queue_max_blocks();
        let max_readers = config.max_readers();
        debug!(
            "memory queue: max_blocks={} max_readers={}",
            max_blocks, max_readers
        );
        MemoryQueue {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
            max_blocks,
            max_readers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the blocks given to every reader when it registers or restarts
    pub fn set_initial_blocks(&self, blocks: Vec<CaptureBlock>) {
        self.lock().initial_blocks = blocks;
    }

    /// Queue a block for all registered readers
    pub fn enqueue(&self, block: CaptureBlock) {
        let mut inner = self.lock();
        inner.enqueued_blocks += 1;
        inner.enqueued_bytes += block.len() as u64;
        for (id, reader) in inner.readers.iter_mut() {
            if reader.backlog.len() - reader.pinned >= self.max_blocks {
                let pinned = reader.pinned;
                if reader.backlog.remove(pinned).is_some() {
                    reader.dropped += 1;
                    trace!("reader {}: backlog full, dropping oldest block", id);
                }
            }
            reader.backlog.push_back(block.clone());
            if let Some(event) = &reader.event {
                // a full or disconnected channel already means "data pending"
                let _ = event.try_send(*id);
            }
        }
    }

    /// Make `sender` reachable through `handle` for data-ready notifications
    pub fn register_event(&self, handle: EventHandle, sender: Sender<ReaderId>) {
        self.lock().notifiers.insert(handle, sender);
    }

    /// Last table given with [`BlockQueue::set_open_connections`]
    pub fn open_connections(&self) -> ConnectionTable {
        self.lock().connections.clone()
    }

    pub fn num_readers(&self) -> usize {
        self.lock().readers.len()
    }

    /// Number of blocks waiting for `reader`
    pub fn backlog_len(&self, reader: ReaderId) -> usize {
        self.lock()
            .readers
            .get(&reader)
            .map_or(0, |r| r.backlog.len())
    }
}

impl BlockQueue for MemoryQueue {
    fn register_reader(&self) -> Result<ReaderId, Error> {
        let mut inner = self.lock();
        if inner.readers.len() >= self.max_readers {
            warn!("memory queue: too many readers ({})", inner.readers.len());
            return Err(Error::ResourceExhausted("too many readers"));
        }
        let id = ReaderId(inner.next_id);
        inner.next_id = inner.next_id.wrapping_add(1).max(1);
        let backlog: VecDeque<CaptureBlock> = inner.initial_blocks.iter().cloned().collect();
        let pinned = backlog.len();
        inner.readers.insert(
            id,
            ReaderQueue {
                backlog,
                pinned,
                ..ReaderQueue::default()
            },
        );
        debug!("memory queue: registered reader {}", id);
        Ok(id)
    }

    fn deregister_reader(&self, reader: ReaderId) {
        if self.lock().readers.remove(&reader).is_some() {
            debug!("memory queue: deregistered reader {}", reader);
        }
    }

    fn dequeue_block(&self, reader: ReaderId) -> Option<CaptureBlock> {
        let mut inner = self.lock();
        let r = inner.readers.get_mut(&reader)?;
        let block = r.backlog.pop_front()?;
        r.pinned = r.pinned.saturating_sub(1);
        Some(block)
    }

    fn get_initial_blocks(&self, reader: ReaderId) {
        let mut inner = self.lock();
        let Inner {
            readers,
            initial_blocks,
            ..
        } = &mut *inner;
        if let Some(r) = readers.get_mut(&reader) {
            for block in initial_blocks.iter().rev() {
                r.backlog.push_front(block.clone());
            }
            r.pinned += initial_blocks.len();
            debug!(
                "memory queue: reader {}: {} initial blocks queued",
                reader,
                initial_blocks.len()
            );
        }
    }

    fn set_reader_snap_length(&self, reader: ReaderId, snap_length: u32) {
        if let Some(r) = self.lock().readers.get_mut(&reader) {
            r.snap_length = snap_length;
        }
    }

    fn set_data_event(&self, reader: ReaderId, event: Option<EventHandle>) -> Result<(), Error> {
        let mut inner = self.lock();
        let sender = match event {
            Some(handle) => Some(
                inner
                    .notifiers
                    .get(&handle)
                    .cloned()
                    .ok_or(Error::InvalidParameter("unknown event handle"))?,
            ),
            None => None,
        };
        let r = inner
            .readers
            .get_mut(&reader)
            .ok_or(Error::InvalidParameter("unknown reader"))?;
        // signal right away if data is already pending
        if let Some(s) = &sender {
            if !r.backlog.is_empty() {
                let _ = s.try_send(reader);
            }
        }
        r.event = sender;
        Ok(())
    }

    fn set_open_connections(&self, table: ConnectionTable) {
        debug!(
            "memory queue: {} open connections",
            table.connections.len()
        );
        self.lock().connections = table;
    }

    fn statistics(&self, reader: ReaderId) -> Statistics {
        let inner = self.lock();
        // a reader with snap length 0 wants full packets
        let max_snap_length = if inner.readers.values().any(|r| r.snap_length == 0) {
            0
        } else {
            inner
                .readers
                .values()
                .map(|r| r.snap_length)
                .max()
                .unwrap_or(0)
        };
        let (dropped_blocks, queued_blocks) = inner
            .readers
            .get(&reader)
            .map_or((0, 0), |r| (r.dropped, r.backlog.len() as u64));
        Statistics {
            reader_id: reader.0,
            active_readers: inner.readers.len() as u32,
            max_snap_length,
            enqueued_blocks: inner.enqueued_blocks,
            enqueued_bytes: inner.enqueued_bytes,
            dropped_blocks,
            queued_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use std::sync::Arc;

    fn block(tag: u8) -> CaptureBlock {
        CaptureBlock::new(BlockKind::Other, Arc::from(vec![tag; 12]))
    }

    fn small_queue(max_blocks: u32, max_readers: u32) -> MemoryQueue {
        let mut config = Config::default();
        config.set("queue_max_blocks", max_blocks);
        config.set("max_readers", max_readers);
        MemoryQueue::new(&config)
    }

    #[test]
    fn broadcast_to_readers() {
        let q = small_queue(16, 4);
        let r1 = q.register_reader().expect("register");
        let r2 = q.register_reader().expect("register");
        assert_ne!(r1, r2);
        q.enqueue(block(1));
        assert_eq!(q.dequeue_block(r1).map(|b| b.data()[0]), Some(1));
        assert!(q.dequeue_block(r1).is_none());
        assert_eq!(q.dequeue_block(r2).map(|b| b.data()[0]), Some(1));
        q.deregister_reader(r1);
        assert_eq!(q.num_readers(), 1);
        assert!(q.dequeue_block(r1).is_none());
    }

    #[test]
    fn reader_limit() {
        let q = small_queue(16, 1);
        let r1 = q.register_reader().expect("register");
        assert!(matches!(
            q.register_reader(),
            Err(Error::ResourceExhausted(_))
        ));
        q.deregister_reader(r1);
        assert!(q.register_reader().is_ok());
    }

    #[test]
    fn backlog_overflow_drops_oldest() {
        let q = small_queue(2, 4);
        let r = q.register_reader().expect("register");
        for tag in 1..=3 {
            q.enqueue(block(tag));
        }
        let stats = q.statistics(r);
        assert_eq!(stats.dropped_blocks, 1);
        assert_eq!(stats.queued_blocks, 2);
        assert_eq!(stats.enqueued_blocks, 3);
        assert_eq!(stats.enqueued_bytes, 36);
        assert_eq!(q.dequeue_block(r).map(|b| b.data()[0]), Some(2));
    }

    #[test]
    fn initial_blocks_go_first() {
        let q = small_queue(16, 4);
        q.set_initial_blocks(vec![block(0xa), block(0xb)]);
        let r = q.register_reader().expect("register");
        q.enqueue(block(1));
        assert_eq!(q.dequeue_block(r).map(|b| b.data()[0]), Some(0xa));
        q.get_initial_blocks(r);
        let tags: Vec<u8> = std::iter::from_fn(|| q.dequeue_block(r))
            .map(|b| b.data()[0])
            .collect();
        assert_eq!(tags, vec![0xa, 0xb, 0xb, 1]);
    }

    #[test]
    fn initial_blocks_outside_backlog_bound() {
        let q = small_queue(1, 4);
        q.set_initial_blocks(vec![block(0xa), block(0xb)]);
        let r = q.register_reader().expect("register");
        assert_eq!(q.statistics(r).queued_blocks, 2);
        q.enqueue(block(1));
        q.enqueue(block(2));
        let stats = q.statistics(r);
        assert_eq!(stats.queued_blocks, 3);
        assert_eq!(stats.dropped_blocks, 1);
        // a restart requeues the initial set in front, still never dropped
        q.get_initial_blocks(r);
        q.enqueue(block(3));
        let tags: Vec<u8> = std::iter::from_fn(|| q.dequeue_block(r))
            .map(|b| b.data()[0])
            .collect();
        assert_eq!(tags, vec![0xa, 0xb, 0xa, 0xb, 3]);
        assert_eq!(q.statistics(r).dropped_blocks, 2);
    }

    #[test]
    fn data_event_notification() {
        let q = small_queue(16, 4);
        let r = q.register_reader().expect("register");
        let (tx, rx) = crossbeam_channel::bounded(1);
        assert!(q.set_data_event(r, Some(EventHandle(5))).is_err());
        q.register_event(EventHandle(5), tx);
        q.set_data_event(r, Some(EventHandle(5))).expect("arm");
        q.enqueue(block(1));
        assert_eq!(rx.try_recv().ok(), Some(r));
        q.set_data_event(r, None).expect("disarm");
        q.enqueue(block(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn max_snap_length() {
        let q = small_queue(16, 4);
        let r1 = q.register_reader().expect("register");
        let r2 = q.register_reader().expect("register");
        q.set_reader_snap_length(r1, 64);
        assert_eq!(q.statistics(r1).max_snap_length, 0);
        q.set_reader_snap_length(r2, 128);
        let stats = q.statistics(r2);
        assert_eq!(stats.max_snap_length, 128);
        assert_eq!(stats.active_readers, 2);
        assert_eq!(stats.reader_id, r2.0);
    }
}
