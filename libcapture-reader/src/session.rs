use crate::assembler;
use crate::filter::{FilterKind, FilterList, Filters};
use crate::pool::{ReadContext, SessionPool};
use crate::restart::{RestartSignal, RestartState};
use crate::trim::{SnapLength, SnapPolicy};
use libcapture_tools::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// State of one open instance of the read interface
///
/// A `Session` is `Sync`: control functions may be called from other threads while a read
/// is in flight. At most one read may be in flight at a time; concurrent reads on the same
/// session are serialized.
///
/// Closing the session (dropping it) deregisters the reader and releases the block in
/// flight and the filter lists.
pub struct Session {
    pub(crate) reader: ReaderId,
    pub(crate) queue: Arc<dyn BlockQueue>,
    pool: Arc<SessionPool>,
    pub(crate) snap: SnapLength,
    pub(crate) filters: Filters,
    pub(crate) restart: RestartSignal,
    context: Mutex<Option<Box<ReadContext>>>,
    max_filter_ids: usize,
}

impl Session {
    /// Open a session: take a context from the pool and register with the queue
    ///
    /// If registration fails, the context goes back to the pool and the error is returned.
    pub(crate) fn open(
        queue: Arc<dyn BlockQueue>,
        pool: Arc<SessionPool>,
        config: &Config,
    ) -> Result<Session, Error> {
        let ctx = pool.acquire()?;
        let reader = match queue.register_reader() {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Open reader failed: {}", e);
                pool.release(ctx);
                return Err(e);
            }
        };
        let snap_length = config.snap_length();
        if snap_length != 0 {
            queue.set_reader_snap_length(reader, snap_length);
        }
        debug!("reader {}: open (snap length {})", reader, snap_length);
        Ok(Session {
            reader,
            queue,
            pool,
            snap: SnapLength::new(snap_length),
            filters: Filters::default(),
            restart: RestartSignal::default(),
            context: Mutex::new(Some(ctx)),
            max_filter_ids: config.max_filter_ids(),
        })
    }

    fn lock_context(&self) -> MutexGuard<'_, Option<Box<ReadContext>>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn reader_id(&self) -> ReaderId {
        self.reader
    }

    /// Fill `buf` with the next bytes of the stream, returning the number of bytes written
    ///
    /// Zero is a valid result: no block is available right now, or a restart boundary
    /// is being signaled.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut guard = self.lock_context();
        match guard.as_deref_mut() {
            Some(ctx) => assembler::assemble(self, ctx, buf),
            None => 0,
        }
    }

    /// Current restart state
    pub fn restart_state(&self) -> RestartState {
        self.lock_context()
            .as_ref()
            .map(|ctx| ctx.state)
            .unwrap_or_default()
    }

    /// Whether a restart was requested and not yet taken by a read
    pub fn restart_pending(&self) -> bool {
        self.restart.is_pending()
    }

    /// Request a restart at the next block boundary
    pub fn mark_restart(&self) {
        self.restart.request();
        info!("Restarting reader {}", self.reader);
    }

    /// Replace a filter list (`None` or an empty list disables filtering)
    ///
    /// The previous list is returned; it stays valid for a read that already loaded it.
    pub fn set_filter(&self, kind: FilterKind, list: Option<FilterList>) -> Option<Arc<FilterList>> {
        match &list {
            Some(l) => info!("Filtering {} {}(s) for reader {}", l.len(), kind, self.reader),
            None => info!("Filtering 0 {}(s) for reader {}", kind, self.reader),
        }
        self.filters.set(kind, list)
    }

    /// Replace a filter list from encoded identifiers, enforcing the configured size cap
    pub fn set_filter_bytes(&self, kind: FilterKind, i: &[u8]) -> Result<(), Error> {
        let list = FilterList::parse(i, self.max_filter_ids).map_err(|e| {
            warn!(
                "reader {}: rejecting {} filter of {} bytes",
                self.reader,
                kind,
                i.len()
            );
            e
        })?;
        self.set_filter(kind, list);
        Ok(())
    }

    pub fn filter(&self, kind: FilterKind) -> Option<Arc<FilterList>> {
        self.filters.get(kind)
    }

    /// Set the snap length (0 disables truncation). Applies from the next block.
    pub fn set_snap_length(&self, snap_length: u32) {
        if self.snap.store(snap_length) {
            self.queue.set_reader_snap_length(self.reader, snap_length);
        }
        debug!(
            "Set snap length to {:08X} ({}) for reader {}",
            snap_length, snap_length, self.reader
        );
    }

    pub fn snap_length(&self) -> u32 {
        self.snap.load().length
    }

    /// Snap length and the padding applied after truncated data
    pub fn snap_policy(&self) -> SnapPolicy {
        self.snap.load()
    }

    /// Arm (`Some`) or disarm (`None`) the data-ready notification
    pub fn set_data_event(&self, event: Option<EventHandle>) -> Result<(), Error> {
        self.queue.set_data_event(self.reader, event)?;
        debug!(
            "{} data notification for reader {}",
            if event.is_some() { "Enabling" } else { "Disabling" },
            self.reader
        );
        Ok(())
    }

    pub fn set_open_connections(&self, table: ConnectionTable) {
        self.queue.set_open_connections(table);
    }

    pub fn statistics(&self) -> Statistics {
        self.queue.statistics(self.reader)
    }

    /// Close the session. Equivalent to dropping it.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.queue.deregister_reader(self.reader);
        let ctx = self
            .context
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut ctx) = ctx {
            if let Some(block) = ctx.block.take() {
                debug!(
                    "reader {}: releasing block in flight ({} of {} bytes sent)",
                    self.reader,
                    ctx.offset,
                    block.len()
                );
            }
            self.pool.release(ctx);
        }
        self.filters.set(FilterKind::Process, None);
        self.filters.set(FilterKind::Connection, None);
        debug!("reader {}: closed", self.reader);
    }
}
