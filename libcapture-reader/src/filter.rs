use libcapture_tools::{CaptureBlock, Error};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Identity used to exclude packet blocks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Process,
    Connection,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Process => f.write_str("process"),
            FilterKind::Connection => f.write_str("connection"),
        }
    }
}

/// Immutable list of identifiers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterList {
    ids: Box<[u32]>,
}

impl FilterList {
    pub fn new<I: IntoIterator<Item = u32>>(ids: I) -> Self {
        FilterList {
            ids: ids.into_iter().collect(),
        }
    }

    /// Decode a list of little-endian `u32` identifiers
    ///
    /// Trailing bytes not forming a whole identifier are ignored. An empty input
    /// gives `None` (no filtering). More than `max_ids` identifiers is an error.
    pub fn parse(i: &[u8], max_ids: usize) -> Result<Option<FilterList>, Error> {
        let count = i.len() / 4;
        if count == 0 {
            return Ok(None);
        }
        if count > max_ids {
            return Err(Error::InvalidParameter("too many identifiers in filter list"));
        }
        let list = FilterList::new(
            i.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        Ok(Some(list))
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.ids.iter().any(|&x| x == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }
}

/// Published filter list
///
/// The lock is only held to clone or swap the `Arc`: a reader keeps the list it loaded
/// alive until it is done, even if a new list is published meanwhile.
#[derive(Debug, Default)]
pub(crate) struct FilterSlot {
    current: RwLock<Option<Arc<FilterList>>>,
}

impl FilterSlot {
    pub(crate) fn load(&self) -> Option<Arc<FilterList>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish `list`, returning the previous one
    pub(crate) fn publish(&self, list: Option<FilterList>) -> Option<Arc<FilterList>> {
        let list = list.filter(|l| !l.is_empty()).map(Arc::new);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, list)
    }
}

/// Process and connection filter lists of a session
#[derive(Debug, Default)]
pub(crate) struct Filters {
    process: FilterSlot,
    connection: FilterSlot,
}

impl Filters {
    fn slot(&self, kind: FilterKind) -> &FilterSlot {
        match kind {
            FilterKind::Process => &self.process,
            FilterKind::Connection => &self.connection,
        }
    }

    pub(crate) fn get(&self, kind: FilterKind) -> Option<Arc<FilterList>> {
        self.slot(kind).load()
    }

    pub(crate) fn set(&self, kind: FilterKind, list: Option<FilterList>) -> Option<Arc<FilterList>> {
        self.slot(kind).publish(list)
    }

    /// Check whether `block` must be excluded, and by which list
    ///
    /// Only packet blocks are filtered. The process list is checked first.
    pub(crate) fn matches(&self, block: &CaptureBlock) -> Option<FilterKind> {
        if !block.is_packet() {
            return None;
        }
        let checks = [
            (FilterKind::Process, block.process_id()),
            (FilterKind::Connection, block.connection_id()),
        ];
        for (kind, id) in checks {
            if let Some(list) = self.get(kind) {
                trace!("checking {} id {} against {} filters", kind, id, list.len());
                if list.contains(id) {
                    return Some(kind);
                }
            }
        }
        None
    }
}
