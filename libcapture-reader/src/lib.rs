//! Read interface for queued capture blocks
//!
//! A [`ReadInterface`] opens [`Session`]s on a [`BlockQueue`](libcapture_tools::BlockQueue).
//! Each session streams the queued blocks as a pcapng byte stream, through reads of any
//! size, applying its own policy:
//!
//! - truncation of packet blocks to a snap length (headers, padding and footers are
//!   rewritten on the fly, the queued block is never modified)
//! - exclusion of packet blocks by process or connection identifier
//! - restart: the queue's initial blocks (section header, interfaces) are streamed again,
//!   after a zero-length read if needed to mark the boundary
//!
//! Sessions are configured through [`ControlRequest`]s, or directly through their methods.

mod assembler;
mod control;
mod filter;
mod interface;
mod pool;
mod restart;
mod session;
mod trim;

pub use control::*;
pub use filter::{FilterKind, FilterList};
pub use interface::*;
pub use pool::SessionPool;
pub use restart::{RestartEvent, RestartState};
pub use session::Session;
pub use trim::SnapPolicy;
