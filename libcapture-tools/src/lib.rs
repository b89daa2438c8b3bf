//! Common definitions for the capture block read interface
//!
//! - [`CaptureBlock`]: a unit of queued capture data
//! - [`BlockQueue`]: the queue of capture blocks, as seen by readers, and
//!   [`MemoryQueue`], an in-memory implementation
//! - [`layout`]: the packet block header and footer
//! - [`Config`] and [`Error`]

#[macro_use]
extern crate log;

mod block;
mod config;
mod error;
pub mod layout;
mod memory_queue;
mod queue;

pub use block::*;
pub use config::*;
pub use error::*;
pub use memory_queue::*;
pub use queue::*;
