//! Block stream assembler: the read path
//!
//! Each call emits as many bytes as fit in the destination, resuming where the previous
//! call stopped. Blocks are never split incorrectly: a block in flight is always finished
//! (over as many calls as needed) before filters, snap length or restart requests are
//! looked at again.

use crate::pool::ReadContext;
use crate::restart::{RestartEvent, RestartState};
use crate::session::Session;
use crate::trim::{copy_bounded, Trim};
use tracing::{debug, info, trace};

fn reinitialize(session: &Session, ctx: &mut ReadContext) {
    session.queue.get_initial_blocks(session.reader);
    ctx.state = ctx.state.next(RestartEvent::Reinitialized);
    debug!("reader {}: initial blocks queued", session.reader);
}

pub(crate) fn assemble(session: &Session, ctx: &mut ReadContext, dst: &mut [u8]) -> usize {
    match ctx.state {
        RestartState::AwaitingBoundaryEcho => {
            // zero bytes tell the consumer it is at a block boundary
            ctx.state = ctx.state.next(RestartEvent::BoundaryEchoed);
            info!("reader {}: restart boundary", session.reader);
            return 0;
        }
        RestartState::AwaitingReinit => reinitialize(session, ctx),
        RestartState::Normal => (),
    }

    let mut written = 0;
    while written < dst.len() {
        if ctx.block.is_none() {
            if session.restart.take() {
                ctx.state = ctx.state.next(RestartEvent::Requested {
                    bytes_written: written > 0,
                });
                if ctx.state == RestartState::AwaitingBoundaryEcho {
                    break;
                }
                reinitialize(session, ctx);
                continue;
            }

            let Some(block) = session.queue.dequeue_block(session.reader) else {
                // no more blocks
                break;
            };
            if let Some(kind) = session.filters.matches(&block) {
                debug!(
                    "Filtering packet for process {:08X}, connection {:08X} ({} filter)",
                    block.process_id(),
                    block.connection_id(),
                    kind
                );
                continue;
            }
            ctx.trim = Trim::plan(&block, session.snap.load());
            ctx.offset = 0;
            ctx.block = Some(block);
        }

        let Some(block) = ctx.block.as_ref() else {
            break;
        };
        let out = &mut dst[written..];
        let (n, total) = match &ctx.trim {
            Some(trim) => (trim.emit(block.data(), ctx.offset, out), trim.len()),
            None => (
                copy_bounded(&block.data()[ctx.offset..], out),
                block.len(),
            ),
        };
        trace!(
            "Copying {:08X} bytes from {:08X}/{:08X} to {:08X}/{:08X}",
            n,
            ctx.offset,
            total,
            written,
            dst.len()
        );
        written += n;
        ctx.offset += n;

        if ctx.offset >= total {
            ctx.block = None;
            ctx.trim = None;
            ctx.offset = 0;
        }
    }
    written
}
