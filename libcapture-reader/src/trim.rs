//! Snap length policy and packet block trimming
//!
//! A trimmed packet block is never written back: the rewritten header and footer are kept
//! in the session, and the block is emitted as four zones
//!
//! ```text
//! [0, header_end)            rewritten header
//! [header_end, data_end)     first `snap_length` bytes of the original data
//! [data_end, padded_end)     zero padding, synthesized
//! [padded_end, total)        rewritten footer (footer_start == padded_end)
//! ```

use libcapture_tools::layout::*;
use libcapture_tools::CaptureBlock;
use std::cmp::min;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

/// Snap length and the padding needed to align the truncated data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapPolicy {
    /// Maximum captured length, 0 to disable truncation
    pub length: u32,
    pub padding: u32,
}

impl SnapPolicy {
    pub fn new(length: u32) -> Self {
        SnapPolicy {
            length,
            padding: padding_for(length),
        }
    }

    fn pack(self) -> u64 {
        u64::from(self.length) | (u64::from(self.padding) << 32)
    }

    fn unpack(v: u64) -> Self {
        SnapPolicy {
            length: v as u32,
            padding: (v >> 32) as u32,
        }
    }
}

/// Snap length of a session, updated and read as a single word
#[derive(Debug, Default)]
pub(crate) struct SnapLength {
    value: AtomicU64,
}

impl SnapLength {
    pub(crate) fn new(length: u32) -> Self {
        SnapLength {
            value: AtomicU64::new(SnapPolicy::new(length).pack()),
        }
    }

    pub(crate) fn load(&self) -> SnapPolicy {
        SnapPolicy::unpack(self.value.load(Ordering::Acquire))
    }

    /// Set the snap length. Returns `true` if the value changed.
    pub(crate) fn store(&self, length: u32) -> bool {
        let new = SnapPolicy::new(length).pack();
        self.value.swap(new, Ordering::AcqRel) != new
    }
}

/// Copy as many bytes of `src` as fit in `dst`
#[inline]
pub(crate) fn copy_bounded(src: &[u8], dst: &mut [u8]) -> usize {
    let n = min(src.len(), dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

/// Rewritten view of a packet block truncated to the snap length
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Trim {
    header: [u8; PACKET_HEADER_SIZE],
    footer: [u8; PACKET_FOOTER_SIZE],
    data_end: usize,
    padded_end: usize,
    total: usize,
}

impl Trim {
    /// Decide whether `block` must be trimmed under `policy`
    ///
    /// Returns `None` if the block must be streamed unmodified: not a packet, snap length
    /// disabled, captured length within the snap length, or a header/footer that does not
    /// decode consistently.
    pub(crate) fn plan(block: &CaptureBlock, policy: SnapPolicy) -> Option<Trim> {
        if !block.is_packet() || policy.length == 0 {
            return None;
        }
        let data = block.data();
        let Some(mut header) = PacketHeader::parse(data) else {
            warn!("packet block with invalid header ({} bytes), not trimming", data.len());
            return None;
        };
        if header.captured_length <= policy.length {
            return None;
        }
        let Some(mut footer) = PacketFooter::parse(data) else {
            warn!("packet block with invalid footer ({} bytes), not trimming", data.len());
            return None;
        };
        let original_footer = data.len() - PACKET_FOOTER_SIZE;
        let data_end = PACKET_HEADER_SIZE + policy.length as usize;
        if header.block_length as usize != data.len()
            || footer.block_length != header.block_length
            || data_end > original_footer
        {
            warn!(
                "inconsistent packet block lengths (header {}, footer {}, actual {}), not trimming",
                header.block_length,
                footer.block_length,
                data.len()
            );
            return None;
        }
        let padded_end = data_end + policy.padding as usize;
        let total = padded_end + PACKET_FOOTER_SIZE;
        header.captured_length = policy.length;
        header.block_length = total as u32;
        footer.block_length = total as u32;
        trace!(
            "trimming packet block from {} to {} bytes (caplen {})",
            data.len(),
            total,
            policy.length
        );
        Some(Trim {
            header: header.to_bytes(),
            footer: footer.to_bytes(),
            data_end,
            padded_end,
            total,
        })
    }

    /// Length of the rewritten block
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.total
    }

    /// Emit the rewritten block from `offset`, reading packet data from `data` (the
    /// original block). Returns the number of bytes written to `dst`.
    pub(crate) fn emit(&self, data: &[u8], mut offset: usize, dst: &mut [u8]) -> usize {
        let mut written = 0;
        while written < dst.len() && offset < self.total {
            let out = &mut dst[written..];
            let n = if offset < PACKET_HEADER_SIZE {
                copy_bounded(&self.header[offset..], out)
            } else if offset < self.data_end {
                copy_bounded(&data[offset..self.data_end], out)
            } else if offset < self.padded_end {
                let n = min(out.len(), self.padded_end - offset);
                out[..n].fill(0);
                n
            } else {
                copy_bounded(&self.footer[offset - self.padded_end..], out)
            };
            trace!("copied {} bytes at offset {}/{}", n, offset, self.total);
            offset += n;
            written += n;
        }
        written
    }
}
