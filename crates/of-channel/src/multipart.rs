//! Multipart request reassembly (spec.md §3 "Multipart accumulator" and
//! §4.2 "Multipart request handling at the receiver").

use crate::error::OfpError;
use crate::wire::OfpType;
use of_core::Xid;

/// Maximum number of concurrently in-flight multipart accumulators per
/// channel (spec.md §3: "Holds up to N in-flight multipart requests per
/// channel"). Chosen to match the original's `NR_MAX_ENTRIES`-style small
/// fixed bound rather than an unbounded map, so a misbehaving controller
/// cannot exhaust memory by opening many multipart requests at once.
pub const MAX_ACCUMULATOR_SLOTS: usize = 16;

/// Upper bound on one accumulator's total reassembled length (spec.md §3:
/// "Total reassembled length bounded by implementation policy (rejected
/// with `MULTIPART_BUFFER_OVERFLOW` otherwise)."). This is an
/// implementation choice (spec.md leaves the exact bound unspecified);
/// 16 MiB comfortably covers a full flow-table dump while still bounding a
/// hostile peer's worst case, see DESIGN.md.
pub const MAX_ACCUMULATOR_BYTES: usize = 16 * 1024 * 1024;

/// One in-flight multipart accumulator, keyed by `(xid, type)` within a
/// channel.
#[derive(Debug)]
struct Accumulator {
    xid: Xid,
    message_type: OfpType,
    fragments: Vec<Vec<u8>>,
    total_len: usize,
}

impl Accumulator {
    fn new(xid: Xid, message_type: OfpType) -> Self {
        Self {
            xid,
            message_type,
            fragments: Vec::new(),
            total_len: 0,
        }
    }

    fn push(&mut self, payload: &[u8]) -> Result<(), OfpError> {
        if self.total_len + payload.len() > MAX_ACCUMULATOR_BYTES {
            return Err(OfpError::MultipartBufferOverflow);
        }
        self.total_len += payload.len();
        self.fragments.push(payload.to_vec());
        Ok(())
    }

    fn finish(mut self, last_payload: &[u8]) -> Result<Vec<u8>, OfpError> {
        if self.total_len + last_payload.len() > MAX_ACCUMULATOR_BYTES {
            return Err(OfpError::MultipartBufferOverflow);
        }
        let mut out = Vec::with_capacity(self.total_len + last_payload.len());
        for fragment in self.fragments.drain(..) {
            out.extend_from_slice(&fragment);
        }
        out.extend_from_slice(last_payload);
        Ok(out)
    }
}

/// Holds up to [`MAX_ACCUMULATOR_SLOTS`] accumulators for one channel.
#[derive(Debug, Default)]
pub struct MultipartTable {
    slots: Vec<Accumulator>,
}

impl MultipartTable {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    fn find_index(&self, xid: Xid) -> Option<usize> {
        self.slots.iter().position(|a| a.xid == xid)
    }

    /// Feeds one fragment into the accumulator for `(xid, message_type)`.
    ///
    /// Returns `Ok(Some(payload))` once the fragment with `more == false`
    /// has been absorbed — `payload` is the full reassembled body and the
    /// slot (if any) has been freed, per spec.md §4.2 step 3: "collect the
    /// accumulator plus this last fragment into one contiguous PBuf...
    /// and free the accumulator." Returns `Ok(None)` while more fragments
    /// are still expected.
    pub fn ingest(
        &mut self,
        xid: Xid,
        message_type: OfpType,
        more: bool,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, OfpError> {
        match self.find_index(xid) {
            Some(idx) => {
                if self.slots[idx].message_type != message_type {
                    return Err(OfpError::BadMultipart);
                }
                if more {
                    self.slots[idx].push(payload)?;
                    Ok(None)
                } else {
                    let acc = self.slots.remove(idx);
                    acc.finish(payload).map(Some)
                }
            }
            None => {
                if !more {
                    // Single-fragment multipart message: no accumulator
                    // ever needed.
                    return Ok(Some(payload.to_vec()));
                }
                if self.slots.len() >= MAX_ACCUMULATOR_SLOTS {
                    return Err(OfpError::MultipartBufferOverflow);
                }
                let mut acc = Accumulator::new(xid, message_type);
                acc.push(payload)?;
                self.slots.push(acc);
                Ok(None)
            }
        }
    }
}
