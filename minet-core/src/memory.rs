//! Thread-local ledger of live tensor buffer bytes.
//!
//! Every [`Buffer`](crate::buffer::Buffer) registers its size on creation and
//! releases it on drop. The ledger keeps the current total and the high-water
//! mark since the last [`reset_peak`], which is how the checkpointed and the
//! standard forward passes are compared for peak activation memory.
//!
//! Counters are per thread: one forward/backward invocation runs on one thread,
//! and concurrent test threads do not disturb each other's measurements.

use std::cell::Cell;

thread_local! {
    static LIVE_BYTES: Cell<usize> = const { Cell::new(0) };
    static PEAK_BYTES: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn record_alloc(bytes: usize) {
    LIVE_BYTES.with(|live| {
        let now = live.get() + bytes;
        live.set(now);
        PEAK_BYTES.with(|peak| {
            if now > peak.get() {
                peak.set(now);
            }
        });
    });
}

pub(crate) fn record_free(bytes: usize) {
    // A buffer dropped on another thread than the one that allocated it
    // would underflow this thread's ledger.
    LIVE_BYTES.with(|live| live.set(live.get().saturating_sub(bytes)));
}

/// Bytes held by tensor buffers alive on this thread.
pub fn live_bytes() -> usize {
    LIVE_BYTES.with(|live| live.get())
}

/// Highest value of [`live_bytes`] since the last [`reset_peak`].
pub fn peak_bytes() -> usize {
    PEAK_BYTES.with(|peak| peak.get())
}

/// Restarts peak tracking from the current live total.
pub fn reset_peak() {
    let live = live_bytes();
    PEAK_BYTES.with(|peak| peak.set(live));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_ledger_tracks_alloc_and_free() {
        let before = live_bytes();
        let t = Tensor::new(vec![0.0; 256], vec![16, 16]).unwrap();
        assert_eq!(live_bytes(), before + 256 * 4);
        drop(t);
        assert_eq!(live_bytes(), before);
    }

    #[test]
    fn test_peak_survives_free_until_reset() {
        reset_peak();
        let base = peak_bytes();
        {
            let _a = Tensor::new(vec![1.0; 1000], vec![1000]).unwrap();
        }
        assert_eq!(peak_bytes(), base + 4000);
        reset_peak();
        assert_eq!(peak_bytes(), live_bytes());
    }

    #[test]
    fn test_detached_view_shares_buffer() {
        let before = live_bytes();
        let t = Tensor::new(vec![2.0; 64], vec![64]).unwrap();
        let view = t.detach();
        assert_eq!(live_bytes(), before + 64 * 4);
        drop(t);
        assert_eq!(live_bytes(), before + 64 * 4);
        drop(view);
        assert_eq!(live_bytes(), before);
    }
}
