//! Thread-local autograd switches.
//!
//! * grad mode: when disabled, ops do not record `grad_fn` nodes.
//! * recompute mode: set while a checkpointed segment is replayed during the
//!   backward pass; stateful layers use it to avoid updating running statistics twice.

use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
    static RECOMPUTING: Cell<bool> = const { Cell::new(false) };
}

/// Returns true if operations on this thread record the autograd graph.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|flag| flag.get())
}

/// Returns true while a checkpointed segment is being recomputed.
pub fn is_recomputing() -> bool {
    RECOMPUTING.with(|flag| flag.get())
}

fn swap_grad_enabled(enabled: bool) -> bool {
    GRAD_ENABLED.with(|flag| flag.replace(enabled))
}

/// Disables graph recording until dropped.
#[derive(Debug)]
pub struct NoGradGuard {
    previous: bool,
}

impl NoGradGuard {
    pub fn new() -> Self {
        NoGradGuard {
            previous: swap_grad_enabled(false),
        }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        swap_grad_enabled(self.previous);
    }
}

/// Enables graph recording until dropped, e.g. inside a backward pass.
#[derive(Debug)]
pub struct EnableGradGuard {
    previous: bool,
}

impl EnableGradGuard {
    pub fn new() -> Self {
        EnableGradGuard {
            previous: swap_grad_enabled(true),
        }
    }
}

impl Default for EnableGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EnableGradGuard {
    fn drop(&mut self) {
        swap_grad_enabled(self.previous);
    }
}

/// Marks the current thread as replaying a checkpointed segment.
#[derive(Debug)]
pub(crate) struct RecomputeGuard {
    previous: bool,
}

impl RecomputeGuard {
    pub(crate) fn new() -> Self {
        RecomputeGuard {
            previous: RECOMPUTING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for RecomputeGuard {
    fn drop(&mut self) {
        RECOMPUTING.with(|flag| flag.set(self.previous));
    }
}
