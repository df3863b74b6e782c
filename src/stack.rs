//! Stack growth for the recursive parser and evaluator.
//!
//! Nesting is bounded by the parser and by `max_eval_depth`, but a single
//! level of evaluation can take several kilobytes in debug builds, so the
//! recursion also grows the native stack on demand instead of relying on
//! the size of whatever thread the host runs scripts on.

/// Grow the stack when less than this remains.
const RED_ZONE: usize = 64 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
