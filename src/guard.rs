//! Scoped ownership of FFmpeg resources
//!
//! Every native resource the pipeline acquires (container contexts, the output
//! I/O handle, codec contexts, packets, frames) is wrapped in a [`Guard`] that
//! runs its release operation exactly once when the guard leaves scope. Early
//! returns through `?` therefore unwind partially built pipelines without
//! per-path cleanup code.
//!
//! Guards report to a [`Ledger`], which counts acquisitions and releases per
//! [`ResourceKind`]. The pipeline logs the ledger when it finishes, and tests
//! use it to check that every path is leak-free.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// Kinds of resources tracked by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    InputContainer,
    OutputContainer,
    OutputIo,
    Decoder,
    Encoder,
    Resampler,
    Packet,
    Frame,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::InputContainer => "input_container",
            ResourceKind::OutputContainer => "output_container",
            ResourceKind::OutputIo => "output_io",
            ResourceKind::Decoder => "decoder",
            ResourceKind::Encoder => "encoder",
            ResourceKind::Resampler => "resampler",
            ResourceKind::Packet => "packet",
            ResourceKind::Frame => "frame",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Acquire/release counts for one resource kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub acquired: usize,
    pub released: usize,
}

impl Counts {
    /// Resources of this kind that are currently alive.
    pub fn outstanding(&self) -> isize {
        self.acquired as isize - self.released as isize
    }
}

/// Per-conversion record of resource acquisitions and releases.
///
/// Cloning a ledger shares the underlying counters. A ledger belongs to one
/// conversion running on one thread.
#[derive(Clone, Default)]
pub struct Ledger {
    counts: Rc<RefCell<BTreeMap<ResourceKind, Counts>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `value`, releasing it with `release` when the returned
    /// guard is dropped.
    pub fn acquire<T>(&self, kind: ResourceKind, value: T, release: fn(T)) -> Guard<T> {
        self.counts.borrow_mut().entry(kind).or_default().acquired += 1;
        Guard {
            value: Some(value),
            kind,
            release,
            ledger: self.clone(),
        }
    }

    /// Take ownership of `value`, releasing it by dropping it.
    pub fn track<T>(&self, kind: ResourceKind, value: T) -> Guard<T> {
        self.acquire(kind, value, drop)
    }

    fn record_release(&self, kind: ResourceKind) {
        self.counts.borrow_mut().entry(kind).or_default().released += 1;
    }

    /// Counts for one resource kind.
    pub fn counts(&self, kind: ResourceKind) -> Counts {
        self.counts.borrow().get(&kind).copied().unwrap_or_default()
    }

    /// Snapshot of every kind seen so far.
    pub fn snapshot(&self) -> Vec<(ResourceKind, Counts)> {
        self.counts
            .borrow()
            .iter()
            .map(|(kind, counts)| (*kind, *counts))
            .collect()
    }

    /// True when every acquired resource has been released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.counts
            .borrow()
            .values()
            .all(|c| c.acquired == c.released)
    }

    /// Total number of resources acquired over the ledger's lifetime.
    pub fn total_acquired(&self) -> usize {
        self.counts.borrow().values().map(|c| c.acquired).sum()
    }

    /// Emit the ledger at trace level.
    pub fn log_summary(&self) {
        for (kind, counts) in self.snapshot() {
            tracing::trace!(
                resource = kind.name(),
                acquired = counts.acquired,
                released = counts.released,
                "resource ledger"
            );
        }
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

/// Owned handle to one resource, released exactly once.
pub struct Guard<T> {
    value: Option<T>,
    kind: ResourceKind,
    release: fn(T),
    ledger: Ledger,
}

impl<T> Guard<T> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Release the resource now through `f` instead of the default release
    /// operation, returning whatever `f` returns. Used where the release step
    /// itself can fail and the failure must be reported.
    pub fn release_with<R>(mut self, f: impl FnOnce(T) -> R) -> R {
        let value = self
            .value
            .take()
            .unwrap_or_else(|| unreachable!("guard for {} already released", self.kind));
        self.ledger.record_release(self.kind);
        f(value)
    }
}

impl<T> Deref for Guard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.value.as_ref() {
            Some(value) => value,
            None => unreachable!("guard for {} already released", self.kind),
        }
    }
}

impl<T> DerefMut for Guard<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.value.as_mut() {
            Some(value) => value,
            None => unreachable!("guard for {} already released", self.kind),
        }
    }
}

impl<T> Drop for Guard<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            (self.release)(value);
            self.ledger.record_release(self.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    fn count_release(_: u32) {
        RELEASED.with(|r| r.set(r.get() + 1));
    }

    #[test]
    fn test_release_on_drop() {
        RELEASED.with(|r| r.set(0));
        let ledger = Ledger::new();
        {
            let guard = ledger.acquire(ResourceKind::Packet, 7u32, count_release);
            assert_eq!(*guard, 7);
            assert!(!ledger.is_balanced());
        }
        assert!(ledger.is_balanced());
        assert_eq!(RELEASED.with(|r| r.get()), 1);
        assert_eq!(
            ledger.counts(ResourceKind::Packet),
            Counts {
                acquired: 1,
                released: 1
            }
        );
    }

    #[test]
    fn test_release_with_runs_once() {
        RELEASED.with(|r| r.set(0));
        let ledger = Ledger::new();
        let guard = ledger.acquire(ResourceKind::OutputIo, 3u32, count_release);
        let doubled = guard.release_with(|v| v * 2);
        assert_eq!(doubled, 6);
        // Custom release replaces the default one.
        assert_eq!(RELEASED.with(|r| r.get()), 0);
        assert!(ledger.is_balanced());
        assert_eq!(ledger.counts(ResourceKind::OutputIo).released, 1);
    }

    #[test]
    fn test_early_return_unwinds_in_reverse() {
        fn build(ledger: &Ledger, fail: bool) -> Result<Vec<Guard<u32>>, ()> {
            let a = ledger.track(ResourceKind::InputContainer, 1u32);
            let b = ledger.track(ResourceKind::Decoder, 2u32);
            if fail {
                return Err(());
            }
            Ok(vec![a, b])
        }

        let ledger = Ledger::new();
        assert!(build(&ledger, true).is_err());
        assert!(ledger.is_balanced());
        assert_eq!(ledger.total_acquired(), 2);

        let kept = build(&ledger, false).unwrap();
        assert!(!ledger.is_balanced());
        assert_eq!(ledger.counts(ResourceKind::Decoder).outstanding(), 1);
        drop(kept);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn test_deref_mut() {
        let ledger = Ledger::new();
        let mut guard = ledger.track(ResourceKind::Frame, vec![1, 2]);
        guard.push(3);
        assert_eq!(guard.len(), 3);
        assert_eq!(guard.kind(), ResourceKind::Frame);
    }
}
