//! Small shared utilities.

use std::ops::{Deref, DerefMut};

/// Pads and aligns a value to the length of a cache line.
///
/// Updating an atomic invalidates the whole cache line it lives on, so the
/// producer-owned and consumer-owned cursors are kept on separate lines to
/// stop one side's progress from evicting the other side's cached view.
///
/// The alignment is 128 bytes on x86-64 and aarch64, where the spatial
/// prefetcher pulls cache lines in pairs, and 64 bytes elsewhere.
#[derive(Debug, Default)]
#[cfg_attr(
    any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
    ),
    repr(align(128))
)]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
    )),
    repr(align(64))
)]
pub(crate) struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
