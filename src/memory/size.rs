// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the simgdb project.

//! Utility structs for memory sizes.

use std::num::NonZero;

#[derive(Copy, Eq, PartialEq, PartialOrd, Ord, Clone)]
#[repr(transparent)]
/// A non-zero size in bytes.
pub struct MemorySize(pub NonZero<u64>);

#[allow(non_upper_case_globals)]
impl MemorySize {
    /// A KiB.
    pub const KiB: NonZero<u64> = match NonZero::new(1024) {
        Some(v) => v,
        None => unreachable!(),
    };
    /// A MiB.
    pub const MiB: NonZero<u64> = match NonZero::new(Self::KiB.get() * 1024) {
        Some(v) => v,
        None => unreachable!(),
    };
    /// A GiB.
    pub const GiB: NonZero<u64> = match NonZero::new(Self::MiB.get() * 1024) {
        Some(v) => v,
        None => unreachable!(),
    };

    #[inline]
    /// Constructs a new size.
    pub const fn new(value: u64) -> Option<Self> {
        match NonZero::new(value) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    /// Unwraps the value.
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for MemorySize {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let bytes = self.get();
        if bytes < Self::KiB.get() || bytes % Self::KiB.get() != 0 {
            write!(fmt, "{}bytes", bytes)
        } else if bytes < Self::MiB.get() || bytes % Self::MiB.get() != 0 {
            write!(fmt, "{}KiB", bytes / Self::KiB)
        } else if bytes < Self::GiB.get() || bytes % Self::GiB.get() != 0 {
            write!(fmt, "{}MiB", bytes / Self::MiB)
        } else {
            write!(fmt, "{}GiB", bytes / Self::GiB)
        }
    }
}

impl std::fmt::Debug for MemorySize {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, fmt)
    }
}
