//
// simgdb
//
// Copyright 2025- Manos Pitsidianakis
//
// This file is part of simgdb.
//
// simgdb is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// simgdb is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with simgdb. If not, see <http://www.gnu.org/licenses/>.
//
// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later


#![allow(clippy::len_without_is_empty)]

use std::{cmp::Ordering, ops::Range};

use crate::memory::{Address, MemoryAccessError, MemorySize};

/// A contiguous range of guest physical memory backed by an anonymous
/// `mmap(2)` area.
pub struct MemoryRegion {
    pub name: String,
    /// Offset from start of physical address space.
    pub phys_offset: Address,
    pub size: MemorySize,
    pub read_only: bool,
    map: memmap2::MmapMut,
}

impl std::fmt::Debug for MemoryRegion {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("MemoryRegion")
            .field("name", &self.name)
            .field("phys_offset", &self.phys_offset)
            .field("size", &self.size)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl Ord for MemoryRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = Range::<Address>::from(self);
        let b = Range::<Address>::from(other);
        (a.start, a.end).cmp(&(b.start, b.end))
    }
}

impl PartialOrd for MemoryRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MemoryRegion {
    fn eq(&self, other: &Self) -> bool {
        (self.phys_offset, self.size) == (other.phys_offset, other.size)
    }
}

impl Eq for MemoryRegion {}

impl From<&MemoryRegion> for Range<Address> {
    fn from(mr: &MemoryRegion) -> Self {
        let start = mr.phys_offset;
        Self {
            start,
            end: Address(start.0 + mr.size.get()),
        }
    }
}

impl MemoryRegion {
    /// Returns a zero-filled memory region backed by an anonymous mapping.
    pub fn new(name: &str, size: MemorySize, phys_offset: Address) -> std::io::Result<Self> {
        if size.get().checked_add(phys_offset.0).is_none() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("region {name} of size {size} at {phys_offset} overflows"),
            ));
        }
        let len: usize = size.get().try_into().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("region {name} of size {size} does not fit the host"),
            )
        })?;
        let map = memmap2::MmapOptions::new().len(len).map_anon()?;
        #[cfg(target_os = "linux")]
        {
            // Don't include guest memory in dumped core files.
            _ = map.advise(memmap2::Advice::DontDump);
        }
        Ok(Self {
            name: name.to_string(),
            phys_offset,
            size,
            read_only: false,
            map,
        })
    }

    #[inline]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.size.get() as usize
    }

    /// One past the last address covered by this region.
    #[inline]
    pub const fn last_addr(&self) -> Address {
        Address(self.phys_offset.0 + self.size.get())
    }

    #[inline]
    pub const fn contains(&self, addr: Address) -> bool {
        addr.0 >= self.phys_offset.0 && addr.0 < self.last_addr().0
    }

    /// Copies bytes starting at `addr` into `buf`, stopping at the end of the
    /// region. Returns how many bytes were copied.
    pub fn read(&self, addr: Address, buf: &mut [u8]) -> Result<usize, MemoryAccessError> {
        if !self.contains(addr) {
            return Err(MemoryAccessError::Unmapped { address: addr });
        }
        let offset = (addr.0 - self.phys_offset.0) as usize;
        let count = buf.len().min(self.len() - offset);
        buf[..count].copy_from_slice(&self.map[offset..offset + count]);
        log::trace!("read {} bytes from {} in region {}", count, addr, self.name);
        Ok(count)
    }

    /// Copies bytes from `data` starting at `addr`, stopping at the end of the
    /// region. Returns how many bytes were copied.
    pub fn write(&mut self, addr: Address, data: &[u8]) -> Result<usize, MemoryAccessError> {
        if !self.contains(addr) {
            return Err(MemoryAccessError::Unmapped { address: addr });
        }
        if self.read_only {
            return Err(MemoryAccessError::ReadOnly { address: addr });
        }
        let offset = (addr.0 - self.phys_offset.0) as usize;
        let count = data.len().min(self.len() - offset);
        self.map[offset..offset + count].copy_from_slice(&data[..count]);
        log::trace!("wrote {} bytes to {} in region {}", count, addr, self.name);
        Ok(count)
    }
}

/// A non-owning analogue of [`MemoryRegion`] that describes its characteristics
/// but does not own its memory or holds any reference to it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryRegionDescription {
    pub start_offset: Address,
    pub size: MemorySize,
    pub read_only: bool,
}

impl From<&MemoryRegion> for MemoryRegionDescription {
    fn from(value: &MemoryRegion) -> Self {
        Self {
            start_offset: value.phys_offset,
            size: value.size,
            read_only: value.read_only,
        }
    }
}

impl MemoryRegionDescription {
    #[inline]
    pub const fn into_range(&self) -> Range<Address> {
        let start = self.start_offset;
        Range {
            start,
            end: Address(start.0 + self.size.get()),
        }
    }
}
