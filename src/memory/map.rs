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


use std::{collections::BTreeMap, ops::Range};

use thiserror::Error;

use crate::memory::{
    Address, MemoryAccessError, MemoryRegion, MemoryRegionDescription, MemorySize,
};

#[derive(Debug)]
pub struct MemoryMapBuilder {
    entries: BTreeMap<Address, MemoryRegion>,
    max_size: MemorySize,
}

#[derive(Debug, Error)]
pub enum MemoryMapError {
    #[error("region {region:?} ends at {range_end}, past the maximum size {max_size}")]
    Overflows {
        region: MemoryRegion,
        range_end: Address,
        max_size: MemorySize,
    },
    #[error("region {region:?} overlaps with {overlaps_with:?}")]
    Overlaps {
        region: MemoryRegion,
        overlaps_with: Vec<MemoryRegionDescription>,
    },
}

impl MemoryMapBuilder {
    #[inline]
    pub fn new(max_size: MemorySize) -> Self {
        Self {
            max_size,
            entries: BTreeMap::default(),
        }
    }

    pub fn add_region(&mut self, new: MemoryRegion) -> Result<(), MemoryMapError> {
        let range: Range<Address> = Range::from(&new);
        if range.end.0 > self.max_size.get() {
            return Err(MemoryMapError::Overflows {
                region: new,
                range_end: range.end,
                max_size: self.max_size,
            });
        }
        let overlaps_with: Vec<MemoryRegionDescription> = self
            .entries
            .values()
            .filter(|r| r.phys_offset < range.end && range.start < r.last_addr())
            .map(MemoryRegionDescription::from)
            .collect();
        if !overlaps_with.is_empty() {
            return Err(MemoryMapError::Overlaps {
                region: new,
                overlaps_with,
            });
        }
        self.entries.insert(new.phys_offset, new);
        Ok(())
    }

    pub fn with_region(mut self, new: MemoryRegion) -> Result<Self, MemoryMapError> {
        self.add_region(new)?;
        Ok(self)
    }

    pub fn build(self) -> MemoryMap {
        let Self { entries, max_size } = self;
        MemoryMap {
            regions: entries.into_values().collect(),
            max_size,
        }
    }
}

/// A flattened memory map of the guest.
///
/// # Example
///
/// ```rust
/// use simgdb::memory::*;
///
/// let overflows_err = MemoryMap::builder(MemorySize(0x100.try_into().unwrap()))
///     .with_region(MemoryRegion::new("rom", MemorySize(MemorySize::KiB), Address(0x0)).unwrap())
///     .unwrap_err();
/// let region = match overflows_err {
///     MemoryMapError::Overflows { region, .. } => region,
///     other => panic!("Expected overflow error, got: {:?}", other),
/// };
/// let map = MemoryMap::builder(MemorySize((MemorySize::KiB.get() * 2).try_into().unwrap()))
///     .with_region(region)
///     .unwrap()
///     .build();
/// assert_eq!(map.len(), 1, "region count");
/// let region_ref = map.find_region(Address(0x0)).unwrap();
/// assert_eq!(region_ref.len(), MemorySize::KiB.get() as usize);
/// assert!(map.find_region(Address(MemorySize::KiB.get())).is_none());
/// ```
#[derive(Debug)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
    max_size: MemorySize,
}

impl MemoryMap {
    #[inline]
    pub fn builder(max_size: MemorySize) -> MemoryMapBuilder {
        MemoryMapBuilder::new(max_size)
    }

    #[inline]
    pub const fn max_size(&self) -> MemorySize {
        self.max_size
    }

    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    fn region_index(&self, addr: Address) -> Option<usize> {
        match self.regions.binary_search_by_key(&addr, |x| x.phys_offset) {
            Ok(x) => Some(x),
            // Within the closest region with starting address < addr
            Err(x) if (x > 0 && addr.0 < self.regions[x - 1].last_addr().0) => Some(x - 1),
            _ => None,
        }
    }

    pub fn find_region(&self, addr: Address) -> Option<&MemoryRegion> {
        self.region_index(addr).and_then(|x| self.regions.get(x))
    }

    pub fn find_region_mut(&mut self, addr: Address) -> Option<&mut MemoryRegion> {
        self.region_index(addr).and_then(|x| self.regions.get_mut(x))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    pub fn descriptions(&self) -> Vec<MemoryRegionDescription> {
        self.regions.iter().map(Into::into).collect()
    }

    /// Reads `buf.len()` bytes starting at `addr`. The range may span adjacent
    /// regions but every byte must be mapped.
    pub fn read(&self, addr: Address, buf: &mut [u8]) -> Result<(), MemoryAccessError> {
        addr.checked_add(buf.len() as u64)
            .ok_or(MemoryAccessError::Overflow {
                address: addr,
                len: buf.len(),
            })?;
        let mut done = 0;
        while done < buf.len() {
            let cursor = addr + done as u64;
            let region = self
                .find_region(cursor)
                .ok_or(MemoryAccessError::Unmapped { address: cursor })?;
            done += region.read(cursor, &mut buf[done..])?;
        }
        Ok(())
    }

    /// Writes `data` starting at `addr`. Nothing is written unless the whole
    /// range is mapped and writable.
    pub fn write(&mut self, addr: Address, data: &[u8]) -> Result<(), MemoryAccessError> {
        addr.checked_add(data.len() as u64)
            .ok_or(MemoryAccessError::Overflow {
                address: addr,
                len: data.len(),
            })?;
        let mut checked = 0;
        while checked < data.len() {
            let cursor = addr + checked as u64;
            let region = self
                .find_region(cursor)
                .ok_or(MemoryAccessError::Unmapped { address: cursor })?;
            if region.read_only {
                return Err(MemoryAccessError::ReadOnly { address: cursor });
            }
            checked += (region.last_addr().0 - cursor.0) as usize;
        }
        let mut done = 0;
        while done < data.len() {
            let cursor = addr + done as u64;
            let region = self
                .find_region_mut(cursor)
                .ok_or(MemoryAccessError::Unmapped { address: cursor })?;
            done += region.write(cursor, &data[done..])?;
        }
        Ok(())
    }

    /// Copies a program image into guest memory, ignoring the read-only flag.
    pub fn load(&mut self, addr: Address, image: &[u8]) -> Result<(), MemoryAccessError> {
        let mut done = 0;
        while done < image.len() {
            let cursor = addr
                .checked_add(done as u64)
                .ok_or(MemoryAccessError::Overflow {
                    address: addr,
                    len: image.len(),
                })?;
            let region = self
                .find_region_mut(cursor)
                .ok_or(MemoryAccessError::Unmapped { address: cursor })?;
            let read_only = std::mem::replace(&mut region.read_only, false);
            let written = region.write(cursor, &image[done..]);
            region.read_only = read_only;
            done += written?;
        }
        Ok(())
    }
}
