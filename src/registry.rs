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


//! Thread/context registry: maps stable context ids to execution contexts and
//! tracks which one the debugger has selected.

use indexmap::IndexMap;
use thiserror::Error;

use crate::context::{ContextHandle, ContextId};

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("{0} is already registered")]
    Duplicate(ContextId),
    #[error("{0} is not registered")]
    Unknown(ContextId),
}

#[derive(Default)]
pub struct ThreadRegistry {
    threads: IndexMap<ContextId, ContextHandle>,
    selected: Option<ContextId>,
    thread_info_idx: usize,
}

impl std::fmt::Debug for ThreadRegistry {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("ThreadRegistry")
            .field("threads", &self.threads.keys().collect::<Vec<_>>())
            .field("selected", &self.selected)
            .field("thread_info_idx", &self.thread_info_idx)
            .finish()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Registers a context under its own id. The first context registered
    /// becomes the selected one.
    pub fn add(&mut self, ctx: ContextHandle) -> Result<ContextId, RegistryError> {
        let id = ctx.borrow().id();
        if self.threads.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.threads.insert(id, ctx);
        if self.selected.is_none() {
            self.selected = Some(id);
        }
        log::debug!(target: "gdb::thread", "registered {}", id);
        Ok(id)
    }

    /// Swaps the context registered under `ctx`'s id, keeping the selection.
    pub fn replace(&mut self, ctx: ContextHandle) -> Result<ContextHandle, RegistryError> {
        let id = ctx.borrow().id();
        let slot = self
            .threads
            .get_mut(&id)
            .ok_or(RegistryError::Unknown(id))?;
        log::debug!(target: "gdb::thread", "replaced {}", id);
        Ok(std::mem::replace(slot, ctx))
    }

    /// Selects `id`. Unknown ids leave the selection unchanged and return
    /// `false`.
    pub fn select(&mut self, id: ContextId) -> bool {
        if !self.threads.contains_key(&id) {
            log::debug!(target: "gdb::thread", "cannot select unknown {}", id);
            return false;
        }
        self.selected = Some(id);
        true
    }

    #[inline]
    pub fn selected_id(&self) -> Option<ContextId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&ContextHandle> {
        self.selected.and_then(|id| self.threads.get(&id))
    }

    pub fn get(&self, id: ContextId) -> Option<&ContextHandle> {
        self.threads.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: ContextId) -> bool {
        self.threads.contains_key(&id)
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.threads.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextHandle> {
        self.threads.values()
    }

    /// Rewinds the enumeration cursor and returns the first page.
    pub fn thread_info_first(&mut self, page: usize) -> String {
        self.thread_info_idx = 0;
        self.thread_info_next(page)
    }

    /// Returns the next page of thread ids as `m<tid>,<tid>...`, or `l` once
    /// every id has been reported.
    pub fn thread_info_next(&mut self, page: usize) -> String {
        let page = page.max(1);
        let start = self.thread_info_idx.min(self.threads.len());
        let tids: Vec<String> = self
            .threads
            .keys()
            .skip(start)
            .take(page)
            .map(|id| format!("{:x}", id.thread_id()))
            .collect();
        if tids.is_empty() {
            return "l".to_string();
        }
        self.thread_info_idx = start + tids.len();
        format!("m{}", tids.join(","))
    }
}
