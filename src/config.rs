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


//! Debugger server settings.
//!
//! Every field has a default so a configuration file only needs to mention the
//! values it changes:
//!
//! ```rust
//! use simgdb::config::GdbConfig;
//!
//! let config = GdbConfig::from_json(r#"{ "retry_limit": 3 }"#).unwrap();
//! assert_eq!(config.retry_limit, 3);
//! assert_eq!(config.packet_size, GdbConfig::default().packet_size);
//! ```

use std::{path::Path, time::Duration};

use serde_derive::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GdbConfig {
    /// Consecutive checksum failures or negative acknowledgements tolerated for
    /// a single packet before the connection is dropped.
    pub retry_limit: usize,
    /// Read timeout applied while a packet or an acknowledgement is in flight.
    /// Idle waits between commands never time out. `0` disables the timeout.
    pub read_timeout_ms: u64,
    /// Packet size advertised in `qSupported`. Memory reads are bounded by it.
    pub packet_size: usize,
    /// Largest payload accepted from the debugger.
    pub max_packet_len: usize,
    /// Thread ids returned per `qfThreadInfo`/`qsThreadInfo` reply.
    pub thread_info_page_size: usize,
    /// Block the simulation until a debugger attaches.
    pub wait_for_attach: bool,
}

impl Default for GdbConfig {
    fn default() -> Self {
        Self {
            retry_limit: 8,
            read_timeout_ms: 5_000,
            packet_size: 0x1000,
            max_packet_len: 0x10000,
            thread_info_page_size: 32,
            wait_for_attach: false,
        }
    }
}

impl GdbConfig {
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_size < 64 {
            return Err(ConfigError::Invalid("packet_size must be at least 64 bytes"));
        }
        if self.max_packet_len < self.packet_size {
            return Err(ConfigError::Invalid(
                "max_packet_len must not be smaller than packet_size",
            ));
        }
        if self.thread_info_page_size == 0 {
            return Err(ConfigError::Invalid("thread_info_page_size must be non-zero"));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms != 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}
