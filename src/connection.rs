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


//! Listening sockets debuggers connect to.

use std::{
    io::ErrorKind,
    net::{TcpListener, TcpStream},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
};

use crate::transport::Transport;

/// Where to listen for a debugger.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListenAddress {
    Tcp(u16),
    Unix(PathBuf),
}

#[derive(Debug)]
pub enum GdbListener {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
}

impl GdbListener {
    pub fn bind(address: &ListenAddress) -> std::io::Result<Self> {
        let listener = match address {
            ListenAddress::Tcp(port) => Self::Tcp(TcpListener::bind(("127.0.0.1", *port))?),
            ListenAddress::Unix(path) => Self::Unix(UnixListener::bind(path)?, path.clone()),
        };
        log::info!("Waiting for a GDB connection on {}...", listener);
        Ok(listener)
    }

    /// Local TCP port, if listening on one.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
            Self::Unix(..) => None,
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Tcp(_) => None,
            Self::Unix(_, path) => Some(path),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
        match self {
            Self::Tcp(listener) => listener.set_nonblocking(nonblocking),
            Self::Unix(listener, _) => listener.set_nonblocking(nonblocking),
        }
    }

    /// Accepts a pending connection. Returns `None` when a non-blocking
    /// listener has nothing to accept.
    pub fn accept(&self) -> std::io::Result<Option<Box<dyn Transport>>> {
        let accepted = match self {
            Self::Tcp(listener) => listener.accept().and_then(|(stream, addr)| {
                log::info!("GDB connected from {}", addr);
                Self::prepare_tcp(stream)
            }),
            Self::Unix(listener, _) => listener.accept().and_then(|(stream, addr)| {
                log::info!("GDB connected from {:?}", addr);
                Self::prepare_unix(stream)
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn prepare_tcp(stream: TcpStream) -> std::io::Result<Box<dyn Transport>> {
        // Accepted sockets may inherit the listener's non-blocking mode.
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn prepare_unix(stream: UnixStream) -> std::io::Result<Box<dyn Transport>> {
        stream.set_nonblocking(false)?;
        Ok(Box::new(stream))
    }
}

impl std::fmt::Display for GdbListener {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => write!(fmt, "{}", addr),
                Err(_) => write!(fmt, "<unbound tcp socket>"),
            },
            Self::Unix(_, path) => write!(fmt, "{}", path.display()),
        }
    }
}

impl Drop for GdbListener {
    fn drop(&mut self) {
        if let Self::Unix(_, path) = self {
            _ = std::fs::remove_file(path);
        }
    }
}
