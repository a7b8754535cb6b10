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


//! Byte streams a debugger connection can run over.

use std::{
    io::{Read, Write},
    net::TcpStream,
    os::{fd::AsFd, unix::net::UnixStream},
    time::Duration,
};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

/// A bidirectional byte stream with a configurable read timeout and a way to
/// ask whether input is pending without consuming it.
pub trait Transport: Read + Write {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Returns `true` if a read would not block. `wait` bounds how long to wait
    /// for input to arrive; `None` returns immediately.
    fn poll_readable(&self, wait: Option<Duration>) -> std::io::Result<bool>;
}

fn poll_fd<F: AsFd>(fd: &F, wait: Option<Duration>) -> std::io::Result<bool> {
    let timeout = match wait {
        None => PollTimeout::ZERO,
        Some(wait) => PollTimeout::from(u16::try_from(wait.as_millis()).unwrap_or(u16::MAX)),
    };
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    let ready = poll(&mut fds, timeout)?;
    if ready == 0 {
        return Ok(false);
    }
    // A hang-up or error is reported as readable so that the next read observes
    // it and the connection gets torn down.
    Ok(fds[0].revents().is_some_and(|revents| {
        revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    }))
}

impl Transport for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn poll_readable(&self, wait: Option<Duration>) -> std::io::Result<bool> {
        poll_fd(self, wait)
    }
}

impl Transport for UnixStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn poll_readable(&self, wait: Option<Duration>) -> std::io::Result<bool> {
        poll_fd(self, wait)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn poll_readable(&self, wait: Option<Duration>) -> std::io::Result<bool> {
        (**self).poll_readable(wait)
    }
}
