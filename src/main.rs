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


use std::{collections::BTreeSet, sync::Arc};

use simgdb::{
    commands::CommandTable,
    config::GdbConfig,
    connection::GdbListener,
    logging::{self, Output},
    machine::{default_memory_map, Machine, RunExit},
    remote_gdb::RemoteGdb,
};

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::parse()?;

    let output = match args.log_file {
        Some(ref path) => Output::File(std::fs::File::create(path)?),
        None => Output::Stderr,
    };
    logging::init(
        logging::level_from_verbosity(args.verbose),
        output,
        args.trace.iter().copied().collect::<BTreeSet<_>>(),
    )?;

    let mut config = match args.config {
        Some(ref path) => GdbConfig::from_path(path)?,
        None => GdbConfig::default(),
    };
    if args.wait_gdb {
        config.wait_for_attach = true;
    }

    let input = std::fs::read(&args.binary)?;
    let arch = args.arch.build();
    let memory = default_memory_map(args.memory, args.rom)?;
    let mut machine = Machine::new(arch.as_ref(), memory, args.cpus, args.start_address);
    machine.load_code(&input, args.start_address)?;
    log::info!(
        "loaded {} bytes at {} for {} {} CPU(s)",
        input.len(),
        args.start_address,
        args.cpus,
        arch.name()
    );

    let wait_for_attach = config.wait_for_attach;
    let mut gdb = RemoteGdb::with_commands(config, arch, Arc::new(CommandTable::new()));
    machine.register(&mut gdb)?;

    let listener = args
        .listen_address()
        .map(|address| GdbListener::bind(&address))
        .transpose()?;
    if let Some(ref listener) = listener {
        if wait_for_attach {
            // Block until the debugger shows up.
            if let Some(stream) = listener.accept()? {
                gdb.attach(stream);
            }
        }
        listener.set_nonblocking(true)?;
    }

    match machine.run(&mut gdb, listener.as_ref(), args.max_insns)? {
        RunExit::InstructionLimit => {
            log::info!("stopped after {} instructions", machine.instructions())
        }
        RunExit::Halted => {
            log::info!("all CPUs halted after {} instructions", machine.instructions())
        }
        RunExit::Idle => log::info!("no CPU can make progress, exiting"),
    }
    Ok(())
}
