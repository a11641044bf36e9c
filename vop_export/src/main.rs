/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

mod cmd_export;
mod scene_dto;

use anyhow::Result;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use structopt::StructOpt;

use cmd_export::ExportArgs;

#[derive(StructOpt)]
struct Cli {
    #[structopt(long, default_value = "Warn")]
    log_level: LevelFilter,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    #[structopt(help = "Rasterize every (or a chosen subset of) view in a JSON scene file")]
    Export(ExportArgs),
}

fn run() -> Result<()> {
    let args = Cli::from_args();
    SimpleLogger::new().with_level(args.log_level).init()?;
    match &args.cmd {
        Command::Export(export_args) => cmd_export::export(export_args)?,
    }
    Ok(())
}

fn main() {
    run().unwrap();
}
