//! ## gamewarden
//! **Game server administration agent**
//!
//! Connects to a Frostbite 2 server over RCON, turns its event stream into
//! typed events and runs them through the registered policy handlers.
//! `simulate` runs the same agent against a scripted local server.

use std::process;

use clap::Parser;

mod agent;
mod commands;
mod error;

use commands::Cli;

fn main() {
    let cli = Cli::parse();
    let code = match commands::run_command(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("gamewarden: {err:#}");
            error::exit_code(&err)
        }
    };
    process::exit(code);
}
