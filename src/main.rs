#![cfg_attr(not(test), deny(clippy::unwrap_used))]
mod commands;
mod config;
mod delivery;
mod executor;
mod gate;
mod llm;
mod pipeline;
mod schema;
mod server;
mod synthesis;

use std::error::Error;

use clap::*;
use commands::{Ask, Initialize, Serve};

#[derive(Parser)]
#[command(name = "sms-sql", bin_name = "sms-sql")]
enum Command {
    Serve(Serve),
    Ask(Ask),
    Init(Initialize),
}

fn main() -> Result<(), Box<dyn Error>> {
    let command = Command::parse();
    match command {
        Command::Serve(args) => args.serve(),
        Command::Ask(args) => args.ask(),
        Command::Init(args) => args.init(),
    }
}
