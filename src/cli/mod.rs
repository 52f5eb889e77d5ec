pub mod commands;

pub use commands::{handle_command, Cli, Command};
