//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for hubsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hubsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Modbus register hub service",
    long_about = None
)]
pub struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = "config/hubsrv.yaml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poll the device until interrupted (default)
    Run,
    /// Validate the configuration and exit
    Validate,
    /// Run one refresh cycle and print every entity state
    Read,
    /// Turn a switch entity on or off
    Switch {
        /// Entity key
        key: String,
        #[arg(value_enum)]
        state: SwitchState,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}
