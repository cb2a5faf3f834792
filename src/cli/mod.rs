//! CLI argument parsing
//!
//! Defines the command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::wire::LOCAL_ENDPOINT;

/// Distributed test runner with local and remote sessions
#[derive(Parser, Debug)]
#[command(name = "testwire")]
#[command(version = "0.1.0")]
#[command(about = "Run parameterized test suites locally or across a TCP connection")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the compiled-in suite in this process
    Local(LocalArgs),

    /// Drive a remote target over TCP
    Connect(ConnectArgs),

    /// Serve the compiled-in suite for a remote driver
    Listen(ListenArgs),

    /// Launch a target through a helper command and drive it
    Device(DeviceArgs),

    /// Re-render or export a saved result file
    Result(ResultArgs),
}

/// Options shared by every session-creating command
#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// Settings file (defaults to the standard locations)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Override one setting, KEY=VALUE; repeatable
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Log level of this process (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Log level placed into the settings shipped to the target
    #[arg(long)]
    pub local_log_level: Option<String>,

    /// Debug mode: verbose framework output and no test timeouts
    #[arg(short, long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Options controlling what runs and where results go
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Run only the test with this dotted name, e.g. `channel.connect`
    #[arg(short, long)]
    pub test: Option<String>,

    /// Category to run (unknown names are rejected)
    #[arg(long)]
    pub category: Option<String>,

    /// Feature tokens: `all`, `+name`, `-name`; comma separated
    #[arg(long)]
    pub features: Option<String>,

    /// Persist the category and feature selection to the settings file
    #[arg(long)]
    pub save_options: bool,

    /// Write the result tree to this XML file
    #[arg(long)]
    pub result: Option<PathBuf>,

    /// Write a JUnit report to this file
    #[arg(long)]
    pub junit_result: Option<PathBuf>,

    /// Directory generated result files are placed in
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// List ignored leaves in the report
    #[arg(long)]
    pub show_ignored: bool,

    /// List the declared categories and exit
    #[arg(long)]
    pub show_categories: bool,

    /// List the declared features and exit
    #[arg(long)]
    pub show_features: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

/// Arguments for the local command
#[derive(Parser, Debug)]
pub struct LocalArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the connect command
#[derive(Parser, Debug)]
pub struct ConnectArgs {
    /// Target endpoint, host[:port]; the port defaults to 8888
    #[arg(short, long)]
    pub endpoint: String,

    /// Leave the target running instead of shutting it down
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the listen command
#[derive(Parser, Debug)]
pub struct ListenArgs {
    /// Endpoint to bind, host[:port]; the port defaults to 8888
    #[arg(short, long, default_value = "0.0.0.0")]
    pub endpoint: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the device command
#[derive(Parser, Debug)]
pub struct DeviceArgs {
    /// Helper command line; `{endpoint}` is replaced before spawning
    #[arg(short, long)]
    pub launcher: String,

    /// Seconds to wait for the launched target to connect back
    #[arg(long, default_value = "60")]
    pub ready_timeout: u64,

    /// Endpoint to listen on for the dial-back
    #[arg(short, long, default_value = LOCAL_ENDPOINT)]
    pub endpoint: String,

    /// Leave the target running instead of shutting it down
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the result command
#[derive(Parser, Debug)]
pub struct ResultArgs {
    /// Saved result XML file to read
    pub input: PathBuf,

    /// Export flat CSV rows to this file
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write a JUnit report to this file
    #[arg(long)]
    pub junit_result: Option<PathBuf>,

    /// List ignored leaves in the report
    #[arg(long)]
    pub show_ignored: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
