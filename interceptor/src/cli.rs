//! Command line parsing and logging initialization.
//!
//! `interceptor -- <command> [args...]` runs `<command>` inside an isolated
//! network namespace and logs its decrypted HTTP(S) exchanges. Verbosity is
//! controlled the same way across this whole tool: `-v` to raise it,
//! `-q` to lower it, never a bare `--debug` flag.

use std::fs::{create_dir_all, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use crate::config::Config;
use crate::pretty::ExchangeLayer;

#[derive(Parser, Debug)]
#[command(name = "interceptor", about = "Intercepts a child process's HTTP(S) traffic")]
struct Args {
    /// Raise verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Lower verbosity; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Write a HAR recording of every intercepted exchange to this path.
    #[arg(long)]
    har: Option<PathBuf>,

    /// Write the freshly generated CA certificate (PEM) to this path so it
    /// can be installed into the child's trust store.
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Also write structured JSON logs to a timestamped file under ./logs.
    #[arg(long)]
    log_file: bool,

    /// The command to run, and its arguments.
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

/// Parses `std::env::args()` into a [`Config`], initializing logging as a
/// side effect (logging has to start before anything else runs).
pub fn parse() -> Config {
    let args = Args::parse();
    initialize_logging(args.verbose, args.quiet, args.log_file);

    let mut config = Config::new(args.command, args.verbose as i8 - args.quiet as i8);
    config.har_path = args.har;
    config.ca_cert_path = args.ca_cert;
    config
}

fn initialize_logging(verbose: u8, quiet: u8, log_file: bool) {
    let level = match verbose as i8 - quiet as i8 {
        i8::MIN..=-1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::Layer::default()
        .pretty()
        .without_time()
        .with_file(false)
        .with_writer(std::io::stderr);
    let exchange_layer = ExchangeLayer::new(verbose == 0 && quiet > 0);

    if log_file {
        let dir = "./logs";
        create_dir_all(dir).expect("failed to create log directory");
        let path = format!(
            "{dir}/interceptor-{}.log",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("failed to open log file");
        let file_layer = fmt::Layer::default().json().with_writer(Arc::new(file));
        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .with(exchange_layer);
        tracing::subscriber::set_global_default(subscriber)
            .expect("a global tracing subscriber was already set");
    } else {
        let subscriber = Registry::default().with(filter).with(stdout_layer).with(exchange_layer);
        tracing::subscriber::set_global_default(subscriber)
            .expect("a global tracing subscriber was already set");
    }
}
