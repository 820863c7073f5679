use std::{path::PathBuf, process::ExitCode};

use clap::{error::ErrorKind, Parser, Subcommand};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(version, about = "Add or remove cloudflared ingress routes")]
struct Args {
    /// cloudflared config file; created if missing
    config_path: PathBuf,
    #[command(subcommand)]
    action: Action,
    /// Log more detail to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Route a hostname to a service, replacing any existing route for it
    Add { hostname: String, service: String },
    /// Remove every route for a hostname
    Remove { hostname: String },
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => return usage(err),
    };

    init_tracing(args.verbose);
    debug!(?args, "Parsed arguments");

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(Args {
    config_path,
    action,
    ..
}: Args) -> Result<(), cf_ingress::Error> {
    match action {
        Action::Add { hostname, service } => {
            cf_ingress::upsert_route(&config_path, &hostname, &service)?;
            println!("Added route: {hostname} -> {service}");
        }
        Action::Remove { hostname } => {
            cf_ingress::remove_route(&config_path, &hostname)?;
            println!("Removed route: {hostname}");
        }
    }
    Ok(())
}

/// Help and version exit 0; any other parse failure prints usage to stdout
/// and exits 1 without touching the config file.
fn usage(err: clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        _ => {
            print!("{}", err.render());
            ExitCode::FAILURE
        }
    }
}

/// 0 (default): `RUST_LOG`, or warnings only. 1: info. 2: debug. 3+: trace.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
    {
        eprintln!("warning: failed to initialize logging: {err}");
    }
}
