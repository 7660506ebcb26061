//! Connectivity manager daemon.
//!
//! Mirrors ConnMan's Wi-Fi state onto the `com.luxoft.ConnectivityManager`
//! D-Bus API and forwards commands the other way. The whole core runs on a
//! single-threaded runtime; nothing here may block the loop.

mod arguments;
mod backend;
mod backends;
mod constants;
mod daemon;
mod dbus_objects;
mod dbus_service;

use std::process::ExitCode;

use log::error;

use crate::arguments::Arguments;

fn main() -> ExitCode {
    env_logger::init();

    let Some(arguments) = Arguments::parse(std::env::args()) else {
        return ExitCode::FAILURE;
    };

    if arguments.print_version_and_exit {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to create runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(daemon::run()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
