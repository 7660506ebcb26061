//! Command line client for the connectivity manager daemon.

mod agent;
mod arguments;
mod commands;
mod error;
mod input_handler;
mod proxies;

use std::process::ExitCode;

use zbus::names::BusName;
use zbus::{fdo, Connection};

use cmrs_core::dbus;

use crate::arguments::{Arguments, Command};
use crate::error::CliError;
use crate::input_handler::InputHandler;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let Some(arguments) = Arguments::parse(std::env::args()) else {
        return ExitCode::FAILURE;
    };

    if arguments.print_version_and_exit {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let Some(command) = arguments.command else {
        eprintln!("cmrs: missing command, try --help");
        return ExitCode::FAILURE;
    };

    match run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("cmrs: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    let connection = Connection::system().await?;

    let dbus_proxy = fdo::DBusProxy::new(&connection).await?;
    let service = BusName::try_from(dbus::SERVICE_NAME).map_err(zbus::Error::from)?;
    if !dbus_proxy
        .name_has_owner(service)
        .await
        .map_err(zbus::Error::from)?
    {
        return Err(CliError::ServiceNotAvailable);
    }

    match command {
        Command::Monitor(monitor_arguments) => {
            commands::monitor::run(&connection, monitor_arguments).await
        }
        Command::Wifi { command } => {
            commands::wifi::run(&connection, command, InputHandler::new()).await
        }
    }
}
