//! Daemon lifecycle: wiring, signals and the run loop.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use zbus::Connection;

use cmrs_core::{Event, StateStore};

use crate::backend::Backend;
use crate::backends::connman::ConnManBackend;
use crate::dbus_service::DBusService;

/// Why the run loop should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitReason {
    NameLost,
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::new();
    let events = store.subscribe();
    let mut critical = store.subscribe();

    let connection = Connection::system().await?;

    let backend: Arc<dyn Backend> = Arc::new(ConnManBackend::start(store, connection.clone()));

    let (quit_tx, mut quit_rx) = mpsc::unbounded_channel();
    let _service = DBusService::start(&connection, Arc::clone(&backend), events, quit_tx).await?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, quitting");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, quitting");
                return Ok(());
            }
            _ = sighup.recv() => {
                // Nothing to reload; configuration is all on the bus.
                debug!("Ignoring SIGHUP");
            }
            event = critical.recv() => {
                match event {
                    Ok(Event::CriticalError) => {
                        error!("Critical error, quitting");
                        return Err("critical error in provider backend".into());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err("state store closed unexpectedly".into());
                    }
                }
            }
            reason = quit_rx.recv() => {
                if reason == Some(QuitReason::NameLost) {
                    return Err("lost well-known bus name".into());
                }
            }
        }
    }
}
