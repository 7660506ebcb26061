use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("connectivity manager service not available")]
    ServiceNotAvailable,

    #[error("no access point with SSID \"{0}\"")]
    AccessPointNotFound(String),
}
