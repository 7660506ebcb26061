//! The `wifi` command family.

use log::debug;
use zbus::Connection;
use zvariant::{ObjectPath, OwnedObjectPath};

use crate::agent::{self, UserInputAgent};
use crate::arguments::WifiCommand;
use crate::error::CliError;
use crate::input_handler::InputHandler;
use crate::proxies::{ConnectivityManagerProxy, WiFiAccessPointProxy};

pub async fn run(
    connection: &Connection,
    command: WifiCommand,
    input_handler: InputHandler,
) -> Result<(), CliError> {
    let proxy = ConnectivityManagerProxy::new(connection).await?;

    match command {
        WifiCommand::Enable => proxy.set_wi_fi_enabled(true).await?,
        WifiCommand::Disable => proxy.set_wi_fi_enabled(false).await?,
        WifiCommand::Status => print_status(connection, &proxy).await?,
        WifiCommand::Connect { ssid } => {
            connect(connection, &proxy, &ssid, input_handler).await?
        }
        WifiCommand::Disconnect { ssid } => {
            let path = find_access_point(connection, &proxy, &ssid).await?;
            proxy.disconnect(&path).await?;
        }
        WifiCommand::EnableHotspot { ssid, passphrase } => {
            if let Some(ssid) = ssid {
                proxy.set_wi_fi_hotspot_ssid(ssid.into_bytes()).await?;
            }
            if let Some(passphrase) = passphrase {
                proxy.set_wi_fi_hotspot_passphrase(passphrase).await?;
            }
            proxy.set_wi_fi_hotspot_enabled(true).await?;
        }
        WifiCommand::DisableHotspot => proxy.set_wi_fi_hotspot_enabled(false).await?,
    }

    Ok(())
}

async fn print_status(
    connection: &Connection,
    proxy: &ConnectivityManagerProxy<'_>,
) -> Result<(), CliError> {
    println!(
        "Wi-Fi available: {}",
        if proxy.wi_fi_available().await? { "Yes" } else { "No" }
    );
    println!(
        "Wi-Fi enabled  : {}",
        if proxy.wi_fi_enabled().await? { "Yes" } else { "No" }
    );
    println!("Access points:");

    for path in proxy.wi_fi_access_points().await? {
        let access_point = access_point_proxy(connection, &path).await?;

        let ssid = access_point.ssid().await?;
        let strength = access_point.strength().await?;
        let connected = access_point.connected().await?;
        let security = access_point.security().await?;

        let ssid = if ssid.is_empty() {
            "<hidden>".to_owned()
        } else {
            String::from_utf8_lossy(&ssid).into_owned()
        };

        println!(
            "  {}\"{}\" ({}%{})",
            if connected { "* " } else { "  " },
            ssid,
            strength,
            if security.is_empty() {
                String::new()
            } else {
                format!(", {security}")
            }
        );
    }

    Ok(())
}

async fn connect(
    connection: &Connection,
    proxy: &ConnectivityManagerProxy<'_>,
    ssid: &str,
    input_handler: InputHandler,
) -> Result<(), CliError> {
    let path = find_access_point(connection, proxy, ssid).await?;

    connection
        .object_server()
        .at(agent::OBJECT_PATH, UserInputAgent::new(input_handler))
        .await?;

    let agent_path = ObjectPath::from_str_unchecked(agent::OBJECT_PATH);
    let result = proxy.connect(&path, &agent_path).await;

    let _ = connection
        .object_server()
        .remove::<UserInputAgent, _>(&agent_path)
        .await;

    result?;
    println!("Connected to \"{ssid}\"");

    Ok(())
}

async fn find_access_point(
    connection: &Connection,
    proxy: &ConnectivityManagerProxy<'_>,
    ssid: &str,
) -> Result<OwnedObjectPath, CliError> {
    for path in proxy.wi_fi_access_points().await? {
        let access_point = access_point_proxy(connection, &path).await?;

        match access_point.ssid().await {
            Ok(bytes) if bytes == ssid.as_bytes() => return Ok(path),
            Ok(_) => {}
            Err(error) => debug!("Skipping access point {}: {error}", path.as_str()),
        }
    }

    Err(CliError::AccessPointNotFound(ssid.to_owned()))
}

async fn access_point_proxy<'a>(
    connection: &'a Connection,
    path: &OwnedObjectPath,
) -> Result<WiFiAccessPointProxy<'a>, CliError> {
    Ok(WiFiAccessPointProxy::builder(connection)
        .path(path.clone())?
        .build()
        .await?)
}
