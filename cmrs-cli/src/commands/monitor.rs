//! The `monitor` command: print property changes until Ctrl-C.

use futures_util::StreamExt;
use zbus::Connection;

use crate::arguments::MonitorArguments;
use crate::error::CliError;
use crate::proxies::ConnectivityManagerProxy;

fn enabled_str(enabled: bool) -> &'static str {
    if enabled {
        "Yes"
    } else {
        "No"
    }
}

pub async fn run(connection: &Connection, arguments: MonitorArguments) -> Result<(), CliError> {
    let proxy = ConnectivityManagerProxy::new(connection).await?;

    if arguments.initial_state {
        print_initial_state(&proxy).await?;
    }

    let mut available = proxy.receive_wi_fi_available_changed().await;
    let mut enabled = proxy.receive_wi_fi_enabled_changed().await;
    let mut hotspot_enabled = proxy.receive_wi_fi_hotspot_enabled_changed().await;
    let mut hotspot_ssid = proxy.receive_wi_fi_hotspot_ssid_changed().await;
    let mut hotspot_passphrase = proxy.receive_wi_fi_hotspot_passphrase_changed().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Some(change) = available.next() => {
                if let Ok(value) = change.get().await {
                    println!("Wi-Fi Available: {}", enabled_str(value));
                }
            }
            Some(change) = enabled.next() => {
                if let Ok(value) = change.get().await {
                    println!("Wi-Fi Enabled: {}", enabled_str(value));
                }
            }
            Some(change) = hotspot_enabled.next() => {
                if let Ok(value) = change.get().await {
                    println!("Wi-Fi Hotspot Enabled: {}", enabled_str(value));
                }
            }
            Some(change) = hotspot_ssid.next() => {
                if let Ok(value) = change.get().await {
                    println!(
                        "Wi-Fi Hotspot Name/SSID: \"{}\"",
                        String::from_utf8_lossy(&value)
                    );
                }
            }
            Some(change) = hotspot_passphrase.next() => {
                if let Ok(value) = change.get().await {
                    println!("Wi-Fi Hotspot Passphrase: \"{value}\"");
                }
            }
        }
    }

    Ok(())
}

async fn print_initial_state(proxy: &ConnectivityManagerProxy<'_>) -> Result<(), CliError> {
    println!("Wi-Fi:");
    println!();
    println!("  Available: {}", enabled_str(proxy.wi_fi_available().await?));
    println!("  Enabled  : {}", enabled_str(proxy.wi_fi_enabled().await?));
    println!();
    println!(
        "  Hotspot Enabled   : {}",
        enabled_str(proxy.wi_fi_hotspot_enabled().await?)
    );
    println!(
        "  Hotspot Name/SSID : \"{}\"",
        String::from_utf8_lossy(&proxy.wi_fi_hotspot_ssid().await?)
    );
    println!(
        "  Hotspot Passphrase: \"{}\"",
        proxy.wi_fi_hotspot_passphrase().await?
    );
    println!();

    Ok(())
}
