//! Proxies for the daemon's D-Bus API.

use zbus::proxy;
use zvariant::{ObjectPath, OwnedObjectPath};

#[proxy(
    interface = "com.luxoft.ConnectivityManager",
    default_service = "com.luxoft.ConnectivityManager",
    default_path = "/com/luxoft/ConnectivityManager"
)]
pub trait ConnectivityManager {
    #[zbus(property)]
    fn wi_fi_available(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn wi_fi_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_wi_fi_enabled(&self, value: bool) -> zbus::Result<()>;

    #[zbus(property)]
    fn wi_fi_access_points(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn wi_fi_hotspot_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_wi_fi_hotspot_enabled(&self, value: bool) -> zbus::Result<()>;

    #[zbus(property, name = "WiFiHotspotSSID")]
    fn wi_fi_hotspot_ssid(&self) -> zbus::Result<Vec<u8>>;

    #[zbus(property, name = "WiFiHotspotSSID")]
    fn set_wi_fi_hotspot_ssid(&self, value: Vec<u8>) -> zbus::Result<()>;

    #[zbus(property)]
    fn wi_fi_hotspot_passphrase(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn set_wi_fi_hotspot_passphrase(&self, value: String) -> zbus::Result<()>;

    fn connect(
        &self,
        object: &ObjectPath<'_>,
        user_input_agent: &ObjectPath<'_>,
    ) -> zbus::Result<()>;

    fn disconnect(&self, object: &ObjectPath<'_>) -> zbus::Result<()>;
}

#[proxy(
    interface = "com.luxoft.ConnectivityManager.WiFiAccessPoint",
    default_service = "com.luxoft.ConnectivityManager"
)]
pub trait WiFiAccessPoint {
    #[zbus(property, name = "SSID")]
    fn ssid(&self) -> zbus::Result<Vec<u8>>;

    #[zbus(property)]
    fn strength(&self) -> zbus::Result<u8>;

    #[zbus(property)]
    fn connected(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn security(&self) -> zbus::Result<String>;
}
