//! Published access point objects.
//!
//! One object per visible access point, registered under
//! `/com/luxoft/ConnectivityManager/WiFiAccessPoints/<id>`. All properties
//! are read-only; the D-Bus service updates them from state events and
//! emits the change notifications.

use zbus::interface;

use cmrs_core::models::AccessPoint;

pub struct WiFiAccessPoint {
    ssid: Vec<u8>,
    strength: u8,
    connected: bool,
    security: String,
}

impl WiFiAccessPoint {
    pub fn new(access_point: &AccessPoint) -> Self {
        Self {
            ssid: access_point.ssid.clone(),
            strength: access_point.strength,
            connected: access_point.connected,
            security: access_point.security.as_str().to_owned(),
        }
    }

    pub fn update_ssid(&mut self, ssid: Vec<u8>) -> bool {
        let changed = self.ssid != ssid;
        self.ssid = ssid;
        changed
    }

    pub fn update_strength(&mut self, strength: u8) -> bool {
        let changed = self.strength != strength;
        self.strength = strength;
        changed
    }

    pub fn update_connected(&mut self, connected: bool) -> bool {
        let changed = self.connected != connected;
        self.connected = connected;
        changed
    }

    pub fn update_security(&mut self, security: &str) -> bool {
        let changed = self.security != security;
        self.security = security.to_owned();
        changed
    }
}

#[interface(name = "com.luxoft.ConnectivityManager.WiFiAccessPoint")]
impl WiFiAccessPoint {
    #[zbus(property, name = "SSID")]
    fn ssid(&self) -> Vec<u8> {
        self.ssid.clone()
    }

    #[zbus(property)]
    fn strength(&self) -> u8 {
        self.strength
    }

    #[zbus(property)]
    fn connected(&self) -> bool {
        self.connected
    }

    #[zbus(property)]
    fn security(&self) -> String {
        self.security.clone()
    }
}
