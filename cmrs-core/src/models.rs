use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifier of an access point for the lifetime of the daemon process.
///
/// Assigned by the state store, unique among live access points and never
/// equal to [`ACCESS_POINT_ID_NONE`].
pub type AccessPointId = u64;

/// Reserved sentinel, never assigned to a real access point.
pub const ACCESS_POINT_ID_NONE: AccessPointId = 0;

/// Overall Wi-Fi radio status.
///
/// `Disabled` and `Enabled` both imply that a Wi-Fi radio is present;
/// `Unavailable` means the provider has not advertised one (or has gone
/// away entirely).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WiFiStatus {
    Unavailable,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WiFiHotspotStatus {
    Disabled,
    Enabled,
}

/// Security of a Wi-Fi access point.
///
/// Variants are ordered by mapping priority when translating the
/// provider's security tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WiFiSecurity {
    None,
    Wep,
    WpaPsk,
    WpaEap,
}

impl WiFiSecurity {
    /// String form used in the `Security` D-Bus property.
    pub fn as_str(self) -> &'static str {
        match self {
            WiFiSecurity::None => "",
            WiFiSecurity::Wep => "wep",
            WiFiSecurity::WpaPsk => "wpa-psk",
            WiFiSecurity::WpaEap => "wpa-eap",
        }
    }
}

impl Display for WiFiSecurity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A visible Wi-Fi network.
///
/// The SSID is kept as raw bytes: SSIDs predating the 2012 edition of
/// IEEE 802.11 are not required to be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub id: AccessPointId,
    pub ssid: Vec<u8>,
    pub strength: u8,
    pub connected: bool,
    pub security: WiFiSecurity,
}

impl AccessPoint {
    /// SSID as text, with invalid UTF-8 replaced, for display purposes.
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }
}

/// Clamp a provider-reported signal strength into the 0-100 range.
pub fn clamp_strength(value: u8) -> u8 {
    value.min(100)
}

/// Terminal outcome of a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Success,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_strings_match_ipc_surface() {
        assert_eq!(WiFiSecurity::None.as_str(), "");
        assert_eq!(WiFiSecurity::Wep.as_str(), "wep");
        assert_eq!(WiFiSecurity::WpaPsk.as_str(), "wpa-psk");
        assert_eq!(WiFiSecurity::WpaEap.as_str(), "wpa-eap");
    }

    #[test]
    fn strength_is_clamped_to_100() {
        assert_eq!(clamp_strength(0), 0);
        assert_eq!(clamp_strength(100), 100);
        assert_eq!(clamp_strength(101), 100);
        assert_eq!(clamp_strength(255), 100);
    }

    #[test]
    fn ssid_lossy_replaces_invalid_utf8() {
        let ap = AccessPoint {
            id: 1,
            ssid: vec![b'a', 0xff, b'b'],
            strength: 50,
            connected: false,
            security: WiFiSecurity::None,
        };
        assert_eq!(ap.ssid_lossy(), "a\u{fffd}b");
    }
}
