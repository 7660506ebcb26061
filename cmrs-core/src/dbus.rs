//! Bus names and object paths of the connectivity manager D-Bus API.

use zvariant::{ObjectPath, OwnedObjectPath};

use crate::models::{AccessPointId, ACCESS_POINT_ID_NONE};

/// Well-known name the daemon owns on the system bus.
pub const SERVICE_NAME: &str = "com.luxoft.ConnectivityManager";

/// Path of the manager object.
pub const MANAGER_PATH: &str = "/com/luxoft/ConnectivityManager";

/// Prefix under which access point objects are published.
pub const ACCESS_POINT_PATH_PREFIX: &str = "/com/luxoft/ConnectivityManager/WiFiAccessPoints/";

/// Path of the agent object the daemon exposes towards the provider.
pub const PROVIDER_AGENT_PATH: &str = "/com/luxoft/ConnectivityManager/ConnManAgent";

/// Object path of the access point with the given id.
pub fn access_point_path(id: AccessPointId) -> OwnedObjectPath {
    debug_assert_ne!(id, ACCESS_POINT_ID_NONE);

    // The prefix and a decimal u64 always form a valid object path.
    ObjectPath::from_string_unchecked(format!("{ACCESS_POINT_PATH_PREFIX}{id}")).into()
}

/// Extract the access point id from an object path, if it is one of ours.
///
/// The id portion must be a plain decimal number: no sign, no leading or
/// trailing characters of any kind. Returns `None` otherwise.
pub fn access_point_id_from_path(path: &ObjectPath<'_>) -> Option<AccessPointId> {
    let id = path.as_str().strip_prefix(ACCESS_POINT_PATH_PREFIX)?;

    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ObjectPath<'_> {
        ObjectPath::try_from(s).unwrap()
    }

    #[test]
    fn access_point_path_round_trips() {
        let p = access_point_path(42);
        assert_eq!(
            p.as_str(),
            "/com/luxoft/ConnectivityManager/WiFiAccessPoints/42"
        );
        assert_eq!(access_point_id_from_path(&p.as_ref()), Some(42));
    }

    #[test]
    fn id_parsing_is_strict() {
        assert_eq!(
            access_point_id_from_path(&path(
                "/com/luxoft/ConnectivityManager/WiFiAccessPoints/18446744073709551615"
            )),
            Some(u64::MAX)
        );

        // Wrong prefix, empty id, overflow.
        assert_eq!(
            access_point_id_from_path(&path("/com/luxoft/ConnectivityManager/1")),
            None
        );
        assert_eq!(
            access_point_id_from_path(&path(
                "/com/luxoft/ConnectivityManager/WiFiAccessPoints"
            )),
            None
        );
        assert_eq!(
            access_point_id_from_path(&path(
                "/com/luxoft/ConnectivityManager/WiFiAccessPoints/18446744073709551616"
            )),
            None
        );
    }

    #[test]
    fn id_parsing_rejects_non_digits() {
        for bad in ["x", "1x", "1_2"] {
            let p = format!("/com/luxoft/ConnectivityManager/WiFiAccessPoints/{bad}");
            assert_eq!(access_point_id_from_path(&path(&p)), None, "{bad}");
        }
    }
}
