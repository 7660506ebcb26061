//! D-Bus proxies for the ConnMan API.
//!
//! ConnMan does not use `org.freedesktop.DBus.Properties`; objects carry
//! their own `PropertyChanged` signal and `SetProperty` method, and the
//! manager hands out property maps together with object paths.

use std::collections::HashMap;

use zbus::proxy;
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

/// Bus name of the ConnMan daemon.
pub const SERVICE_NAME: &str = "net.connman";

/// Object path plus property map, as used by inventory calls and signals.
pub type ObjectProperties = (OwnedObjectPath, HashMap<String, OwnedValue>);

#[proxy(
    interface = "net.connman.Manager",
    default_service = "net.connman",
    default_path = "/"
)]
pub trait ConnManManager {
    fn get_technologies(&self) -> zbus::Result<Vec<ObjectProperties>>;

    fn get_services(&self) -> zbus::Result<Vec<ObjectProperties>>;

    fn register_agent(&self, path: &ObjectPath<'_>) -> zbus::Result<()>;

    fn unregister_agent(&self, path: &ObjectPath<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    fn technology_added(
        &self,
        path: OwnedObjectPath,
        properties: HashMap<String, OwnedValue>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    fn technology_removed(&self, path: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn services_changed(
        &self,
        changed: Vec<ObjectProperties>,
        removed: Vec<OwnedObjectPath>,
    ) -> zbus::Result<()>;
}

mod technology_proxy {
    use super::*;

    #[proxy(interface = "net.connman.Technology", default_service = "net.connman")]
    pub trait ConnManTechnology {
        fn scan(&self) -> zbus::Result<()>;

        fn set_property(&self, name: &str, value: &Value<'_>) -> zbus::Result<()>;

        #[zbus(signal)]
        fn property_changed(&self, name: String, value: Value<'_>) -> zbus::Result<()>;
    }
}
pub use technology_proxy::ConnManTechnologyProxy;

mod service_proxy {
    use super::*;

    #[proxy(interface = "net.connman.Service", default_service = "net.connman")]
    pub trait ConnManService {
        fn connect(&self) -> zbus::Result<()>;

        fn disconnect(&self) -> zbus::Result<()>;

        #[zbus(signal)]
        fn property_changed(&self, name: String, value: Value<'_>) -> zbus::Result<()>;
    }
}
pub use service_proxy::ConnManServiceProxy;
