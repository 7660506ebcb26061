//! Handle for a ConnMan service object (a connectable network).
//!
//! Like [`Technology`](super::technology::Technology), proxy creation is
//! asynchronous and completions travel as [`Msg`]s keyed by object path.
//! A Wi-Fi service is not surfaced as an access point until its proxy is
//! ready.

use std::collections::HashMap;

use futures_util::StreamExt;
use log::warn;
use tokio::sync::mpsc;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use cmrs_core::models::{clamp_strength, WiFiSecurity};

use super::connman_dbus::ConnManServiceProxy;
use super::{byte_from_map, byte_from_value, string_from_map, string_from_value,
    string_list_from_map, string_list_from_value, TaskGuard};
use crate::backends::connman::Msg;
use crate::constants::timeouts;

const PROPERTY_TYPE: &str = "Type";
const PROPERTY_NAME: &str = "Name";
const PROPERTY_SECURITY: &str = "Security";
const PROPERTY_STATE: &str = "State";
const PROPERTY_STRENGTH: &str = "Strength";

const CONTEXT: &str = "ConnMan service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Unknown,
    Bluetooth,
    Ethernet,
    Wifi,
}

impl ServiceKind {
    fn from_str(s: &str) -> Self {
        match s {
            "bluetooth" => ServiceKind::Bluetooth,
            "ethernet" => ServiceKind::Ethernet,
            "wifi" => ServiceKind::Wifi,
            _ => ServiceKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Failure,
    Association,
    Configuration,
    Ready,
    Disconnect,
    Online,
}

impl ServiceState {
    fn from_str(s: &str) -> Self {
        match s {
            "idle" => ServiceState::Idle,
            "failure" => ServiceState::Failure,
            "association" => ServiceState::Association,
            "configuration" => ServiceState::Configuration,
            "ready" => ServiceState::Ready,
            "disconnect" => ServiceState::Disconnect,
            "online" => ServiceState::Online,
            other => {
                warn!("Received unknown ConnMan service state \"{other}\", defaulting to \"idle\"");
                ServiceState::Idle
            }
        }
    }
}

/// Properties that are mapped onto access point fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceProperty {
    Name,
    Security,
    State,
    Strength,
}

pub struct Service {
    path: OwnedObjectPath,
    kind: ServiceKind,
    name: String,
    security: Vec<String>,
    state: ServiceState,
    strength: u8,

    proxy: Option<ConnManServiceProxy<'static>>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    _signal_task: TaskGuard,
}

impl Service {
    pub fn new(
        connection: &Connection,
        path: OwnedObjectPath,
        properties: &HashMap<String, OwnedValue>,
        msg_tx: mpsc::UnboundedSender<Msg>,
    ) -> Self {
        let signal_task = tokio::spawn(create_proxy_and_forward_signals(
            connection.clone(),
            path.clone(),
            msg_tx.clone(),
        ));

        Self {
            kind: ServiceKind::from_str(&string_from_map(properties, PROPERTY_TYPE, CONTEXT)),
            name: string_from_map(properties, PROPERTY_NAME, CONTEXT),
            security: string_list_from_map(properties, PROPERTY_SECURITY, CONTEXT),
            state: ServiceState::from_str(&string_from_map(properties, PROPERTY_STATE, CONTEXT)),
            strength: clamp_strength(byte_from_map(properties, PROPERTY_STRENGTH, CONTEXT, 0)),
            proxy: None,
            msg_tx,
            _signal_task: TaskGuard::new(signal_task),
            path,
        }
    }

    pub fn path(&self) -> &OwnedObjectPath {
        &self.path
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strength(&self) -> u8 {
        self.strength
    }

    pub fn proxy_created(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn set_proxy(&mut self, proxy: ConnManServiceProxy<'static>) {
        self.proxy = Some(proxy);
    }

    /// Whether the service state counts as connected.
    pub fn connected(&self) -> bool {
        matches!(self.state, ServiceState::Ready | ServiceState::Online)
    }

    /// Map the provider's security tag set to the access point security.
    ///
    /// The first tag that maps wins. An unmappable set is reported as an
    /// open network, with a warning.
    pub fn security(&self) -> WiFiSecurity {
        for tag in &self.security {
            let security = match tag.as_str() {
                "none" => Some(WiFiSecurity::None),
                "wep" => Some(WiFiSecurity::Wep),
                "psk" => Some(WiFiSecurity::WpaPsk),
                "ieee8021x" => Some(WiFiSecurity::WpaEap),
                _ => None,
            };

            if let Some(security) = security {
                return security;
            }
        }

        warn!(
            "Failed to convert security ({}) for {} to Wi-Fi security",
            self.security.join(", "),
            self.log_id()
        );

        WiFiSecurity::None
    }

    /// Apply a batch of property changes, as delivered by the manager's
    /// `ServicesChanged` signal. Changes are only reported once the proxy
    /// is ready; before that the service is invisible to the rest of the
    /// daemon anyway.
    pub fn properties_changed(
        &mut self,
        properties: &HashMap<String, OwnedValue>,
    ) -> Vec<ServiceProperty> {
        let mut changed = Vec::new();

        for (name, value) in properties {
            if let Some(property) = self.property_changed(name, value) {
                changed.push(property);
            }
        }

        changed
    }

    /// A single property change. Returns the mapped property if its value
    /// changed and the proxy is ready.
    pub fn property_changed(&mut self, name: &str, value: &Value<'_>) -> Option<ServiceProperty> {
        let changed = match name {
            PROPERTY_NAME => {
                let received = string_from_value(value, name, CONTEXT)?;
                if self.name == received {
                    return None;
                }
                self.name = received;
                Some(ServiceProperty::Name)
            }
            PROPERTY_SECURITY => {
                let received = string_list_from_value(value, name, CONTEXT)?;
                if self.security == received {
                    return None;
                }
                self.security = received;
                Some(ServiceProperty::Security)
            }
            PROPERTY_STATE => {
                let received =
                    ServiceState::from_str(&string_from_value(value, name, CONTEXT)?);
                if self.state == received {
                    return None;
                }
                self.state = received;
                Some(ServiceProperty::State)
            }
            PROPERTY_STRENGTH => {
                let received = clamp_strength(byte_from_value(value, name, CONTEXT)?);
                if self.strength == received {
                    return None;
                }
                self.strength = received;
                Some(ServiceProperty::Strength)
            }
            PROPERTY_TYPE => {
                warn!(
                    "Assumed to be constant property \"{name}\" changed for {}",
                    self.log_id()
                );
                None
            }
            // Many service properties are intentionally left unmapped.
            _ => None,
        };

        changed.filter(|_| self.proxy.is_some())
    }

    /// Issue the provider connect. The outcome arrives as
    /// [`Msg::ServiceConnectFinished`], bounded by the connect timeout.
    pub fn start_connect(&self) {
        let path = self.path.clone();
        let msg_tx = self.msg_tx.clone();
        let log_id = self.log_id();

        let Some(proxy) = self.proxy.clone() else {
            warn!("Can not connect {log_id}, proxy not created");
            let _ = msg_tx.send(Msg::ServiceConnectFinished {
                path,
                success: false,
            });
            return;
        };

        tokio::spawn(async move {
            // AlreadyConnected and InProgress both count as failure here;
            // the service state signal is what flips "connected".
            let success = match tokio::time::timeout(timeouts::CONNECT, proxy.connect()).await {
                Ok(Ok(())) => true,
                Ok(Err(error)) => {
                    warn!("Failed to connect {log_id}: {error}");
                    false
                }
                Err(_) => {
                    warn!("Timed out connecting {log_id}");
                    false
                }
            };

            let _ = msg_tx.send(Msg::ServiceConnectFinished { path, success });
        });
    }

    /// Issue the provider disconnect. Failures are logged and ignored.
    pub fn disconnect(&self) {
        let Some(proxy) = self.proxy.clone() else {
            return;
        };
        let log_id = self.log_id();

        tokio::spawn(async move {
            if let Err(error) = proxy.disconnect().await {
                warn!("Failed to disconnect {log_id}: {error}");
            }
        });
    }

    fn log_id(&self) -> String {
        format!("ConnMan service \"{}\" ({:?})", self.name, self.kind)
    }
}

async fn create_proxy_and_forward_signals(
    connection: Connection,
    path: OwnedObjectPath,
    msg_tx: mpsc::UnboundedSender<Msg>,
) {
    let proxy = match build_proxy(&connection, &path).await {
        Ok(proxy) => proxy,
        Err(error) => {
            warn!(
                "Failed to create D-Bus proxy for ConnMan service {}: {error}",
                path.as_str()
            );
            return;
        }
    };

    let mut changes = match proxy.receive_property_changed().await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(
                "Failed to subscribe to property changes of ConnMan service {}: {error}",
                path.as_str()
            );
            return;
        }
    };

    let _ = msg_tx.send(Msg::ServiceProxyReady {
        path: path.clone(),
        proxy,
    });

    while let Some(signal) = changes.next().await {
        let Ok(args) = signal.args() else {
            continue;
        };

        let Ok(value) = args.value().try_to_owned() else {
            continue;
        };

        let _ = msg_tx.send(Msg::ServicePropertyChanged {
            path: path.clone(),
            name: args.name().clone(),
            value,
        });
    }
}

async fn build_proxy(
    connection: &Connection,
    path: &OwnedObjectPath,
) -> zbus::Result<ConnManServiceProxy<'static>> {
    ConnManServiceProxy::builder(connection)
        .path(path.clone())?
        .build()
        .await
}
