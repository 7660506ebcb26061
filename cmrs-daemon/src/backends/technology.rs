//! Handle for a ConnMan technology object.
//!
//! Wraps asynchronous proxy creation and ConnMan's custom property
//! handling. Read-only properties are plain fields; the writable ones
//! (`Powered`, `Tethering`, `TetheringIdentifier`, `TetheringPassphrase`)
//! go through [`SettableProperty`] cells so that at most one provider
//! write is in flight per property.
//!
//! All asynchronous completions are reported to the adapter as [`Msg`]s
//! carrying this technology's object path; the adapter looks the handle up
//! again on delivery, so completions for a removed technology fall
//! through.

use std::collections::HashMap;

use futures_util::StreamExt;
use log::warn;
use tokio::sync::mpsc;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::connman_dbus::ConnManTechnologyProxy;
use super::settable_property::SettableProperty;
use super::{bool_from_map, bool_from_value, string_from_map, string_from_value, TaskGuard};
use crate::backends::connman::Msg;

const PROPERTY_TYPE: &str = "Type";
const PROPERTY_NAME: &str = "Name";
const PROPERTY_CONNECTED: &str = "Connected";
const PROPERTY_POWERED: &str = "Powered";
const PROPERTY_TETHERING: &str = "Tethering";
const PROPERTY_TETHERING_IDENTIFIER: &str = "TetheringIdentifier";
const PROPERTY_TETHERING_PASSPHRASE: &str = "TetheringPassphrase";

const CONTEXT: &str = "ConnMan technology";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnologyKind {
    Unknown,
    Bluetooth,
    Ethernet,
    Wifi,
}

impl TechnologyKind {
    fn from_str(s: &str) -> Self {
        match s {
            "bluetooth" => TechnologyKind::Bluetooth,
            "ethernet" => TechnologyKind::Ethernet,
            "wifi" => TechnologyKind::Wifi,
            _ => TechnologyKind::Unknown,
        }
    }
}

/// Properties that can change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnologyProperty {
    Connected,
    Powered,
    Tethering,
    TetheringIdentifier,
    TetheringPassphrase,
}

impl TechnologyProperty {
    fn name(self) -> &'static str {
        match self {
            TechnologyProperty::Connected => PROPERTY_CONNECTED,
            TechnologyProperty::Powered => PROPERTY_POWERED,
            TechnologyProperty::Tethering => PROPERTY_TETHERING,
            TechnologyProperty::TetheringIdentifier => PROPERTY_TETHERING_IDENTIFIER,
            TechnologyProperty::TetheringPassphrase => PROPERTY_TETHERING_PASSPHRASE,
        }
    }
}

pub struct Technology {
    path: OwnedObjectPath,
    kind: TechnologyKind,
    name: String,
    connected: bool,

    powered: SettableProperty<bool>,
    tethering: SettableProperty<bool>,
    tethering_identifier: SettableProperty<String>,
    tethering_passphrase: SettableProperty<String>,

    proxy: Option<ConnManTechnologyProxy<'static>>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    _signal_task: TaskGuard,
}

impl Technology {
    /// Create the handle and start asynchronous proxy creation. The
    /// adapter receives [`Msg::TechnologyProxyReady`] once the proxy and
    /// its signal subscription are up; until then the technology is not
    /// considered usable.
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
            kind: TechnologyKind::from_str(&string_from_map(properties, PROPERTY_TYPE, CONTEXT)),
            name: string_from_map(properties, PROPERTY_NAME, CONTEXT),
            connected: bool_from_map(properties, PROPERTY_CONNECTED, CONTEXT, false),
            powered: SettableProperty::new(bool_from_map(
                properties,
                PROPERTY_POWERED,
                CONTEXT,
                false,
            )),
            tethering: SettableProperty::new(bool_from_map(
                properties,
                PROPERTY_TETHERING,
                CONTEXT,
                false,
            )),
            tethering_identifier: SettableProperty::new(string_from_map(
                properties,
                PROPERTY_TETHERING_IDENTIFIER,
                CONTEXT,
            )),
            tethering_passphrase: SettableProperty::new(string_from_map(
                properties,
                PROPERTY_TETHERING_PASSPHRASE,
                CONTEXT,
            )),
            proxy: None,
            msg_tx,
            _signal_task: TaskGuard::new(signal_task),
            path,
        }
    }

    pub fn path(&self) -> &OwnedObjectPath {
        &self.path
    }

    pub fn kind(&self) -> TechnologyKind {
        self.kind
    }

    pub fn proxy_created(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn set_proxy(&mut self, proxy: ConnManTechnologyProxy<'static>) {
        self.proxy = Some(proxy);
    }

    pub fn powered(&self) -> bool {
        *self.powered.value()
    }

    pub fn tethering(&self) -> bool {
        *self.tethering.value()
    }

    pub fn tethering_identifier(&self) -> &str {
        self.tethering_identifier.value()
    }

    pub fn tethering_passphrase(&self) -> &str {
        self.tethering_passphrase.value()
    }

    /// Request a provider write. Returns whether the observed value
    /// changed (a change notification is due).
    pub fn set_powered(&mut self, powered: bool) -> bool {
        let outcome = self.powered.set(powered);
        if let Some(value) = outcome.issue {
            self.issue_write(TechnologyProperty::Powered, Value::from(value));
        }
        outcome.changed
    }

    pub fn set_tethering(&mut self, tethering: bool) -> bool {
        let outcome = self.tethering.set(tethering);
        if let Some(value) = outcome.issue {
            self.issue_write(TechnologyProperty::Tethering, Value::from(value));
        }
        outcome.changed
    }

    pub fn set_tethering_identifier(&mut self, identifier: String) -> bool {
        let outcome = self.tethering_identifier.set(identifier);
        if let Some(value) = outcome.issue {
            self.issue_write(TechnologyProperty::TetheringIdentifier, Value::from(value));
        }
        outcome.changed
    }

    pub fn set_tethering_passphrase(&mut self, passphrase: String) -> bool {
        let outcome = self.tethering_passphrase.set(passphrase);
        if let Some(value) = outcome.issue {
            self.issue_write(TechnologyProperty::TetheringPassphrase, Value::from(value));
        }
        outcome.changed
    }

    /// A provider write completed. May issue a queued write; returns
    /// whether the observed value changed.
    pub fn write_finished(&mut self, property: TechnologyProperty, success: bool) -> bool {
        match property {
            TechnologyProperty::Powered => {
                let outcome = self.powered.write_finished(success);
                if let Some(value) = outcome.issue {
                    self.issue_write(property, Value::from(value));
                }
                outcome.changed
            }
            TechnologyProperty::Tethering => {
                let outcome = self.tethering.write_finished(success);
                if let Some(value) = outcome.issue {
                    self.issue_write(property, Value::from(value));
                }
                outcome.changed
            }
            TechnologyProperty::TetheringIdentifier => {
                let outcome = self.tethering_identifier.write_finished(success);
                if let Some(value) = outcome.issue {
                    self.issue_write(property, Value::from(value));
                }
                outcome.changed
            }
            TechnologyProperty::TetheringPassphrase => {
                let outcome = self.tethering_passphrase.write_finished(success);
                if let Some(value) = outcome.issue {
                    self.issue_write(property, Value::from(value));
                }
                outcome.changed
            }
            TechnologyProperty::Connected => false,
        }
    }

    /// A `PropertyChanged` signal arrived. Returns the property whose
    /// observed value changed, if any.
    pub fn provider_property_changed(
        &mut self,
        name: &str,
        value: &Value<'_>,
    ) -> Option<TechnologyProperty> {
        match name {
            PROPERTY_CONNECTED => {
                let received = bool_from_value(value, name, CONTEXT)?;
                if self.connected == received {
                    return None;
                }
                self.connected = received;
                Some(TechnologyProperty::Connected)
            }
            PROPERTY_POWERED => bool_from_value(value, name, CONTEXT)
                .filter(|v| self.powered.received_from_provider(*v))
                .map(|_| TechnologyProperty::Powered),
            PROPERTY_TETHERING => bool_from_value(value, name, CONTEXT)
                .filter(|v| self.tethering.received_from_provider(*v))
                .map(|_| TechnologyProperty::Tethering),
            PROPERTY_TETHERING_IDENTIFIER => string_from_value(value, name, CONTEXT)
                .map(|v| self.tethering_identifier.received_from_provider(v))
                .filter(|changed| *changed)
                .map(|_| TechnologyProperty::TetheringIdentifier),
            PROPERTY_TETHERING_PASSPHRASE => string_from_value(value, name, CONTEXT)
                .map(|v| self.tethering_passphrase.received_from_provider(v))
                .filter(|changed| *changed)
                .map(|_| TechnologyProperty::TetheringPassphrase),
            PROPERTY_TYPE | PROPERTY_NAME => {
                warn!(
                    "Assumed to be constant property \"{name}\" changed for {}",
                    self.log_id()
                );
                None
            }
            _ => {
                warn!("Received unknown property \"{name}\" for {}", self.log_id());
                None
            }
        }
    }

    /// Ask the provider to scan. Failures are logged and ignored.
    pub fn scan(&self) {
        let Some(proxy) = self.proxy.clone() else {
            return;
        };
        let log_id = self.log_id();

        tokio::spawn(async move {
            if let Err(error) = proxy.scan().await {
                warn!("Failed to scan {log_id}: {error}");
            }
        });
    }

    fn issue_write(&self, property: TechnologyProperty, value: Value<'static>) {
        let path = self.path.clone();
        let msg_tx = self.msg_tx.clone();
        let log_id = self.log_id();

        let Some(proxy) = self.proxy.clone() else {
            warn!(
                "Can not set property \"{}\" for {log_id}, proxy not created",
                property.name()
            );
            let _ = msg_tx.send(Msg::TechnologyWriteFinished {
                path,
                property,
                success: false,
            });
            return;
        };

        tokio::spawn(async move {
            let success = match proxy.set_property(property.name(), &value).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        "Failed to set property \"{}\" for {log_id}: {error}",
                        property.name()
                    );
                    false
                }
            };

            let _ = msg_tx.send(Msg::TechnologyWriteFinished {
                path,
                property,
                success,
            });
        });
    }

    fn log_id(&self) -> String {
        format!("ConnMan technology \"{}\" ({:?})", self.name, self.kind)
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
                "Failed to create D-Bus proxy for ConnMan technology {}: {error}",
                path.as_str()
            );
            return;
        }
    };

    let mut changes = match proxy.receive_property_changed().await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(
                "Failed to subscribe to property changes of ConnMan technology {}: {error}",
                path.as_str()
            );
            return;
        }
    };

    let _ = msg_tx.send(Msg::TechnologyProxyReady {
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

        let _ = msg_tx.send(Msg::TechnologyPropertyChanged {
            path: path.clone(),
            name: args.name().clone(),
            value,
        });
    }
}

async fn build_proxy(
    connection: &Connection,
    path: &OwnedObjectPath,
) -> zbus::Result<ConnManTechnologyProxy<'static>> {
    ConnManTechnologyProxy::builder(connection)
        .path(path.clone())?
        .build()
        .await
}
