//! Publishes the state store on the bus.
//!
//! Registers the manager object and one object per access point, keeps
//! their properties in sync with state events and owns the well-known bus
//! name. Losing the name asks the daemon to quit.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use log::{info, warn};
use tokio::sync::{broadcast, mpsc};
use zbus::object_server::InterfaceRef;
use zbus::{fdo, Connection};
use zvariant::OwnedObjectPath;

use cmrs_core::models::AccessPointId;
use cmrs_core::state::{AccessPointsEvent, Event};
use cmrs_core::{dbus, AccessPoint, State, StateReader};

use crate::backend::Backend;
use crate::backends::TaskGuard;
use crate::daemon::QuitReason;
use crate::dbus_objects::manager::Manager;
use crate::dbus_objects::wifi_access_point::WiFiAccessPoint;

pub struct DBusService {
    _event_task: TaskGuard,
    _name_task: TaskGuard,
}

impl DBusService {
    /// Register all objects, sync them with the current state, start
    /// pumping events and finally request the well-known name.
    pub async fn start(
        connection: &Connection,
        backend: Arc<dyn Backend>,
        events: broadcast::Receiver<Event>,
        quit: mpsc::UnboundedSender<QuitReason>,
    ) -> zbus::Result<Self> {
        let reader = backend.reader();

        connection
            .object_server()
            .at(dbus::MANAGER_PATH, Manager::new(backend))
            .await?;

        let manager = connection
            .object_server()
            .interface::<_, Manager>(dbus::MANAGER_PATH)
            .await?;

        let mut access_points = AccessPointRegistry::new(connection.clone());
        let snapshot = reader.snapshot();
        access_points.reset_from(&snapshot).await;
        manager
            .get()
            .await
            .sync_snapshot(&snapshot, access_points.paths());

        let event_task = tokio::spawn(event_loop(reader, manager, access_points, events));

        connection.request_name(dbus::SERVICE_NAME).await?;
        info!("Acquired D-Bus name {}", dbus::SERVICE_NAME);

        let name_task = tokio::spawn(watch_name_lost(connection.clone(), quit));

        Ok(Self {
            _event_task: TaskGuard::new(event_task),
            _name_task: TaskGuard::new(name_task),
        })
    }
}

async fn watch_name_lost(connection: Connection, quit: mpsc::UnboundedSender<QuitReason>) {
    let Ok(dbus_proxy) = fdo::DBusProxy::new(&connection).await else {
        return;
    };
    let Ok(mut name_lost) = dbus_proxy.receive_name_lost().await else {
        return;
    };

    while let Some(signal) = name_lost.next().await {
        let Ok(args) = signal.args() else { continue };
        if args.name().as_str() == dbus::SERVICE_NAME {
            warn!("Lost D-Bus name {}, quitting", dbus::SERVICE_NAME);
            let _ = quit.send(QuitReason::NameLost);
            break;
        }
    }
}

async fn event_loop(
    reader: StateReader,
    manager: InterfaceRef<Manager>,
    mut access_points: AccessPointRegistry,
    mut events: broadcast::Receiver<Event>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Err(error) = handle_event(&reader, &manager, &mut access_points, event).await
                {
                    warn!("Failed to publish state change: {error}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Missed {missed} state events, resynchronizing");
                if let Err(error) = resync(&reader, &manager, &mut access_points).await {
                    warn!("Failed to resynchronize published state: {error}");
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn handle_event(
    reader: &StateReader,
    manager: &InterfaceRef<Manager>,
    access_points: &mut AccessPointRegistry,
    event: Event,
) -> zbus::Result<()> {
    match event {
        Event::CriticalError => {}

        Event::WiFiStatusChanged(status) => {
            let m = manager.get().await;
            let (available_changed, enabled_changed) = m.apply_status(status);
            if available_changed {
                m.wi_fi_available_changed(manager.signal_context()).await?;
            }
            if enabled_changed {
                m.wi_fi_enabled_changed(manager.signal_context()).await?;
            }
        }

        Event::AccessPointsChanged(kind, access_point) => {
            match kind {
                AccessPointsEvent::AddedAll | AccessPointsEvent::RemovedAll => {
                    let snapshot = reader.snapshot();
                    access_points.reset_from(&snapshot).await;
                }
                AccessPointsEvent::AddedOne => {
                    if let Some(ap) = &access_point {
                        access_points.add(ap).await;
                    }
                }
                AccessPointsEvent::RemovedOne => {
                    if let Some(ap) = &access_point {
                        access_points.remove(ap.id).await;
                    }
                }
                AccessPointsEvent::SsidChanged
                | AccessPointsEvent::StrengthChanged
                | AccessPointsEvent::ConnectedChanged
                | AccessPointsEvent::SecurityChanged => {
                    if let Some(ap) = &access_point {
                        access_points.update(kind, ap).await?;
                    }
                    return Ok(());
                }
            }

            let m = manager.get().await;
            if m.apply_access_points(access_points.paths()) {
                m.wi_fi_access_points_changed(manager.signal_context())
                    .await?;
            }
        }

        Event::WiFiHotspotStatusChanged(status) => {
            let m = manager.get().await;
            if m.apply_hotspot_status(status) {
                m.wi_fi_hotspot_enabled_changed(manager.signal_context())
                    .await?;
            }
        }

        Event::WiFiHotspotSsidChanged(ssid) => {
            let m = manager.get().await;
            if m.apply_hotspot_ssid(ssid) {
                m.wi_fi_hotspot_s_s_i_d_changed(manager.signal_context())
                    .await?;
            }
        }

        Event::WiFiHotspotPassphraseChanged(passphrase) => {
            let m = manager.get().await;
            if m.apply_hotspot_passphrase(passphrase) {
                m.wi_fi_hotspot_passphrase_changed(manager.signal_context())
                    .await?;
            }
        }
    }

    Ok(())
}

async fn resync(
    reader: &StateReader,
    manager: &InterfaceRef<Manager>,
    access_points: &mut AccessPointRegistry,
) -> zbus::Result<()> {
    let snapshot = reader.snapshot();
    access_points.reset_from(&snapshot).await;

    let m = manager.get().await;
    let (available_changed, enabled_changed) = m.apply_status(snapshot.wifi.status);
    if available_changed {
        m.wi_fi_available_changed(manager.signal_context()).await?;
    }
    if enabled_changed {
        m.wi_fi_enabled_changed(manager.signal_context()).await?;
    }
    if m.apply_access_points(access_points.paths()) {
        m.wi_fi_access_points_changed(manager.signal_context())
            .await?;
    }
    if m.apply_hotspot_status(snapshot.wifi.hotspot_status) {
        m.wi_fi_hotspot_enabled_changed(manager.signal_context())
            .await?;
    }
    if m.apply_hotspot_ssid(snapshot.wifi.hotspot_ssid.clone()) {
        m.wi_fi_hotspot_s_s_i_d_changed(manager.signal_context())
            .await?;
    }
    if m.apply_hotspot_passphrase(snapshot.wifi.hotspot_passphrase.clone()) {
        m.wi_fi_hotspot_passphrase_changed(manager.signal_context())
            .await?;
    }

    Ok(())
}

/// Registered access point objects, id-sorted for the published list.
struct AccessPointRegistry {
    connection: Connection,
    registered: HashMap<AccessPointId, OwnedObjectPath>,
}

impl AccessPointRegistry {
    fn new(connection: Connection) -> Self {
        Self {
            connection,
            registered: HashMap::new(),
        }
    }

    /// Object paths of all registered access points, sorted by id so the
    /// list is stable across one inventory snapshot.
    fn paths(&self) -> Vec<OwnedObjectPath> {
        let mut ids: Vec<_> = self.registered.keys().copied().collect();
        ids.sort_unstable();
        ids.iter().map(|id| dbus::access_point_path(*id)).collect()
    }

    async fn reset_from(&mut self, snapshot: &State) {
        let stale: Vec<_> = self.registered.keys().copied().collect();
        for id in stale {
            self.remove(id).await;
        }

        for access_point in snapshot.wifi.access_points.values() {
            self.add(access_point).await;
        }
    }

    async fn add(&mut self, access_point: &AccessPoint) {
        let path = dbus::access_point_path(access_point.id);

        match self
            .connection
            .object_server()
            .at(&path, WiFiAccessPoint::new(access_point))
            .await
        {
            Ok(_) => {
                self.registered.insert(access_point.id, path);
            }
            Err(error) => {
                warn!(
                    "Failed to register access point object {}: {error}",
                    path.as_str()
                );
            }
        }
    }

    async fn remove(&mut self, id: AccessPointId) {
        let Some(path) = self.registered.remove(&id) else {
            return;
        };

        if let Err(error) = self
            .connection
            .object_server()
            .remove::<WiFiAccessPoint, _>(&path)
            .await
        {
            warn!(
                "Failed to unregister access point object {}: {error}",
                path.as_str()
            );
        }
    }

    async fn update(&self, kind: AccessPointsEvent, access_point: &AccessPoint) -> zbus::Result<()> {
        let Some(path) = self.registered.get(&access_point.id) else {
            return Ok(());
        };

        let object = self
            .connection
            .object_server()
            .interface::<_, WiFiAccessPoint>(path)
            .await?;
        let mut ap = object.get_mut().await;

        match kind {
            AccessPointsEvent::SsidChanged => {
                if ap.update_ssid(access_point.ssid.clone()) {
                    ap.s_s_i_d_changed(object.signal_context()).await?;
                }
            }
            AccessPointsEvent::StrengthChanged => {
                if ap.update_strength(access_point.strength) {
                    ap.strength_changed(object.signal_context()).await?;
                }
            }
            AccessPointsEvent::ConnectedChanged => {
                if ap.update_connected(access_point.connected) {
                    ap.connected_changed(object.signal_context()).await?;
                }
            }
            AccessPointsEvent::SecurityChanged => {
                if ap.update_security(access_point.security.as_str()) {
                    ap.security_changed(object.signal_context()).await?;
                }
            }
            _ => {}
        }

        Ok(())
    }
}
