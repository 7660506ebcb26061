//! The manager object, `com.luxoft.ConnectivityManager`.
//!
//! Exposes the Wi-Fi properties and the `Connect`/`Disconnect` operations.
//! Property reads are served from a local mirror that the D-Bus service
//! keeps in sync with state events; writes validate against live state and
//! forward to the backend.
//!
//! A `Connect` call is held open on the wire until the backend reports the
//! terminal result. While it is open, the coordinator tracks the caller's
//! credential agent: prompts arriving from the provider are forwarded to
//! the agent, and a caller that drops off the bus simply gets no more
//! prompts (each pending prompt is then answered with absent credentials,
//! which the provider treats as a failed connect).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use log::warn;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use zbus::message::Header;
use zbus::names::OwnedUniqueName;
use zbus::{fdo, interface, proxy, Connection};
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue};

use cmrs_core::{
    dbus, AccessPointId, ConnectResult, Credentials, RequestedCredentials, State, WiFiHotspotStatus,
    WiFiStatus,
};

use crate::backend::{Backend, CredentialsRequest};
use crate::constants::timeouts;

/// Client-side credential agent, called back by the daemon.
#[proxy(interface = "com.luxoft.ConnectivityManager.UserInputAgent")]
trait UserInputAgent {
    fn request_credentials(
        &self,
        description_type: &str,
        description_id: &str,
        requested: HashMap<String, OwnedValue>,
    ) -> zbus::Result<HashMap<String, OwnedValue>>;
}

#[derive(Default)]
struct WiFiMirror {
    available: bool,
    enabled: bool,
    access_points: Vec<OwnedObjectPath>,
    hotspot_enabled: bool,
    hotspot_ssid: Vec<u8>,
    hotspot_passphrase: String,
}

pub struct Manager {
    backend: Arc<dyn Backend>,
    wifi: Mutex<WiFiMirror>,
    pending_connects: PendingConnects,
}

impl Manager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            wifi: Mutex::new(WiFiMirror::default()),
            pending_connects: PendingConnects::default(),
        }
    }

    fn mirror(&self) -> MutexGuard<'_, WiFiMirror> {
        self.wifi.lock().expect("wifi mirror lock poisoned")
    }

    /// Replace the whole mirror from a state snapshot.
    pub fn sync_snapshot(&self, state: &State, access_points: Vec<OwnedObjectPath>) {
        let mut wifi = self.mirror();
        wifi.available = state.wifi.status != WiFiStatus::Unavailable;
        wifi.enabled = state.wifi.status == WiFiStatus::Enabled;
        wifi.access_points = access_points;
        wifi.hotspot_enabled = state.wifi.hotspot_status == WiFiHotspotStatus::Enabled;
        wifi.hotspot_ssid = state.wifi.hotspot_ssid.clone();
        wifi.hotspot_passphrase = state.wifi.hotspot_passphrase.clone();
    }

    /// Returns which of (available, enabled) changed.
    pub fn apply_status(&self, status: WiFiStatus) -> (bool, bool) {
        let available = status != WiFiStatus::Unavailable;
        let enabled = status == WiFiStatus::Enabled;

        let mut wifi = self.mirror();
        let changed = (wifi.available != available, wifi.enabled != enabled);
        wifi.available = available;
        wifi.enabled = enabled;
        changed
    }

    pub fn apply_access_points(&self, access_points: Vec<OwnedObjectPath>) -> bool {
        let mut wifi = self.mirror();
        let changed = wifi.access_points != access_points;
        wifi.access_points = access_points;
        changed
    }

    pub fn apply_hotspot_status(&self, status: WiFiHotspotStatus) -> bool {
        let enabled = status == WiFiHotspotStatus::Enabled;
        let mut wifi = self.mirror();
        let changed = wifi.hotspot_enabled != enabled;
        wifi.hotspot_enabled = enabled;
        changed
    }

    pub fn apply_hotspot_ssid(&self, ssid: Vec<u8>) -> bool {
        let mut wifi = self.mirror();
        let changed = wifi.hotspot_ssid != ssid;
        wifi.hotspot_ssid = ssid;
        changed
    }

    pub fn apply_hotspot_passphrase(&self, passphrase: String) -> bool {
        let mut wifi = self.mirror();
        let changed = wifi.hotspot_passphrase != passphrase;
        wifi.hotspot_passphrase = passphrase;
        changed
    }

    fn known_access_point(&self, path: &ObjectPath<'_>) -> Option<AccessPointId> {
        let id = dbus::access_point_id_from_path(path)?;
        self.backend.reader().access_point(id).map(|_| id)
    }
}

#[interface(name = "com.luxoft.ConnectivityManager")]
impl Manager {
    #[zbus(property)]
    async fn wi_fi_available(&self) -> bool {
        self.mirror().available
    }

    #[zbus(property)]
    async fn wi_fi_enabled(&self) -> bool {
        self.mirror().enabled
    }

    #[zbus(property)]
    async fn set_wi_fi_enabled(&self, value: bool) -> zbus::Result<()> {
        if value && !self.backend.reader().wifi_available() {
            return Err(fdo::Error::Failed(
                "Unable to set WiFiEnabled property to true, WiFi not available".to_owned(),
            )
            .into());
        }

        {
            let mut wifi = self.mirror();
            if wifi.enabled == value {
                return Ok(());
            }
            wifi.enabled = value;
        }

        if value != self.backend.reader().wifi_enabled() {
            if value {
                self.backend.wifi_enable().await;
            } else {
                self.backend.wifi_disable().await;
            }
        }

        Ok(())
    }

    #[zbus(property)]
    async fn wi_fi_access_points(&self) -> Vec<OwnedObjectPath> {
        self.mirror().access_points.clone()
    }

    #[zbus(property)]
    async fn wi_fi_hotspot_enabled(&self) -> bool {
        self.mirror().hotspot_enabled
    }

    #[zbus(property)]
    async fn set_wi_fi_hotspot_enabled(&self, value: bool) -> zbus::Result<()> {
        if value && !self.backend.reader().wifi_available() {
            return Err(fdo::Error::Failed(
                "Unable to set WiFiHotspotEnabled property to true, WiFi not available".to_owned(),
            )
            .into());
        }

        {
            let mut wifi = self.mirror();
            if wifi.hotspot_enabled == value {
                return Ok(());
            }
            wifi.hotspot_enabled = value;
        }

        if value != self.backend.reader().wifi_hotspot_enabled() {
            if value {
                self.backend.wifi_hotspot_enable().await;
            } else {
                self.backend.wifi_hotspot_disable().await;
            }
        }

        Ok(())
    }

    #[zbus(property, name = "WiFiHotspotSSID")]
    async fn wi_fi_hotspot_ssid(&self) -> Vec<u8> {
        self.mirror().hotspot_ssid.clone()
    }

    #[zbus(property, name = "WiFiHotspotSSID")]
    async fn set_wi_fi_hotspot_ssid(&self, value: Vec<u8>) -> zbus::Result<()> {
        if !self.backend.reader().wifi_available() {
            return Err(fdo::Error::Failed(
                "Unable to set WiFiHotspotSSID property, WiFi not available".to_owned(),
            )
            .into());
        }

        {
            let mut wifi = self.mirror();
            if wifi.hotspot_ssid == value {
                return Ok(());
            }
            wifi.hotspot_ssid = value.clone();
        }

        if self.backend.reader().snapshot().wifi.hotspot_ssid != value {
            self.backend.wifi_hotspot_change_ssid(value).await;
        }

        Ok(())
    }

    #[zbus(property)]
    async fn wi_fi_hotspot_passphrase(&self) -> String {
        self.mirror().hotspot_passphrase.clone()
    }

    #[zbus(property)]
    async fn set_wi_fi_hotspot_passphrase(&self, value: String) -> zbus::Result<()> {
        if !self.backend.reader().wifi_available() {
            return Err(fdo::Error::Failed(
                "Unable to set WiFiHotspotPassphrase property, WiFi not available".to_owned(),
            )
            .into());
        }

        {
            let mut wifi = self.mirror();
            if wifi.hotspot_passphrase == value {
                return Ok(());
            }
            wifi.hotspot_passphrase = value.clone();
        }

        if self.backend.reader().snapshot().wifi.hotspot_passphrase != value {
            self.backend.wifi_hotspot_change_passphrase(value).await;
        }

        Ok(())
    }

    /// Connect to the access point at `object`, prompting for credentials
    /// through the agent object the caller serves at `user_input_agent`.
    /// The reply is sent when the attempt has succeeded or failed.
    async fn connect(
        &self,
        object: ObjectPath<'_>,
        user_input_agent: ObjectPath<'_>,
        #[zbus(header)] header: Header<'_>,
        #[zbus(connection)] connection: &Connection,
    ) -> fdo::Result<()> {
        if self.pending_connects.contains(&object) {
            return Err(fdo::Error::Failed(format!(
                "Can not connect \"{object}\", already connecting"
            )));
        }

        let Some(id) = self.known_access_point(&object) else {
            return Err(fdo::Error::InvalidArgs(format!(
                "Can not connect \"{object}\", unknown object"
            )));
        };

        let Some(sender) = header.sender() else {
            return Err(fdo::Error::Failed(
                "Connect call without a sender".to_owned(),
            ));
        };

        let object: OwnedObjectPath = object.into();

        if !self.pending_connects.add(
            object.clone(),
            OwnedUniqueName::from(sender.to_owned()),
            user_input_agent.into(),
            connection,
        ) {
            return Err(fdo::Error::Failed(format!(
                "Can not connect \"{object}\", already connecting"
            )));
        }

        let (finished_tx, finished_rx) = oneshot::channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(run_credentials_pump(
            connection.clone(),
            self.pending_connects.clone(),
            object.clone(),
            request_rx,
        ));

        let _cleanup = ConnectCleanup {
            pending_connects: self.pending_connects.clone(),
            object: object.clone(),
            pump,
        };

        self.backend.wifi_connect(id, finished_tx, request_tx).await;

        match finished_rx.await.unwrap_or(ConnectResult::Failed) {
            ConnectResult::Success => Ok(()),
            ConnectResult::Failed => Err(fdo::Error::Failed(format!(
                "Failed to connect to {object}"
            ))),
        }
    }

    /// Ask the backend to disconnect the access point. Returns as soon as
    /// the request is accepted.
    async fn disconnect(&self, object: ObjectPath<'_>) -> fdo::Result<()> {
        let Some(id) = self.known_access_point(&object) else {
            return Err(fdo::Error::InvalidArgs(format!(
                "Can not disconnect \"{object}\", unknown object"
            )));
        };

        self.backend.wifi_disconnect(id).await;

        Ok(())
    }
}

/// In-flight client connect calls, keyed by access point object path.
#[derive(Clone, Default)]
struct PendingConnects {
    map: Arc<Mutex<HashMap<OwnedObjectPath, PendingConnect>>>,
}

struct PendingConnect {
    user_input_agent: Option<AgentRef>,
    _vanish_watcher: VanishWatcher,
}

#[derive(Clone)]
struct AgentRef {
    owner: OwnedUniqueName,
    path: OwnedObjectPath,
}

/// Name-vanish watcher scoped to one pending connect entry.
struct VanishWatcher(JoinHandle<()>);

impl Drop for VanishWatcher {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl PendingConnects {
    fn lock(&self) -> MutexGuard<'_, HashMap<OwnedObjectPath, PendingConnect>> {
        self.map.lock().expect("pending connects lock poisoned")
    }

    fn contains(&self, object: &ObjectPath<'_>) -> bool {
        self.lock().contains_key(&OwnedObjectPath::from(object.to_owned()))
    }

    /// Insert an entry and start watching the caller's bus name. Returns
    /// false if a connect for `object` is already in flight.
    fn add(
        &self,
        object: OwnedObjectPath,
        owner: OwnedUniqueName,
        agent_path: OwnedObjectPath,
        connection: &Connection,
    ) -> bool {
        let mut map = self.lock();
        if map.contains_key(&object) {
            return false;
        }

        let watcher = VanishWatcher(tokio::spawn(watch_client_vanished(
            connection.clone(),
            owner.clone(),
            self.clone(),
            object.clone(),
        )));

        map.insert(
            object,
            PendingConnect {
                user_input_agent: Some(AgentRef {
                    owner,
                    path: agent_path,
                }),
                _vanish_watcher: watcher,
            },
        );

        true
    }

    fn agent_ref(&self, object: &OwnedObjectPath) -> Option<AgentRef> {
        self.lock().get(object)?.user_input_agent.clone()
    }

    /// The client dropped off the bus: forget its agent. Subsequent
    /// credential prompts are answered with absent credentials.
    fn clear_agent(&self, object: &OwnedObjectPath) {
        if let Some(pending) = self.lock().get_mut(object) {
            pending.user_input_agent = None;
        }
    }

    fn remove(&self, object: &OwnedObjectPath) {
        self.lock().remove(object);
    }
}

/// Removes the pending entry and stops the prompt pump when the connect
/// call resolves, including when its future is dropped mid-flight.
struct ConnectCleanup {
    pending_connects: PendingConnects,
    object: OwnedObjectPath,
    pump: JoinHandle<()>,
}

impl Drop for ConnectCleanup {
    fn drop(&mut self) {
        self.pump.abort();
        self.pending_connects.remove(&self.object);
    }
}

async fn watch_client_vanished(
    connection: Connection,
    owner: OwnedUniqueName,
    pending_connects: PendingConnects,
    object: OwnedObjectPath,
) {
    let Ok(dbus_proxy) = fdo::DBusProxy::new(&connection).await else {
        return;
    };

    let Ok(mut owner_changed) = dbus_proxy
        .receive_name_owner_changed_with_args(&[(0, owner.as_str())])
        .await
    else {
        return;
    };

    while let Some(signal) = owner_changed.next().await {
        let Ok(args) = signal.args() else { continue };
        if args.new_owner().is_none() {
            pending_connects.clear_agent(&object);
            break;
        }
    }
}

/// Forward credential prompts for one connect call to the client's agent.
async fn run_credentials_pump(
    connection: Connection,
    pending_connects: PendingConnects,
    object: OwnedObjectPath,
    mut requests: mpsc::UnboundedReceiver<CredentialsRequest>,
) {
    while let Some(request) = requests.recv().await {
        let reply = request_credentials_from_client(
            &connection,
            &pending_connects,
            &object,
            request.requested,
        )
        .await;

        let _ = request.reply.send(reply);
    }
}

async fn request_credentials_from_client(
    connection: &Connection,
    pending_connects: &PendingConnects,
    object: &OwnedObjectPath,
    requested: RequestedCredentials,
) -> Option<Credentials> {
    let agent = pending_connects.agent_ref(object)?;

    let proxy = match UserInputAgentProxy::builder(connection)
        .destination(agent.owner.clone())
        .and_then(|builder| builder.path(agent.path.clone()))
    {
        Ok(builder) => match builder.build().await {
            Ok(proxy) => proxy,
            Err(error) => {
                warn!("Failed to create user input agent proxy for {object}: {error}");
                return None;
            }
        },
        Err(error) => {
            warn!("Failed to create user input agent proxy for {object}: {error}");
            return None;
        }
    };

    let wire = match requested.credentials.to_wire() {
        Ok(wire) => wire,
        Err(error) => {
            warn!("Failed to encode requested credentials for {object}: {error}");
            return None;
        }
    };

    let call = proxy.request_credentials(
        &requested.description_type,
        &requested.description_id,
        wire,
    );

    let reply = match tokio::time::timeout(timeouts::REQUEST_CREDENTIALS, call).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(error)) => {
            warn!("RequestCredentials() for {object} failed: {error}");
            return None;
        }
        Err(_) => {
            warn!("RequestCredentials() for {object} timed out");
            return None;
        }
    };

    match Credentials::from_wire(&reply) {
        Ok(credentials) => Some(credentials),
        Err(error) => {
            warn!("Invalid credentials reply for {object}: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use cmrs_core::{Event, StateReader, StateStore};

    use crate::backend::{ConnectFinished, RequestCredentials};

    #[derive(Default)]
    struct Calls {
        wifi_enable: AtomicUsize,
        wifi_disable: AtomicUsize,
        hotspot_enable: AtomicUsize,
        hotspot_disable: AtomicUsize,
    }

    struct MockBackend {
        reader: StateReader,
        events: broadcast::Sender<Event>,
        calls: Calls,
    }

    impl MockBackend {
        fn with_status(status: WiFiStatus) -> Arc<Self> {
            let mut store = StateStore::new();
            store.set_wifi_status(status);

            Arc::new(Self {
                reader: store.reader(),
                events: store.event_sender(),
                calls: Calls::default(),
            })
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn reader(&self) -> StateReader {
            self.reader.clone()
        }

        fn subscribe(&self) -> broadcast::Receiver<Event> {
            self.events.subscribe()
        }

        async fn wifi_enable(&self) {
            self.calls.wifi_enable.fetch_add(1, Ordering::SeqCst);
        }

        async fn wifi_disable(&self) {
            self.calls.wifi_disable.fetch_add(1, Ordering::SeqCst);
        }

        async fn wifi_connect(
            &self,
            _access_point: AccessPointId,
            finished: ConnectFinished,
            _request_credentials: RequestCredentials,
        ) {
            let _ = finished.send(ConnectResult::Failed);
        }

        async fn wifi_disconnect(&self, _access_point: AccessPointId) {}

        async fn wifi_hotspot_enable(&self) {
            self.calls.hotspot_enable.fetch_add(1, Ordering::SeqCst);
        }

        async fn wifi_hotspot_disable(&self) {
            self.calls.hotspot_disable.fetch_add(1, Ordering::SeqCst);
        }

        async fn wifi_hotspot_change_ssid(&self, _ssid: Vec<u8>) {}

        async fn wifi_hotspot_change_passphrase(&self, _passphrase: String) {}
    }

    #[tokio::test]
    async fn enabling_hotspot_while_unavailable_fails() {
        let backend = MockBackend::with_status(WiFiStatus::Unavailable);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);

        assert!(manager.set_wi_fi_hotspot_enabled(true).await.is_err());
        assert_eq!(backend.calls.hotspot_enable.load(Ordering::SeqCst), 0);
        assert!(!manager.wi_fi_hotspot_enabled().await);
    }

    #[tokio::test]
    async fn enabling_wifi_while_unavailable_fails() {
        let backend = MockBackend::with_status(WiFiStatus::Unavailable);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);

        assert!(manager.set_wi_fi_enabled(true).await.is_err());
        assert_eq!(backend.calls.wifi_enable.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabling_wifi_is_always_accepted() {
        let backend = MockBackend::with_status(WiFiStatus::Unavailable);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);

        assert!(manager.set_wi_fi_enabled(false).await.is_ok());
    }

    #[tokio::test]
    async fn enabling_hotspot_forwards_to_the_backend() {
        let backend = MockBackend::with_status(WiFiStatus::Enabled);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);

        assert!(manager.set_wi_fi_hotspot_enabled(true).await.is_ok());
        assert_eq!(backend.calls.hotspot_enable.load(Ordering::SeqCst), 1);
        assert!(manager.wi_fi_hotspot_enabled().await);
    }

    #[tokio::test]
    async fn enabling_wifi_already_enabled_does_not_forward() {
        let backend = MockBackend::with_status(WiFiStatus::Enabled);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);
        manager.sync_snapshot(&backend.reader.snapshot(), Vec::new());

        assert!(manager.set_wi_fi_enabled(true).await.is_ok());
        assert_eq!(backend.calls.wifi_enable.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn setting_a_property_to_its_current_value_changes_nothing() {
        let backend = MockBackend::with_status(WiFiStatus::Enabled);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);
        manager.sync_snapshot(&backend.reader.snapshot(), Vec::new());

        assert!(manager
            .set_wi_fi_hotspot_passphrase("secret".to_owned())
            .await
            .is_ok());
        assert_eq!(manager.wi_fi_hotspot_passphrase().await, "secret");

        // Same value again: accepted, mirror untouched, nothing forwarded.
        assert!(manager
            .set_wi_fi_hotspot_enabled(false)
            .await
            .is_ok());
        assert_eq!(backend.calls.hotspot_disable.load(Ordering::SeqCst), 0);
        assert!(manager
            .set_wi_fi_hotspot_passphrase("secret".to_owned())
            .await
            .is_ok());
        assert_eq!(manager.wi_fi_hotspot_passphrase().await, "secret");
    }

    #[tokio::test]
    async fn status_sync_reports_what_changed() {
        let backend = MockBackend::with_status(WiFiStatus::Unavailable);
        let manager = Manager::new(Arc::clone(&backend) as Arc<dyn Backend>);

        assert_eq!(manager.apply_status(WiFiStatus::Enabled), (true, true));
        assert_eq!(manager.apply_status(WiFiStatus::Enabled), (false, false));
        assert_eq!(manager.apply_status(WiFiStatus::Disabled), (false, true));
        assert_eq!(manager.apply_status(WiFiStatus::Unavailable), (true, false));
    }
}
