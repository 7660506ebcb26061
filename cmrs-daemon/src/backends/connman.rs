//! Backend implementation for ConnMan.
//!
//! See `doc/overview-api.txt` in the ConnMan repo for an overview of its
//! D-Bus API. The adapter is a single task owning the state store and an
//! inventory of [`Technology`] and [`Service`] handles keyed by object
//! path. Everything that happens asynchronously (commands from the IPC
//! layer, provider signals, proxy creations, call completions, agent
//! calls) is funneled into one [`Msg`] channel, so all state transitions
//! run in one scheduling domain and in arrival order.
//!
//! Completions carry the object path of the handle they belong to and the
//! handler looks the handle up again; a completion for a removed object is
//! silently dropped.
//!
//! The agent is registered with ConnMan as soon as ConnMan appears on the
//! bus. If registration failed or the agent was released, another attempt
//! is made when a connect is requested. Connects issued before the agent
//! is registered wait in the connect queue.
//!
//! ConnMan uses UTF-8 strings for SSIDs in its D-Bus interface even though
//! SSIDs are not necessarily UTF-8; byte SSIDs are converted lossily where
//! the interface demands text.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{error, warn};
use tokio::sync::{broadcast, mpsc};
use zbus::names::BusName;
use zbus::{fdo, Connection};
use zvariant::{OwnedObjectPath, OwnedValue};

use cmrs_core::{
    dbus, AccessPoint, AccessPointId, ConnectResult, Credentials, Event, RequestedCredentials,
    StateReader, StateStore, WiFiHotspotStatus, WiFiStatus,
};

use super::agent::{AgentCall, AgentState, ConnManAgent};
use super::connect_queue::ConnectQueue;
use super::connman_dbus::{
    ConnManManagerProxy, ConnManServiceProxy, ConnManTechnologyProxy, ObjectProperties,
    SERVICE_NAME,
};
use super::service::{Service, ServiceKind, ServiceProperty};
use super::technology::{Technology, TechnologyKind, TechnologyProperty};
use super::TaskGuard;
use crate::backend::{Backend, ConnectFinished, RequestCredentials};

/// Commands from the IPC layer.
enum Command {
    WiFiEnable,
    WiFiDisable,
    WiFiConnect {
        access_point: AccessPointId,
        finished: ConnectFinished,
        request_credentials: RequestCredentials,
    },
    WiFiDisconnect {
        access_point: AccessPointId,
    },
    WiFiHotspotEnable,
    WiFiHotspotDisable,
    WiFiHotspotChangeSsid(Vec<u8>),
    WiFiHotspotChangePassphrase(String),
}

/// Everything the adapter task reacts to.
pub enum Msg {
    Command(Command),
    ProviderAvailable(bool),
    TechnologyAdded {
        path: OwnedObjectPath,
        properties: HashMap<String, OwnedValue>,
    },
    TechnologyRemoved {
        path: OwnedObjectPath,
    },
    TechnologyProxyReady {
        path: OwnedObjectPath,
        proxy: ConnManTechnologyProxy<'static>,
    },
    TechnologyPropertyChanged {
        path: OwnedObjectPath,
        name: String,
        value: OwnedValue,
    },
    TechnologyWriteFinished {
        path: OwnedObjectPath,
        property: TechnologyProperty,
        success: bool,
    },
    ServicesChanged {
        changed: Vec<ObjectProperties>,
        removed: Vec<OwnedObjectPath>,
    },
    ServiceProxyReady {
        path: OwnedObjectPath,
        proxy: ConnManServiceProxy<'static>,
    },
    ServicePropertyChanged {
        path: OwnedObjectPath,
        name: String,
        value: OwnedValue,
    },
    ServiceConnectFinished {
        path: OwnedObjectPath,
        success: bool,
    },
    AgentRegistered {
        success: bool,
    },
    Agent(AgentCall),
}

/// Cloneable handle implementing [`Backend`] over the adapter task.
pub struct ConnManBackend {
    messages: mpsc::UnboundedSender<Msg>,
    reader: StateReader,
    events: broadcast::Sender<Event>,
}

impl ConnManBackend {
    /// Spawn the adapter task. The task owns `store` from here on; state
    /// is only reachable through the returned handle.
    pub fn start(store: StateStore, connection: Connection) -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let handle = Self {
            messages: msg_tx.clone(),
            reader: store.reader(),
            events: store.event_sender(),
        };

        tokio::spawn(run(store, connection, msg_tx, msg_rx));

        handle
    }

    fn send(&self, command: Command) {
        // Failure means the adapter task is gone, which only happens on a
        // critical error; the daemon is exiting already.
        let _ = self.messages.send(Msg::Command(command));
    }
}

#[async_trait]
impl Backend for ConnManBackend {
    fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn wifi_enable(&self) {
        self.send(Command::WiFiEnable);
    }

    async fn wifi_disable(&self) {
        self.send(Command::WiFiDisable);
    }

    async fn wifi_connect(
        &self,
        access_point: AccessPointId,
        finished: ConnectFinished,
        request_credentials: RequestCredentials,
    ) {
        self.send(Command::WiFiConnect {
            access_point,
            finished,
            request_credentials,
        });
    }

    async fn wifi_disconnect(&self, access_point: AccessPointId) {
        self.send(Command::WiFiDisconnect { access_point });
    }

    async fn wifi_hotspot_enable(&self) {
        self.send(Command::WiFiHotspotEnable);
    }

    async fn wifi_hotspot_disable(&self) {
        self.send(Command::WiFiHotspotDisable);
    }

    async fn wifi_hotspot_change_ssid(&self, ssid: Vec<u8>) {
        self.send(Command::WiFiHotspotChangeSsid(ssid));
    }

    async fn wifi_hotspot_change_passphrase(&self, passphrase: String) {
        self.send(Command::WiFiHotspotChangePassphrase(passphrase));
    }
}

async fn run(
    mut store: StateStore,
    connection: Connection,
    msg_tx: mpsc::UnboundedSender<Msg>,
    mut msg_rx: mpsc::UnboundedReceiver<Msg>,
) {
    let manager = match ConnManManagerProxy::new(&connection).await {
        Ok(manager) => manager,
        Err(err) => {
            error!("Failed to create D-Bus proxy for ConnMan manager: {err}");
            store.critical_error();
            return;
        }
    };

    let (agent_tx, mut agent_rx) = mpsc::unbounded_channel();
    if let Err(err) = connection
        .object_server()
        .at(dbus::PROVIDER_AGENT_PATH, ConnManAgent::new(agent_tx))
        .await
    {
        error!("Failed to register ConnMan agent object: {err}");
        store.critical_error();
        return;
    }

    let mut tasks = Vec::new();

    {
        let msg_tx = msg_tx.clone();
        tasks.push(TaskGuard::new(tokio::spawn(async move {
            while let Some(call) = agent_rx.recv().await {
                let _ = msg_tx.send(Msg::Agent(call));
            }
        })));
    }

    match subscribe_manager_signals(&connection, &manager, &msg_tx).await {
        Ok(mut subscription_tasks) => tasks.append(&mut subscription_tasks),
        Err(err) => {
            error!("Failed to subscribe to ConnMan manager signals: {err}");
            store.critical_error();
            return;
        }
    }

    let mut adapter = Adapter {
        store,
        connection,
        manager,
        msg_tx,
        technologies: HashMap::new(),
        services: HashMap::new(),
        wifi_technology: None,
        wifi_service_to_ap: HashMap::new(),
        connect_queue: ConnectQueue::new(),
        agent_state: AgentState::NotRegisteredWithProvider,
        _tasks: tasks,
    };

    while let Some(msg) = msg_rx.recv().await {
        adapter.handle(msg);
    }
}

async fn subscribe_manager_signals(
    connection: &Connection,
    manager: &ConnManManagerProxy<'static>,
    msg_tx: &mpsc::UnboundedSender<Msg>,
) -> zbus::Result<Vec<TaskGuard>> {
    let mut tasks = Vec::new();

    let mut technology_added = manager.receive_technology_added().await?;
    let tx = msg_tx.clone();
    tasks.push(TaskGuard::new(tokio::spawn(async move {
        while let Some(signal) = technology_added.next().await {
            let Ok(args) = signal.args() else { continue };
            let _ = tx.send(Msg::TechnologyAdded {
                path: args.path().clone(),
                properties: own_properties(args.properties()),
            });
        }
    })));

    let mut technology_removed = manager.receive_technology_removed().await?;
    let tx = msg_tx.clone();
    tasks.push(TaskGuard::new(tokio::spawn(async move {
        while let Some(signal) = technology_removed.next().await {
            let Ok(args) = signal.args() else { continue };
            let _ = tx.send(Msg::TechnologyRemoved {
                path: args.path().clone(),
            });
        }
    })));

    let mut services_changed = manager.receive_services_changed().await?;
    let tx = msg_tx.clone();
    tasks.push(TaskGuard::new(tokio::spawn(async move {
        while let Some(signal) = services_changed.next().await {
            let Ok(args) = signal.args() else { continue };
            let changed = args
                .changed()
                .iter()
                .map(|(path, properties)| (path.clone(), own_properties(properties)))
                .collect();
            let _ = tx.send(Msg::ServicesChanged {
                changed,
                removed: args.removed().clone(),
            });
        }
    })));

    // Provider appearance and disappearance on the bus.
    let dbus_proxy = fdo::DBusProxy::new(connection).await?;
    let mut owner_changed = dbus_proxy
        .receive_name_owner_changed_with_args(&[(0, SERVICE_NAME)])
        .await?;
    let tx = msg_tx.clone();
    tasks.push(TaskGuard::new(tokio::spawn(async move {
        while let Some(signal) = owner_changed.next().await {
            let Ok(args) = signal.args() else { continue };
            let _ = tx.send(Msg::ProviderAvailable(args.new_owner().is_some()));
        }
    })));

    let available = dbus_proxy
        .name_has_owner(BusName::try_from(SERVICE_NAME)?)
        .await
        .unwrap_or(false);
    if available {
        let _ = msg_tx.send(Msg::ProviderAvailable(true));
    }

    Ok(tasks)
}

fn own_properties(properties: &HashMap<String, OwnedValue>) -> HashMap<String, OwnedValue> {
    properties
        .iter()
        .filter_map(|(name, value)| Some((name.clone(), value.try_clone().ok()?)))
        .collect()
}

struct Adapter {
    store: StateStore,
    connection: Connection,
    manager: ConnManManagerProxy<'static>,
    msg_tx: mpsc::UnboundedSender<Msg>,

    technologies: HashMap<OwnedObjectPath, Technology>,
    services: HashMap<OwnedObjectPath, Service>,

    wifi_technology: Option<OwnedObjectPath>,
    wifi_service_to_ap: HashMap<OwnedObjectPath, AccessPointId>,

    connect_queue: ConnectQueue,
    agent_state: AgentState,

    _tasks: Vec<TaskGuard>,
}

impl Adapter {
    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Command(command) => self.handle_command(command),
            Msg::ProviderAvailable(true) => self.provider_appeared(),
            Msg::ProviderAvailable(false) => self.provider_vanished(),
            Msg::TechnologyAdded { path, properties } => self.technology_add(path, &properties),
            Msg::TechnologyRemoved { path } => self.technology_remove(&path),
            Msg::TechnologyProxyReady { path, proxy } => {
                if let Some(technology) = self.technologies.get_mut(&path) {
                    technology.set_proxy(proxy);
                    if technology.kind() == TechnologyKind::Wifi {
                        self.wifi_technology_ready(path);
                    }
                }
            }
            Msg::TechnologyPropertyChanged { path, name, value } => {
                let Some(technology) = self.technologies.get_mut(&path) else {
                    return;
                };
                if let Some(property) = technology.provider_property_changed(&name, &value) {
                    if self.wifi_technology.as_ref() == Some(&path) {
                        self.wifi_technology_property_changed(property);
                    }
                }
            }
            Msg::TechnologyWriteFinished {
                path,
                property,
                success,
            } => {
                let Some(technology) = self.technologies.get_mut(&path) else {
                    return;
                };
                if technology.write_finished(property, success)
                    && self.wifi_technology.as_ref() == Some(&path)
                {
                    self.wifi_technology_property_changed(property);
                }
            }
            Msg::ServicesChanged { changed, removed } => {
                for (path, properties) in changed {
                    self.service_add_or_change(path, &properties);
                }
                for path in removed {
                    self.service_remove(&path);
                }
            }
            Msg::ServiceProxyReady { path, proxy } => {
                if let Some(service) = self.services.get_mut(&path) {
                    service.set_proxy(proxy);
                    self.wifi_service_ready(&path);
                }
            }
            Msg::ServicePropertyChanged { path, name, value } => {
                let Some(service) = self.services.get_mut(&path) else {
                    return;
                };
                if let Some(property) = service.property_changed(&name, &value) {
                    self.wifi_service_property_changed(&path, property);
                }
            }
            Msg::ServiceConnectFinished { path, success } => {
                if let Some(next) = self.connect_queue.connect_finished(&path, success) {
                    self.start_connect(&next);
                }
            }
            Msg::AgentRegistered { success } => self.agent_registered(success),
            Msg::Agent(AgentCall::Released) => {
                self.agent_state = AgentState::NotRegisteredWithProvider;
                self.connect_queue.fail_all_and_clear();
            }
            Msg::Agent(AgentCall::RequestInput {
                service,
                credentials,
                reply,
            }) => self.agent_request_input(&service, credentials, reply),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::WiFiEnable => self.wifi_set_powered(true),
            Command::WiFiDisable => self.wifi_set_powered(false),
            Command::WiFiConnect {
                access_point,
                finished,
                request_credentials,
            } => self.wifi_connect(access_point, finished, request_credentials),
            Command::WiFiDisconnect { access_point } => {
                if let Some(path) = self.service_from_access_point(access_point) {
                    if let Some(service) = self.services.get(&path) {
                        service.disconnect();
                    }
                }
            }
            Command::WiFiHotspotEnable => self.wifi_set_tethering(true),
            Command::WiFiHotspotDisable => self.wifi_set_tethering(false),
            Command::WiFiHotspotChangeSsid(ssid) => {
                let identifier = String::from_utf8_lossy(&ssid).into_owned();
                self.with_wifi_technology(TechnologyProperty::TetheringIdentifier, |technology| {
                    technology.set_tethering_identifier(identifier)
                });
            }
            Command::WiFiHotspotChangePassphrase(passphrase) => {
                self.with_wifi_technology(TechnologyProperty::TetheringPassphrase, |technology| {
                    technology.set_tethering_passphrase(passphrase)
                });
            }
        }
    }

    fn wifi_set_powered(&mut self, powered: bool) {
        self.with_wifi_technology(TechnologyProperty::Powered, |technology| {
            technology.set_powered(powered)
        });
    }

    fn wifi_set_tethering(&mut self, tethering: bool) {
        self.with_wifi_technology(TechnologyProperty::Tethering, |technology| {
            technology.set_tethering(tethering)
        });
    }

    /// Run a settable-property operation against the bound Wi-Fi
    /// technology and propagate the observed change, if any. No-op when
    /// Wi-Fi is unavailable; the IPC layer guards against that.
    fn with_wifi_technology(
        &mut self,
        property: TechnologyProperty,
        operation: impl FnOnce(&mut Technology) -> bool,
    ) {
        let Some(path) = self.wifi_technology.clone() else {
            return;
        };
        let Some(technology) = self.technologies.get_mut(&path) else {
            return;
        };

        if operation(technology) {
            self.wifi_technology_property_changed(property);
        }
    }

    fn wifi_connect(
        &mut self,
        access_point: AccessPointId,
        finished: ConnectFinished,
        request_credentials: RequestCredentials,
    ) {
        if self.wifi_technology.is_none() {
            let _ = finished.send(ConnectResult::Failed);
            return;
        }

        let Some(path) = self.service_from_access_point(access_point) else {
            let _ = finished.send(ConnectResult::Failed);
            return;
        };

        let agent_registered = self.agent_state == AgentState::RegisteredWithProvider;

        if let Some(to_start) = self.connect_queue.enqueue(
            path,
            finished,
            Some(request_credentials),
            agent_registered,
        ) {
            self.start_connect(&to_start);
        }

        if !agent_registered {
            self.agent_register();
        }
    }

    fn start_connect(&mut self, path: &OwnedObjectPath) {
        match self.services.get(path) {
            Some(service) => service.start_connect(),
            None => {
                // The service vanished between queueing and starting.
                let _ = self.msg_tx.send(Msg::ServiceConnectFinished {
                    path: path.clone(),
                    success: false,
                });
            }
        }
    }

    fn provider_appeared(&mut self) {
        let manager = self.manager.clone();
        let msg_tx = self.msg_tx.clone();

        tokio::spawn(async move {
            match manager.get_technologies().await {
                Ok(technologies) => {
                    for (path, properties) in technologies {
                        let _ = msg_tx.send(Msg::TechnologyAdded { path, properties });
                    }
                }
                Err(err) => warn!("Failed to get ConnMan technologies: {err}"),
            }

            match manager.get_services().await {
                Ok(services) => {
                    let _ = msg_tx.send(Msg::ServicesChanged {
                        changed: services,
                        removed: Vec::new(),
                    });
                }
                Err(err) => warn!("Failed to get ConnMan services: {err}"),
            }
        });

        self.agent_register();
    }

    fn provider_vanished(&mut self) {
        self.wifi_technology_removed();

        self.connect_queue.fail_all_and_clear();

        self.services.clear();
        self.technologies.clear();

        self.agent_state = AgentState::NotRegisteredWithProvider;
    }

    fn technology_add(&mut self, path: OwnedObjectPath, properties: &HashMap<String, OwnedValue>) {
        self.technology_remove(&path);

        let technology =
            Technology::new(&self.connection, path.clone(), properties, self.msg_tx.clone());
        self.technologies.insert(path, technology);
    }

    fn technology_remove(&mut self, path: &OwnedObjectPath) {
        if self.technologies.remove(path).is_none() {
            return;
        }

        if self.wifi_technology.as_ref() == Some(path) {
            self.wifi_technology_removed();
        }
    }

    /// A Wi-Fi technology proxy became usable: bind it and build the
    /// initial access point set from the services that are ready.
    fn wifi_technology_ready(&mut self, path: OwnedObjectPath) {
        if self.wifi_technology.is_some() {
            warn!("Received multiple Wi-Fi technologies from ConnMan, using latest");
            self.wifi_technology_removed();
        }

        self.wifi_technology = Some(path.clone());

        let mut access_points = Vec::new();
        for (service_path, service) in &self.services {
            if service.kind() == ServiceKind::Wifi && service.proxy_created() {
                let id = self.store.next_access_point_id();
                access_points.push(AccessPoint {
                    id,
                    ssid: service.name().as_bytes().to_vec(),
                    strength: service.strength(),
                    connected: service.connected(),
                    security: service.security(),
                });
                self.wifi_service_to_ap.insert(service_path.clone(), id);
            }
        }

        let Some(technology) = self.technologies.get(&path) else {
            return;
        };

        self.store.set_wifi_status(if technology.powered() {
            WiFiStatus::Enabled
        } else {
            WiFiStatus::Disabled
        });
        self.store.add_all_access_points(access_points);

        self.store.set_hotspot_status(if technology.tethering() {
            WiFiHotspotStatus::Enabled
        } else {
            WiFiHotspotStatus::Disabled
        });
        self.store
            .set_hotspot_ssid(technology.tethering_identifier().as_bytes().to_vec());
        self.store
            .set_hotspot_passphrase(technology.tethering_passphrase().to_owned());
    }

    fn wifi_technology_removed(&mut self) {
        if self.wifi_technology.take().is_none() {
            return;
        }

        self.wifi_service_to_ap.clear();

        self.store.remove_all_access_points();
        self.store.set_hotspot_status(WiFiHotspotStatus::Disabled);
        self.store.set_wifi_status(WiFiStatus::Unavailable);
    }

    fn wifi_technology_property_changed(&mut self, property: TechnologyProperty) {
        let Some(path) = self.wifi_technology.clone() else {
            return;
        };
        let Some(technology) = self.technologies.get(&path) else {
            return;
        };

        match property {
            TechnologyProperty::Powered => {
                let powered = technology.powered();
                if powered {
                    technology.scan();
                }
                self.store.set_wifi_status(if powered {
                    WiFiStatus::Enabled
                } else {
                    WiFiStatus::Disabled
                });
            }
            TechnologyProperty::Tethering => {
                let status = if technology.tethering() {
                    WiFiHotspotStatus::Enabled
                } else {
                    WiFiHotspotStatus::Disabled
                };
                self.store.set_hotspot_status(status);
            }
            TechnologyProperty::TetheringIdentifier => {
                let ssid = technology.tethering_identifier().as_bytes().to_vec();
                self.store.set_hotspot_ssid(ssid);
            }
            TechnologyProperty::TetheringPassphrase => {
                let passphrase = technology.tethering_passphrase().to_owned();
                self.store.set_hotspot_passphrase(passphrase);
            }
            TechnologyProperty::Connected => {}
        }
    }

    fn service_add_or_change(
        &mut self,
        path: OwnedObjectPath,
        properties: &HashMap<String, OwnedValue>,
    ) {
        if let Some(service) = self.services.get_mut(&path) {
            let changes = service.properties_changed(properties);
            for property in changes {
                self.wifi_service_property_changed(&path, property);
            }
            return;
        }

        let service = Service::new(&self.connection, path.clone(), properties, self.msg_tx.clone());
        self.services.insert(path, service);
    }

    fn service_remove(&mut self, path: &OwnedObjectPath) {
        if !self.services.contains_key(path) {
            return;
        }

        self.connect_queue.remove_service(path);

        if let Some(id) = self.wifi_service_to_ap.remove(path) {
            self.store.remove_access_point(id);
        }

        self.services.remove(path);
    }

    /// A service proxy became usable. Wi-Fi services turn into access
    /// points, but only while a Wi-Fi technology is bound; otherwise the
    /// service is picked up when the technology arrives.
    fn wifi_service_ready(&mut self, path: &OwnedObjectPath) {
        if self.wifi_technology.is_none() {
            return;
        }

        let Some(service) = self.services.get(path) else {
            return;
        };

        if service.kind() != ServiceKind::Wifi || self.wifi_service_to_ap.contains_key(path) {
            return;
        }

        let id = self.store.next_access_point_id();
        let access_point = AccessPoint {
            id,
            ssid: service.name().as_bytes().to_vec(),
            strength: service.strength(),
            connected: service.connected(),
            security: service.security(),
        };

        self.wifi_service_to_ap.insert(path.clone(), id);
        self.store.add_access_point(access_point);
    }

    fn wifi_service_property_changed(&mut self, path: &OwnedObjectPath, property: ServiceProperty) {
        let Some(id) = self.wifi_service_to_ap.get(path).copied() else {
            return;
        };
        let Some(service) = self.services.get(path) else {
            return;
        };

        match property {
            ServiceProperty::Name => {
                let ssid = service.name().as_bytes().to_vec();
                self.store.set_access_point_ssid(id, ssid);
            }
            ServiceProperty::Security => {
                let security = service.security();
                self.store.set_access_point_security(id, security);
            }
            ServiceProperty::State => {
                let connected = service.connected();
                self.store.set_access_point_connected(id, connected);
            }
            ServiceProperty::Strength => {
                let strength = service.strength();
                self.store.set_access_point_strength(id, strength);
            }
        }
    }

    fn agent_register(&mut self) {
        if self.agent_state != AgentState::NotRegisteredWithProvider {
            return;
        }

        self.agent_state = AgentState::RegisteringWithProvider;

        let manager = self.manager.clone();
        let msg_tx = self.msg_tx.clone();

        tokio::spawn(async move {
            let path = zvariant::ObjectPath::from_str_unchecked(dbus::PROVIDER_AGENT_PATH);
            let success = match manager.register_agent(&path).await {
                Ok(()) => true,
                Err(err) => {
                    warn!("Failed to register agent with ConnMan manager: {err}");
                    false
                }
            };
            let _ = msg_tx.send(Msg::AgentRegistered { success });
        });
    }

    fn agent_registered(&mut self, success: bool) {
        if success {
            self.agent_state = AgentState::RegisteredWithProvider;
            if let Some(to_start) = self.connect_queue.connect_if_not_empty() {
                self.start_connect(&to_start);
            }
        } else {
            self.agent_state = AgentState::NotRegisteredWithProvider;
            self.connect_queue.fail_all_and_clear();
        }
    }

    fn agent_request_input(
        &mut self,
        service_path: &OwnedObjectPath,
        credentials: Credentials,
        reply: crate::backend::CredentialsReply,
    ) {
        let Some(service) = self.services.get(service_path) else {
            warn!("Received ConnMan agent credentials request for non-existing service");
            let _ = reply.send(None);
            return;
        };

        let description_type = if service.kind() == ServiceKind::Wifi {
            if service.name().is_empty() {
                RequestedCredentials::TYPE_HIDDEN_WIRELESS_NETWORK
            } else {
                RequestedCredentials::TYPE_WIRELESS_NETWORK
            }
        } else {
            RequestedCredentials::TYPE_NETWORK
        };

        let requested = RequestedCredentials {
            description_type: description_type.to_owned(),
            description_id: service.name().to_owned(),
            credentials,
        };

        self.connect_queue
            .request_credentials(service_path, requested, reply);
    }

    fn service_from_access_point(&self, id: AccessPointId) -> Option<OwnedObjectPath> {
        self.wifi_service_to_ap
            .iter()
            .find(|(_, ap_id)| **ap_id == id)
            .map(|(path, _)| path.clone())
    }
}
