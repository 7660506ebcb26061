//! Authoritative connectivity state and its change events.
//!
//! [`StateStore`] is the single writer: the daemon's provider adapter owns
//! it and applies every mutation through the setters below. Each setter is
//! a no-op when the new value equals the current one; otherwise it applies
//! the change and emits exactly one [`Event`]. Events are emitted in
//! mutation order and observers never see a state that is ahead of or
//! behind the event stream mid-mutation.
//!
//! Everyone else gets a [`StateReader`] for snapshots and a broadcast
//! subscription for events.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::models::{
    clamp_strength, AccessPoint, AccessPointId, WiFiHotspotStatus, WiFiSecurity, WiFiStatus,
    ACCESS_POINT_ID_NONE,
};

/// Capacity of the event channel. Subscribers that fall this far behind
/// observe a `Lagged` error and must resynchronize from a snapshot.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct State {
    pub wifi: WiFiState,
}

#[derive(Debug, Clone)]
pub struct WiFiState {
    pub status: WiFiStatus,
    pub access_points: HashMap<AccessPointId, AccessPoint>,
    pub hotspot_status: WiFiHotspotStatus,
    pub hotspot_ssid: Vec<u8>,
    pub hotspot_passphrase: String,
}

impl Default for WiFiState {
    fn default() -> Self {
        Self {
            status: WiFiStatus::Unavailable,
            access_points: HashMap::new(),
            hotspot_status: WiFiHotspotStatus::Disabled,
            hotspot_ssid: Vec::new(),
            hotspot_passphrase: String::new(),
        }
    }
}

/// What happened to the access point set.
///
/// `AddedAll`/`RemovedAll` are used when Wi-Fi is enabled/disabled to
/// limit event traffic; they carry no access point and observers should
/// consult a snapshot instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPointsEvent {
    AddedAll,
    RemovedAll,
    AddedOne,
    RemovedOne,
    SsidChanged,
    StrengthChanged,
    ConnectedChanged,
    SecurityChanged,
}

/// Change notification published by the state store.
#[derive(Debug, Clone)]
pub enum Event {
    CriticalError,
    WiFiStatusChanged(WiFiStatus),
    AccessPointsChanged(AccessPointsEvent, Option<AccessPoint>),
    WiFiHotspotStatusChanged(WiFiHotspotStatus),
    WiFiHotspotSsidChanged(Vec<u8>),
    WiFiHotspotPassphraseChanged(String),
}

/// Read-only handle to the state, for components that only observe.
#[derive(Clone)]
pub struct StateReader {
    state: Arc<RwLock<State>>,
}

impl StateReader {
    pub fn snapshot(&self) -> State {
        self.state.read().expect("state lock poisoned").clone()
    }

    pub fn wifi_available(&self) -> bool {
        self.with(|state| state.wifi.status != WiFiStatus::Unavailable)
    }

    pub fn wifi_enabled(&self) -> bool {
        self.with(|state| state.wifi.status == WiFiStatus::Enabled)
    }

    pub fn wifi_hotspot_enabled(&self) -> bool {
        self.with(|state| state.wifi.hotspot_status == WiFiHotspotStatus::Enabled)
    }

    pub fn access_point(&self, id: AccessPointId) -> Option<AccessPoint> {
        self.with(|state| state.wifi.access_points.get(&id).cloned())
    }

    fn with<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.read().expect("state lock poisoned"))
    }
}

/// The single mutable entry point to the connectivity state.
pub struct StateStore {
    state: Arc<RwLock<State>>,
    events: broadcast::Sender<Event>,
    last_id: AccessPointId,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(State::default())),
            events,
            last_id: ACCESS_POINT_ID_NONE,
        }
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            state: Arc::clone(&self.state),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Sender half of the event channel, for handing to a backend handle.
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.events.clone()
    }

    /// Signal an unrecoverable condition. The daemon exits on this event.
    pub fn critical_error(&mut self) {
        self.emit(Event::CriticalError);
    }

    pub fn set_wifi_status(&mut self, status: WiFiStatus) {
        let changed = self.mutate(|wifi| {
            if wifi.status == status {
                return false;
            }
            wifi.status = status;
            true
        });

        if changed {
            self.emit(Event::WiFiStatusChanged(status));
        }
    }

    /// Allocate the next access point id.
    ///
    /// Monotonically advancing, skipping the sentinel and any id still in
    /// use; retired ids may be reused once the counter wraps past them.
    pub fn next_access_point_id(&mut self) -> AccessPointId {
        let state = self.state.read().expect("state lock poisoned");

        loop {
            self.last_id = self.last_id.wrapping_add(1);

            if self.last_id == ACCESS_POINT_ID_NONE {
                continue;
            }

            if !state.wifi.access_points.contains_key(&self.last_id) {
                return self.last_id;
            }
        }
    }

    /// Replace the whole access point set. Any previous entries are
    /// dropped as part of the replacement; only one event is emitted.
    pub fn add_all_access_points(&mut self, access_points: Vec<AccessPoint>) {
        self.mutate(|wifi| {
            wifi.access_points.clear();
            for access_point in access_points {
                debug_assert_ne!(access_point.id, ACCESS_POINT_ID_NONE);
                wifi.access_points.insert(access_point.id, access_point);
            }
            true
        });

        self.emit(Event::AccessPointsChanged(AccessPointsEvent::AddedAll, None));
    }

    /// Clear the access point set. Nothing is emitted if it was empty.
    pub fn remove_all_access_points(&mut self) {
        let changed = self.mutate(|wifi| {
            if wifi.access_points.is_empty() {
                return false;
            }
            wifi.access_points.clear();
            true
        });

        if changed {
            self.emit(Event::AccessPointsChanged(
                AccessPointsEvent::RemovedAll,
                None,
            ));
        }
    }

    pub fn add_access_point(&mut self, access_point: AccessPoint) {
        debug_assert_ne!(access_point.id, ACCESS_POINT_ID_NONE);

        self.mutate(|wifi| {
            wifi.access_points
                .insert(access_point.id, access_point.clone());
            true
        });

        self.emit(Event::AccessPointsChanged(
            AccessPointsEvent::AddedOne,
            Some(access_point),
        ));
    }

    pub fn remove_access_point(&mut self, id: AccessPointId) {
        let removed = {
            let mut state = self.state.write().expect("state lock poisoned");
            state.wifi.access_points.remove(&id)
        };

        if let Some(access_point) = removed {
            self.emit(Event::AccessPointsChanged(
                AccessPointsEvent::RemovedOne,
                Some(access_point),
            ));
        }
    }

    pub fn set_access_point_ssid(&mut self, id: AccessPointId, ssid: Vec<u8>) {
        self.update_access_point(id, AccessPointsEvent::SsidChanged, |ap| {
            if ap.ssid == ssid {
                return false;
            }
            ap.ssid = ssid.clone();
            true
        });
    }

    pub fn set_access_point_strength(&mut self, id: AccessPointId, strength: u8) {
        let strength = clamp_strength(strength);
        self.update_access_point(id, AccessPointsEvent::StrengthChanged, |ap| {
            if ap.strength == strength {
                return false;
            }
            ap.strength = strength;
            true
        });
    }

    pub fn set_access_point_connected(&mut self, id: AccessPointId, connected: bool) {
        self.update_access_point(id, AccessPointsEvent::ConnectedChanged, |ap| {
            if ap.connected == connected {
                return false;
            }
            ap.connected = connected;
            true
        });
    }

    pub fn set_access_point_security(&mut self, id: AccessPointId, security: WiFiSecurity) {
        self.update_access_point(id, AccessPointsEvent::SecurityChanged, |ap| {
            if ap.security == security {
                return false;
            }
            ap.security = security;
            true
        });
    }

    pub fn set_hotspot_status(&mut self, status: WiFiHotspotStatus) {
        let changed = self.mutate(|wifi| {
            if wifi.hotspot_status == status {
                return false;
            }
            wifi.hotspot_status = status;
            true
        });

        if changed {
            self.emit(Event::WiFiHotspotStatusChanged(status));
        }
    }

    pub fn set_hotspot_ssid(&mut self, ssid: Vec<u8>) {
        let changed = self.mutate(|wifi| {
            if wifi.hotspot_ssid == ssid {
                return false;
            }
            wifi.hotspot_ssid = ssid.clone();
            true
        });

        if changed {
            self.emit(Event::WiFiHotspotSsidChanged(ssid));
        }
    }

    pub fn set_hotspot_passphrase(&mut self, passphrase: String) {
        let changed = self.mutate(|wifi| {
            if wifi.hotspot_passphrase == passphrase {
                return false;
            }
            wifi.hotspot_passphrase = passphrase.clone();
            true
        });

        if changed {
            self.emit(Event::WiFiHotspotPassphraseChanged(passphrase));
        }
    }

    fn update_access_point(
        &mut self,
        id: AccessPointId,
        event: AccessPointsEvent,
        apply: impl FnOnce(&mut AccessPoint) -> bool,
    ) {
        let updated = {
            let mut state = self.state.write().expect("state lock poisoned");
            match state.wifi.access_points.get_mut(&id) {
                Some(ap) => {
                    if apply(ap) {
                        Some(ap.clone())
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        if let Some(access_point) = updated {
            self.emit(Event::AccessPointsChanged(event, Some(access_point)));
        }
    }

    fn mutate(&mut self, apply: impl FnOnce(&mut WiFiState) -> bool) -> bool {
        let mut state = self.state.write().expect("state lock poisoned");
        apply(&mut state.wifi)
    }

    fn emit(&self, event: Event) {
        // send() only fails when there are no subscribers, which is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_point(id: AccessPointId, ssid: &str) -> AccessPoint {
        AccessPoint {
            id,
            ssid: ssid.as_bytes().to_vec(),
            strength: 50,
            connected: false,
            security: WiFiSecurity::WpaPsk,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn initial_state_is_unavailable_and_empty() {
        let store = StateStore::new();
        let state = store.reader().snapshot();

        assert_eq!(state.wifi.status, WiFiStatus::Unavailable);
        assert!(state.wifi.access_points.is_empty());
        assert_eq!(state.wifi.hotspot_status, WiFiHotspotStatus::Disabled);
    }

    #[test]
    fn setting_equal_status_emits_nothing() {
        let mut store = StateStore::new();
        let mut rx = store.subscribe();

        store.set_wifi_status(WiFiStatus::Unavailable);
        assert!(drain(&mut rx).is_empty());

        store.set_wifi_status(WiFiStatus::Enabled);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::WiFiStatusChanged(WiFiStatus::Enabled)
        ));
    }

    #[test]
    fn id_allocation_skips_zero_and_live_ids() {
        let mut store = StateStore::new();

        let first = store.next_access_point_id();
        assert_ne!(first, ACCESS_POINT_ID_NONE);
        assert_eq!(first, 1);

        store.add_access_point(access_point(first, "one"));
        let second = store.next_access_point_id();
        assert_eq!(second, 2);

        // Force a wrap: the sentinel and the live id must both be skipped.
        store.last_id = AccessPointId::MAX;
        let wrapped = store.next_access_point_id();
        assert_eq!(wrapped, 2);
    }

    #[test]
    fn ids_match_keys_and_are_unique() {
        let mut store = StateStore::new();
        let a = store.next_access_point_id();
        store.add_access_point(access_point(a, "a"));
        let b = store.next_access_point_id();
        store.add_access_point(access_point(b, "b"));

        let state = store.reader().snapshot();
        for (id, ap) in &state.wifi.access_points {
            assert_eq!(*id, ap.id);
            assert_ne!(*id, ACCESS_POINT_ID_NONE);
        }
        assert_eq!(state.wifi.access_points.len(), 2);
    }

    #[test]
    fn add_all_replaces_set_with_one_event() {
        let mut store = StateStore::new();
        let a = store.next_access_point_id();
        store.add_access_point(access_point(a, "old"));

        let mut rx = store.subscribe();
        let b = store.next_access_point_id();
        let c = store.next_access_point_id();
        store.add_all_access_points(vec![access_point(b, "b"), access_point(c, "c")]);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::AccessPointsChanged(AccessPointsEvent::AddedAll, None)
        ));

        let state = store.reader().snapshot();
        assert_eq!(state.wifi.access_points.len(), 2);
        assert!(!state.wifi.access_points.contains_key(&a));
    }

    #[test]
    fn add_all_then_remove_all_nets_one_add_and_one_remove() {
        let mut store = StateStore::new();
        let mut rx = store.subscribe();

        let a = store.next_access_point_id();
        store.add_all_access_points(vec![access_point(a, "a")]);
        store.remove_all_access_points();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            Event::AccessPointsChanged(AccessPointsEvent::AddedAll, None)
        ));
        assert!(matches!(
            events[1],
            Event::AccessPointsChanged(AccessPointsEvent::RemovedAll, None)
        ));
        assert!(store.reader().snapshot().wifi.access_points.is_empty());
    }

    #[test]
    fn remove_all_on_empty_set_emits_nothing() {
        let mut store = StateStore::new();
        let mut rx = store.subscribe();

        store.remove_all_access_points();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn remove_one_carries_a_snapshot() {
        let mut store = StateStore::new();
        let id = store.next_access_point_id();
        store.add_access_point(access_point(id, "gone"));

        let mut rx = store.subscribe();
        store.remove_access_point(id);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::AccessPointsChanged(AccessPointsEvent::RemovedOne, Some(ap)) => {
                assert_eq!(ap.id, id);
                assert_eq!(ap.ssid, b"gone");
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Removing again is a no-op.
        store.remove_access_point(id);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn field_setters_are_no_ops_on_equal_values() {
        let mut store = StateStore::new();
        let id = store.next_access_point_id();
        store.add_access_point(access_point(id, "net"));

        let mut rx = store.subscribe();

        store.set_access_point_strength(id, 50);
        store.set_access_point_connected(id, false);
        store.set_access_point_security(id, WiFiSecurity::WpaPsk);
        assert!(drain(&mut rx).is_empty());

        store.set_access_point_strength(id, 80);
        store.set_access_point_connected(id, true);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            Event::AccessPointsChanged(AccessPointsEvent::StrengthChanged, Some(_))
        ));
        assert!(matches!(
            events[1],
            Event::AccessPointsChanged(AccessPointsEvent::ConnectedChanged, Some(_))
        ));
    }

    #[test]
    fn strength_from_provider_is_clamped() {
        let mut store = StateStore::new();
        let id = store.next_access_point_id();
        store.add_access_point(access_point(id, "net"));

        store.set_access_point_strength(id, 250);
        assert_eq!(store.reader().access_point(id).unwrap().strength, 100);
    }

    #[test]
    fn hotspot_setters_follow_the_same_rules() {
        let mut store = StateStore::new();
        let mut rx = store.subscribe();

        store.set_hotspot_status(WiFiHotspotStatus::Disabled);
        store.set_hotspot_ssid(Vec::new());
        store.set_hotspot_passphrase(String::new());
        assert!(drain(&mut rx).is_empty());

        store.set_hotspot_status(WiFiHotspotStatus::Enabled);
        store.set_hotspot_ssid(b"spot".to_vec());
        store.set_hotspot_passphrase("secret".to_owned());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            Event::WiFiHotspotStatusChanged(WiFiHotspotStatus::Enabled)
        ));
    }

    #[test]
    fn unavailable_implies_no_access_points_after_teardown() {
        let mut store = StateStore::new();
        store.set_wifi_status(WiFiStatus::Enabled);
        let id = store.next_access_point_id();
        store.add_access_point(access_point(id, "net"));
        store.set_hotspot_status(WiFiHotspotStatus::Enabled);

        // The provider-vanished sequence used by the adapter.
        store.remove_all_access_points();
        store.set_hotspot_status(WiFiHotspotStatus::Disabled);
        store.set_wifi_status(WiFiStatus::Unavailable);

        let state = store.reader().snapshot();
        assert_eq!(state.wifi.status, WiFiStatus::Unavailable);
        assert!(state.wifi.access_points.is_empty());
        assert_eq!(state.wifi.hotspot_status, WiFiHotspotStatus::Disabled);
    }
}
