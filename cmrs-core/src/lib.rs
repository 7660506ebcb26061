//! Shared model and state for the cmrs connectivity manager.
//!
//! This crate holds everything the daemon and the command line client have
//! in common:
//!
//! - The Wi-Fi data model ([`models`]): status, security, access points.
//! - Credentials and their D-Bus wire form ([`credentials`]), used both by
//!   the daemon when talking to the provider's agent interface and by the
//!   client when answering `RequestCredentials` calls.
//! - The authoritative state store with change events ([`state`]). Only the
//!   daemon's provider adapter mutates it; everyone else observes events.
//! - Bus names and object path helpers ([`dbus`]).
//!
//! Failures carry typed errors rather than being logged here; the daemon
//! and the client decide what is worth a log line.

pub mod credentials;
pub mod dbus;
pub mod models;
pub mod state;

pub use credentials::{Credentials, Password, PasswordKind, RequestedCredentials};
pub use models::{
    AccessPoint, AccessPointId, ConnectResult, WiFiHotspotStatus, WiFiSecurity, WiFiStatus,
    ACCESS_POINT_ID_NONE,
};
pub use state::{AccessPointsEvent, Event, State, StateReader, StateStore, WiFiState};
