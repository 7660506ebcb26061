//! Capability interface over the connectivity provider.
//!
//! The D-Bus layer talks to the provider adapter exclusively through this
//! trait plus the state events it can subscribe to; the adapter is the only
//! component that mutates state.
//!
//! Connecting is asynchronous in two ways: the terminal outcome arrives on
//! the `finished` channel (exactly once per connect request), and the
//! provider may ask for credentials any number of times in between via the
//! `request_credentials` channel. Every [`CredentialsRequest`] carries a
//! reply channel that must be fulfilled; replying `None` tells the provider
//! that no credentials could be produced, which it treats as a failed
//! connect.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use cmrs_core::{
    AccessPointId, ConnectResult, Credentials, Event, RequestedCredentials, StateReader,
};

/// One-shot channel carrying the terminal result of a connect attempt.
pub type ConnectFinished = oneshot::Sender<ConnectResult>;

/// Reply channel of a single credentials prompt.
pub type CredentialsReply = oneshot::Sender<Option<Credentials>>;

/// Channel on which the adapter delivers credential prompts for one
/// connect attempt.
pub type RequestCredentials = mpsc::UnboundedSender<CredentialsRequest>;

/// A credentials prompt on its way from the provider to the client.
pub struct CredentialsRequest {
    pub requested: RequestedCredentials,
    pub reply: CredentialsReply,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Read-only access to the current state.
    fn reader(&self) -> StateReader;

    /// Subscribe to state change events.
    fn subscribe(&self) -> broadcast::Receiver<Event>;

    async fn wifi_enable(&self);
    async fn wifi_disable(&self);

    async fn wifi_connect(
        &self,
        access_point: AccessPointId,
        finished: ConnectFinished,
        request_credentials: RequestCredentials,
    );
    async fn wifi_disconnect(&self, access_point: AccessPointId);

    async fn wifi_hotspot_enable(&self);
    async fn wifi_hotspot_disable(&self);
    async fn wifi_hotspot_change_ssid(&self, ssid: Vec<u8>);
    async fn wifi_hotspot_change_passphrase(&self, passphrase: String);
}
