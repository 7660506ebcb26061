//! The credential agent object the client serves while connecting.
//!
//! The daemon calls `RequestCredentials` on this object when the provider
//! needs user input for the connect we asked for.

use std::collections::HashMap;

use zbus::{fdo, interface};
use zvariant::OwnedValue;

use cmrs_core::Credentials;

use crate::input_handler::InputHandler;

/// Path under which the agent is served on this client's connection.
pub const OBJECT_PATH: &str = "/com/luxoft/ConnectivityManager/UserInputAgent";

pub struct UserInputAgent {
    input_handler: InputHandler,
}

impl UserInputAgent {
    pub fn new(input_handler: InputHandler) -> Self {
        Self { input_handler }
    }
}

#[interface(name = "com.luxoft.ConnectivityManager.UserInputAgent")]
impl UserInputAgent {
    async fn request_credentials(
        &self,
        description_type: String,
        description_id: String,
        requested: HashMap<String, OwnedValue>,
    ) -> fdo::Result<HashMap<String, OwnedValue>> {
        let requested = Credentials::from_wire(&requested)
            .map_err(|error| fdo::Error::InvalidArgs(error.to_string()))?;

        let input_handler = self.input_handler.clone();
        let credentials = tokio::task::spawn_blocking(move || {
            input_handler.prompt_for_credentials(&description_type, &description_id, &requested)
        })
        .await
        .map_err(|_| fdo::Error::Failed("Prompting for credentials failed".to_owned()))?;

        credentials
            .to_wire()
            .map_err(|error| fdo::Error::Failed(error.to_string()))
    }
}
