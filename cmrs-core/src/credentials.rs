//! Credentials for logging in to Wi-Fi access points and their D-Bus wire
//! form.
//!
//! Credentials travel in two directions. In a *request*, every field that
//! is present is a field the caller wants filled in (possibly carrying a
//! default value to present to the user); absent fields are not solicited.
//! In a *reply*, each solicited field should be set. `password_alternative`
//! exists so the requester can offer the user a choice between two password
//! kinds and is never set in replies.
//!
//! On the bus a credentials value is an `a{sv}` map with the keys `ssid`
//! (byte array), `username` (string), `password` and `password_alternative`
//! (both `(ss)` tuples of kind and value). Anything else is rejected.

use std::collections::HashMap;

use thiserror::Error;
use zvariant::{OwnedValue, StructureBuilder, Value};

const ENTRY_SSID: &str = "ssid";
const ENTRY_USERNAME: &str = "username";
const ENTRY_PASSWORD: &str = "password";
const ENTRY_PASSWORD_ALTERNATIVE: &str = "password_alternative";

const PASSWORD_KIND_PASSPHRASE: &str = "passphrase";
const PASSWORD_KIND_WPA_PSK: &str = "wpa_psk";
const PASSWORD_KIND_WEP_KEY: &str = "wep_key";
const PASSWORD_KIND_WPS_PIN: &str = "wps_pin";

/// Kind of secret a [`Password`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordKind {
    Passphrase,
    WpaPsk,
    WepKey,
    WpsPin,
}

impl PasswordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PasswordKind::Passphrase => PASSWORD_KIND_PASSPHRASE,
            PasswordKind::WpaPsk => PASSWORD_KIND_WPA_PSK,
            PasswordKind::WepKey => PASSWORD_KIND_WEP_KEY,
            PasswordKind::WpsPin => PASSWORD_KIND_WPS_PIN,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            PASSWORD_KIND_PASSPHRASE => Some(PasswordKind::Passphrase),
            PASSWORD_KIND_WPA_PSK => Some(PasswordKind::WpaPsk),
            PASSWORD_KIND_WEP_KEY => Some(PasswordKind::WepKey),
            PASSWORD_KIND_WPS_PIN => Some(PasswordKind::WpsPin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Password {
    pub kind: PasswordKind,
    pub value: String,
}

/// A set of credentials, or a request for one. See the module docs for the
/// request/reply conventions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: Option<Vec<u8>>,
    pub username: Option<String>,
    pub password: Option<Password>,
    pub password_alternative: Option<Password>,
}

/// A credentials request together with a description of what it is for.
///
/// The description strings are part of the D-Bus API and are meant to be
/// translated when presented to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedCredentials {
    pub description_type: String,
    pub description_id: String,
    pub credentials: Credentials,
}

impl RequestedCredentials {
    pub const TYPE_NETWORK: &'static str = "network";
    pub const TYPE_WIRELESS_NETWORK: &'static str = "wireless network";
    pub const TYPE_HIDDEN_WIRELESS_NETWORK: &'static str = "hidden wireless network";
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("credentials value must contain at least one entry")]
    Empty,
    #[error("unknown entry \"{0}\" in credentials value")]
    UnknownEntry(String),
    #[error("unexpected type for {0} in credentials value")]
    WrongType(&'static str),
    #[error("unknown password kind \"{0}\" in credentials value")]
    UnknownPasswordKind(String),
    #[error("failed to convert credentials value: {0}")]
    Variant(String),
}

impl Credentials {
    /// Decode a credentials value received over the bus.
    ///
    /// Strict: an empty map, an unknown key or a value of the wrong type
    /// all fail, so a malformed peer is rejected instead of silently
    /// losing fields.
    pub fn from_wire(wire: &HashMap<String, OwnedValue>) -> Result<Self, CredentialsError> {
        if wire.is_empty() {
            return Err(CredentialsError::Empty);
        }

        let mut credentials = Credentials::default();

        for (entry, value) in wire {
            match entry.as_str() {
                ENTRY_SSID => {
                    credentials.ssid = Some(
                        bytes_from_value(value).ok_or(CredentialsError::WrongType(ENTRY_SSID))?,
                    );
                }
                ENTRY_USERNAME => {
                    credentials.username = Some(
                        string_from_value(value)
                            .ok_or(CredentialsError::WrongType(ENTRY_USERNAME))?,
                    );
                }
                ENTRY_PASSWORD => {
                    credentials.password = Some(password_from_value(value, ENTRY_PASSWORD)?);
                }
                ENTRY_PASSWORD_ALTERNATIVE => {
                    credentials.password_alternative =
                        Some(password_from_value(value, ENTRY_PASSWORD_ALTERNATIVE)?);
                }
                other => return Err(CredentialsError::UnknownEntry(other.to_owned())),
            }
        }

        Ok(credentials)
    }

    /// Encode for sending over the bus. Only present fields are included.
    pub fn to_wire(&self) -> Result<HashMap<String, OwnedValue>, CredentialsError> {
        let mut wire = HashMap::new();

        if let Some(ssid) = &self.ssid {
            wire.insert(ENTRY_SSID.to_owned(), owned(Value::from(ssid.clone()))?);
        }

        if let Some(username) = &self.username {
            wire.insert(
                ENTRY_USERNAME.to_owned(),
                owned(Value::from(username.clone()))?,
            );
        }

        if let Some(password) = &self.password {
            wire.insert(ENTRY_PASSWORD.to_owned(), password_to_value(password)?);
        }

        if let Some(alternative) = &self.password_alternative {
            wire.insert(
                ENTRY_PASSWORD_ALTERNATIVE.to_owned(),
                password_to_value(alternative)?,
            );
        }

        Ok(wire)
    }
}

fn owned(value: Value<'_>) -> Result<OwnedValue, CredentialsError> {
    value
        .try_to_owned()
        .map_err(|e| CredentialsError::Variant(e.to_string()))
}

fn string_from_value(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.as_str().to_owned()),
        _ => None,
    }
}

fn bytes_from_value(value: &Value<'_>) -> Option<Vec<u8>> {
    match value {
        Value::Array(array) => array
            .iter()
            .map(|element| match element {
                Value::U8(byte) => Some(*byte),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn password_from_value(
    value: &Value<'_>,
    entry: &'static str,
) -> Result<Password, CredentialsError> {
    let fields = match value {
        Value::Structure(structure) => structure.fields(),
        _ => return Err(CredentialsError::WrongType(entry)),
    };

    let (kind, value) = match fields {
        [kind, value] => (
            string_from_value(kind).ok_or(CredentialsError::WrongType(entry))?,
            string_from_value(value).ok_or(CredentialsError::WrongType(entry))?,
        ),
        _ => return Err(CredentialsError::WrongType(entry)),
    };

    let kind =
        PasswordKind::from_str(&kind).ok_or(CredentialsError::UnknownPasswordKind(kind))?;

    Ok(Password { kind, value })
}

fn password_to_value(password: &Password) -> Result<OwnedValue, CredentialsError> {
    let structure = StructureBuilder::new()
        .add_field(password.kind.as_str().to_owned())
        .add_field(password.value.clone())
        .build();

    owned(Value::Structure(structure))
}
