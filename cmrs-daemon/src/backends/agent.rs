//! The agent object ConnMan calls to request user input.
//!
//! Exposed on the bus under the manager path. ConnMan's `RequestInput`
//! fields are translated into a [`Credentials`] request, handed to the
//! adapter (which routes them through the connect queue to the pending
//! client call) and the reply is translated back into the field names the
//! request used. See `doc/agent-api.txt` in the ConnMan repo for the field
//! vocabulary.

use std::collections::HashMap;

use log::debug;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use zbus::{fdo, interface};
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use cmrs_core::{Credentials, Password, PasswordKind};

use crate::backend::CredentialsReply;

const FIELD_SSID_TEXT: &str = "Name";
const FIELD_SSID_BYTES: &str = "SSID";
const FIELD_EAP_USERNAME: &str = "Identity";
const FIELD_PASSPHRASE: &str = "Passphrase";
const FIELD_PREVIOUS_PASSPHRASE: &str = "PreviousPassphrase";
const FIELD_WPS: &str = "WPS";
const FIELD_WISPR_USERNAME: &str = "Username";
const FIELD_WISPR_PASSWORD: &str = "Password";

const ARGUMENT_TYPE: &str = "Type";
const ARGUMENT_VALUE: &str = "Value";

/// ConnMan's `RequestInput` argument: field name to argument map.
pub type Fields = HashMap<String, OwnedValue>;

/// How the agent currently relates to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    NotRegisteredWithProvider,
    RegisteringWithProvider,
    RegisteredWithProvider,
}

/// Calls forwarded from the served agent object to the adapter.
pub enum AgentCall {
    Released,
    RequestInput {
        service: OwnedObjectPath,
        credentials: Credentials,
        reply: CredentialsReply,
    },
}

/// The D-Bus object itself. Dumb on purpose: every decision lives in the
/// adapter, this type only translates and forwards.
pub struct ConnManAgent {
    calls: mpsc::UnboundedSender<AgentCall>,
}

impl ConnManAgent {
    pub fn new(calls: mpsc::UnboundedSender<AgentCall>) -> Self {
        Self { calls }
    }
}

#[interface(name = "net.connman.Agent")]
impl ConnManAgent {
    async fn release(&self) {
        let _ = self.calls.send(AgentCall::Released);
    }

    async fn report_error(&self, service: ObjectPath<'_>, error: String) {
        // The failing Connect() call is the authoritative signal.
        debug!("ConnMan reported error for {}: {error}", service.as_str());
    }

    async fn request_browser(&self, _service: ObjectPath<'_>, _url: String) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported(
            "RequestBrowser is not supported".to_owned(),
        ))
    }

    async fn request_input(
        &self,
        service: ObjectPath<'_>,
        fields: Fields,
    ) -> fdo::Result<Fields> {
        let credentials = fields_to_credentials(&fields)
            .map_err(|error| fdo::Error::InvalidArgs(error.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();

        self.calls
            .send(AgentCall::RequestInput {
                service: service.into(),
                credentials,
                reply: reply_tx,
            })
            .map_err(|_| fdo::Error::Failed("Agent owner is gone".to_owned()))?;

        match reply_rx.await {
            Ok(Some(credentials)) => credentials_to_reply_fields(&credentials, &fields)
                .map_err(|error| fdo::Error::Failed(error.to_string())),
            _ => Err(fdo::Error::Failed(
                "Failed to request credentials".to_owned(),
            )),
        }
    }

    async fn cancel(&self) {
        // Nothing to do: ConnMan failing the in-flight connect is what
        // unwinds the pending request.
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldsError {
    #[error("field \"{0}\" has arguments of the wrong type")]
    BadArguments(String),
    #[error("fields contain both \"{0}\" and \"{1}\"")]
    MutuallyExclusive(&'static str, &'static str),
    #[error("password field \"{0}\" has no type")]
    PasswordWithoutType(String),
    #[error("password field \"{0}\" has unknown type \"{1}\"")]
    UnknownPasswordType(String, String),
    #[error("WPS field does not have the WPS pin type")]
    WpsFieldKind,
    #[error("password alternative field without a password field")]
    AlternativeWithoutPassword,
    #[error("password and password alternative have the same type")]
    AlternativeSameKind,
    #[error("previous passphrase field without a password field")]
    PreviousWithoutPassword,
    #[error("unknown field \"{0}\"")]
    UnknownField(String),
    #[error("failed to convert reply fields: {0}")]
    Variant(String),
}

/// Map the fields of a `RequestInput` call to a credentials request.
///
/// The `Value` argument of `Passphrase`, `Password` and `WPS` wins over
/// `PreviousPassphrase`; the previous value is only adopted as a default
/// when the chosen slot is empty and the types match.
pub fn fields_to_credentials(fields: &Fields) -> Result<Credentials, FieldsError> {
    let mut credentials = Credentials::default();
    let mut previous_password = None;

    for (name, arguments_value) in fields {
        let arguments = arguments_from_value(arguments_value)
            .ok_or_else(|| FieldsError::BadArguments(name.clone()))?;

        match name.as_str() {
            FIELD_SSID_TEXT => {
                credentials.ssid = Some(argument_string(&arguments, ARGUMENT_VALUE).into_bytes());
            }
            FIELD_SSID_BYTES => {
                credentials.ssid = Some(argument_bytes(&arguments, ARGUMENT_VALUE));
            }
            FIELD_EAP_USERNAME | FIELD_WISPR_USERNAME => {
                if credentials.username.is_some() {
                    return Err(FieldsError::MutuallyExclusive(
                        FIELD_EAP_USERNAME,
                        FIELD_WISPR_USERNAME,
                    ));
                }
                credentials.username = Some(argument_string(&arguments, ARGUMENT_VALUE));
            }
            FIELD_PASSPHRASE | FIELD_WISPR_PASSWORD => {
                if credentials.password.is_some() {
                    return Err(FieldsError::MutuallyExclusive(
                        FIELD_PASSPHRASE,
                        FIELD_WISPR_PASSWORD,
                    ));
                }
                credentials.password = Some(arguments_to_password(name, &arguments)?);
            }
            FIELD_PREVIOUS_PASSPHRASE => {
                previous_password = Some(arguments_to_password(name, &arguments)?);
            }
            FIELD_WPS => {
                let password = arguments_to_password(name, &arguments)?;
                if password.kind != PasswordKind::WpsPin {
                    return Err(FieldsError::WpsFieldKind);
                }
                credentials.password_alternative = Some(password);
            }
            other => return Err(FieldsError::UnknownField(other.to_owned())),
        }
    }

    if let Some(alternative) = &credentials.password_alternative {
        let Some(password) = &credentials.password else {
            return Err(FieldsError::AlternativeWithoutPassword);
        };
        if password.kind == alternative.kind {
            return Err(FieldsError::AlternativeSameKind);
        }
    }

    if let Some(previous) = previous_password {
        match &mut credentials.password {
            None => return Err(FieldsError::PreviousWithoutPassword),
            Some(password) if password.kind == previous.kind => {
                if password.value.is_empty() {
                    password.value = previous.value;
                }
            }
            Some(_) => {
                if let Some(alternative) = &mut credentials.password_alternative {
                    if alternative.kind == previous.kind && alternative.value.is_empty() {
                        alternative.value = previous.value;
                    }
                }
            }
        }
    }

    Ok(credentials)
}

/// Build the `RequestInput` reply from a credentials reply, using the
/// field names the request asked with.
///
/// ConnMan can request the SSID both as UTF-8 (`Name`) and as bytes
/// (`SSID`); UTF-8 is preferred when the SSID is valid UTF-8.
pub fn credentials_to_reply_fields(
    credentials: &Credentials,
    requested_fields: &Fields,
) -> Result<Fields, FieldsError> {
    let mut fields = Fields::new();
    let was_requested = |name: &str| requested_fields.contains_key(name);

    if let Some(ssid) = &credentials.ssid {
        match std::str::from_utf8(ssid) {
            Ok(text) if was_requested(FIELD_SSID_TEXT) => {
                fields.insert(FIELD_SSID_TEXT.to_owned(), owned_string(text)?);
            }
            _ if was_requested(FIELD_SSID_BYTES) => {
                fields.insert(FIELD_SSID_BYTES.to_owned(), owned_bytes(ssid)?);
            }
            _ if was_requested(FIELD_SSID_TEXT) => {
                fields.insert(
                    FIELD_SSID_TEXT.to_owned(),
                    owned_string(&String::from_utf8_lossy(ssid))?,
                );
            }
            _ => {}
        }
    }

    if let Some(username) = &credentials.username {
        if was_requested(FIELD_EAP_USERNAME) {
            fields.insert(FIELD_EAP_USERNAME.to_owned(), owned_string(username)?);
        } else if was_requested(FIELD_WISPR_USERNAME) {
            fields.insert(FIELD_WISPR_USERNAME.to_owned(), owned_string(username)?);
        }
    }

    if let Some(password) = &credentials.password {
        let wps_reply = password.kind == PasswordKind::WpsPin && was_requested(FIELD_WPS);

        if wps_reply {
            fields.insert(FIELD_WPS.to_owned(), owned_string(&password.value)?);
        } else if was_requested(FIELD_PASSPHRASE) {
            fields.insert(FIELD_PASSPHRASE.to_owned(), owned_string(&password.value)?);
        } else if was_requested(FIELD_WISPR_PASSWORD) {
            fields.insert(
                FIELD_WISPR_PASSWORD.to_owned(),
                owned_string(&password.value)?,
            );
        }
    }

    Ok(fields)
}

fn arguments_from_value(value: &OwnedValue) -> Option<Fields> {
    let value = value.try_clone().ok()?;
    Fields::try_from(value).ok()
}

fn argument_string(arguments: &Fields, name: &str) -> String {
    match arguments.get(name).map(|value| &**value) {
        Some(Value::Str(s)) => s.as_str().to_owned(),
        _ => String::new(),
    }
}

fn argument_bytes(arguments: &Fields, name: &str) -> Vec<u8> {
    match arguments.get(name).map(|value| &**value) {
        Some(Value::Array(array)) => array
            .iter()
            .map(|element| match element {
                Value::U8(byte) => Some(*byte),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .unwrap_or_default(),
        Some(Value::Str(s)) => s.as_bytes().to_vec(),
        _ => Vec::new(),
    }
}

fn arguments_to_password(name: &str, arguments: &Fields) -> Result<Password, FieldsError> {
    let kind = argument_string(arguments, ARGUMENT_TYPE);
    if kind.is_empty() {
        return Err(FieldsError::PasswordWithoutType(name.to_owned()));
    }

    let kind = match kind.as_str() {
        "passphrase" | "response" | "string" => PasswordKind::Passphrase,
        "psk" => PasswordKind::WpaPsk,
        "wep" => PasswordKind::WepKey,
        "wpspin" => PasswordKind::WpsPin,
        other => {
            return Err(FieldsError::UnknownPasswordType(
                name.to_owned(),
                other.to_owned(),
            ))
        }
    };

    Ok(Password {
        kind,
        value: argument_string(arguments, ARGUMENT_VALUE),
    })
}

fn owned_string(value: &str) -> Result<OwnedValue, FieldsError> {
    Value::from(value)
        .try_to_owned()
        .map_err(|error| FieldsError::Variant(error.to_string()))
}

fn owned_bytes(value: &[u8]) -> Result<OwnedValue, FieldsError> {
    Value::from(value.to_vec())
        .try_to_owned()
        .map_err(|error| FieldsError::Variant(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arguments(pairs: &[(&str, Value<'_>)]) -> OwnedValue {
        let mut map = HashMap::new();
        for (name, value) in pairs {
            map.insert(name.to_string(), value.try_clone().unwrap());
        }
        Value::from(map).try_to_owned().unwrap()
    }

    fn fields(entries: Vec<(&str, OwnedValue)>) -> Fields {
        entries
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect()
    }

    #[test]
    fn passphrase_request_maps_to_password() {
        let fields = fields(vec![(
            FIELD_PASSPHRASE,
            arguments(&[(ARGUMENT_TYPE, Value::from("psk"))]),
        )]);

        let credentials = fields_to_credentials(&fields).unwrap();
        assert_eq!(
            credentials.password,
            Some(Password {
                kind: PasswordKind::WpaPsk,
                value: String::new(),
            })
        );
        assert!(credentials.ssid.is_none());
        assert!(credentials.username.is_none());
    }

    #[test]
    fn hidden_network_request_maps_name_to_ssid() {
        let fields = fields(vec![(
            FIELD_SSID_TEXT,
            arguments(&[(ARGUMENT_TYPE, Value::from("string"))]),
        )]);

        let credentials = fields_to_credentials(&fields).unwrap();
        assert_eq!(credentials.ssid, Some(Vec::new()));
    }

    #[test]
    fn both_username_variants_are_rejected() {
        let fields = fields(vec![
            (
                FIELD_EAP_USERNAME,
                arguments(&[(ARGUMENT_TYPE, Value::from("string"))]),
            ),
            (
                FIELD_WISPR_USERNAME,
                arguments(&[(ARGUMENT_TYPE, Value::from("string"))]),
            ),
        ]);

        assert_eq!(
            fields_to_credentials(&fields),
            Err(FieldsError::MutuallyExclusive(
                FIELD_EAP_USERNAME,
                FIELD_WISPR_USERNAME,
            ))
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let fields = fields(vec![(
            "Unknown",
            arguments(&[(ARGUMENT_TYPE, Value::from("string"))]),
        )]);

        assert_eq!(
            fields_to_credentials(&fields),
            Err(FieldsError::UnknownField("Unknown".to_owned()))
        );
    }

    #[test]
    fn unknown_password_type_is_rejected() {
        let fields = fields(vec![(
            FIELD_PASSPHRASE,
            arguments(&[(ARGUMENT_TYPE, Value::from("rot13"))]),
        )]);

        assert_eq!(
            fields_to_credentials(&fields),
            Err(FieldsError::UnknownPasswordType(
                FIELD_PASSPHRASE.to_owned(),
                "rot13".to_owned(),
            ))
        );
    }

    #[test]
    fn password_without_type_is_rejected() {
        let fields = fields(vec![(
            FIELD_PASSPHRASE,
            arguments(&[(ARGUMENT_VALUE, Value::from("secret"))]),
        )]);

        assert_eq!(
            fields_to_credentials(&fields),
            Err(FieldsError::PasswordWithoutType(FIELD_PASSPHRASE.to_owned()))
        );
    }

    #[test]
    fn wps_field_must_carry_a_wps_pin() {
        let bad = fields(vec![
            (
                FIELD_PASSPHRASE,
                arguments(&[(ARGUMENT_TYPE, Value::from("psk"))]),
            ),
            (
                FIELD_WPS,
                arguments(&[(ARGUMENT_TYPE, Value::from("psk"))]),
            ),
        ]);
        assert_eq!(fields_to_credentials(&bad), Err(FieldsError::WpsFieldKind));

        let good = fields(vec![
            (
                FIELD_PASSPHRASE,
                arguments(&[(ARGUMENT_TYPE, Value::from("psk"))]),
            ),
            (
                FIELD_WPS,
                arguments(&[(ARGUMENT_TYPE, Value::from("wpspin"))]),
            ),
        ]);
        let credentials = fields_to_credentials(&good).unwrap();
        assert_eq!(
            credentials.password_alternative.unwrap().kind,
            PasswordKind::WpsPin
        );
    }

    #[test]
    fn wps_alternative_without_password_is_rejected() {
        let fields = fields(vec![(
            FIELD_WPS,
            arguments(&[(ARGUMENT_TYPE, Value::from("wpspin"))]),
        )]);

        assert_eq!(
            fields_to_credentials(&fields),
            Err(FieldsError::AlternativeWithoutPassword)
        );
    }

    #[test]
    fn previous_passphrase_fills_empty_password_of_same_type() {
        let fields = fields(vec![
            (
                FIELD_PASSPHRASE,
                arguments(&[(ARGUMENT_TYPE, Value::from("psk"))]),
            ),
            (
                FIELD_PREVIOUS_PASSPHRASE,
                arguments(&[
                    (ARGUMENT_TYPE, Value::from("psk")),
                    (ARGUMENT_VALUE, Value::from("previous secret")),
                ]),
            ),
        ]);

        let credentials = fields_to_credentials(&fields).unwrap();
        assert_eq!(credentials.password.unwrap().value, "previous secret");
    }

    #[test]
    fn previous_passphrase_does_not_override_a_provided_value() {
        let fields = fields(vec![
            (
                FIELD_PASSPHRASE,
                arguments(&[
                    (ARGUMENT_TYPE, Value::from("psk")),
                    (ARGUMENT_VALUE, Value::from("current")),
                ]),
            ),
            (
                FIELD_PREVIOUS_PASSPHRASE,
                arguments(&[
                    (ARGUMENT_TYPE, Value::from("psk")),
                    (ARGUMENT_VALUE, Value::from("previous")),
                ]),
            ),
        ]);

        let credentials = fields_to_credentials(&fields).unwrap();
        assert_eq!(credentials.password.unwrap().value, "current");
    }

    #[test]
    fn reply_prefers_text_ssid_when_valid_utf8() {
        let requested = fields(vec![
            (
                FIELD_SSID_TEXT,
                arguments(&[(ARGUMENT_TYPE, Value::from("string"))]),
            ),
            (
                FIELD_SSID_BYTES,
                arguments(&[(ARGUMENT_TYPE, Value::from("ssid"))]),
            ),
        ]);

        let credentials = Credentials {
            ssid: Some(b"Home".to_vec()),
            ..Credentials::default()
        };

        let reply = credentials_to_reply_fields(&credentials, &requested).unwrap();
        assert!(reply.contains_key(FIELD_SSID_TEXT));
        assert!(!reply.contains_key(FIELD_SSID_BYTES));
    }

    #[test]
    fn reply_falls_back_to_byte_ssid_for_invalid_utf8() {
        let requested = fields(vec![
            (
                FIELD_SSID_TEXT,
                arguments(&[(ARGUMENT_TYPE, Value::from("string"))]),
            ),
            (
                FIELD_SSID_BYTES,
                arguments(&[(ARGUMENT_TYPE, Value::from("ssid"))]),
            ),
        ]);

        let credentials = Credentials {
            ssid: Some(vec![0xff, 0xfe]),
            ..Credentials::default()
        };

        let reply = credentials_to_reply_fields(&credentials, &requested).unwrap();
        assert!(reply.contains_key(FIELD_SSID_BYTES));
        assert!(!reply.contains_key(FIELD_SSID_TEXT));
    }

    #[test]
    fn reply_places_password_in_the_requested_slot() {
        let requested = fields(vec![(
            FIELD_WISPR_PASSWORD,
            arguments(&[(ARGUMENT_TYPE, Value::from("passphrase"))]),
        )]);

        let credentials = Credentials {
            password: Some(Password {
                kind: PasswordKind::Passphrase,
                value: "secret".to_owned(),
            }),
            ..Credentials::default()
        };

        let reply = credentials_to_reply_fields(&credentials, &requested).unwrap();
        let value = reply.get(FIELD_WISPR_PASSWORD).unwrap();
        assert!(matches!(&**value, Value::Str(s) if s.as_str() == "secret"));
    }

    #[test]
    fn reply_uses_wps_slot_for_wps_pins() {
        let requested = fields(vec![
            (
                FIELD_PASSPHRASE,
                arguments(&[(ARGUMENT_TYPE, Value::from("psk"))]),
            ),
            (
                FIELD_WPS,
                arguments(&[(ARGUMENT_TYPE, Value::from("wpspin"))]),
            ),
        ]);

        let credentials = Credentials {
            password: Some(Password {
                kind: PasswordKind::WpsPin,
                value: "12345670".to_owned(),
            }),
            ..Credentials::default()
        };

        let reply = credentials_to_reply_fields(&credentials, &requested).unwrap();
        assert!(reply.contains_key(FIELD_WPS));
        assert!(!reply.contains_key(FIELD_PASSPHRASE));
    }

    #[test]
    fn field_with_non_dict_arguments_is_rejected() {
        let fields = fields(vec![(
            FIELD_PASSPHRASE,
            Value::from("not a dict").try_to_owned().unwrap(),
        )]);

        assert_eq!(
            fields_to_credentials(&fields),
            Err(FieldsError::BadArguments(FIELD_PASSPHRASE.to_owned()))
        );
    }
}
