use std::collections::HashMap;

use cmrs_core::credentials::{Credentials, CredentialsError, Password, PasswordKind};
use zvariant::{OwnedValue, StructureBuilder, Value};

fn owned(value: Value<'_>) -> OwnedValue {
    value.try_to_owned().unwrap()
}

fn password_value(kind: &str, value: &str) -> OwnedValue {
    owned(Value::Structure(
        StructureBuilder::new()
            .add_field(kind.to_owned())
            .add_field(value.to_owned())
            .build(),
    ))
}

#[test]
fn wire_round_trip_preserves_all_fields() {
    let original = Credentials {
        ssid: Some(b"Test SSID".to_vec()),
        username: Some("Test username".to_owned()),
        password: Some(Password {
            kind: PasswordKind::WpaPsk,
            value: "Test WPA PSK".to_owned(),
        }),
        password_alternative: Some(Password {
            kind: PasswordKind::WpsPin,
            value: "Test WPS PIN".to_owned(),
        }),
    };

    let wire = original.to_wire().unwrap();
    let converted = Credentials::from_wire(&wire).unwrap();

    assert_eq!(converted, original);
}

#[test]
fn empty_wire_value_is_rejected() {
    let empty = HashMap::new();

    assert_eq!(
        Credentials::from_wire(&empty),
        Err(CredentialsError::Empty)
    );
}

#[test]
fn unknown_entry_is_rejected() {
    let mut wire = HashMap::new();
    wire.insert("unknown".to_owned(), owned(Value::from("")));

    assert_eq!(
        Credentials::from_wire(&wire),
        Err(CredentialsError::UnknownEntry("unknown".to_owned()))
    );
}

#[test]
fn ssid_must_be_a_byte_array() {
    let mut valid = HashMap::new();
    valid.insert(
        "ssid".to_owned(),
        owned(Value::from(b"An SSID".to_vec())),
    );
    assert!(Credentials::from_wire(&valid).is_ok());

    let mut invalid = HashMap::new();
    invalid.insert("ssid".to_owned(), owned(Value::from(0i32)));
    assert_eq!(
        Credentials::from_wire(&invalid),
        Err(CredentialsError::WrongType("ssid"))
    );
}

#[test]
fn username_must_be_a_string() {
    let mut valid = HashMap::new();
    valid.insert("username".to_owned(), owned(Value::from("A Name")));
    assert!(Credentials::from_wire(&valid).is_ok());

    let mut invalid = HashMap::new();
    invalid.insert("username".to_owned(), owned(Value::from(0i32)));
    assert_eq!(
        Credentials::from_wire(&invalid),
        Err(CredentialsError::WrongType("username"))
    );
}

#[test]
fn unknown_password_kind_is_rejected() {
    let mut wire = HashMap::new();
    wire.insert(
        "password".to_owned(),
        password_value("unknown_password_kind", "1"),
    );

    assert_eq!(
        Credentials::from_wire(&wire),
        Err(CredentialsError::UnknownPasswordKind(
            "unknown_password_kind".to_owned()
        ))
    );
}

#[test]
fn password_must_be_a_kind_value_pair() {
    let mut valid = HashMap::new();
    valid.insert("password".to_owned(), password_value("passphrase", "123"));
    let credentials = Credentials::from_wire(&valid).unwrap();
    assert_eq!(
        credentials.password,
        Some(Password {
            kind: PasswordKind::Passphrase,
            value: "123".to_owned(),
        })
    );

    let mut invalid = HashMap::new();
    invalid.insert("password".to_owned(), owned(Value::from("passphrase")));
    assert_eq!(
        Credentials::from_wire(&invalid),
        Err(CredentialsError::WrongType("password"))
    );
}

#[test]
fn absent_fields_are_not_encoded() {
    let credentials = Credentials {
        username: Some("user".to_owned()),
        ..Credentials::default()
    };

    let wire = credentials.to_wire().unwrap();
    assert_eq!(wire.len(), 1);
    assert!(wire.contains_key("username"));
}
