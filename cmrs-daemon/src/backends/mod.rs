//! Provider backends. ConnMan is the only one.

pub mod agent;
pub mod connect_queue;
pub mod connman;
pub mod connman_dbus;
pub mod service;
pub mod settable_property;
pub mod technology;

use std::collections::HashMap;

use log::warn;
use tokio::task::JoinHandle;
use zvariant::{OwnedValue, Value};

/// Join handle that aborts its task when dropped.
///
/// Per-object signal forwarders are tied to the lifetime of the object
/// they report for; dropping the object must stop its completions.
pub(crate) struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(crate) fn bool_from_value(value: &Value<'_>, name: &str, context: &str) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => {
            warn!("Invalid type {} for {context} property \"{name}\"", value.value_signature());
            None
        }
    }
}

pub(crate) fn string_from_value(value: &Value<'_>, name: &str, context: &str) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.as_str().to_owned()),
        _ => {
            warn!("Invalid type {} for {context} property \"{name}\"", value.value_signature());
            None
        }
    }
}

pub(crate) fn byte_from_value(value: &Value<'_>, name: &str, context: &str) -> Option<u8> {
    match value {
        Value::U8(b) => Some(*b),
        _ => {
            warn!("Invalid type {} for {context} property \"{name}\"", value.value_signature());
            None
        }
    }
}

pub(crate) fn string_list_from_value(
    value: &Value<'_>,
    name: &str,
    context: &str,
) -> Option<Vec<String>> {
    let strings = match value {
        Value::Array(array) => array
            .iter()
            .map(|element| match element {
                Value::Str(s) => Some(s.as_str().to_owned()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>(),
        _ => None,
    };

    if strings.is_none() {
        warn!("Invalid type {} for {context} property \"{name}\"", value.value_signature());
    }

    strings
}

pub(crate) fn bool_from_map(
    map: &HashMap<String, OwnedValue>,
    name: &str,
    context: &str,
    default: bool,
) -> bool {
    map.get(name)
        .and_then(|value| bool_from_value(value, name, context))
        .unwrap_or(default)
}

pub(crate) fn string_from_map(
    map: &HashMap<String, OwnedValue>,
    name: &str,
    context: &str,
) -> String {
    map.get(name)
        .and_then(|value| string_from_value(value, name, context))
        .unwrap_or_default()
}

pub(crate) fn byte_from_map(
    map: &HashMap<String, OwnedValue>,
    name: &str,
    context: &str,
    default: u8,
) -> u8 {
    map.get(name)
        .and_then(|value| byte_from_value(value, name, context))
        .unwrap_or(default)
}

pub(crate) fn string_list_from_map(
    map: &HashMap<String, OwnedValue>,
    name: &str,
    context: &str,
) -> Vec<String> {
    map.get(name)
        .and_then(|value| string_list_from_value(value, name, context))
        .unwrap_or_default()
}
