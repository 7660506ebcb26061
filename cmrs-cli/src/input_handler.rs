//! Prompting the user for credentials on the terminal.
//!
//! The handler is handed to whatever needs it instead of living in a
//! process-wide singleton, so its scope is explicit.

use std::io::{self, BufRead, Write};

use cmrs_core::{Credentials, Password, PasswordKind};

fn password_kind_str(kind: PasswordKind) -> &'static str {
    match kind {
        PasswordKind::Passphrase => "passphrase",
        PasswordKind::WpaPsk => "WPA PSK",
        PasswordKind::WepKey => "WEP key",
        PasswordKind::WpsPin => "WPS pin",
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputHandler;

impl InputHandler {
    pub fn new() -> Self {
        Self
    }

    /// Prompt for each requested field. Blocking; run off the async loop.
    pub fn prompt_for_credentials(
        &self,
        description_type: &str,
        description_id: &str,
        requested: &Credentials,
    ) -> Credentials {
        let mut credentials = Credentials::default();

        if description_id.is_empty() {
            println!("Enter credentials for {description_type}");
        } else {
            println!("Enter credentials for {description_type} {description_id}");
        }

        if let Some(default_ssid) = &requested.ssid {
            let default = String::from_utf8_lossy(default_ssid).into_owned();
            credentials.ssid = Some(prompt_for_value("SSID", &default).into_bytes());
        }

        if let Some(default_username) = &requested.username {
            credentials.username = Some(prompt_for_value("Username", default_username));
        }

        if let Some(password) = &requested.password {
            let mut kind = password.kind;
            let alternative = requested.password_alternative.as_ref();
            const WANT_ALTERNATIVE: &str = "a";

            let mut what = format!("Password ({}", password_kind_str(kind));
            if alternative.is_some() {
                what += &format!(", '{WANT_ALTERNATIVE}' to use alternative");
            }
            what += ")";

            let mut value = prompt_for_value(&what, &password.value);

            if let Some(alternative) = alternative {
                if value == WANT_ALTERNATIVE {
                    kind = alternative.kind;
                    let what = format!("Password ({}, alternative)", password_kind_str(kind));
                    value = prompt_for_value(&what, &password.value);
                }
            }

            credentials.password = Some(Password { kind, value });
        }

        credentials
    }
}

fn prompt_for_value(what: &str, default_value: &str) -> String {
    let mut prompt = what.to_owned();
    if !default_value.is_empty() {
        prompt += &format!(" (default: \"{default_value}\")");
    }
    prompt += ": ";

    print!("{prompt}");
    let _ = io::stdout().flush();

    let mut result = String::new();
    if io::stdin().lock().read_line(&mut result).is_err() {
        result.clear();
    }

    let result = result.trim_end_matches(['\r', '\n']).to_owned();
    if result.is_empty() {
        default_value.to_owned()
    } else {
        result
    }
}
