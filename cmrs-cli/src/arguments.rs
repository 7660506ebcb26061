use clap::{Args, Parser, Subcommand};

/// Command line arguments of the client.
#[derive(Debug, Parser)]
#[command(name = "cmrs", disable_version_flag = true)]
pub struct Arguments {
    /// Print version and exit
    #[arg(long = "version")]
    pub print_version_and_exit: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Monitor changes
    Monitor(MonitorArguments),

    /// Wi-Fi operations
    Wifi {
        #[command(subcommand)]
        command: WifiCommand,
    },
}

#[derive(Debug, Args)]
pub struct MonitorArguments {
    /// Print initial state
    #[arg(short = 'i', long = "initial-state")]
    pub initial_state: bool,
}

#[derive(Debug, Subcommand)]
pub enum WifiCommand {
    /// Enable Wi-Fi
    Enable,

    /// Disable Wi-Fi
    Disable,

    /// Show Wi-Fi status and access points
    Status,

    /// Connect to Wi-Fi access point
    Connect {
        /// SSID of the access point
        #[arg(short = 's', long = "ssid")]
        ssid: String,
    },

    /// Disconnect from Wi-Fi access point
    Disconnect {
        /// SSID of the access point
        #[arg(short = 's', long = "ssid")]
        ssid: String,
    },

    /// Enable Wi-Fi hotspot
    EnableHotspot {
        /// SSID for the hotspot
        #[arg(short = 's', long = "ssid")]
        ssid: Option<String>,

        /// Passphrase for the hotspot
        #[arg(short = 'p', long = "passphrase")]
        passphrase: Option<String>,
    },

    /// Disable Wi-Fi hotspot
    DisableHotspot,
}

impl Arguments {
    /// Parse `args`, printing any parse error. Returns `None` on failure.
    pub fn parse<I, T>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(arguments) => Some(arguments),
            Err(error) => {
                let _ = error.print();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_argument_sets_print_version_and_exit() {
        let arguments = Arguments::parse(["program", "--version"]).unwrap();

        assert!(arguments.print_version_and_exit);
        assert!(arguments.command.is_none());
    }

    #[test]
    fn unknown_command_fails() {
        assert!(Arguments::parse(["program", "--does_not_exist"]).is_none());
        assert!(Arguments::parse(["program", "does-not-exist"]).is_none());
    }

    #[test]
    fn monitor_accepts_initial_state_flag() {
        let arguments = Arguments::parse(["program", "monitor", "-i"]).unwrap();

        match arguments.command {
            Some(Command::Monitor(monitor)) => assert!(monitor.initial_state),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn wifi_connect_requires_an_ssid() {
        assert!(Arguments::parse(["program", "wifi", "connect"]).is_none());

        let arguments =
            Arguments::parse(["program", "wifi", "connect", "-s", "Home"]).unwrap();
        match arguments.command {
            Some(Command::Wifi {
                command: WifiCommand::Connect { ssid },
            }) => assert_eq!(ssid, "Home"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn wifi_enable_takes_no_ssid() {
        assert!(Arguments::parse(["program", "wifi", "enable", "-s", "Home"]).is_none());
        assert!(Arguments::parse(["program", "wifi", "enable"]).is_some());
    }

    #[test]
    fn enable_hotspot_accepts_ssid_and_passphrase() {
        let arguments = Arguments::parse([
            "program",
            "wifi",
            "enable-hotspot",
            "-s",
            "Spot",
            "-p",
            "secret",
        ])
        .unwrap();

        match arguments.command {
            Some(Command::Wifi {
                command: WifiCommand::EnableHotspot { ssid, passphrase },
            }) => {
                assert_eq!(ssid.as_deref(), Some("Spot"));
                assert_eq!(passphrase.as_deref(), Some("secret"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
