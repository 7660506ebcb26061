use clap::Parser;

/// Command line arguments of the daemon.
#[derive(Debug, Parser)]
#[command(name = "cmrs-daemon", disable_version_flag = true)]
pub struct Arguments {
    /// Print version and exit
    #[arg(long = "version")]
    pub print_version_and_exit: bool,
}

impl Arguments {
    /// Parse `args`, printing any parse error. Returns `None` on failure
    /// (and on `--help`, which clap reports as an "error" after printing
    /// the help text).
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
    fn no_arguments_succeeds() {
        let arguments = Arguments::parse(["program"]);

        assert!(arguments.is_some());
        assert!(!arguments.unwrap().print_version_and_exit);
    }

    #[test]
    fn non_existing_argument_fails() {
        let arguments = Arguments::parse(["program", "--does_not_exist"]);

        assert!(arguments.is_none());
    }

    #[test]
    fn version_argument_sets_print_version_and_exit() {
        let arguments = Arguments::parse(["program", "--version"]);

        assert!(arguments.unwrap().print_version_and_exit);
    }
}
