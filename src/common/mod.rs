//! Commonly used code.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug, Default)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Args {
    /// Whether non-essential warnings are suppressed, i.e., `-q` was given at least once.
    pub fn quiet(&self) -> bool {
        self.verbose
            .log_level()
            .map_or(true, |level| level < log::Level::Info)
    }

    /// The `tracing` level corresponding to the verbosity flags.
    pub fn tracing_level(&self) -> tracing::Level {
        match self.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::ERROR,
        }
    }
}

/// The version of `moi-collate` package.
#[cfg(not(test))]
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// This allows us to override the version to `0.0.0` in tests.
pub fn version() -> &'static str {
    #[cfg(test)]
    return "0.0.0";
    #[cfg(not(test))]
    return VERSION;
}

#[cfg(test)]
mod test {
    use clap_verbosity_flag::Verbosity;
    use pretty_assertions::assert_eq;

    use super::*;

    #[rstest::rstest]
    #[case(0, 0, false, tracing::Level::INFO)]
    #[case(0, 1, true, tracing::Level::WARN)]
    #[case(0, 2, true, tracing::Level::ERROR)]
    #[case(0, 3, true, tracing::Level::ERROR)]
    #[case(2, 0, false, tracing::Level::TRACE)]
    fn quiet_and_level(
        #[case] verbose: u8,
        #[case] quiet: u8,
        #[case] expected_quiet: bool,
        #[case] expected_level: tracing::Level,
    ) {
        let args = Args {
            verbose: Verbosity::new(verbose, quiet),
        };

        assert_eq!(args.quiet(), expected_quiet);
        assert_eq!(args.tracing_level(), expected_level);
    }
}
