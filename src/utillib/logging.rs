//! Log level selection for programs using this library. The library
//! itself only emits through the `log` facade; where the messages go
//! is decided by the program, via `init_logging`.

use log::LevelFilter;

// Do *not* make the fields public here to force going through `From`/`Into`, OK?
#[derive(Debug, Clone, Copy, Default, clap::Args)]
pub struct LogLevelOpt {
    /// Show what is being done
    #[clap(short, long)]
    verbose: bool,

    /// Show information that helps debug this program (implies
    /// `--verbose`)
    #[clap(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Only warnings and errors
    Quiet,
    /// Verbose execution, not for debugging this program but for
    /// giving the user information about what is going on
    Info,
    /// Highest amount of log statement, for debugging this program
    Debug,
}

impl From<LogLevelOpt> for LogLevel {
    fn from(value: LogLevelOpt) -> Self {
        match value {
            LogLevelOpt {
                verbose: false,
                debug: false,
            } => LogLevel::Quiet,
            LogLevelOpt {
                verbose: true,
                debug: false,
            } => LogLevel::Info,
            LogLevelOpt {
                verbose: _,
                debug: true,
            } => LogLevel::Debug,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Quiet => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Trace,
        }
    }
}

/// Send log messages to stderr. `RUST_LOG`, if set, is applied on top
/// of `level`. Calling this more than once has no further effect.
pub fn init_logging(level: LogLevel) {
    let _ = env_logger::Builder::new()
        .filter_level(level.into())
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_levels() {
        let opt = |verbose, debug| LogLevelOpt { verbose, debug };
        assert_eq!(LogLevel::from(opt(false, false)), LogLevel::Quiet);
        assert_eq!(LogLevel::from(opt(true, false)), LogLevel::Info);
        assert_eq!(LogLevel::from(opt(false, true)), LogLevel::Debug);
        assert_eq!(LogLevel::from(opt(true, true)), LogLevel::Debug);
        assert!(LogLevel::Quiet < LogLevel::Info);
        assert_eq!(LevelFilter::from(LogLevel::Info), LevelFilter::Info);
    }

    #[test]
    fn t_init_twice() {
        init_logging(LogLevel::Debug);
        init_logging(LogLevel::Quiet);
        log::debug!("still fine");
    }
}
