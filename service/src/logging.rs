use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ConfigBuilder, TermLogger};

/// HTTP stack crates that log every frame and connection event. Their output
/// is only useful when chasing a transport problem, so it is hidden below Trace.
const FILTERED_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "rustls",
    "tower",
    "tower_http",
    "axum",
    "mockito",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger at the verbosity configured in `config`.
    ///
    /// Fails if a logger was already installed for this process.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;

        TermLogger::init(
            level,
            Self::build_log_config(Self::dependency_filters(level)),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
    }

    /// Modules to silence at the given level: none at Trace, the HTTP stack otherwise.
    fn dependency_filters(level: LevelFilter) -> &'static [&'static str] {
        if level == LevelFilter::Trace {
            &[]
        } else {
            FILTERED_MODULES
        }
    }

    fn build_log_config(ignored_modules: &[&'static str]) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        for &module in ignored_modules {
            builder.add_filter_ignore_str(module);
        }

        builder.build()
    }
}
