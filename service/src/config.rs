use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Paths that bypass the session gatekeeper unless overridden with `PUBLIC_PATHS`.
pub const DEFAULT_PUBLIC_PATHS: &str =
    "/login,/api,/health,/_next,/static,/assets,/.well-known,/favicon.ico,/robots.txt";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Base URL of the upstream auth gateway. Session refreshes are sent to
    /// `{auth_base_url}/auth/refresh`.
    #[arg(long, env, default_value = "http://localhost:4100")]
    auth_base_url: String,

    /// Base URL of the upstream notification service. Event streams are opened
    /// against `{notification_base_url}/sse`.
    #[arg(long, env, default_value = "http://localhost:4200")]
    notification_base_url: String,

    /// Origin sent to upstream services when the inbound request carries none.
    #[arg(long, env)]
    gateway_origin: Option<String>,

    /// Name of the cookie carrying the short-lived access token
    #[arg(long, env, default_value = "access_token")]
    access_token_cookie: String,

    /// Name of the cookie carrying the long-lived refresh token
    #[arg(long, env, default_value = "refresh_token")]
    refresh_token_cookie: String,

    /// Where unauthenticated page requests get redirected
    #[arg(long, env, default_value = "/login")]
    login_path: String,

    /// Path prefixes that are served without any session check.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = DEFAULT_PUBLIC_PATHS
    )]
    pub public_paths: Vec<String>,

    /// Upper bound in milliseconds for the server-to-server session refresh call
    #[arg(long, env, default_value_t = 5000)]
    pub refresh_timeout_ms: u64,

    /// Timeout in seconds for establishing the upstream notification connection.
    /// The stream itself may stay open indefinitely.
    #[arg(long, env, default_value_t = 10)]
    pub upstream_connect_timeout_secs: u64,

    /// Number of upstream chunks the relay buffers before it stops reading
    /// from the notification service.
    #[arg(long, env, default_value_t = 16)]
    pub relay_buffer_chunks: usize,

    /// Directory of pages and assets served behind the session gatekeeper
    #[arg(long, env, default_value = "./public")]
    static_dir: String,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed
    /// on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new([
            "OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"
        ])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn auth_base_url(&self) -> &str {
        self.auth_base_url.trim_end_matches('/')
    }

    pub fn set_auth_base_url(mut self, auth_base_url: String) -> Self {
        self.auth_base_url = auth_base_url;
        self
    }

    /// Full URL of the upstream session refresh endpoint.
    pub fn refresh_url(&self) -> String {
        format!("{}/auth/refresh", self.auth_base_url())
    }

    pub fn notification_base_url(&self) -> &str {
        self.notification_base_url.trim_end_matches('/')
    }

    pub fn set_notification_base_url(mut self, notification_base_url: String) -> Self {
        self.notification_base_url = notification_base_url;
        self
    }

    /// Full URL of the upstream notification event stream.
    pub fn notification_stream_url(&self) -> String {
        format!("{}/sse", self.notification_base_url())
    }

    pub fn gateway_origin(&self) -> Option<&str> {
        self.gateway_origin.as_deref()
    }

    pub fn access_token_cookie(&self) -> &str {
        &self.access_token_cookie
    }

    pub fn refresh_token_cookie(&self) -> &str {
        &self.refresh_token_cookie
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn static_dir(&self) -> &str {
        &self.static_dir
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }
}
