use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// OAuth scope requested for the push relay when `PUSH_SCOPE` is not set.
pub const DEFAULT_PUSH_SCOPE: &str = "pushapi";

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
        default_value = "http://localhost:4200,https://localhost:4200"
    )]
    pub allowed_origins: Vec<String>,

    /// Base URL of the identity server that issues access tokens (e.g. http://localhost:5000).
    /// The relay requests its tokens from `<url>/connect/token`.
    #[arg(long, env)]
    identity_server_url: Option<String>,

    /// Base URL of the push broker (e.g. http://localhost:5002).
    /// The relay connects to `<url>/hubs/list`.
    #[arg(long, env)]
    push_server_url: Option<String>,

    /// Client id the relay authenticates with at the identity server.
    #[arg(long, env)]
    push_client_id: Option<String>,

    /// Client secret the relay authenticates with at the identity server.
    #[arg(long, env, hide_env_values = true)]
    push_client_secret: Option<String>,

    /// OAuth scope requested for the relay's access token.
    #[arg(long, env, default_value = DEFAULT_PUSH_SCOPE)]
    push_scope: String,

    /// Timeout in seconds for a single token request against the identity server
    #[arg(long, env, default_value_t = 10)]
    pub push_request_timeout_secs: u64,

    /// Timeout in seconds for opening the broker connection, including the hub handshake
    #[arg(long, env, default_value_t = 15)]
    pub push_handshake_timeout_secs: u64,

    /// Interval in seconds between keep-alive pings sent on an idle broker connection
    #[arg(long, env, default_value_t = 15)]
    pub push_keep_alive_secs: u64,

    /// Seed the todo store with an initial list on startup
    #[arg(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub seed_data: bool,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
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

    pub fn identity_server_url(&self) -> Option<&str> {
        self.identity_server_url.as_deref()
    }

    pub fn push_server_url(&self) -> Option<&str> {
        self.push_server_url.as_deref()
    }

    pub fn push_client_id(&self) -> Option<&str> {
        self.push_client_id.as_deref()
    }

    pub fn push_client_secret(&self) -> Option<&str> {
        self.push_client_secret.as_deref()
    }

    pub fn push_scope(&self) -> &str {
        &self.push_scope
    }

    /// True when every setting the push relay needs to reach the broker is present.
    pub fn push_enabled(&self) -> bool {
        self.identity_server_url.is_some()
            && self.push_server_url.is_some()
            && self.push_client_id.is_some()
            && self.push_client_secret.is_some()
    }

    pub fn push_request_timeout(&self) -> Duration {
        Duration::from_secs(self.push_request_timeout_secs)
    }

    pub fn push_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.push_handshake_timeout_secs)
    }

    pub fn push_keep_alive(&self) -> Duration {
        Duration::from_secs(self.push_keep_alive_secs)
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }
}
