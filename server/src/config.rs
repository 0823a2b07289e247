use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Echo room-chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "echo-server", version, about = "Echo anonymous room-chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "ECHO_PORT", default_value = "8000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "ECHO_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./echo.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "ECHO_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, JWT key)
    #[arg(long, env = "ECHO_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Insert the official rooms on startup if none exist yet
    #[arg(
        long,
        env = "ECHO_SEED_OFFICIAL_ROOMS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub seed_official_rooms: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: "./echo.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            seed_official_rooms: true,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (ECHO_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        Self::layered(cli)
    }

    fn layered(cli: Config) -> Result<Self, figment::Error> {
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("ECHO_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Echo Server Configuration
# Place this file at ./echo.toml or specify with --config <path>
# All settings can be overridden via environment variables (ECHO_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database (echo.db) and JWT signing key (jwt_secret)
# data_dir = "./data"

# Insert the official rooms (Safe Space, Tech Hub, ...) on first boot
# seed_official_rooms = true
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Config::parse_from(["echo-server"]);
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.data_dir, "./data");
        assert!(cli.seed_official_rooms);
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_seed_flag_can_be_disabled() {
        let cli = Config::parse_from(["echo-server", "--seed-official-rooms", "false", "--port", "9100"]);
        let config = Config::layered(cli).unwrap();
        assert!(!config.seed_official_rooms);
        assert_eq!(config.port, 9100);
    }

    #[test]
    fn test_template_is_valid_toml() {
        let template = generate_config_template();
        let parsed: Result<Config, _> = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&template))
            .extract();
        assert!(parsed.is_ok());
    }
}
