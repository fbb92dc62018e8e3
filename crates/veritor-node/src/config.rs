use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use veritor_economics::{AccountAddress, VeriAmount};
use veritor_oracle::OracleConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub oracle: OracleSettings,
    pub genesis: GenesisConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "rocksdb" (requires the rocksdb feature)
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Oracle parameters as operators write them: whole-VERI decimals rather
/// than base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    pub min_requester_stake: f64,
    pub min_prover_stake: f64,
    pub dispute_window_secs: u64,
    /// Hex address allowed on the admin routes. The all-zero default locks
    /// the admin surface until an operator sets a real address.
    pub owner: String,
}

impl From<OracleSettings> for OracleConfig {
    fn from(settings: OracleSettings) -> Self {
        OracleConfig {
            min_requester_stake: VeriAmount::from_veri(settings.min_requester_stake),
            min_prover_stake: VeriAmount::from_veri(settings.min_prover_stake),
            dispute_window_secs: settings.dispute_window_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub allocations: Vec<GenesisAllocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: String,
    /// Whole VERI
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty", "compact", or "json"
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub show_emoji_legend: bool,
    pub show_boot_banner: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            show_emoji_legend: true,
            show_boot_banner: true,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "veritor-node".to_string(),
                data_dir: PathBuf::from("./data"),
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
            },
            api: ApiConfig {
                enabled: true,
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            oracle: OracleSettings {
                min_requester_stake: 0.1,
                min_prover_stake: 0.5,
                dispute_window_secs: 24 * 60 * 60,
                owner: AccountAddress::from_bytes([0u8; 32]).to_hex(),
            },
            genesis: GenesisConfig {
                allocations: vec![],
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        // Env overrides are applied by main so the precedence order stays
        // in one place
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = env::var("VERITOR_DATA_DIR") {
            self.node.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(name) = env::var("VERITOR_NODE_NAME") {
            if !name.is_empty() {
                self.node.name = name;
            }
        }
        if let Ok(backend) = env::var("VERITOR_STORAGE_BACKEND") {
            if !backend.is_empty() {
                self.storage.backend = backend;
            }
        }

        if let Ok(api_host) = env::var("VERITOR_API_HOST") {
            self.api.host = api_host;
        }
        if let Ok(api_port) = env::var("VERITOR_API_PORT") {
            if let Ok(port) = api_port.parse() {
                self.api.port = port;
            }
        }

        if let Ok(owner) = env::var("VERITOR_OWNER") {
            if !owner.is_empty() {
                self.oracle.owner = owner;
            }
        }
        if let Ok(stake) = env::var("VERITOR_MIN_REQUESTER_STAKE") {
            if let Ok(val) = stake.parse() {
                self.oracle.min_requester_stake = val;
            }
        }
        if let Ok(stake) = env::var("VERITOR_MIN_PROVER_STAKE") {
            if let Ok(val) = stake.parse() {
                self.oracle.min_prover_stake = val;
            }
        }
        if let Ok(window) = env::var("VERITOR_DISPUTE_WINDOW_SECS") {
            if let Ok(val) = window.parse() {
                self.oracle.dispute_window_secs = val;
            }
        }

        if let Ok(level) = env::var("VERITOR_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn oracle_params(&self) -> OracleConfig {
        self.oracle.clone().into()
    }

    pub fn owner_address(&self) -> Result<AccountAddress> {
        AccountAddress::from_hex(&self.oracle.owner)
    }
}
