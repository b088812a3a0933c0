use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health/API server port (default: 8716)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8716
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding all persisted state files
    #[serde(default = "default_store_dir")]
    pub dir: String,
}

fn default_store_dir() -> String {
    "data/state".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Address the agent votes and attests as
    #[serde(default)]
    pub agent_address: String,
    /// Chain attestations are submitted to
    #[serde(default = "default_attestation_chain")]
    pub attestation_chain: String,
}

fn default_attestation_chain() -> String {
    "base".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_address: String::new(),
            attestation_chain: default_attestation_chain(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Bounded transition history capacity
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Transitions closer together than this are flagged as fast (seconds)
    #[serde(default = "default_fast_threshold_secs")]
    pub fast_threshold_secs: f64,
}

fn default_history_capacity() -> usize {
    100
}

fn default_fast_threshold_secs() -> f64 {
    5.0
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            fast_threshold_secs: default_fast_threshold_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// Chains the ledger tracks; mutations against any other chain fail fast
    #[serde(default = "default_chains")]
    pub chains: Vec<String>,
    /// Required activity rate per second, scaled by 1e18 (staking-contract
    /// convention). Default is one on-chain action per day.
    #[serde(default = "default_liveness_ratio")]
    pub liveness_ratio: u128,
}

fn default_chains() -> Vec<String> {
    vec!["base".to_string()]
}

fn default_liveness_ratio() -> u128 {
    // 1e18 / 86_400, truncated
    11_574_074_074_074
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            liveness_ratio: default_liveness_ratio(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttestationConfig {
    /// Maximum submission attempts before a record is dead-lettered
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Snapshot cache time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_cache_ttl_secs() -> u64 {
    10
}

fn default_probe_timeout_ms() -> u64 {
    50
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollaboratorConfig {
    /// Candidate source base URL
    #[serde(default)]
    pub candidate_source_url: Option<String>,
    /// Decision engine base URL
    #[serde(default)]
    pub decision_engine_url: Option<String>,
    /// Chain submitter base URL
    #[serde(default)]
    pub submitter_url: Option<String>,
    /// JSON-RPC endpoint polled by the connectivity probe
    #[serde(default)]
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Optional directory for rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("QUORATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (QUORATE__ACTIVITY__CHAINS, etc.)
            .add_source(
                Environment::with_prefix("QUORATE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.activity.chains.is_empty() {
            errors.push("activity.chains must list at least one chain".to_string());
        }

        if self.activity.liveness_ratio == 0 {
            errors.push("activity.liveness_ratio must be positive".to_string());
        }

        if self.attestation.max_retries == 0 {
            errors.push("attestation.max_retries must be at least 1".to_string());
        }

        if self.tracker.history_capacity == 0 {
            errors.push("tracker.history_capacity must be at least 1".to_string());
        }

        if self.tracker.fast_threshold_secs <= 0.0 {
            errors.push("tracker.fast_threshold_secs must be positive".to_string());
        }

        if !self
            .activity
            .chains
            .contains(&self.orchestrator.attestation_chain)
        {
            errors.push(format!(
                "orchestrator.attestation_chain '{}' is not in activity.chains",
                self.orchestrator.attestation_chain
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            tracker: TrackerConfig::default(),
            activity: ActivityConfig::default(),
            attestation: AttestationConfig::default(),
            health: HealthConfig::default(),
            collaborators: CollaboratorConfig::default(),
            logging: LoggingConfig::default(),
            port: default_port(),
        }
    }
}
