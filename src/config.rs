use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the transcription orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    /// Volcengine engine settings (flash + standard)
    pub volc: VolcConfig,

    /// DashScope Qwen flash engine settings
    pub qwen: QwenConfig,

    /// DashScope Paraformer async transcription settings
    pub paraformer: ParaformerConfig,

    /// Orchestrator strategy settings
    pub orchestrator: OrchestratorConfig,

    /// Hotword list shared by all engines; biases recognition, empty = no bias
    pub hotwords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolcConfig {
    /// Application id issued by the vendor console
    pub app_id: String,

    /// Access token paired with the app id
    pub access_token: String,

    /// Flash (single-call) request timeout in seconds
    pub flash_timeout_secs: u64,

    /// Flash retry budget (attempts = retries + 1)
    pub flash_max_retries: u32,

    /// Fixed delay between flash retries, milliseconds
    pub flash_retry_delay_ms: u64,

    /// Maximum byte-payload size accepted before the network call
    pub flash_max_payload_bytes: usize,

    /// Standard (submit+poll) poll interval in seconds
    pub standard_poll_interval_secs: u64,

    /// Standard maximum wall-clock poll time in seconds
    pub standard_max_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QwenConfig {
    /// DashScope API key
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry budget (attempts = retries + 1)
    pub max_retries: u32,

    /// Fixed delay between retries, milliseconds
    pub retry_delay_ms: u64,

    /// Maximum byte-payload size accepted before the network call
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParaformerConfig {
    /// DashScope API key
    pub api_key: String,

    /// Model name (fun-asr stable, or paraformer-v2)
    pub model: String,

    /// Poll interval in seconds
    pub poll_interval_secs: u64,

    /// Maximum wall-clock poll time in seconds
    pub max_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Primary engine name: volc-flash | volc-standard | qwen | paraformer
    pub primary: String,

    /// Backup engine name
    pub backup: String,

    /// Delay between Mixed-strategy foreground attempts, milliseconds
    pub retry_delay_ms: u64,
}

impl AsrConfig {
    /// Load configuration from file, falling back to environment variables
    pub fn load() -> Result<Self> {
        let config_paths = [
            "pod-asr.toml",
            "config/pod-asr.toml",
            "~/.config/pod-asr/config.toml",
            "/etc/pod-asr/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<AsrConfig>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env_overrides();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override credentials and tunables from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = std::env::var("POD_ASR_VOLC_APP_ID") {
            self.volc.app_id = app_id;
        }
        if let Ok(token) = std::env::var("POD_ASR_VOLC_ACCESS_TOKEN") {
            self.volc.access_token = token;
        }
        if let Ok(key) = std::env::var("POD_ASR_QWEN_API_KEY") {
            self.qwen.api_key = key;
        }
        if let Ok(key) = std::env::var("POD_ASR_PARAFORMER_API_KEY") {
            self.paraformer.api_key = key;
        }
        if let Ok(primary) = std::env::var("POD_ASR_PRIMARY_ENGINE") {
            self.orchestrator.primary = primary;
        }
        if let Ok(backup) = std::env::var("POD_ASR_BACKUP_ENGINE") {
            self.orchestrator.backup = backup;
        }
        if let Ok(delay) = std::env::var("POD_ASR_RETRY_DELAY_MS") {
            if let Ok(delay) = delay.parse() {
                self.orchestrator.retry_delay_ms = delay;
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for engine in [&self.orchestrator.primary, &self.orchestrator.backup] {
            match engine.as_str() {
                "volc-flash" | "volc-standard" => {
                    if self.volc.app_id.is_empty() || self.volc.access_token.is_empty() {
                        return Err(anyhow!("Volcengine credentials required for engine '{}'", engine));
                    }
                }
                "qwen" => {
                    if self.qwen.api_key.is_empty() {
                        return Err(anyhow!("Qwen API key required"));
                    }
                }
                "paraformer" => {
                    if self.paraformer.api_key.is_empty() {
                        return Err(anyhow!("Paraformer API key required"));
                    }
                }
                other => return Err(anyhow!("Unknown engine name: {}", other)),
            }
        }

        if self.orchestrator.primary == self.orchestrator.backup {
            return Err(anyhow!("Primary and backup engines must differ"));
        }
        if self.volc.flash_max_payload_bytes == 0 {
            return Err(anyhow!("flash_max_payload_bytes must be greater than 0"));
        }
        if self.volc.standard_poll_interval_secs == 0 || self.paraformer.poll_interval_secs == 0 {
            return Err(anyhow!("poll intervals must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            volc: VolcConfig {
                app_id: String::new(),
                access_token: String::new(),
                flash_timeout_secs: 120,
                flash_max_retries: 1,
                flash_retry_delay_ms: 1000,
                flash_max_payload_bytes: 100 * 1024 * 1024,
                standard_poll_interval_secs: 3,
                standard_max_poll_secs: 600,
            },
            qwen: QwenConfig {
                api_key: String::new(),
                timeout_secs: 30,
                max_retries: 2,
                retry_delay_ms: 500,
                max_payload_bytes: 10 * 1024 * 1024,
            },
            paraformer: ParaformerConfig {
                api_key: String::new(),
                model: "fun-asr".to_string(),
                poll_interval_secs: 3,
                max_poll_secs: 600,
            },
            orchestrator: OrchestratorConfig {
                primary: "volc-flash".to_string(),
                backup: "qwen".to_string(),
                retry_delay_ms: 500,
            },
            hotwords: vec![],
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct AsrConfigBuilder {
    config: AsrConfig,
}

impl AsrConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AsrConfig::default(),
        }
    }

    pub fn with_volc_credentials(mut self, app_id: String, access_token: String) -> Self {
        self.config.volc.app_id = app_id;
        self.config.volc.access_token = access_token;
        self
    }

    pub fn with_qwen_api_key(mut self, api_key: String) -> Self {
        self.config.qwen.api_key = api_key;
        self
    }

    pub fn with_paraformer_api_key(mut self, api_key: String) -> Self {
        self.config.paraformer.api_key = api_key;
        self
    }

    pub fn with_engines(mut self, primary: &str, backup: &str) -> Self {
        self.config.orchestrator.primary = primary.to_string();
        self.config.orchestrator.backup = backup.to_string();
        self
    }

    pub fn with_hotwords(mut self, hotwords: Vec<String>) -> Self {
        self.config.hotwords = hotwords;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.orchestrator.retry_delay_ms = delay_ms;
        self
    }

    pub fn build(self) -> AsrConfig {
        self.config
    }
}

impl Default for AsrConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
