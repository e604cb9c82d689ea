use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{PacemakerError, Result};

/// Top-level config (pacemaker.toml + PACEMAKER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacemakerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stamina: StaminaConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tasks: TaskRunnerConfig,
    pub bot: BotIdentity,
}

impl PacemakerConfig {
    /// Resolves the config file path the same way `load` does, without
    /// reading or parsing it — explicit path argument, else
    /// `~/.pacemaker/pacemaker.toml`. Lets callers distinguish "no config
    /// file present yet" from a config file that exists but fails to
    /// parse or validate (the latter is fatal, see `load`).
    pub fn resolve_path(config_path: Option<&str>) -> String {
        config_path.map(String::from).unwrap_or_else(default_config_path)
    }

    /// Load config from a TOML file with `PACEMAKER_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.pacemaker/pacemaker.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(config_path);

        let config: PacemakerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PACEMAKER_").split("_"))
            .extract()
            .map_err(|e| PacemakerError::Config(e.to_string()))?;

        if config.credentials.primary.is_empty() && config.credentials.backup.is_empty() {
            return Err(PacemakerError::Config(
                "no credentials configured (credentials.primary / credentials.backup)".into(),
            ));
        }

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pacemaker/pacemaker.toml", home)
}

/// C4 scheduling knobs (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_silence_seconds")]
    pub silence_seconds: u64,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_max_queue_age_seconds")]
    pub max_queue_age_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            silence_seconds: default_silence_seconds(),
            max_queue_size: default_max_queue_size(),
            max_queue_age_seconds: default_max_queue_age_seconds(),
        }
    }
}

fn default_silence_seconds() -> u64 {
    8
}
fn default_max_queue_size() -> usize {
    10
}
fn default_max_queue_age_seconds() -> u64 {
    30
}

/// C3 fatigue-with-inertia model parameters (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaminaConfig {
    #[serde(default = "default_s_max")]
    pub s_max: f64,
    #[serde(default = "default_k")]
    pub k: f64,
    #[serde(default = "default_p")]
    pub p: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_r")]
    pub r: f64,
    #[serde(default = "default_regen_interval_ms")]
    pub regen_interval_ms: u64,
    #[serde(default = "default_low_thresh")]
    pub low_thresh: f64,
    #[serde(default = "default_critical_thresh")]
    pub critical_thresh: f64,
    #[serde(default)]
    pub rest_mode: bool,
}

impl Default for StaminaConfig {
    fn default() -> Self {
        Self {
            s_max: default_s_max(),
            k: default_k(),
            p: default_p(),
            alpha: default_alpha(),
            beta: default_beta(),
            gamma: default_gamma(),
            r: default_r(),
            regen_interval_ms: default_regen_interval_ms(),
            low_thresh: default_low_thresh(),
            critical_thresh: default_critical_thresh(),
            rest_mode: false,
        }
    }
}

fn default_s_max() -> f64 {
    100.0
}
fn default_k() -> f64 {
    1.0
}
fn default_p() -> f64 {
    1.0
}
fn default_alpha() -> f64 {
    0.5
}
fn default_beta() -> f64 {
    0.1
}
fn default_gamma() -> f64 {
    0.4
}
fn default_r() -> f64 {
    5.0
}
fn default_regen_interval_ms() -> u64 {
    1000
}
fn default_low_thresh() -> f64 {
    30.0
}
fn default_critical_thresh() -> f64 {
    10.0
}

/// C1 credential pool configuration. Primary and backup lists are merged and
/// deduplicated by the pool at construction time (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub backup: Vec<String>,
}

/// C2 LLM client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
    /// Endpoint the default HTTP `LlmBackend` posts prompts to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            cap_delay_ms: default_cap_delay_ms(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_model() -> String {
    "default-model".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_cap_delay_ms() -> u64 {
    10_000
}
fn default_endpoint() -> String {
    "http://localhost:8090/v1/complete".to_string()
}

/// C6 task runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunnerConfig {
    #[serde(default = "default_task_max_attempts")]
    pub max_attempts: u32,
}

impl Default for TaskRunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_task_max_attempts(),
        }
    }
}

fn default_task_max_attempts() -> u32 {
    3
}

/// Bot identity used by C4 (high-priority mention detection) and C5 (role
/// assignment in structured context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIdentity {
    pub bot_id: String,
    pub bot_name: Option<String>,
}

impl BotIdentity {
    /// The name used for `@mention` / substring high-priority detection —
    /// falls back to `bot_id` when no distinct display name is configured.
    pub fn display_name(&self) -> &str {
        self.bot_name.as_deref().unwrap_or(&self.bot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamina_defaults_match_spec() {
        let cfg = StaminaConfig::default();
        assert_eq!(cfg.s_max, 100.0);
        assert_eq!(cfg.low_thresh, 30.0);
        assert_eq!(cfg.critical_thresh, 10.0);
        assert!(!cfg.rest_mode);
    }

    #[test]
    fn scheduler_defaults_match_spec() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.silence_seconds, 8);
        assert_eq!(cfg.max_queue_size, 10);
        assert_eq!(cfg.max_queue_age_seconds, 30);
    }
}
