use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::TrapError;
use crate::execution::PositionManager;
use crate::risk::RiskSizer;
use crate::strategy::ReversalConfig;
use crate::Result;

/// File read when no `--config` is given; skipped if absent
pub const DEFAULT_CONFIG_FILE: &str = "trapbot.toml";

/// Prefix for environment overrides, e.g. `TRAPBOT_RISK_FRACTION`
pub const ENV_PREFIX: &str = "TRAPBOT";

/// Runtime settings
///
/// Built from defaults, then the config file, then `TRAPBOT_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub symbol: String,
    /// Exchange product id for the symbol (27 is BTCUSD on Delta India)
    pub product_id: u64,
    pub resolution: String,
    pub candle_limit: usize,
    pub level_window: usize,
    pub proximity: f64,
    pub risk_fraction: f64,
    /// Account balance used for sizing
    pub balance: f64,
    pub poll_interval_secs: u64,
    pub base_url: String,
    pub signals_dir: String,
    pub enforce_stop_loss: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSD".to_string(),
            product_id: 27,
            resolution: "15m".to_string(),
            candle_limit: 100,
            level_window: 25,
            proximity: 0.005,
            risk_fraction: 0.005,
            balance: 1000.0,
            poll_interval_secs: 900,
            base_url: crate::api::delta::DELTA_API_BASE.to_string(),
            signals_dir: ".".to_string(),
            enforce_stop_loss: true,
        }
    }
}

impl Settings {
    /// Load settings and validate them
    ///
    /// An explicit `path` must exist; otherwise `trapbot.toml` is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], reading overrides from `env` instead of the process
    /// environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let overrides = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(env);

        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(overrides)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol", "must not be empty"));
        }
        if self.candle_limit == 0 {
            return Err(invalid("candle_limit", "must be positive"));
        }
        if self.level_window == 0 {
            return Err(invalid("level_window", "must be positive"));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs", "must be positive"));
        }
        if !(self.balance.is_finite() && self.balance > 0.0) {
            return Err(invalid("balance", format!("must be positive, got {}", self.balance)));
        }
        if !fraction(self.risk_fraction) {
            return Err(invalid(
                "risk_fraction",
                format!("must be in (0, 1), got {}", self.risk_fraction),
            ));
        }
        if !fraction(self.proximity) {
            return Err(invalid(
                "proximity",
                format!("must be in (0, 1), got {}", self.proximity),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn reversal_config(&self) -> ReversalConfig {
        ReversalConfig {
            level_window: self.level_window,
            proximity: self.proximity,
        }
    }

    pub fn position_manager(&self) -> PositionManager {
        PositionManager::new(RiskSizer::new(self.risk_fraction), self.enforce_stop_loss)
    }
}

fn fraction(value: f64) -> bool {
    value > 0.0 && value < 1.0
}

fn invalid(key: &'static str, reason: impl Into<String>) -> TrapError {
    TrapError::InvalidSetting {
        key,
        reason: reason.into(),
    }
}
