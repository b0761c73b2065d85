use serde::{Deserialize, Serialize};
use std::path::Path;

// ─── Constantes de la estrategia ──────────────────────────────────────────────
/// Minimum seconds between two order submissions (throttle window).
pub const SIGNAL_COOLDOWN_SECS: i64 = 60;
/// Zone touch tolerance, in price increments (multiples of tick_size).
pub const ZONE_TOUCH_TOLERANCE_TICKS: f64 = 5.0;
/// Order comment attached to every submission.
pub const ORDER_COMMENT: &str = "zone_trader";

// BRIDGE_API_KEY and BRIDGE_SECRET are read from environment variables
// at runtime (see config.example.json for everything else).

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub trading: TradingConfig,
    pub analysis: AnalysisConfig,
    pub symbol: SymbolConfig,
    pub logging: LoggingConfig,
    pub bridge: BridgeConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradingConfig {
    pub risk_amount: f64,      // riesgo monetario fijo por operación
    pub max_daily_loss: f64,   // pérdida diaria que desactiva el trading
    pub min_risk_reward: f64,  // ratio riesgo:recompensa mínimo
    pub max_risk_percent: f64, // tope duro: % del equity en riesgo por trade
    pub magic_number: i64,     // identifica las órdenes de esta estrategia
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub lookback_period: usize, // velas hacia atrás para buscar zonas
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub min_zone_touches: u32, // toques mínimos para que una zona cuente
    pub body_multiplier: f64,  // cuerpo de la vela de reversión vs media previa
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    pub max_spread: f64, // techo de spread en unidades de precio
    pub timeframe: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log the per-cycle analysis verdict even when no order results.
    pub log_analysis: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub base_url: String,
    pub ws_url: String,
    pub connection_timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            trading: TradingConfig {
                risk_amount: 50.0,
                max_daily_loss: 200.0,
                min_risk_reward: 2.0,
                max_risk_percent: 5.0,
                magic_number: 234567,
            },
            analysis: AnalysisConfig {
                lookback_period: 20,
                macd_fast: 12,
                macd_slow: 26,
                macd_signal: 9,
                min_zone_touches: 2,
                body_multiplier: 1.5,
            },
            symbol: SymbolConfig {
                name: "EURUSD".to_string(),
                max_spread: 0.0003,
                timeframe: "M1".to_string(),
            },
            logging: LoggingConfig { log_analysis: false },
            bridge: BridgeConfig {
                base_url: "http://127.0.0.1:8228".to_string(),
                ws_url: "ws://127.0.0.1:8229/stream".to_string(),
                connection_timeout_secs: 10,
                retry_attempts: 3,
            },
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
    /// Config file was missing; a default one was written for the user to edit.
    DefaultCreated(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
            ConfigError::DefaultCreated(path) => {
                write!(f, "config not found — default written to {}, edit it and restart", path)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load and validate the JSON config. A missing file is replaced by a
    /// default one and reported as an error so the user can review it first.
    pub fn load(path: &str) -> Result<Config, ConfigError> {
        if !Path::new(path).exists() {
            let default = Config::default();
            let json = serde_json::to_string_pretty(&default).map_err(ConfigError::Parse)?;
            std::fs::write(path, json).map_err(ConfigError::Io)?;
            return Err(ConfigError::DefaultCreated(path.to_string()));
        }

        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let cfg: Config = serde_json::from_str(&raw).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        log::info!("Configuration loaded from {}", path);
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.risk_amount <= 0.0 {
            return Err(ConfigError::Invalid("trading.risk_amount must be positive".into()));
        }
        if self.trading.max_daily_loss <= 0.0 {
            return Err(ConfigError::Invalid("trading.max_daily_loss must be positive".into()));
        }
        if self.trading.min_risk_reward < 1.0 {
            return Err(ConfigError::Invalid("trading.min_risk_reward must be at least 1.0".into()));
        }
        if self.trading.max_risk_percent <= 0.0 || self.trading.max_risk_percent > 100.0 {
            return Err(ConfigError::Invalid("trading.max_risk_percent must be in (0, 100]".into()));
        }
        if self.symbol.name.is_empty() {
            return Err(ConfigError::Invalid("symbol.name must not be empty".into()));
        }
        if self.symbol.max_spread <= 0.0 {
            return Err(ConfigError::Invalid("symbol.max_spread must be positive".into()));
        }
        if self.analysis.lookback_period < 5 {
            return Err(ConfigError::Invalid("analysis.lookback_period must be at least 5".into()));
        }
        if self.analysis.macd_fast >= self.analysis.macd_slow {
            return Err(ConfigError::Invalid("analysis.macd_fast must be below macd_slow".into()));
        }
        if self.analysis.macd_signal == 0 {
            return Err(ConfigError::Invalid("analysis.macd_signal must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_risk_reward_below_one() {
        let mut cfg = Config::default();
        cfg.trading.min_risk_reward = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_macd_periods() {
        let mut cfg = Config::default();
        cfg.analysis.macd_fast = 26;
        cfg.analysis.macd_slow = 12;
        assert!(cfg.validate().is_err());
    }
}
