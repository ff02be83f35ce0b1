use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};

/// Engine tuning knobs. Loaded once by the embedding application and handed
/// to the engine; defaults match the classic football scoring and the
/// original winner/loser intake routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Points awarded to the higher scorer of a finished match.
    pub points_win: u32,
    /// Points awarded to each side of a draw.
    pub points_draw: u32,
    /// Route knockout losers into group 1 of the intake target when that
    /// stage has at least two groups. Winners always route into group 0.
    pub route_losers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            points_win: 3,
            points_draw: 1,
            route_losers: true,
        }
    }
}

pub fn config_path() -> PathBuf {
    env_default("ENGINE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("engine.json"))
}

pub fn env_default(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_flag_true_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => {
            let value = value.trim().to_ascii_lowercase();
            matches!(value.as_str(), "1" | "true" | "yes" | "on")
        }
        Err(_) => default,
    }
}

pub fn apply_env_defaults(mut config: EngineConfig) -> EngineConfig {
    if let Some(value) = env_default("ENGINE_POINTS_WIN").and_then(|v| v.parse().ok()) {
        config.points_win = value;
    }
    if let Some(value) = env_default("ENGINE_POINTS_DRAW").and_then(|v| v.parse().ok()) {
        config.points_draw = value;
    }
    config.route_losers = env_flag_true_default("ENGINE_ROUTE_LOSERS", config.route_losers);
    config
}

pub fn load_engine_config() -> Result<EngineConfig, String> {
    let path = config_path();
    if !path.is_file() {
        return Ok(apply_env_defaults(EngineConfig::default()));
    }
    let data =
        fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
    let config = serde_json::from_str::<EngineConfig>(&data)
        .map_err(|e| format!("parse config {}: {e}", path.display()))?;
    Ok(apply_env_defaults(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_scoring() {
        let config = EngineConfig::default();
        assert_eq!(config.points_win, 3);
        assert_eq!(config.points_draw, 1);
        assert!(config.route_losers);
    }
}
