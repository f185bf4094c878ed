//! Configuration loader: merges .env, config.toml and environment variables.

use std::path::Path;

use common::{Error, SignalsConfig, MARGIN_LIMIT_POINTS};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number >= 0")))?;
    if !(parsed >= 0.0) {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn parse_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number")))
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

/// First set, non-empty variable among `names`.
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .find(|v| !v.trim().is_empty())
}

pub fn validate_config(config: &SignalsConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if !LOG_LEVELS.contains(&config.log_level.to_ascii_lowercase().as_str()) {
        issues.push(format!("log_level must be one of {}", LOG_LEVELS.join(", ")));
    }

    let m = &config.markets;
    for (name, value) in [
        ("markets.house_series", &m.house_series),
        ("markets.senate_series", &m.senate_series),
        ("markets.combo_series", &m.combo_series),
        ("markets.house_side_suffix", &m.house_side_suffix),
        ("markets.senate_side_suffix", &m.senate_side_suffix),
    ] {
        if value.trim().is_empty() {
            issues.push(format!("{name} must not be empty"));
        }
    }

    let s = &config.strategy;
    for (name, pct) in [
        ("strategy.edge_threshold_pct", s.edge_threshold_pct),
        ("strategy.senate_edge_threshold_pct", s.senate_edge_threshold_pct),
        ("strategy.combo_edge_threshold_pct", s.combo_edge_threshold_pct),
    ] {
        if !(0.0..=100.0).contains(&pct) {
            issues.push(format!("{name} must be in [0,100]"));
        }
    }

    if let Err(e) = valuation::ValuationModel::from_config(&config.model) {
        issues.push(format!("model: {e}"));
    }

    let t = &config.timing;
    if t.refresh_interval_secs == 0 {
        issues.push("timing.refresh_interval_secs must be > 0".into());
    }
    if t.fetch_timeout_secs == 0 {
        issues.push("timing.fetch_timeout_secs must be > 0".into());
    }
    if t.quote_stale_secs == 0 {
        issues.push("timing.quote_stale_secs must be > 0".into());
    }

    let r = &config.retry;
    if r.max_attempts == 0 {
        issues.push("retry.max_attempts must be > 0".into());
    }
    if r.max_backoff_ms < r.initial_backoff_ms {
        issues.push("retry.max_backoff_ms must be >= retry.initial_backoff_ms".into());
    }

    if let Some(margin) = config.poll.fallback_margin_points {
        if !margin.is_finite() || margin.abs() > MARGIN_LIMIT_POINTS {
            issues.push(format!(
                "poll.fallback_margin_points must be in [-{MARGIN_LIMIT_POINTS},{MARGIN_LIMIT_POINTS}]"
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides (highest priority).
fn apply_env_overrides(config: &mut SignalsConfig) -> Result<(), Error> {
    if let Some(key) = env_any(&["KALSHI_KEY_ID", "KALSHI_API_KEY"]) {
        config.api_key = key;
    }
    if let Some(secret) = env_any(&["KALSHI_PRIVATE_KEY", "KALSHI_SECRET_KEY"]) {
        config.secret_key = secret;
    }
    if let Ok(demo) = std::env::var("USE_DEMO") {
        config.use_demo = parse_bool(&demo);
    }
    if let Some(url) = env_any(&["KALSHI_API_BASE_URL"]) {
        config.api_base_url = Some(url);
    }
    if let Ok(raw) = std::env::var("EDGE_THRESHOLD_PCT") {
        config.strategy.edge_threshold_pct = parse_non_negative_f64(&raw, "EDGE_THRESHOLD_PCT")?;
    }
    if let Ok(raw) = std::env::var("REFRESH_INTERVAL_SECS") {
        config.timing.refresh_interval_secs = parse_positive_u64(&raw, "REFRESH_INTERVAL_SECS")?;
    }
    if let Some(level) = env_any(&["LOG_LEVEL"]) {
        config.log_level = level.trim().to_ascii_lowercase();
    }
    if let Ok(path) = std::env::var("POLL_READING_PATH") {
        let trimmed = path.trim();
        config.poll.reading_path = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
    if let Ok(raw) = std::env::var("POLL_FALLBACK_MARGIN") {
        config.poll.fallback_margin_points = Some(parse_f64(&raw, "POLL_FALLBACK_MARGIN")?);
    }
    Ok(())
}

/// Parse a config file body.
pub fn parse_config(contents: &str) -> Result<SignalsConfig, Error> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

/// Config file contents, or defaults when the file does not exist.
pub fn read_config_file(path: &Path) -> Result<SignalsConfig, Error> {
    if !path.exists() {
        tracing::debug!("{} not found; using defaults", path.display());
        return Ok(SignalsConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_config(&contents)
}

/// Load configuration from .env, an optional TOML file, and the environment.
pub fn load_config(path: &Path) -> Result<SignalsConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, replaced by the config file if present.
    let mut config = read_config_file(path)?;

    // 3. Environment wins.
    apply_env_overrides(&mut config)?;

    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&SignalsConfig::default()).unwrap();
    }

    #[test]
    fn test_all_issues_reported_together() {
        let mut cfg = SignalsConfig::default();
        cfg.log_level = "loud".into();
        cfg.strategy.edge_threshold_pct = -1.0;
        cfg.timing.refresh_interval_secs = 0;
        cfg.model.seat_sigma = 0.5;

        let msg = match validate_config(&cfg) {
            Err(Error::Config(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        };
        assert!(msg.contains("log_level"));
        assert!(msg.contains("strategy.edge_threshold_pct"));
        assert!(msg.contains("timing.refresh_interval_secs"));
        assert!(msg.contains("model:"));
    }

    #[test]
    fn test_fallback_margin_range() {
        let mut cfg = SignalsConfig::default();
        cfg.poll.reading_path = None;
        cfg.poll.fallback_margin_points = Some(4.0);
        assert!(validate_config(&cfg).is_ok());

        cfg.poll.fallback_margin_points = Some(150.0);
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_parse_config_file_body() {
        let cfg = parse_config(
            r#"
            use_demo = true

            [markets]
            house_series = "CONTROLH"

            [poll]
            fallback_margin_points = 4.0
            "#,
        )
        .unwrap();
        assert!(cfg.use_demo);
        assert_eq!(cfg.poll.fallback_margin_points, Some(4.0));
        assert!(matches!(parse_config("use_demo = [").unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_value_parsers() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
        assert_eq!(parse_positive_u64(" 60 ", "X").unwrap(), 60);
        assert!(parse_positive_u64("0", "X").is_err());
        assert!(parse_non_negative_f64("-2", "X").is_err());
        assert!(parse_non_negative_f64("NaN", "X").is_err());
        assert_eq!(parse_f64("-3.5", "X").unwrap(), -3.5);
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();

        let absent = read_config_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(absent.timing.refresh_interval_secs, 600);

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timing]\nrefresh_interval_secs = 30\n").unwrap();
        let cfg = read_config_file(&path).unwrap();
        assert_eq!(cfg.timing.refresh_interval_secs, 30);
        assert_eq!(cfg.timing.fetch_timeout_secs, 20);
    }
}
