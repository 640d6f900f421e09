use config::{Config, Environment, File, Map};
use kairos_core::config::AppConfig;
use thiserror::Error;

/// 默认配置文件名 (不含扩展名，支持 toml/json/yaml)
pub const CONFIG_FILE: &str = "kairos";
/// 环境变量前缀，层级之间用 `__` 分隔，如 `KAIROS__FEED__BASE_URL`
pub const ENV_PREFIX: &str = "KAIROS";
const ENV_SEPARATOR: &str = "__";

// 东十四区到西十二区
const VALID_UTC_OFFSETS: std::ops::RangeInclusive<i32> = -12..=14;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # Summary
/// 从当前目录的 `kairos.*` 与进程环境变量加载配置。
pub fn load() -> Result<AppConfig, ConfigError> {
    load_from(CONFIG_FILE, None)
}

/// # Summary
/// 从指定文件与环境变量加载配置。
///
/// # Logic
/// 1. 以内置默认值为底。
/// 2. 叠加可选的配置文件。
/// 3. 叠加 `KAIROS__` 前缀的环境变量，优先级最高。
/// 4. 校验关键字段。
///
/// # Arguments
/// * `file`: 配置文件路径 (不含扩展名)，文件不存在时忽略。
/// * `env`: 替代进程环境变量的键值表，None 时读取真实环境。
///
/// # Returns
/// 成功返回合并后的配置。
pub fn load_from(file: &str, env: Option<Map<String, String>>) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.feed.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("feed.base_url must not be empty".into()));
    }
    if config.watch.symbol.trim().is_empty() {
        return Err(ConfigError::Invalid("watch.symbol must not be empty".into()));
    }
    if !VALID_UTC_OFFSETS.contains(&config.session.viewer_utc_offset_hours) {
        return Err(ConfigError::Invalid(format!(
            "session.viewer_utc_offset_hours {} out of range",
            config.session.viewer_utc_offset_hours
        )));
    }
    if config.refresher.quote_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "refresher.quote_interval_secs must be positive".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::common::AssetClass;

    fn missing_file(dir: &tempfile::TempDir) -> String {
        dir.path().join("absent").to_string_lossy().into_owned()
    }

    #[test]
    fn test_defaults_without_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&missing_file(&dir), Some(Map::new())).unwrap();
        assert_eq!(config.refresher.quote_interval_secs, 3);
        assert_eq!(config.session.viewer_utc_offset_hours, 3);
        assert_eq!(config.watch.symbol, "AAPL");
    }

    #[test]
    fn test_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kairos.toml"),
            r#"
[feed]
base_url = "http://proxy.local/api/brokerage"

[refresher]
quote_interval_secs = 5

[session.market_hours]
regular_start = "09:45"

[watch]
symbol = "MSFT"
"#,
        )
        .unwrap();

        let mut env = Map::new();
        env.insert("KAIROS__WATCH__SYMBOL".to_string(), "BTC/USD".to_string());
        env.insert("KAIROS__WATCH__ASSET_CLASS".to_string(), "crypto".to_string());
        env.insert(
            "KAIROS__SESSION__VIEWER_UTC_OFFSET_HOURS".to_string(),
            "-5".to_string(),
        );

        let path = dir.path().join("kairos").to_string_lossy().into_owned();
        let config = load_from(&path, Some(env)).unwrap();

        assert_eq!(config.feed.base_url, "http://proxy.local/api/brokerage");
        assert_eq!(config.refresher.quote_interval_secs, 5);
        assert_eq!(config.refresher.bars_interval_secs, 300);
        assert_eq!(
            config.session.market_hours.regular_start.as_deref(),
            Some("09:45")
        );
        assert_eq!(config.session.viewer_utc_offset_hours, -5);
        assert_eq!(config.watch.symbol, "BTC/USD");
        assert_eq!(config.watch.asset_class, AssetClass::Crypto);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Map::new();
        env.insert(
            "KAIROS__SESSION__VIEWER_UTC_OFFSET_HOURS".to_string(),
            "20".to_string(),
        );
        let err = load_from(&missing_file(&dir), Some(env)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{:?}", err);

        let mut env = Map::new();
        env.insert(
            "KAIROS__REFRESHER__QUOTE_INTERVAL_SECS".to_string(),
            "soon".to_string(),
        );
        let err = load_from(&missing_file(&dir), Some(env)).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)), "{:?}", err);
    }
}
