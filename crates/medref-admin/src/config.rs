//! 配置管理
//!
//! 配置按以下顺序叠加：内置默认值 → 可选的 TOML 文件 → `MEDREF_*` 环境变量
//! （层级之间用 `__` 分隔，例如 `MEDREF_STORE__DATA_DIR`）。

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use medref_resolve::{HierarchyLimits, PathwayRules};
use medref_store::SnapshotLoader;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// MedRef 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedrefConfig {
    /// 参考数据存储配置
    pub store: StoreConfig,
    /// 查询配置
    pub query: QueryConfig,
    /// 临床路径规则
    pub pathway: PathwayRules,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 参考数据存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// 快照文件目录
    pub data_dir: String,
    /// 检验与指引文件缺失时使用内置数据
    pub use_builtin_seed: bool,
    /// 快照刷新间隔（秒），0 表示不刷新
    pub refresh_interval_secs: u64,
}

impl StoreConfig {
    pub fn loader(&self) -> SnapshotLoader {
        SnapshotLoader::new(&self.data_dir, self.use_builtin_seed)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            use_builtin_seed: true,
            refresh_interval_secs: 3600,
        }
    }
}

/// 查询返回条数上限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub max_specializations: usize,
    pub max_siblings: usize,
    pub max_neighbors: usize,
    pub max_search_results: usize,
}

impl QueryConfig {
    pub fn limits(&self) -> HierarchyLimits {
        HierarchyLimits {
            specializations: self.max_specializations,
            siblings: self.max_siblings,
            neighbors: self.max_neighbors,
            search: self.max_search_results,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        let limits = HierarchyLimits::default();
        Self {
            max_specializations: limits.specializations,
            max_siblings: limits.siblings,
            max_neighbors: limits.neighbors,
            max_search_results: limits.search,
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令，例如 `info` / `medref_store=debug`
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl MedrefConfig {
    /// 加载配置并验证
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(config_path, None)
    }

    /// 以指定的环境变量表代替进程环境加载
    pub fn load_with_env(config_path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let defaults = Config::try_from(&MedrefConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("MEDREF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings = builder.build().context("Failed to read configuration sources")?;
        let config: MedrefConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        ConfigValidator::new().validate(&config)?;

        match config_path {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    /// 序列化为 TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// 按点分路径读取配置值，例如 `store.data_dir`
    pub fn get_value(&self, path: &str) -> Result<serde_json::Value> {
        let config_json = serde_json::to_value(self).context("Failed to serialize config to JSON")?;

        let mut current = &config_json;
        for part in path.split('.') {
            match current {
                serde_json::Value::Object(map) => {
                    current = map
                        .get(part)
                        .ok_or_else(|| anyhow::anyhow!("Path segment not found: {}", part))?;
                }
                _ => return Err(anyhow::anyhow!("Invalid path at segment: {}", part)),
            }
        }

        debug!("Configuration value read: {}", path);
        Ok(current.clone())
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    validator: fn(&MedrefConfig) -> Result<()>,
    error_message: &'static str,
}

fn check(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{}", message))
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "store.data_dir",
                validator: |config| {
                    check(
                        !config.store.data_dir.trim().is_empty() || config.store.use_builtin_seed,
                        "Data directory cannot be empty when built-in data is disabled",
                    )
                },
                error_message: "Invalid data directory",
            },
            ValidationRule {
                field_path: "query.max_specializations",
                validator: |config| check(config.query.max_specializations > 0, "Cap cannot be 0"),
                error_message: "Invalid specialization cap",
            },
            ValidationRule {
                field_path: "query.max_siblings",
                validator: |config| check(config.query.max_siblings > 0, "Cap cannot be 0"),
                error_message: "Invalid sibling cap",
            },
            ValidationRule {
                field_path: "query.max_neighbors",
                validator: |config| check(config.query.max_neighbors > 0, "Cap cannot be 0"),
                error_message: "Invalid neighbor cap",
            },
            ValidationRule {
                field_path: "query.max_search_results",
                validator: |config| check(config.query.max_search_results > 0, "Cap cannot be 0"),
                error_message: "Invalid search cap",
            },
            ValidationRule {
                field_path: "pathway.first_line_labels",
                validator: |config| {
                    check(
                        !config.pathway.first_line_labels.is_empty(),
                        "At least one first-line label is required",
                    )
                },
                error_message: "Invalid pathway rules",
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    EnvFilter::try_new(&config.logging.level)
                        .map(|_| ())
                        .map_err(|e| anyhow::anyhow!("Unparseable filter '{}': {}", config.logging.level, e))
                },
                error_message: "Invalid log level",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置，遇到第一条失败的规则即返回
    pub fn validate(&self, config: &MedrefConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{} ({}): {}", rule.error_message, rule.field_path, e));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
