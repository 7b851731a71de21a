//! 设备树配置
//!
//! ```toml
//! system-bus-name = "main-system-bus"
//! system-bus-type = "System"
//! hotplug-only = false
//! ```

use crate::types::TYPE_SYSTEM_BUS;
use serde::{Deserialize, Serialize};

/// 默认系统总线名称
pub const DEFAULT_SYSTEM_BUS_NAME: &str = "main-system-bus";

/// 配置错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// 无效的配置
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// 解析错误
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// 序列化错误
    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),
}

/// 设备树配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QdevConfig {
    /// 默认系统总线名称
    pub system_bus_name: String,
    /// 默认系统总线类型
    pub system_bus_type: String,
    /// 初始的"仅热插拔"策略，机器初始化完成后通常置为 true
    pub hotplug_only: bool,
}

impl Default for QdevConfig {
    fn default() -> Self {
        Self {
            system_bus_name: DEFAULT_SYSTEM_BUS_NAME.to_string(),
            system_bus_type: TYPE_SYSTEM_BUS.to_string(),
            hotplug_only: false,
        }
    }
}

impl QdevConfig {
    /// 验证配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system_bus_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "system-bus-name must not be empty".to_string(),
            ));
        }
        if self.system_bus_type.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "system-bus-type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// 从 TOML 字符串加载并验证配置，缺省字段取默认值
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)
            .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 字符串加载并验证配置
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::Parse(format!("JSON parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(format!("TOML serialize error: {}", e)))
    }
}
