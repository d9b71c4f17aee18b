// crates/vd_config/src/error.rs

//! 配置层错误类型

use vd_foundation::VdError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 不支持的枚举取值
    #[error("不支持的取值 '{value}' (键 {key}, 支持: {supported:?})")]
    Unsupported {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 支持的取值
        supported: Vec<String>,
    },
}

impl From<ConfigError> for VdError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(source) => VdError::Io {
                message: source.to_string(),
                source: Some(source),
            },
            ConfigError::Parse(message) => VdError::Serialization { message },
            ConfigError::InvalidValue { key, value, reason } => {
                VdError::InvalidConfig { key, value, reason }
            }
            ConfigError::Unsupported {
                value, supported, ..
            } => VdError::unsupported_method(value, &supported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "alpha".to_string(),
            value: "-1".to_string(),
            reason: "必须为正".to_string(),
        };
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_conversion_keeps_config_category() {
        let err: VdError = ConfigError::Unsupported {
            key: "compression_method".into(),
            value: "PCA".into(),
            supported: vec!["SVD".into(), "AE".into()],
        }
        .into();
        assert!(err.is_config());
        match err {
            VdError::UnsupportedMethod { method, supported } => {
                assert_eq!(method, "PCA");
                assert_eq!(supported, vec!["SVD".to_string(), "AE".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
