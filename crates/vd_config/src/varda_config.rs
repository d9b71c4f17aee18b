// crates/vd_config/src/varda_config.rs

//! VarDaConfig - 同化运行配置
//!
//! 一次运行开始时构造一次，按引用传入各组件，不存在全局可变配置。
//! 所有数值使用 f64，以 JSON 序列化。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use vd_foundation::validation::{
    check_interval, check_positive, warn_if_above, warn_if_below, ValidationError,
    ValidationReport,
};

use crate::error::ConfigError;

/// 降维方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompressionMethod {
    /// 截断奇异值分解（线性）
    #[default]
    #[serde(rename = "SVD")]
    Svd,
    /// 预训练自编码器的解码器（非线性）
    #[serde(rename = "AE")]
    Ae,
}

impl CompressionMethod {
    /// 支持的方法名
    pub const SUPPORTED: [&'static str; 2] = ["SVD", "AE"];

    /// 方法名
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Svd => "SVD",
            Self::Ae => "AE",
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SVD" => Ok(Self::Svd),
            "AE" => Ok(Self::Ae),
            _ => Err(ConfigError::Unsupported {
                key: "compression_method".to_string(),
                value: s.to_string(),
                supported: Self::SUPPORTED.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

/// 观测选取方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationMode {
    /// 按 `obs_frac` 无放回均匀随机抽样
    #[default]
    Random,
    /// 按 `obs_frac` 等间距抽样
    Regular,
    /// 调用方给定的观测位置
    Fixed {
        /// 观测索引
        indices: Vec<usize>,
    },
}

/// 观测噪声模型
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationNoise {
    /// 直接取真值
    #[default]
    NoiseFree,
    /// 叠加零均值高斯噪声
    Gaussian {
        /// 噪声标准差
        std_dev: f64,
    },
}

/// 降维坐标初值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialGuess {
    /// w₀ = 0
    #[default]
    Zero,
    /// w₀ = V_trunc⁺·u₀（仅线性路径）
    Projected,
}

/// 解码器形状约定
///
/// 调用方提供的解码器必须满足 `input_size = n`、`latent_size`、`hidden_layers`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderShape {
    /// 隐空间维度
    #[serde(default = "default_latent_size")]
    pub latent_size: usize,
    /// 隐藏层宽度（按自编码器约定，自状态一侧起；解码器内部顺序与之相反）
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
}

fn default_latent_size() -> usize { 2 }
fn default_hidden_layers() -> Vec<usize> { vec![1000, 200] }

impl Default for DecoderShape {
    fn default() -> Self {
        Self {
            latent_size: default_latent_size(),
            hidden_layers: default_hidden_layers(),
        }
    }
}

/// 同化配置（全 f64）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDaConfig {
    /// 正则化权重 α
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// 观测误差方差 σ²
    #[serde(default = "default_obs_variance")]
    pub obs_variance: f64,

    /// 观测比例
    #[serde(default = "default_obs_frac")]
    pub obs_frac: f64,

    /// 历史窗口比例
    #[serde(default = "default_hist_frac")]
    pub hist_frac: f64,

    /// 同化时刻距末尾的偏移（t_DA = M - tda_idx_from_end）
    #[serde(default = "default_tda_idx_from_end")]
    pub tda_idx_from_end: usize,

    /// 降维方法
    #[serde(default)]
    pub compression_method: CompressionMethod,

    /// 截断模态数（仅线性路径）
    #[serde(default = "default_number_modes")]
    pub number_modes: usize,

    /// 优化器收敛容差
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// 优化器最大迭代次数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,

    /// L-BFGS 历史长度
    #[serde(default = "default_lbfgs_memory")]
    pub lbfgs_memory: usize,

    /// 观测选取方式
    #[serde(default)]
    pub obs_mode: ObservationMode,

    /// 观测噪声
    #[serde(default)]
    pub obs_noise: ObservationNoise,

    /// 初值策略
    #[serde(default)]
    pub initial_guess: InitialGuess,

    /// 随机种子
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// 解码器形状约定（仅非线性路径）
    #[serde(default)]
    pub decoder: DecoderShape,

    /// 雅可比每批计算的列数
    #[serde(default = "default_jacobian_batch_size")]
    pub jacobian_batch_size: usize,

    /// 单次雅可比组装的时间预算 [ms]
    #[serde(default)]
    pub jacobian_budget_ms: Option<u64>,

    /// 优化器时间预算 [ms]
    #[serde(default)]
    pub optimizer_timeout_ms: Option<u64>,
}

fn default_alpha() -> f64 { 1.0 }
fn default_obs_variance() -> f64 { 0.01 }
fn default_obs_frac() -> f64 { 0.5 }
fn default_hist_frac() -> f64 { 0.6 }
fn default_tda_idx_from_end() -> usize { 1 }
fn default_number_modes() -> usize { 5 }
fn default_tolerance() -> f64 { 1e-3 }
fn default_max_iterations() -> u64 { 500 }
fn default_lbfgs_memory() -> usize { 7 }
fn default_seed() -> u64 { 42 }
fn default_jacobian_batch_size() -> usize { 8 }

impl Default for VarDaConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            obs_variance: default_obs_variance(),
            obs_frac: default_obs_frac(),
            hist_frac: default_hist_frac(),
            tda_idx_from_end: default_tda_idx_from_end(),
            compression_method: CompressionMethod::default(),
            number_modes: default_number_modes(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            lbfgs_memory: default_lbfgs_memory(),
            obs_mode: ObservationMode::default(),
            obs_noise: ObservationNoise::default(),
            initial_guess: InitialGuess::default(),
            seed: default_seed(),
            decoder: DecoderShape::default(),
            jacobian_batch_size: default_jacobian_batch_size(),
            jacobian_budget_ms: None,
            optimizer_timeout_ms: None,
        }
    }
}

impl VarDaConfig {
    /// 从 JSON 文件加载配置并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json(&content)
    }

    /// 从 JSON 字符串解析配置并校验
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: VarDaConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// 收集全部错误与警告
    pub fn report(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        check_positive(&mut report, "alpha", self.alpha);
        check_positive(&mut report, "obs_variance", self.obs_variance);
        check_positive(&mut report, "tolerance", self.tolerance);
        check_interval(&mut report, "hist_frac", self.hist_frac, (0.0, true), (1.0, true));

        if !matches!(self.obs_mode, ObservationMode::Fixed { .. }) {
            check_interval(&mut report, "obs_frac", self.obs_frac, (0.0, true), (1.0, false));
        }
        if let ObservationMode::Fixed { indices } = &self.obs_mode {
            if indices.is_empty() {
                report.add_error(ValidationError::Inconsistent {
                    message: "obs_mode.fixed 的观测索引为空".into(),
                });
            }
        }
        if let ObservationNoise::Gaussian { std_dev } = self.obs_noise {
            check_positive(&mut report, "obs_noise.std_dev", std_dev);
        }

        let counts = [
            ("tda_idx_from_end", self.tda_idx_from_end),
            ("number_modes", self.number_modes),
            ("lbfgs_memory", self.lbfgs_memory),
            ("jacobian_batch_size", self.jacobian_batch_size),
            ("decoder.latent_size", self.decoder.latent_size),
        ];
        for (field, value) in counts {
            if value == 0 {
                report.add_error(ValidationError::OutOfRange {
                    field,
                    value: 0.0,
                    min: 1.0,
                    max: f64::MAX,
                });
            }
        }
        if self.max_iterations == 0 {
            report.add_error(ValidationError::OutOfRange {
                field: "max_iterations",
                value: 0.0,
                min: 1.0,
                max: f64::MAX,
            });
        }

        if self.compression_method == CompressionMethod::Ae
            && self.initial_guess == InitialGuess::Projected
        {
            report.add_error(ValidationError::Inconsistent {
                message: "initial_guess=projected 只适用于 SVD 路径".into(),
            });
        }

        warn_if_below(&mut report, "obs_variance", self.obs_variance, 1e-10);
        warn_if_above(&mut report, "tolerance", self.tolerance, 1e-1);

        report
    }

    /// 验证配置有效性，返回第一个错误
    pub fn validate(&self) -> Result<(), ConfigError> {
        let report = self.report();
        match report.errors.into_iter().next() {
            None => Ok(()),
            Some(ValidationError::OutOfRange { field, value, min, max }) => {
                Err(ConfigError::InvalidValue {
                    key: field.to_string(),
                    value: value.to_string(),
                    reason: format!("必须在 [{}, {}] 范围内", min, max),
                })
            }
            Some(ValidationError::NonFinite { field, value }) => Err(ConfigError::InvalidValue {
                key: field.to_string(),
                value: value.to_string(),
                reason: "必须为有限值".to_string(),
            }),
            Some(ValidationError::Inconsistent { message }) => Err(ConfigError::InvalidValue {
                key: "config".to_string(),
                value: String::new(),
                reason: message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VarDaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.compression_method, CompressionMethod::Svd);
        assert_eq!(config.tolerance, 1e-3);
    }

    #[test]
    fn test_invalid_alpha() {
        let mut config = VarDaConfig::default();
        config.alpha = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_hist_frac_is_open_interval() {
        let mut config = VarDaConfig::default();
        config.hist_frac = 1.0;
        assert!(config.validate().is_err());
        config.hist_frac = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_modes_rejected() {
        let mut config = VarDaConfig::default();
        config.number_modes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_method_from_str() {
        assert_eq!("svd".parse::<CompressionMethod>().unwrap(), CompressionMethod::Svd);
        assert_eq!("AE".parse::<CompressionMethod>().unwrap(), CompressionMethod::Ae);
        let err = "PCA".parse::<CompressionMethod>().unwrap_err();
        assert!(matches!(err, ConfigError::Unsupported { .. }));
    }

    #[test]
    fn test_unknown_method_in_json_fails_at_load() {
        let json = r#"{ "compression_method": "PCA" }"#;
        assert!(matches!(
            VarDaConfig::from_json(json),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_json_defaults_and_tags() {
        let json = r#"{
            "alpha": 2.0,
            "compression_method": "AE",
            "obs_mode": { "kind": "fixed", "indices": [1, 3, 5] },
            "obs_noise": { "kind": "gaussian", "std_dev": 0.1 }
        }"#;
        let config = VarDaConfig::from_json(json).unwrap();
        assert_eq!(config.alpha, 2.0);
        assert_eq!(config.compression_method, CompressionMethod::Ae);
        assert_eq!(
            config.obs_mode,
            ObservationMode::Fixed { indices: vec![1, 3, 5] }
        );
        assert_eq!(config.obs_noise, ObservationNoise::Gaussian { std_dev: 0.1 });
        assert_eq!(config.number_modes, 5);
    }

    #[test]
    fn test_projected_guess_rejected_for_ae() {
        let mut config = VarDaConfig::default();
        config.compression_method = CompressionMethod::Ae;
        config.initial_guess = InitialGuess::Projected;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = VarDaConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: VarDaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.compression_method, config.compression_method);
        assert_eq!(parsed.decoder, config.decoder);
    }

    #[test]
    fn test_tiny_variance_only_warns() {
        let mut config = VarDaConfig::default();
        config.obs_variance = 1e-12;
        let report = config.report();
        assert!(report.is_valid());
        assert!(report.has_warnings());
    }
}
