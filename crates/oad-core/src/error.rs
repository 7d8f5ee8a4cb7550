//! エラー型
//!
//! 学習ループで扱うエラーは `TrainError` に集約する。
//! 致命的なのは `NonFiniteLoss` のみで、それ以外は呼び出し側へそのまま伝播させる。

use std::path::PathBuf;

use thiserror::Error;

/// 設定ファイルの読み込み・検証エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 学習ループのエラー
#[derive(Debug, Error)]
pub enum TrainError {
    /// 合成損失が NaN / ±inf になった。学習の継続は不可能として扱う。
    #[error("Loss is {value}, stopping training ({terms})")]
    NonFiniteLoss { value: f32, terms: String },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("criterion requires output `{0}` which the model did not produce")]
    MissingOutput(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<ndarray::ShapeError> for TrainError {
    fn from(e: ndarray::ShapeError) -> Self {
        TrainError::Shape(e.to_string())
    }
}

impl TrainError {
    /// プロセスを終了させるべき発散エラーかどうか
    pub fn is_divergence(&self) -> bool {
        matches!(self, TrainError::NonFiniteLoss { .. })
    }
}

pub type Result<T, E = TrainError> = std::result::Result<T, E>;
