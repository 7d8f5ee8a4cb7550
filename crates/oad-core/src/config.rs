//! 学習設定
//!
//! TOML（拡張子が `.yaml` / `.yml` の場合は YAML）から読み込む。
//! 未指定の項目は `Default` の値で埋める。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 設定全体
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub loss: LossConfig,
    pub data: DataConfig,
}

/// 学習ループの設定
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// ログ出力間隔（イテレーション単位）
    #[serde(alias = "training_print_freq")]
    pub print_freq: usize,
    /// 勾配クリッピングの最大ノルム（0 以下で無効）
    pub max_norm: f32,
    pub epochs: usize,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    /// 基準学習率
    pub lr: f32,
    pub momentum: f32,
    pub weight_decay: f32,
    pub lr_schedule: LrScheduleConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            print_freq: 20,
            max_norm: 1.0,
            epochs: 1,
            batch_size: 32,
            optimizer: OptimizerKind::Sgd,
            lr: 0.01,
            momentum: 0.9,
            weight_decay: 0.0,
            lr_schedule: LrScheduleConfig::Constant,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    Adamw,
}

/// 学習率スケジュール（ステップはイテレーション単位）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LrScheduleConfig {
    /// 基準学習率で固定
    #[default]
    Constant,
    /// `step_size` ステップ毎に `gamma` 倍
    Step {
        step_size: u64,
        #[serde(default = "default_step_gamma")]
        gamma: f32,
    },
    /// 線形ウォームアップ後にコサイン減衰
    WarmupCosine {
        #[serde(default)]
        warmup_steps: u64,
        total_steps: u64,
        #[serde(default)]
        min_lr: f32,
    },
    /// eta1(=lr) → eta2 → eta3 の区分線形補間
    ///
    /// `eta1_step` が 0 の場合は eta1 固定、`eta2_step` が 0 の場合は eta2 固定。
    Eta {
        eta2: f32,
        eta3: f32,
        eta1_step: u64,
        #[serde(default)]
        eta2_step: u64,
    },
}

fn default_step_gamma() -> f32 {
    0.1
}

/// モデル形状の設定
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// クラス数（背景クラスを含む）
    pub num_class: usize,
    /// 1フレームあたりの特徴量次元
    pub feature_dim: usize,
    /// エンコーダ入力のフレーム数
    pub enc_len: usize,
    /// デコーダの予測ステップ数
    pub dec_steps: usize,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_class: 8,
            feature_dim: 16,
            enc_len: 8,
            dec_steps: 4,
            seed: 42,
        }
    }
}

/// 損失項の重み
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    pub encoder_weight: f32,
    pub decoder_weight: f32,
    /// 損失計算から除外するクラス（例: 曖昧区間クラス）
    pub ignore_index: Option<usize>,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            encoder_weight: 1.0,
            decoder_weight: 1.0,
            ignore_index: None,
        }
    }
}

/// 合成データセットの設定
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub num_samples: usize,
    /// クラスプロトタイプに加える一様ノイズの振幅
    pub noise: f32,
    /// デコーダ目標で次クラスへ遷移する確率
    pub transition_prob: f32,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            num_samples: 256,
            noise: 0.5,
            transition_prob: 0.2,
            shuffle: true,
            seed: 7,
        }
    }
}

impl TrainConfig {
    /// ファイルから設定を読み込み、検証する
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
        let config: TrainConfig = match ext.as_str() {
            "toml" => toml::from_str(&text)?,
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// 値の整合性を検証する
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        let m = &self.model;
        if t.print_freq == 0 {
            return Err(ConfigError::Invalid("training.print_freq must be >= 1".into()));
        }
        if t.batch_size == 0 {
            return Err(ConfigError::Invalid("training.batch_size must be >= 1".into()));
        }
        if t.lr < 0.0 {
            return Err(ConfigError::Invalid(format!("training.lr must be >= 0 (got {})", t.lr)));
        }
        if let LrScheduleConfig::Step { step_size: 0, .. } = t.lr_schedule {
            return Err(ConfigError::Invalid("lr_schedule.step_size must be >= 1".into()));
        }
        for (name, v) in [
            ("model.num_class", m.num_class),
            ("model.feature_dim", m.feature_dim),
            ("model.enc_len", m.enc_len),
            ("model.dec_steps", m.dec_steps),
        ] {
            if v == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be >= 1")));
            }
        }
        if let Some(idx) = self.loss.ignore_index {
            if idx >= m.num_class {
                return Err(ConfigError::Invalid(format!(
                    "loss.ignore_index ({idx}) must be < model.num_class ({})",
                    m.num_class
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.data.transition_prob) {
            return Err(ConfigError::Invalid("data.transition_prob must be within [0, 1]".into()));
        }
        Ok(())
    }
}
