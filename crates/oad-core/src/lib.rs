//! オンライン行動検出モデルの学習ドライバ
//!
//! エンコーダ（現在フレーム）とデコーダ（未来ステップ）の2ヘッドを持つモデルを
//! 1エポック学習する。モデル・損失・オプティマイザ・スケジューラはトレイトで差し替え可能。

pub mod config;
pub mod criterion;
pub mod data;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod scheduler;
pub mod tensor;

pub use config::TrainConfig;
pub use engine::train_one_epoch;
pub use error::{ConfigError, Result, TrainError};
pub use logging::{LogFacade, TrainLogger};
pub use metrics::{MetricLogger, SmoothedValue};
