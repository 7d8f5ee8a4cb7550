//! オプティマイザと勾配クリッピング

mod adamw;
mod clip;
mod sgd;

pub use adamw::AdamW;
pub use clip::clip_grad_norm;
pub use sgd::Sgd;

use crate::config::{OptimizerKind, TrainingConfig};
use crate::model::Param;

/// パラメータ更新の契約
///
/// 内部状態（モーメンタム等）は `params` の並び順で対応付ける。
pub trait Optimizer {
    /// 全パラメータの勾配をゼロにする
    fn zero_grad(&mut self, params: &mut [&mut Param]) {
        for p in params.iter_mut() {
            p.grad.fill(0.0);
        }
    }

    fn step(&mut self, params: &mut [&mut Param]);

    /// 現在の学習率
    fn lr(&self) -> f32;

    fn set_lr(&mut self, lr: f32);
}

/// 設定からオプティマイザを構築する
pub fn build_optimizer(cfg: &TrainingConfig) -> Box<dyn Optimizer> {
    match cfg.optimizer {
        OptimizerKind::Sgd => Box::new(Sgd::new(cfg.lr, cfg.momentum, cfg.weight_decay)),
        OptimizerKind::Adamw => Box::new(AdamW::new(cfg.lr, cfg.weight_decay)),
    }
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn zero_grad(&mut self, params: &mut [&mut Param]) {
        (**self).zero_grad(params)
    }

    fn step(&mut self, params: &mut [&mut Param]) {
        (**self).step(params)
    }

    fn lr(&self) -> f32 {
        (**self).lr()
    }

    fn set_lr(&mut self, lr: f32) {
        (**self).set_lr(lr)
    }
}
