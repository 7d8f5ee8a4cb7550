//! 学習率スケジューラ
//!
//! 1イテレーション毎に `step` を呼び、オプティマイザの学習率を書き換える。

use crate::config::LrScheduleConfig;
use crate::optim::Optimizer;

pub trait LrScheduler {
    /// ステップを1つ進め、オプティマイザへ新しい学習率を設定する
    fn step(&mut self, optimizer: &mut dyn Optimizer);

    /// 最後に設定した学習率
    fn last_lr(&self) -> f32;
}

impl LrScheduleConfig {
    /// `step` 時点の学習率
    ///
    /// - constant: `base_lr`
    /// - step: `base_lr · gamma^(step / step_size)`
    /// - warmup_cosine: `(step+1)/warmup_steps` の線形ウォームアップ後、`min_lr` までコサイン減衰
    /// - eta: `base_lr`(eta1) → eta2 → eta3 を線形補間
    pub fn lr_at(&self, base_lr: f32, step: u64) -> f32 {
        match *self {
            LrScheduleConfig::Constant => base_lr,
            LrScheduleConfig::Step { step_size, gamma } => {
                let k = (step / step_size.max(1)) as i32;
                base_lr * gamma.powi(k)
            }
            LrScheduleConfig::WarmupCosine {
                warmup_steps,
                total_steps,
                min_lr,
            } => {
                if step < warmup_steps {
                    return base_lr * (step + 1) as f32 / warmup_steps as f32;
                }
                let span = total_steps.saturating_sub(warmup_steps).max(1);
                let p = ((step - warmup_steps) as f32 / span as f32).clamp(0.0, 1.0);
                min_lr + (base_lr - min_lr) * 0.5 * (1.0 + (std::f32::consts::PI * p).cos())
            }
            LrScheduleConfig::Eta {
                eta2,
                eta3,
                eta1_step,
                eta2_step,
            } => {
                let eta1 = base_lr;
                if eta1_step == 0 {
                    eta1
                } else if step < eta1_step {
                    let t = step as f32 / eta1_step as f32;
                    eta1 + (eta2 - eta1) * t
                } else if eta2_step == 0 {
                    eta2
                } else if step < eta2_step {
                    let t = (step - eta1_step) as f32 / (eta2_step - eta1_step) as f32;
                    eta2 + (eta3 - eta2) * t
                } else {
                    eta3
                }
            }
        }
    }
}

/// 設定されたスケジュールに従うスケジューラ
pub struct ScheduledLr {
    base_lr: f32,
    schedule: LrScheduleConfig,
    step: u64,
    last_lr: f32,
}

impl ScheduledLr {
    /// スケジューラを作成し、ステップ0の学習率をオプティマイザへ設定する
    pub fn new(base_lr: f32, schedule: LrScheduleConfig, optimizer: &mut dyn Optimizer) -> Self {
        if let LrScheduleConfig::Eta {
            eta1_step,
            eta2_step,
            ..
        } = schedule
        {
            if eta1_step > 0 && eta2_step > 0 && eta1_step > eta2_step {
                log::warn!(
                    "eta1_step ({eta1_step}) > eta2_step ({eta2_step}). \
                     This may cause unexpected learning rate behavior."
                );
            }
        }
        let last_lr = schedule.lr_at(base_lr, 0).max(0.0);
        optimizer.set_lr(last_lr);
        Self {
            base_lr,
            schedule,
            step: 0,
            last_lr,
        }
    }

    /// これまでに進めたステップ数
    pub fn steps(&self) -> u64 {
        self.step
    }
}

impl LrScheduler for ScheduledLr {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.step += 1;
        self.last_lr = self.schedule.lr_at(self.base_lr, self.step).max(0.0);
        optimizer.set_lr(self.last_lr);
    }

    fn last_lr(&self) -> f32 {
        self.last_lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Sgd;

    #[test]
    fn constant_schedule() {
        let s = LrScheduleConfig::Constant;
        assert!((s.lr_at(0.001, 0) - 0.001).abs() < 1e-9);
        assert!((s.lr_at(0.001, 500) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn step_schedule_decays_every_step_size() {
        let s = LrScheduleConfig::Step {
            step_size: 10,
            gamma: 0.5,
        };
        assert!((s.lr_at(0.1, 9) - 0.1).abs() < 1e-7);
        assert!((s.lr_at(0.1, 10) - 0.05).abs() < 1e-7);
        assert!((s.lr_at(0.1, 25) - 0.025).abs() < 1e-7);
    }

    #[test]
    fn warmup_then_cosine() {
        let s = LrScheduleConfig::WarmupCosine {
            warmup_steps: 4,
            total_steps: 14,
            min_lr: 0.0,
        };
        assert!((s.lr_at(1.0, 0) - 0.25).abs() < 1e-6);
        assert!((s.lr_at(1.0, 3) - 1.0).abs() < 1e-6);
        assert!((s.lr_at(1.0, 4) - 1.0).abs() < 1e-6);
        assert!((s.lr_at(1.0, 9) - 0.5).abs() < 1e-6);
        assert!(s.lr_at(1.0, 14).abs() < 1e-6);
        assert!(s.lr_at(1.0, 100).abs() < 1e-6);
    }

    #[test]
    fn eta_three_phase() {
        // eta1 = 0.01 (0-100), eta2 = 0.001 (100-200), eta3 = 0.0001
        let s = LrScheduleConfig::Eta {
            eta2: 0.001,
            eta3: 0.0001,
            eta1_step: 100,
            eta2_step: 200,
        };
        assert!((s.lr_at(0.01, 0) - 0.01).abs() < 1e-6);
        assert!((s.lr_at(0.01, 50) - (0.01 + (0.001 - 0.01) * 0.5)).abs() < 1e-6);
        assert!((s.lr_at(0.01, 100) - 0.001).abs() < 1e-6);
        assert!((s.lr_at(0.01, 150) - (0.001 + (0.0001 - 0.001) * 0.5)).abs() < 1e-6);
        assert!((s.lr_at(0.01, 300) - 0.0001).abs() < 1e-6);
    }

    #[test]
    fn eta_two_phase_holds_eta2() {
        let s = LrScheduleConfig::Eta {
            eta2: 0.001,
            eta3: 0.0,
            eta1_step: 100,
            eta2_step: 0,
        };
        assert!((s.lr_at(0.01, 200) - 0.001).abs() < 1e-6);
    }

    #[test]
    fn scheduler_drives_optimizer_lr() {
        let mut opt = Sgd::new(1.0, 0.0, 0.0);
        let mut sched = ScheduledLr::new(
            0.1,
            LrScheduleConfig::Step {
                step_size: 2,
                gamma: 0.1,
            },
            &mut opt,
        );
        assert!((opt.lr() - 0.1).abs() < 1e-7);
        sched.step(&mut opt);
        assert!((opt.lr() - 0.1).abs() < 1e-7);
        sched.step(&mut opt);
        assert!((opt.lr() - 0.01).abs() < 1e-7);
        assert_eq!(sched.steps(), 2);
        assert!((sched.last_lr() - 0.01).abs() < 1e-7);
    }
}
