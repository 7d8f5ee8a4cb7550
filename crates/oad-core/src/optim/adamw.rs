use ndarray::{ArrayD, Zip};

use super::Optimizer;
use crate::model::Param;

pub const ADAM_BETA1: f32 = 0.9;
pub const ADAM_BETA2: f32 = 0.999;
pub const ADAM_EPSILON: f32 = 1e-8;

/// 重み減衰を分離した Adam
pub struct AdamW {
    lr: f32,
    weight_decay: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
    /// (m, v) をパラメータ順に保持
    moments: Vec<(ArrayD<f32>, ArrayD<f32>)>,
}

impl AdamW {
    pub fn new(lr: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            weight_decay,
            beta1: ADAM_BETA1,
            beta2: ADAM_BETA2,
            epsilon: ADAM_EPSILON,
            t: 0,
            moments: Vec::new(),
        }
    }

    /// 実行済みのステップ数
    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [&mut Param]) {
        while self.moments.len() < params.len() {
            let shape = params[self.moments.len()].value.raw_dim();
            self.moments.push((ArrayD::zeros(shape.clone()), ArrayD::zeros(shape)));
        }
        self.t += 1;
        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.lr);
        let bias1 = 1.0 - b1.powi(self.t);
        let bias2 = 1.0 - b2.powi(self.t);
        let decay = if self.weight_decay > 0.0 { 1.0 - lr * self.weight_decay } else { 1.0 };

        for (p, (m, v)) in params.iter_mut().zip(self.moments.iter_mut()) {
            let p = &mut **p;
            Zip::from(&mut p.value).and(&p.grad).and(m).and(v).for_each(|w, &g, m, v| {
                *m = b1 * *m + (1.0 - b1) * g;
                *v = b2 * *v + (1.0 - b2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *w = *w * decay - lr * m_hat / (v_hat.sqrt() + eps);
            });
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
