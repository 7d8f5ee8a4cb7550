use ndarray::ArrayD;

use super::Optimizer;
use crate::model::Param;

/// モーメンタム付き SGD（L2 正則化は勾配に加算する方式）
pub struct Sgd {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    /// パラメータ毎のモーメンタムバッファ（初回 step で確保）
    buffers: Vec<Option<ArrayD<f32>>>,
}

impl Sgd {
    pub fn new(lr: f32, momentum: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay,
            buffers: Vec::new(),
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) {
        let momentum = self.momentum;
        if self.buffers.len() < params.len() {
            self.buffers.resize(params.len(), None);
        }
        for (p, buf) in params.iter_mut().zip(self.buffers.iter_mut()) {
            let mut d = p.grad.clone();
            if self.weight_decay != 0.0 {
                d.scaled_add(self.weight_decay, &p.value);
            }
            if momentum != 0.0 {
                // 初回はゼロバッファから始めるので buf = d となる
                let b = buf.get_or_insert_with(|| ArrayD::zeros(d.raw_dim()));
                b.mapv_inplace(|v| v * momentum);
                *b += &d;
                d.assign(&*b);
            }
            p.value.scaled_add(-self.lr, &d);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, arr1};

    fn param(value: f32, grad: f32) -> Param {
        let mut p = Param::new("w", arr1(&[value]).into_dyn());
        p.grad = arr1(&[grad]).into_dyn();
        p
    }

    #[test]
    fn plain_sgd_step() {
        let mut opt = Sgd::new(0.1, 0.0, 0.0);
        let mut p = param(1.0, 2.0);
        opt.step(&mut [&mut p]);
        assert!((p.value[IxDyn(&[0])] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn momentum_accumulates() {
        let mut opt = Sgd::new(0.1, 0.9, 0.0);
        let mut p = param(0.0, 1.0);
        opt.step(&mut [&mut p]);
        // buf = 1.0
        assert!((p.value[IxDyn(&[0])] + 0.1).abs() < 1e-6);
        opt.step(&mut [&mut p]);
        // buf = 0.9 + 1.0
        assert!((p.value[IxDyn(&[0])] + 0.1 + 0.19).abs() < 1e-6);
    }

    #[test]
    fn weight_decay_adds_l2_gradient() {
        let mut opt = Sgd::new(1.0, 0.0, 0.5);
        let mut p = param(2.0, 0.0);
        opt.step(&mut [&mut p]);
        assert!((p.value[IxDyn(&[0])] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_grad_clears_all() {
        let mut opt = Sgd::new(0.1, 0.0, 0.0);
        let mut a = param(1.0, 3.0);
        let mut b = param(1.0, -3.0);
        opt.zero_grad(&mut [&mut a, &mut b]);
        assert_eq!(a.grad[IxDyn(&[0])], 0.0);
        assert_eq!(b.grad[IxDyn(&[0])], 0.0);
    }
}
