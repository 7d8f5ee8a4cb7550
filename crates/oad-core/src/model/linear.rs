//! 線形の参照モデル
//!
//! 入力を時間方向に平均プーリングし、エンコーダ用に1つ、
//! デコーダの各ステップ用に1つずつの線形ヘッドを持つ。

use ndarray::{Array, Array2, Array3, Axis, Ix1, Ix2, Ix3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::{Model, ModelOutput, OutputGrad, Param};
use crate::config::ModelConfig;
use crate::error::{Result, TrainError};

pub struct LinearOadModel {
    feature_dim: usize,
    num_class: usize,
    dec_steps: usize,
    enc_w: Param,
    enc_b: Param,
    dec_w: Param,
    dec_b: Param,
    /// 直前の forward のプーリング済み入力 `[B, D]`
    pooled: Option<Array2<f32>>,
}

impl LinearOadModel {
    /// `±1/√D` の一様乱数でパラメータを初期化する
    pub fn new(cfg: &ModelConfig) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(cfg.seed);
        let (d, c, s) = (cfg.feature_dim, cfg.num_class, cfg.dec_steps);
        let bound = 1.0 / (d.max(1) as f32).sqrt();
        let mut uniform = |shape: &[usize]| {
            Array::from_shape_fn(shape, |_| rng.random_range(-bound..bound))
        };

        Self {
            feature_dim: d,
            num_class: c,
            dec_steps: s,
            enc_w: Param::new("enc_w", uniform(&[d, c])),
            enc_b: Param::new("enc_b", uniform(&[c])),
            dec_w: Param::new("dec_w", uniform(&[s, d, c])),
            dec_b: Param::new("dec_b", uniform(&[s, c])),
            pooled: None,
        }
    }

    pub fn num_class(&self) -> usize {
        self.num_class
    }

    pub fn dec_steps(&self) -> usize {
        self.dec_steps
    }
}

impl Model for LinearOadModel {
    fn forward(&mut self, inputs: &Array3<f32>) -> Result<ModelOutput> {
        let (batch, _, dim) = inputs.dim();
        if dim != self.feature_dim {
            return Err(TrainError::Shape(format!(
                "model expects feature_dim {}, got input shape {:?}",
                self.feature_dim,
                inputs.shape()
            )));
        }
        let pooled = inputs
            .mean_axis(Axis(1))
            .ok_or_else(|| TrainError::Shape("input sequence must not be empty".into()))?;

        let enc_w = self.enc_w.value.view().into_dimensionality::<Ix2>()?;
        let enc_b = self.enc_b.value.view().into_dimensionality::<Ix1>()?;
        let encoder = pooled.dot(&enc_w) + &enc_b;

        let dec_w = self.dec_w.value.view().into_dimensionality::<Ix3>()?;
        let dec_b = self.dec_b.value.view().into_dimensionality::<Ix2>()?;
        let mut decoder = Array3::zeros((batch, self.dec_steps, self.num_class));
        for step in 0..self.dec_steps {
            let scores = pooled.dot(&dec_w.index_axis(Axis(0), step)) + &dec_b.row(step);
            decoder.index_axis_mut(Axis(1), step).assign(&scores);
        }

        self.pooled = Some(pooled);
        Ok(ModelOutput { encoder, decoder })
    }

    fn backward(&mut self, grad: &OutputGrad) -> Result<()> {
        let pooled = self
            .pooled
            .as_ref()
            .ok_or_else(|| TrainError::Shape("backward called before forward".into()))?;
        let batch = pooled.nrows();
        if grad.encoder.dim() != (batch, self.num_class)
            || grad.decoder.dim() != (batch, self.dec_steps, self.num_class)
        {
            return Err(TrainError::Shape(format!(
                "output grad shapes {:?} / {:?} do not match batch {batch}",
                grad.encoder.shape(),
                grad.decoder.shape()
            )));
        }
        let pooled_t = pooled.t();

        let mut enc_w = self.enc_w.grad.view_mut().into_dimensionality::<Ix2>()?;
        enc_w += &pooled_t.dot(&grad.encoder);
        let mut enc_b = self.enc_b.grad.view_mut().into_dimensionality::<Ix1>()?;
        enc_b += &grad.encoder.sum_axis(Axis(0));

        let mut dec_w = self.dec_w.grad.view_mut().into_dimensionality::<Ix3>()?;
        let mut dec_b = self.dec_b.grad.view_mut().into_dimensionality::<Ix2>()?;
        for step in 0..self.dec_steps {
            let g = grad.decoder.index_axis(Axis(1), step);
            let mut w = dec_w.index_axis_mut(Axis(0), step);
            w += &pooled_t.dot(&g);
            let mut b = dec_b.row_mut(step);
            b += &g.sum_axis(Axis(0));
        }
        Ok(())
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.enc_w, &mut self.enc_b, &mut self.dec_w, &mut self.dec_b]
    }
}
