//! バッチと合成データセット
//!
//! 実データのローダーは持たない。クラス毎のプロトタイプ特徴量にノイズを加えた
//! 合成データで、学習ループが要求するバッチ形式をそのまま生成する。

use ndarray::{Array1, Array2, Array3, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::{DataConfig, ModelConfig};

/// 1イテレーション分の入力と目標
#[derive(Clone, Debug)]
pub struct Batch {
    /// 特徴量 `[B, T, D]`
    pub inputs: Array3<f32>,
    /// フレーム毎のクラス `[B, T, C]`（損失では未使用）
    pub enc_target: Array3<f32>,
    /// 現在フレームまでの距離 `[B, T]`（損失では未使用）
    pub distance_target: Array2<f32>,
    /// 現在フレームのクラス `[B, C]`
    pub class_h_target: Array2<f32>,
    /// 未来ステップのクラス `[B, S, C]`
    pub dec_target: Array3<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 合成データセット
pub struct SyntheticActionDataset {
    inputs: Array3<f32>,
    enc_target: Array3<f32>,
    distance_target: Array2<f32>,
    class_h_target: Array2<f32>,
    dec_target: Array3<f32>,
    /// バッチを切り出す順序
    order: Vec<usize>,
}

impl SyntheticActionDataset {
    pub fn generate(model: &ModelConfig, data: &DataConfig) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(data.seed);
        let (n, t, d, c, s) = (
            data.num_samples,
            model.enc_len,
            model.feature_dim,
            model.num_class,
            model.dec_steps,
        );

        let prototypes = Array2::from_shape_fn((c, d), |_| rng.random_range(-1.0f32..1.0));
        let labels: Vec<usize> = (0..n).map(|_| rng.random_range(0..c)).collect();

        let mut inputs = Array3::zeros((n, t, d));
        for (i, mut sample) in inputs.axis_iter_mut(Axis(0)).enumerate() {
            let proto = prototypes.row(labels[i]);
            for mut frame in sample.axis_iter_mut(Axis(0)) {
                frame.assign(&proto);
                frame.mapv_inplace(|v| v + data.noise * rng.random_range(-1.0f32..1.0));
            }
        }

        let mut enc_target = Array3::zeros((n, t, c));
        let mut class_h_target = Array2::zeros((n, c));
        let mut dec_target = Array3::zeros((n, s, c));
        for (i, &label) in labels.iter().enumerate() {
            enc_target.index_axis_mut(Axis(0), i).column_mut(label).fill(1.0);
            class_h_target[[i, label]] = 1.0;
            let mut cur = label;
            for step in 0..s {
                if rng.random_bool(data.transition_prob as f64) {
                    cur = (cur + 1) % c;
                }
                dec_target[[i, step, cur]] = 1.0;
            }
        }
        let distance_row = Array1::from_shape_fn(t, |k| (t - 1 - k) as f32);
        let distance_target = Array2::from_shape_fn((n, t), |(_, k)| distance_row[k]);

        Self {
            inputs,
            enc_target,
            distance_target,
            class_h_target,
            dec_target,
            order: (0..n).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// バッチ順をシャッフル
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.len().div_ceil(batch_size.max(1))
    }

    fn gather(&self, idx: &[usize]) -> Batch {
        Batch {
            inputs: self.inputs.select(Axis(0), idx),
            enc_target: self.enc_target.select(Axis(0), idx),
            distance_target: self.distance_target.select(Axis(0), idx),
            class_h_target: self.class_h_target.select(Axis(0), idx),
            dec_target: self.dec_target.select(Axis(0), idx),
        }
    }

    /// エポックのイテレータ（最後のバッチは端数になりうる）
    pub fn batches(&self, batch_size: usize) -> impl ExactSizeIterator<Item = Batch> + '_ {
        self.order.chunks(batch_size.max(1)).map(move |idx| self.gather(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> (ModelConfig, DataConfig) {
        let model = ModelConfig {
            num_class: 5,
            feature_dim: 6,
            enc_len: 3,
            dec_steps: 2,
            seed: 0,
        };
        let data = DataConfig {
            num_samples: 10,
            noise: 0.1,
            transition_prob: 0.5,
            shuffle: true,
            seed: 3,
        };
        (model, data)
    }

    #[test]
    fn batches_cover_dataset_with_remainder() {
        let (model, data) = configs();
        let ds = SyntheticActionDataset::generate(&model, &data);
        let batches = ds.batches(4);
        assert_eq!(batches.len(), 3);
        assert_eq!(ds.num_batches(4), 3);
        let sizes: Vec<usize> = batches.map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn batch_layout_and_one_hot_targets() {
        let (model, data) = configs();
        let ds = SyntheticActionDataset::generate(&model, &data);
        let b = ds.batches(4).next().unwrap();
        assert_eq!(b.inputs.dim(), (4, 3, 6));
        assert_eq!(b.enc_target.dim(), (4, 3, 5));
        assert_eq!(b.distance_target.dim(), (4, 3));
        assert_eq!(b.class_h_target.dim(), (4, 5));
        assert_eq!(b.dec_target.dim(), (4, 2, 5));
        for row in b.class_h_target.rows() {
            assert_eq!(row.sum(), 1.0);
        }
        for row in b.dec_target.rows() {
            assert_eq!(row.sum(), 1.0);
        }
        assert_eq!(b.distance_target[[0, 0]], 2.0);
        assert_eq!(b.distance_target[[0, 2]], 0.0);
    }

    #[test]
    fn generation_is_deterministic_and_shuffle_reorders() {
        let (model, data) = configs();
        let a = SyntheticActionDataset::generate(&model, &data);
        let mut b = SyntheticActionDataset::generate(&model, &data);
        assert_eq!(a.inputs, b.inputs);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        b.shuffle(&mut rng);
        let mut sorted = b.order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }
}
