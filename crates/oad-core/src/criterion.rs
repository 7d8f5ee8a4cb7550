//! 損失関数
//!
//! `Criterion` は名前付きの損失項と、それぞれの出力に対する勾配を返す。
//! 合成損失は `weight_dict` と損失項の両方に存在するキーについての重み付き和。

use std::collections::BTreeMap;
use std::fmt::Write as _;

use ndarray::{Array2, ArrayView2, Axis};

use crate::config::LossConfig;
use crate::error::{Result, TrainError};

/// エンコーダ出力 / 目標のキー
pub const LABELS_ENCODER: &str = "labels_encoder";
/// デコーダ出力 / 目標のキー
pub const LABELS_DECODER: &str = "labels_decoder";

pub type TensorMap = BTreeMap<String, Array2<f32>>;

/// 1つの損失項
#[derive(Clone, Debug)]
pub struct LossTerm {
    pub value: f32,
    /// d(value)/d(outputs[key])
    pub grads: TensorMap,
}

pub type LossDict = BTreeMap<String, LossTerm>;

pub trait Criterion {
    /// 損失項ごとの重み
    fn weight_dict(&self) -> &BTreeMap<String, f32>;

    fn compute(&self, outputs: &TensorMap, targets: &TensorMap) -> Result<LossDict>;
}

/// 重み付き合成損失
///
/// `weights` に存在しない損失項は合成には含めない（メトリクスとしては記録される）。
pub fn weighted_loss(losses: &LossDict, weights: &BTreeMap<String, f32>) -> f32 {
    losses
        .iter()
        .filter_map(|(k, term)| weights.get(k).map(|w| term.value * w))
        .sum()
}

/// 合成損失の各出力に対する勾配
pub fn weighted_output_grads(losses: &LossDict, weights: &BTreeMap<String, f32>) -> TensorMap {
    let mut out = TensorMap::new();
    for (k, term) in losses {
        let Some(&w) = weights.get(k) else {
            continue;
        };
        for (name, g) in &term.grads {
            match out.get_mut(name) {
                Some(acc) => acc.scaled_add(w, g),
                None => {
                    out.insert(name.clone(), g * w);
                }
            }
        }
    }
    out
}

/// 損失項の内訳を `{name: value, ...}` 形式で整形する
pub fn format_loss_terms(losses: &LossDict) -> String {
    let mut s = String::from("{");
    for (i, (k, term)) in losses.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        let _ = write!(s, "{k}: {}", term.value);
    }
    s.push('}');
    s
}

/// ソフトラベルの交差エントロピー
///
/// 各ヘッドについて `mean_rows(Σ_j -t_j · log_softmax(x)_j)` を計算する。
/// `ignore_index` を指定した場合、そのクラス列はソフトマックスと目標から除外し、
/// 目標がそのクラスを指す行は平均から除外する。
pub struct SoftLabelCriterion {
    weight_dict: BTreeMap<String, f32>,
    ignore_index: Option<usize>,
}

impl SoftLabelCriterion {
    pub fn new(cfg: &LossConfig) -> Self {
        let weight_dict = BTreeMap::from([
            (LABELS_ENCODER.to_string(), cfg.encoder_weight),
            (LABELS_DECODER.to_string(), cfg.decoder_weight),
        ]);
        Self {
            weight_dict,
            ignore_index: cfg.ignore_index,
        }
    }

    fn loss_labels(&self, input: ArrayView2<'_, f32>, target: ArrayView2<'_, f32>) -> Result<(f32, Array2<f32>)> {
        if input.dim() != target.dim() {
            return Err(TrainError::Shape(format!(
                "criterion: input {:?} and target {:?} differ",
                input.shape(),
                target.shape()
            )));
        }
        let (rows, cols) = input.dim();
        let notice: Vec<bool> = (0..cols).map(|c| Some(c) != self.ignore_index).collect();
        let mut grad = Array2::zeros((rows, cols));
        let mut total = 0.0f32;
        let mut used = 0usize;

        for (r, (x, t)) in input.axis_iter(Axis(0)).zip(target.axis_iter(Axis(0))).enumerate() {
            if let Some(ig) = self.ignore_index {
                if t[ig] == 1.0 {
                    continue;
                }
            }
            // 除外列を除いた log-softmax
            let max = x
                .iter()
                .zip(&notice)
                .filter(|(_, n)| **n)
                .map(|(v, _)| *v)
                .fold(f32::NEG_INFINITY, f32::max);
            let sum_exp: f32 = x
                .iter()
                .zip(&notice)
                .filter(|(_, n)| **n)
                .map(|(v, _)| (v - max).exp())
                .sum();
            let log_z = max + sum_exp.ln();

            let t_sum: f32 = t.iter().zip(&notice).filter(|(_, n)| **n).map(|(v, _)| *v).sum();
            let mut row_loss = 0.0f32;
            let mut g_row = grad.row_mut(r);
            for c in (0..cols).filter(|&c| notice[c]) {
                let log_p = x[c] - log_z;
                row_loss -= t[c] * log_p;
                // d/dx_c = softmax_c · Σt − t_c
                g_row[c] = log_p.exp() * t_sum - t[c];
            }
            total += row_loss;
            used += 1;
        }

        if used == 0 {
            return Ok((0.0, Array2::zeros((rows, cols))));
        }
        let n = used as f32;
        grad /= n;
        Ok((total / n, grad))
    }
}

impl Criterion for SoftLabelCriterion {
    fn weight_dict(&self) -> &BTreeMap<String, f32> {
        &self.weight_dict
    }

    fn compute(&self, outputs: &TensorMap, targets: &TensorMap) -> Result<LossDict> {
        let mut losses = LossDict::new();
        for key in [LABELS_ENCODER, LABELS_DECODER] {
            let input = outputs.get(key).ok_or_else(|| TrainError::MissingOutput(key.to_string()))?;
            let target = targets.get(key).ok_or_else(|| TrainError::MissingOutput(key.to_string()))?;
            let (value, grad) = self.loss_labels(input.view(), target.view())?;
            losses.insert(
                key.to_string(),
                LossTerm {
                    value,
                    grads: TensorMap::from([(key.to_string(), grad)]),
                },
            );
        }
        Ok(losses)
    }
}
