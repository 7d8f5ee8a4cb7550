//! モデル
//!
//! 学習ループから見たモデルは「順伝播でエンコーダ/デコーダのスコアを返し、
//! 出力勾配を受け取ってパラメータ勾配を累積する」ものとして扱う。

mod linear;

pub use linear::LinearOadModel;

use ndarray::{Array2, Array3, ArrayD, IxDyn};

use crate::error::Result;

/// 学習対象のパラメータと、その勾配
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub value: ArrayD<f32>,
    pub grad: ArrayD<f32>,
}

impl Param {
    /// 勾配ゼロで初期化したパラメータ
    pub fn new(name: &str, value: ArrayD<f32>) -> Self {
        let grad = ArrayD::zeros(value.raw_dim());
        Self {
            name: name.to_string(),
            value,
            grad,
        }
    }

    pub fn zeros(name: &str, shape: &[usize]) -> Self {
        Self::new(name, ArrayD::zeros(IxDyn(shape)))
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// 順伝播の出力
#[derive(Clone, Debug)]
pub struct ModelOutput {
    /// エンコーダのスコア `[B, C]`
    pub encoder: Array2<f32>,
    /// デコーダのステップ毎スコア `[B, S, C]`
    pub decoder: Array3<f32>,
}

/// 出力に対する損失の勾配（`ModelOutput` と同形状）
#[derive(Clone, Debug)]
pub struct OutputGrad {
    pub encoder: Array2<f32>,
    pub decoder: Array3<f32>,
}

/// 学習ループが要求するモデルの契約
pub trait Model {
    /// 入力 `[B, T, D]` からスコアを計算する
    fn forward(&mut self, inputs: &Array3<f32>) -> Result<ModelOutput>;

    /// 直前の `forward` に対する出力勾配を受け取り、パラメータ勾配へ加算する
    fn backward(&mut self, grad: &OutputGrad) -> Result<()>;

    /// 全パラメータ（順序は呼び出し間で不変）
    fn params_mut(&mut self) -> Vec<&mut Param>;

    fn param_count(&mut self) -> usize {
        self.params_mut().iter().map(|p| p.len()).sum()
    }
}
