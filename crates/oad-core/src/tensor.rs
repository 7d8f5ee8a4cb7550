//! ndarray 上の小さなテンソル操作
//!
//! 学習ループが必要とする reshape / argmax / top-k 精度のみを置く。

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView, ArrayView1, ArrayView2, Axis, Dimension};

use crate::error::{Result, TrainError};

/// 末尾軸をクラス軸とみなし `(*, num_class)` の2次元に平坦化する
///
/// 末尾軸の長さが `num_class` と一致しない場合はエラー。
pub fn flatten_classes<D: Dimension>(a: ArrayView<'_, f32, D>, num_class: usize) -> Result<Array2<f32>> {
    let last = a.shape().last().copied().unwrap_or(0);
    if last != num_class {
        return Err(TrainError::Shape(format!(
            "expected trailing dimension {num_class}, got shape {:?}",
            a.shape()
        )));
    }
    let rows = if num_class == 0 { 0 } else { a.len() / num_class };
    Ok(a.to_shape((rows, num_class))?.into_owned())
}

/// 行ごとの最大値のインデックス（同値の場合は小さいインデックス）
pub fn argmax_rows(a: ArrayView2<'_, f32>) -> Vec<usize> {
    a.axis_iter(Axis(0)).map(argmax).collect()
}

fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0usize;
    for (i, &v) in row.iter().enumerate() {
        if v.total_cmp(&row[best]) == Ordering::Greater {
            best = i;
        }
    }
    best
}

/// 上位 k 個のクラスインデックス（スコア降順、同値は小さいインデックス優先）
fn top_indices(row: ArrayView1<'_, f32>, k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..row.len()).collect();
    idx.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
    idx.truncate(k);
    idx
}

/// top-k 精度（%）
///
/// `topk` の各 k について、正解ラベルが上位 k 個に含まれるサンプルの割合を返す。
/// k がクラス数を超える場合はクラス数に丸める。
pub fn accuracy(scores: ArrayView2<'_, f32>, labels: &[usize], topk: &[usize]) -> Result<Vec<f32>> {
    let batch = scores.nrows();
    if labels.len() != batch {
        return Err(TrainError::Shape(format!(
            "accuracy: {} labels for {batch} score rows",
            labels.len()
        )));
    }
    if batch == 0 {
        return Ok(vec![0.0; topk.len()]);
    }
    let maxk = topk.iter().copied().max().unwrap_or(0).min(scores.ncols());

    // 各サンプルについて「正解が何位に入ったか」を求めておく
    let ranks: Vec<Option<usize>> = scores
        .axis_iter(Axis(0))
        .zip(labels)
        .map(|(row, &label)| top_indices(row, maxk).iter().position(|&c| c == label))
        .collect();

    Ok(topk
        .iter()
        .map(|&k| {
            let k = k.min(scores.ncols());
            let correct = ranks.iter().filter(|r| matches!(r, Some(pos) if *pos < k)).count();
            correct as f32 * 100.0 / batch as f32
        })
        .collect())
}
