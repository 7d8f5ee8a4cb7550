//! 学習ループ
//!
//! データローダーを1周し、順伝播 → 損失 → 逆伝播 → 勾配クリップ → 更新 → 学習率更新
//! を1イテレーションずつ実行する。平滑化したメトリクスを定期的にログへ書き出し、
//! エポック終了時に集約結果を返す。

mod timefmt;

pub use timefmt::{format_duration, format_hms};

use std::time::Instant;

use ndarray::{Array2, Array3};

use crate::config::TrainConfig;
use crate::criterion::{
    Criterion, LABELS_DECODER, LABELS_ENCODER, TensorMap, format_loss_terms, weighted_loss,
    weighted_output_grads,
};
use crate::data::Batch;
use crate::error::{Result, TrainError};
use crate::logging::TrainLogger;
use crate::metrics::MetricLogger;
use crate::model::{Model, OutputGrad};
use crate::optim::{Optimizer, clip_grad_norm};
use crate::scheduler::LrScheduler;
use crate::tensor::{accuracy, argmax_rows, flatten_classes};

/// エンコーダ精度として記録する top-k
const TOPK: [usize; 2] = [1, 5];

/// このイテレーションで進捗行を出すか
///
/// `print_freq` 毎と、最終イテレーションで出力する。
pub fn should_log(iteration: usize, print_freq: usize, max_iter: usize) -> bool {
    iteration % print_freq.max(1) == 0 || iteration + 1 == max_iter
}

/// 残り時間（秒）= 平均バッチ時間 × 残りイテレーション数
pub fn eta_seconds(avg_batch_secs: f64, iteration: usize, max_iter: usize) -> f64 {
    (avg_batch_secs * max_iter.saturating_sub(iteration) as f64).max(0.0)
}

/// 1エポック分の学習
///
/// 合成損失が非有限になった場合は値と損失項の内訳をログに出し、パラメータを
/// 更新せずに `TrainError::NonFiniteLoss` を返す。呼び出し側はこれを致命的な
/// 発散として扱う（`oad_train` はプロセスを終了する）。
#[allow(clippy::too_many_arguments)]
pub fn train_one_epoch<M, C, I, O, L, S>(
    cfg: &TrainConfig,
    model: &mut M,
    criterion: &C,
    data_loader: I,
    optimizer: &mut O,
    epoch: usize,
    logger: &mut L,
    scheduler: &mut S,
) -> Result<MetricLogger>
where
    M: Model + ?Sized,
    C: Criterion + ?Sized,
    I: IntoIterator<Item = Batch>,
    I::IntoIter: ExactSizeIterator,
    O: Optimizer,
    L: TrainLogger + ?Sized,
    S: LrScheduler + ?Sized,
{
    logger.info("Start training ... ");
    let mut meters = MetricLogger::new("  ");
    let loader = data_loader.into_iter();
    let max_iter = loader.len();
    let print_freq = cfg.training.print_freq;
    let num_class = cfg.model.num_class;
    let max_norm = cfg.training.max_norm;

    let start_training_time = Instant::now();
    let mut end = Instant::now();
    for (iteration, batch) in loader.enumerate() {
        // バックエンドはホストメモリのみなのでデバイス転送は不要
        let data_time = end.elapsed();

        let output = model.forward(&batch.inputs)?;
        let (b, s, c) = output.decoder.dim();
        let outputs = TensorMap::from([
            (LABELS_ENCODER.to_string(), flatten_classes(output.encoder.view(), num_class)?),
            (LABELS_DECODER.to_string(), flatten_classes(output.decoder.view(), num_class)?),
        ]);
        let targets = TensorMap::from([
            (LABELS_ENCODER.to_string(), flatten_classes(batch.class_h_target.view(), num_class)?),
            (LABELS_DECODER.to_string(), flatten_classes(batch.dec_target.view(), num_class)?),
        ]);

        let labels = argmax_rows(batch.class_h_target.view());
        let acc = accuracy(outputs[LABELS_ENCODER].view(), &labels, &TOPK)?;

        let loss_dict = criterion.compute(&outputs, &targets)?;
        let weight_dict = criterion.weight_dict();
        let loss_value = weighted_loss(&loss_dict, weight_dict);

        if !loss_value.is_finite() {
            let terms = format_loss_terms(&loss_dict);
            logger.info(&format!("Loss is {loss_value}, stopping training"));
            logger.info(&terms);
            return Err(TrainError::NonFiniteLoss {
                value: loss_value,
                terms,
            });
        }

        meters.update("losses", f64::from(loss_value));
        for (name, term) in &loss_dict {
            meters.update(name, f64::from(term.value));
        }
        meters.update("top1", f64::from(acc[0]));
        meters.update("top5", f64::from(acc[1]));

        let mut grads = weighted_output_grads(&loss_dict, weight_dict);
        let output_grad = OutputGrad {
            encoder: grads
                .remove(LABELS_ENCODER)
                .unwrap_or_else(|| Array2::zeros(output.encoder.raw_dim())),
            decoder: match grads.remove(LABELS_DECODER) {
                Some(g) => g.to_shape((b, s, c))?.into_owned(),
                None => Array3::zeros((b, s, c)),
            },
        };

        optimizer.zero_grad(&mut model.params_mut());
        model.backward(&output_grad)?;
        {
            let mut params = model.params_mut();
            if max_norm > 0.0 {
                let norm = clip_grad_norm(&mut params, max_norm);
                log::trace!("iter {iteration}: grad norm {norm:.6} (max_norm {max_norm})");
            }
            optimizer.step(&mut params);
        }
        scheduler.step(&mut *optimizer);

        let batch_time = end.elapsed();
        end = Instant::now();
        meters.update("time", batch_time.as_secs_f64());
        meters.update("data", data_time.as_secs_f64());

        if should_log(iteration, print_freq, max_iter) {
            let avg_time = meters.get("time").map(|m| m.global_avg()).unwrap_or(0.0);
            let eta = eta_seconds(avg_time, iteration, max_iter);
            let line = [
                format!("epoch: {epoch}"),
                format!("iter: {iteration}/{max_iter}"),
                format!("eta: {}", format_hms(eta as u64)),
                meters.to_string(),
                format!("lr: {:.6}", optimizer.lr()),
            ]
            .join(meters.delimiter());
            logger.info(&line);
        }
    }

    let total_training_time = start_training_time.elapsed();
    meters.set_total_time(total_training_time);
    let per_iter = if max_iter > 0 {
        total_training_time.as_secs_f64() / max_iter as f64
    } else {
        0.0
    };
    logger.info(&format!(
        "Total training time: {} ({per_iter:.4} s / it)",
        format_duration(total_training_time)
    ));
    Ok(meters)
}
