use crate::model::Param;

/// クリップ係数の分母に加える微小値
const CLIP_EPSILON: f32 = 1e-6;

/// 全勾配の大域 L2 ノルムが `max_norm` を超える場合に一律スケールする
///
/// 戻り値はクリップ前のノルム。ノルムが非有限の場合は何もしない。
pub fn clip_grad_norm(params: &mut [&mut Param], max_norm: f32) -> f32 {
    let norm_sq: f32 = params.iter().map(|p| p.grad.iter().map(|g| g * g).sum::<f32>()).sum();
    let norm = norm_sq.sqrt();
    if !norm.is_finite() || norm <= max_norm {
        return norm;
    }
    let coef = max_norm / (norm + CLIP_EPSILON);
    if coef < 1.0 {
        for p in params.iter_mut() {
            p.grad.mapv_inplace(|g| g * coef);
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, arr1};

    fn param(grad: &[f32]) -> Param {
        let mut p = Param::zeros("w", &[grad.len()]);
        p.grad = arr1(grad).into_dyn();
        p
    }

    #[test]
    fn no_clip_below_threshold() {
        let mut a = param(&[0.1, 0.2]);
        let mut b = param(&[0.1]);
        let norm = clip_grad_norm(&mut [&mut a, &mut b], 1.0);
        assert!((norm - 0.06f32.sqrt()).abs() < 1e-6);
        assert_eq!(a.grad[IxDyn(&[1])], 0.2);
    }

    #[test]
    fn clip_scales_to_max_norm() {
        let mut a = param(&[3.0]);
        let mut b = param(&[4.0]);
        let norm = clip_grad_norm(&mut [&mut a, &mut b], 1.0);
        assert!((norm - 5.0).abs() < 1e-6);
        let clipped = (a.grad[IxDyn(&[0])].powi(2) + b.grad[IxDyn(&[0])].powi(2)).sqrt();
        assert!((clipped - 1.0).abs() < 1e-5);
        // 比率は保存される
        assert!((a.grad[IxDyn(&[0])] / b.grad[IxDyn(&[0])] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn non_finite_norm_is_left_alone() {
        let mut a = param(&[f32::NAN, 1.0]);
        let norm = clip_grad_norm(&mut [&mut a], 1.0);
        assert!(norm.is_nan());
        assert_eq!(a.grad[IxDyn(&[1])], 1.0);
    }
}
