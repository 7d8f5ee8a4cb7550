//! 平滑化メトリクス
//!
//! `SmoothedValue` は直近ウィンドウの中央値・平均と全体平均を保持する。
//! `MetricLogger` は名前付きの `SmoothedValue` を挿入順に並べ、1行のログ文字列に整形する。

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// 平滑化ウィンドウの既定サイズ
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// ウィンドウ付きの移動統計
#[derive(Clone, Debug)]
pub struct SmoothedValue {
    window: VecDeque<f64>,
    window_size: usize,
    total: f64,
    count: u64,
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl SmoothedValue {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            total: 0.0,
            count: 0,
        }
    }

    pub fn update(&mut self, value: f64) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.total += value;
        self.count += 1;
    }

    /// 更新回数
    pub fn count(&self) -> u64 {
        self.count
    }

    /// ウィンドウ内の中央値（偶数個の場合は下側）
    pub fn median(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted[(sorted.len() - 1) / 2]
    }

    /// ウィンドウ内の平均
    pub fn avg(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// 全更新値の平均
    pub fn global_avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total / self.count as f64
    }

    pub fn max(&self) -> f64 {
        self.window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// 最後に追加された値
    pub fn value(&self) -> f64 {
        self.window.back().copied().unwrap_or(0.0)
    }
}

impl fmt::Display for SmoothedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} ({:.4})", self.median(), self.global_avg())
    }
}

/// 名前付きメトリクスの集約
#[derive(Clone, Debug)]
pub struct MetricLogger {
    delimiter: String,
    window_size: usize,
    meters: Vec<(String, SmoothedValue)>,
    total_time: Option<Duration>,
}

impl Default for MetricLogger {
    fn default() -> Self {
        Self::new("  ")
    }
}

impl MetricLogger {
    pub fn new(delimiter: &str) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            window_size: DEFAULT_WINDOW_SIZE,
            meters: Vec::new(),
            total_time: None,
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// メトリクスを1件更新する。未登録の名前は新規に追加される。
    pub fn update(&mut self, name: &str, value: f64) {
        match self.meters.iter_mut().find(|(n, _)| n == name) {
            Some((_, meter)) => meter.update(value),
            None => {
                let mut meter = SmoothedValue::new(self.window_size);
                meter.update(value);
                self.meters.push((name.to_string(), meter));
            }
        }
    }

    pub fn update_all<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (name, value) in values {
            self.update(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&SmoothedValue> {
        self.meters.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.meters.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// 各メトリクスの全体平均
    pub fn global_avgs(&self) -> BTreeMap<String, f64> {
        self.meters.iter().map(|(n, m)| (n.clone(), m.global_avg())).collect()
    }

    /// エポック全体の経過時間（学習ループ終了時に設定される）
    pub fn total_time(&self) -> Option<Duration> {
        self.total_time
    }

    pub fn set_total_time(&mut self, elapsed: Duration) {
        self.total_time = Some(elapsed);
    }
}

impl fmt::Display for MetricLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, meter)) in self.meters.iter().enumerate() {
            if i > 0 {
                f.write_str(&self.delimiter)?;
            }
            write!(f, "{name}: {meter}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothed_value_window_and_global() {
        let mut v = SmoothedValue::new(3);
        for x in [1.0, 2.0, 3.0, 4.0] {
            v.update(x);
        }
        // ウィンドウは [2, 3, 4]
        assert_eq!(v.count(), 4);
        assert!((v.median() - 3.0).abs() < 1e-12);
        assert!((v.avg() - 3.0).abs() < 1e-12);
        assert!((v.global_avg() - 2.5).abs() < 1e-12);
        assert!((v.max() - 4.0).abs() < 1e-12);
        assert!((v.value() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn median_takes_lower_middle() {
        let mut v = SmoothedValue::new(4);
        for x in [4.0, 1.0, 3.0, 2.0] {
            v.update(x);
        }
        assert!((v.median() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn empty_value_is_zero() {
        let v = SmoothedValue::default();
        assert_eq!(v.median(), 0.0);
        assert_eq!(v.global_avg(), 0.0);
        assert_eq!(v.to_string(), "0.0000 (0.0000)");
    }

    #[test]
    fn logger_keeps_insertion_order() {
        let mut m = MetricLogger::new("  ");
        m.update("losses", 1.5);
        m.update_all([("top1", 50.0), ("top5", 100.0)]);
        m.update("losses", 0.5);

        assert_eq!(m.names().collect::<Vec<_>>(), vec!["losses", "top1", "top5"]);
        assert_eq!(m.get("losses").map(|v| v.count()), Some(2));
        assert_eq!(
            m.to_string(),
            "losses: 0.5000 (1.0000)  top1: 50.0000 (50.0000)  top5: 100.0000 (100.0000)"
        );
        assert!((m.global_avgs()["losses"] - 1.0).abs() < 1e-12);
        assert!(m.get("missing").is_none());
    }
}
