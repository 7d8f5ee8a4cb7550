use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use oad_core::MetricLogger;
use serde_json::{Map, Value, json};

/// エポック毎のサマリを JSON Lines で書き出すロガー
///
/// パスに `-` を指定すると stdout へ出力する。
pub struct StructuredLogger {
    pub to_stdout: bool,
    file: Option<Mutex<BufWriter<File>>>,
}

impl StructuredLogger {
    pub fn new(path: &str) -> std::io::Result<Self> {
        if path == "-" {
            return Ok(Self {
                to_stdout: true,
                file: None,
            });
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let f = fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            to_stdout: false,
            file: Some(Mutex::new(BufWriter::new(f))),
        })
    }

    pub fn write_json(&self, v: &Value) {
        if self.to_stdout {
            println!("{v}");
        } else if let Some(file) = &self.file {
            if let Ok(mut w) = file.lock() {
                let _ = writeln!(w, "{v}");
            }
        }
    }

    /// 内部バッファを flush する。stdout モードでは何もしない。
    pub fn flush(&self) -> std::io::Result<()> {
        match &self.file {
            Some(file) => match file.lock() {
                Ok(mut w) => w.flush(),
                Err(_) => Ok(()),
            },
            None => Ok(()),
        }
    }
}

/// 1エポック分のサマリ
pub fn epoch_summary(epoch: usize, lr: f32, meters: &MetricLogger, timestamp: &str) -> Value {
    let global_avg: Map<String, Value> = meters
        .global_avgs()
        .into_iter()
        .map(|(k, v)| (k, json!(v)))
        .collect();
    json!({
        "epoch": epoch,
        "lr": lr,
        "global_avg": global_avg,
        "total_time_sec": meters.total_time().map(|d| d.as_secs_f64()).unwrap_or(0.0),
        "ts": timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn summary_contains_global_averages() {
        let mut meters = MetricLogger::default();
        meters.update("losses", 2.0);
        meters.update("losses", 4.0);
        meters.update("top1", 50.0);
        meters.set_total_time(Duration::from_millis(1500));

        let v = epoch_summary(3, 0.5, &meters, "2024-01-01T00:00:00+09:00");
        assert_eq!(v["epoch"], 3);
        assert_eq!(v["lr"], 0.5);
        assert_eq!(v["global_avg"]["losses"], 3.0);
        assert_eq!(v["global_avg"]["top1"], 50.0);
        assert_eq!(v["total_time_sec"], 1.5);
    }

    #[test]
    fn file_logger_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/metrics.jsonl");
        let path_str = path.to_str().unwrap();
        {
            let lg = StructuredLogger::new(path_str).unwrap();
            lg.write_json(&json!({"epoch": 0}));
            lg.write_json(&json!({"epoch": 1}));
            lg.flush().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![r#"{"epoch":0}"#, r#"{"epoch":1}"#]);
    }
}
