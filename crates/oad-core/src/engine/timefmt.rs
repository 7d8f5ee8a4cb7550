//! 経過時間・残り時間の表示形式
//!
//! `H:MM:SS`、1日以上は `N day(s), H:MM:SS`。小数秒はマイクロ秒6桁（0 の場合は省略）。

use std::time::Duration;

const SECS_PER_DAY: u64 = 86_400;

/// 整数秒を `H:MM:SS` 形式にする
pub fn format_hms(total_secs: u64) -> String {
    let days = total_secs / SECS_PER_DAY;
    let rem = total_secs % SECS_PER_DAY;
    let hms = format!("{}:{:02}:{:02}", rem / 3600, (rem % 3600) / 60, rem % 60);
    match days {
        0 => hms,
        1 => format!("1 day, {hms}"),
        n => format!("{n} days, {hms}"),
    }
}

/// 小数秒を含む経過時間
pub fn format_duration(d: Duration) -> String {
    let micros = d.subsec_micros();
    if micros == 0 {
        format_hms(d.as_secs())
    } else {
        format!("{}.{micros:06}", format_hms(d.as_secs()))
    }
}
