//! 学習ログの出力先

/// 学習ループが人間向けの進捗行を書き出す先
pub trait TrainLogger {
    fn info(&mut self, message: &str);
}

/// `log` facade へ info レベルで流す既定の実装
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFacade;

impl TrainLogger for LogFacade {
    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }
}

/// 行をそのまま溜める（テストや GUI への転送用）
impl TrainLogger for Vec<String> {
    fn info(&mut self, message: &str) {
        self.push(message.to_string());
    }
}
