use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use oad_core::config::TrainConfig;
use oad_core::criterion::SoftLabelCriterion;
use oad_core::data::SyntheticActionDataset;
use oad_core::model::{LinearOadModel, Model};
use oad_core::optim::{Optimizer, build_optimizer};
use oad_core::scheduler::ScheduledLr;
use oad_core::{LogFacade, train_one_epoch};
use oad_tools::structured::{StructuredLogger, epoch_summary};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train an online action detection model on synthetic data")]
struct Cli {
    /// 設定ファイル（.toml / .yaml / .yml）。未指定時は既定値
    #[arg(long)]
    config: Option<PathBuf>,

    /// エポック数（設定ファイルより優先）
    #[arg(long)]
    epochs: Option<usize>,

    /// ログ出力間隔（設定ファイルより優先）
    #[arg(long)]
    print_freq: Option<usize>,

    /// 勾配クリッピングの最大ノルム。0 で無効（設定ファイルより優先）
    #[arg(long)]
    max_norm: Option<f32>,

    /// 基準学習率（設定ファイルより優先）
    #[arg(long)]
    lr: Option<f32>,

    /// エポック毎のサマリを JSON Lines で出力する先（`-` で stdout）
    #[arg(long)]
    metrics_jsonl: Option<String>,
}

fn load_config(cli: &Cli) -> Result<TrainConfig> {
    let mut cfg = match &cli.config {
        Some(path) => TrainConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TrainConfig::default(),
    };
    if let Some(v) = cli.epochs {
        cfg.training.epochs = v;
    }
    if let Some(v) = cli.print_freq {
        cfg.training.print_freq = v;
    }
    if let Some(v) = cli.max_norm {
        cfg.training.max_norm = v;
    }
    if let Some(v) = cli.lr {
        cfg.training.lr = v;
    }
    cfg.validate().context("invalid configuration after applying command line overrides")?;
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let structured = cli
        .metrics_jsonl
        .as_deref()
        .map(StructuredLogger::new)
        .transpose()
        .context("failed to open metrics output")?;

    let mut dataset = SyntheticActionDataset::generate(&cfg.model, &cfg.data);
    let mut model = LinearOadModel::new(&cfg.model);
    let criterion = SoftLabelCriterion::new(&cfg.loss);
    let mut optimizer = build_optimizer(&cfg.training);
    let mut scheduler =
        ScheduledLr::new(cfg.training.lr, cfg.training.lr_schedule.clone(), optimizer.as_mut());
    let mut shuffle_rng = Xoshiro256PlusPlus::seed_from_u64(cfg.data.seed.wrapping_add(1));
    let mut logger = LogFacade;

    log::info!(
        "samples={} batch_size={} epochs={} params={} optimizer={:?}",
        dataset.len(),
        cfg.training.batch_size,
        cfg.training.epochs,
        model.param_count(),
        cfg.training.optimizer
    );

    for epoch in 0..cfg.training.epochs {
        if cfg.data.shuffle {
            dataset.shuffle(&mut shuffle_rng);
        }
        let meters = match train_one_epoch(
            &cfg,
            &mut model,
            &criterion,
            dataset.batches(cfg.training.batch_size),
            &mut optimizer,
            epoch,
            &mut logger,
            &mut scheduler,
        ) {
            Ok(meters) => meters,
            Err(e) if e.is_divergence() => {
                log::error!("{e}");
                if let Some(lg) = &structured {
                    let _ = lg.flush();
                }
                std::process::exit(1);
            }
            Err(e) => return Err(e).with_context(|| format!("training failed at epoch {epoch}")),
        };

        log::info!("Averaged stats: {meters}");
        if let Some(lg) = &structured {
            let ts = chrono::Local::now().to_rfc3339();
            lg.write_json(&epoch_summary(epoch, optimizer.lr(), &meters, &ts));
        }
    }

    if let Some(lg) = &structured {
        lg.flush().context("failed to flush metrics output")?;
    }
    Ok(())
}
