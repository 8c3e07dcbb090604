//! データセット管理と分類モデル学習のコマンドラインツール

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;

use meat_trainer_lib::model::config::{AppConfig, DeviceType};
use meat_trainer_lib::product_store::Record;
use meat_trainer_lib::Workbench;

use burn::tensor::backend::AutodiffBackend;
use meat_trainer_lib::ml::{CpuBackend, GpuBackend, InferenceEngine, TrainingRequest};

#[derive(Parser, Debug)]
#[command(name = "meat_trainer", version, about = "Dataset curation and classifier training")]
struct Cli {
    /// 設定ファイル
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 現在の設定を表示する
    Config {
        /// デフォルト設定をファイルに書き出す
        #[arg(long)]
        write: bool,
    },
    /// 画像を画像ディレクトリへ保存する
    ImportImage { path: PathBuf },
    /// CSV/Excel/JSONを正規CSVとして保存する
    ImportData { path: PathBuf },
    /// 保存済み画像とデータセットの状態を表示する
    Info,
    /// データ品質のレポートを表示する
    Check,
    /// 欠損値を含む行を削除する
    CleanMissing,
    /// 重複行を削除する
    CleanDuplicates,
    /// モデルを学習して保存する
    Train {
        #[arg(long)]
        target: String,
        /// 省略時は設定ファイルの training.num_epochs
        #[arg(long)]
        epochs: Option<String>,
        /// 省略時は設定ファイルの training.batch_size
        #[arg(long)]
        batch_size: Option<String>,
        #[arg(long, default_value = "model")]
        name: String,
    },
    /// 保存したモデルで分類する
    Predict {
        /// モデルバンドル（.model.tar.gz / .lite.tar.gz）
        #[arg(long)]
        model: PathBuf,
        /// 特徴量（列=値）
        #[arg(value_parser = parse_field)]
        values: Vec<(String, String)>,
    },
    /// 商品レコードの操作
    #[command(subcommand)]
    Product(ProductCommand),
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
    /// レコードを追加する（列=値 ...）
    Add {
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// バーコードで検索する
    Find { barcode: String },
    /// すべてのレコードを表示する
    List,
    /// 指定位置のレコードを更新する
    Update {
        index: usize,
        #[arg(value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// 指定位置のレコードを削除する
    Delete { index: usize },
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("'列=値' の形式で指定してください: {}", raw))
}

fn format_record(record: &Record) -> String {
    record
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.as_deref().unwrap_or("")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load_or_default(&cli.config);

    if let Commands::Config { write } = &cli.command {
        println!("{}", config.display());
        if *write {
            config
                .save(&cli.config)
                .with_context(|| format!("設定を保存できませんでした: {}", cli.config.display()))?;
            println!("設定を保存しました: {}", cli.config.display());
        }
        return Ok(());
    }

    let mut bench = Workbench::new(config)?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::ImportImage { path } => {
            bench.select_image(&path);
            let name = bench.save_selected_image()?;
            println!("✅ 画像を保存しました: {}", name);
        }
        Commands::ImportData { path } => {
            bench.select_data_file(&path);
            let rows = bench.save_selected_data_file()?;
            println!("✅ データを保存しました: {} 行", rows);
        }
        Commands::Info => {
            let images = bench.list_images()?;
            println!("画像: {} 件", images.len());
            for name in &images {
                println!("  {}", name);
            }
            println!("データセット: {}", bench.dataset_status());
        }
        Commands::Check => {
            println!("{}", bench.summary_report()?);
            for (column, ty) in bench.validator()?.column_types() {
                println!("  {}: {}", column, ty);
            }
        }
        Commands::CleanMissing => {
            let removed = bench.remove_missing_values()?;
            println!("✅ 欠損値を含む {} 行を削除しました", removed);
        }
        Commands::CleanDuplicates => {
            let removed = bench.remove_duplicate_rows()?;
            println!("✅ 重複行を {} 行削除しました", removed);
        }
        Commands::Train {
            target,
            epochs,
            batch_size,
            name,
        } => {
            let request = TrainingRequest::parse_or_default(
                &target,
                epochs.as_deref(),
                batch_size.as_deref(),
                &name,
                &bench.config().training,
            )?;
            match bench.config().device_type {
                DeviceType::Cpu => train_with::<CpuBackend>(&bench, Default::default(), &request)?,
                DeviceType::Wgpu => train_with::<GpuBackend>(&bench, burn_wgpu::WgpuDevice::default(), &request)?,
            }
        }
        Commands::Predict { model, values } => {
            let engine = InferenceEngine::load(&model)?;
            let record: Record = values.into_iter().map(|(k, v)| (k, Some(v))).collect();
            let prediction = engine.predict_record(&record)?;
            println!(
                "{} = {} (確率 {:.3})",
                engine.config().target_column,
                prediction.label,
                prediction.confidence
            );
        }
        Commands::Product(command) => {
            let mut store = bench.record_store()?;
            match command {
                ProductCommand::Add { fields } => {
                    store.add_record(fields)?;
                    println!("✅ レコードを追加しました（{} 件）", store.len());
                }
                ProductCommand::Find { barcode } => match store.find_by_barcode(&barcode) {
                    Some(record) => println!("{}", format_record(&record)),
                    None => println!("見つかりませんでした: {}", barcode),
                },
                ProductCommand::List => {
                    for (index, record) in store.list_all().iter().enumerate() {
                        println!("[{}] {}", index, format_record(record));
                    }
                }
                ProductCommand::Update { index, fields } => {
                    store.update_record(index, fields)?;
                    println!("✅ レコード {} を更新しました", index);
                }
                ProductCommand::Delete { index } => {
                    store.delete_record(index)?;
                    println!("✅ レコード {} を削除しました", index);
                }
            }
        }
    }

    Ok(())
}

fn train_with<B: AutodiffBackend>(bench: &Workbench, device: B::Device, request: &TrainingRequest) -> Result<()> {
    let mut session = bench.new_session::<B>(device);
    let outcome = bench.run_training(&mut session, request)?;

    println!("{}", session.summary());
    println!("✅ 学習完了: 正解率 {:.4}", outcome.accuracy);
    println!("  フル精度: {}", outcome.paths.full.display());
    println!("  軽量版:   {}", outcome.paths.lite.display());
    Ok(())
}
