//! 保存したモデルバンドルの内容を表示するツール

use std::path::PathBuf;

use clap::Parser;

use meat_trainer_lib::ml::InferenceEngine;
use meat_trainer_lib::model::{load_model_with_metadata, metadata_info};

#[derive(Parser, Debug)]
#[command(name = "inspect_model", about = "Show metadata stored in a model bundle")]
struct Args {
    /// モデルバンドル（.model.tar.gz / .lite.tar.gz）
    model: PathBuf,

    /// 重みを読み込んで推論エンジンを初期化できるか確認する
    #[arg(long)]
    verify: bool,
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();

    match load_model_with_metadata(&args.model) {
        Ok((metadata, binary)) => {
            println!("✓ モデルメタデータ読み込み成功:");
            println!("{}", metadata_info(&metadata));
            println!("重みサイズ: {} bytes", binary.len());
        }
        Err(e) => {
            eprintln!("✗ エラー: {:#}", e);
            std::process::exit(1);
        }
    }

    if args.verify {
        match InferenceEngine::load(&args.model) {
            Ok(engine) => {
                println!("✓ 推論エンジン初期化成功");
                println!("{}", engine.config().info());
            }
            Err(e) => {
                eprintln!("✗ エラー: {}", e);
                std::process::exit(1);
            }
        }
    }
}
