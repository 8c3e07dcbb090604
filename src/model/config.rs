//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、保存先、学習設定などをJSON形式で保存・読み込みします。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 保存先の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// データディレクトリ
    pub data_dir: String,
    /// 画像を保存するサブディレクトリ名
    pub images_subdir: String,
    /// 正規CSVのファイル名
    pub dataset_file: String,
    /// 学習済みモデルの保存先
    pub models_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            images_subdir: "images".to_string(),
            dataset_file: "uploaded_data.csv".to_string(),
            models_dir: "models".to_string(),
        }
    }
}

impl StorageSettings {
    pub fn dataset_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.dataset_file)
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード（分割とミニバッチのシャッフルに使用）
    pub seed: u64,
    /// 検証用データの割合
    pub test_fraction: f64,
    /// ドロップアウト率
    pub dropout: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 42,
            test_fraction: 0.2,
            dropout: 0.2,
        }
    }
}

/// 商品レコード追加時の列の扱い
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SchemaPolicy {
    /// 未知の列を追加する（既存行は欠損で埋める）
    #[default]
    AllowDrift,
    /// 未知の列を含むレコードを拒否する
    Strict,
}

/// 商品レコードの設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSettings {
    #[serde(default)]
    pub schema_policy: SchemaPolicy,
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// 保存先
    #[serde(default)]
    pub storage: StorageSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// 商品レコード設定
    #[serde(default)]
    pub records: RecordSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 設定を読み込む、存在しない・読めない場合はデフォルト設定を返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報を表示用テキストにする
    pub fn display(&self) -> String {
        let mut text = String::from("=== アプリケーション設定 ===\n");
        text += &format!("計算デバイス: {}\n", self.device_type);
        text += &format!("データディレクトリ: {}\n", self.storage.data_dir);
        text += &format!("データファイル: {}\n", self.storage.dataset_path().display());
        text += &format!("モデル保存先: {}\n", self.storage.models_dir);
        text += "\n--- トレーニング設定 ---\n";
        text += &format!("エポック数: {}\n", self.training.num_epochs);
        text += &format!("バッチサイズ: {}\n", self.training.batch_size);
        text += &format!("学習率: {}\n", self.training.learning_rate);
        text += &format!("シード: {}\n", self.training.seed);
        text += &format!("検証データの割合: {}\n", self.training.test_fraction);
        text += &format!("ドロップアウト率: {}\n", self.training.dropout);
        text += "\n--- 商品レコード ---\n";
        text += &format!("列の扱い: {:?}\n", self.records.schema_policy);
        text += "========================";
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.training.num_epochs, 50);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.records.schema_policy, SchemaPolicy::AllowDrift);
        assert_eq!(config.storage.dataset_path(), Path::new("data").join("uploaded_data.csv"));
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.records.schema_policy = SchemaPolicy::Strict;
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.device_type, deserialized.device_type);
        assert_eq!(deserialized.records.schema_policy, SchemaPolicy::Strict);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"device_type": "Wgpu"}"#).unwrap();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.training.test_fraction, 0.2);
    }

    #[test]
    fn test_load_or_default_with_broken_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ broken").unwrap();
        let config = AppConfig::load_or_default(&path);
        assert_eq!(config.training.num_epochs, 50);

        config.save(&path).unwrap();
        assert!(AppConfig::load(&path).is_ok());
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
