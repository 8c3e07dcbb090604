//! モデルメタデータの定義と永続化
//!
//! tar.gz形式のモデルバンドルに同梱し、推論時に前処理を完全に再現できるように
//! 特徴量の列順・ラベル対応・スケーラーのパラメータを記録します。

#[cfg(feature = "ml")]
use anyhow::{Context, Result};
#[cfg(feature = "ml")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "ml")]
use crate::ml::preprocessing::{FeatureSchema, LabelEncoding, StandardScaler};

/// 保存する重みの精度
#[cfg(feature = "ml")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// f32（フル精度）
    Full,
    /// f16（軽量版）
    Half,
}

#[cfg(feature = "ml")]
impl Precision {
    /// バンドルファイルの拡張子
    pub fn extension(self) -> &'static str {
        match self {
            Precision::Full => "model.tar.gz",
            Precision::Half => "lite.tar.gz",
        }
    }
}

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[cfg(feature = "ml")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 特徴量の列名（モデル入力の順序）
    pub feature_columns: Vec<String>,

    /// 目的変数の列名
    pub target_column: String,

    /// ラベルのエンコード方法（文字列ラベルは出現順のクラス名一覧）
    pub label_encoding: LabelEncoding,

    /// クラス数
    pub num_classes: usize,

    /// 出力層の幅（2クラス以下は1）
    pub output_width: usize,

    /// 中間層の幅
    pub hidden_layers: Vec<usize>,

    /// ドロップアウト率
    pub dropout: f64,

    /// 学習データでフィットしたスケーラー
    pub scaler: StandardScaler,

    /// 重みの精度
    pub precision: Precision,

    /// 学習エポック数
    pub num_epochs: usize,

    /// バッチサイズ
    pub batch_size: usize,

    /// 検証データでの最終正解率
    #[serde(default)]
    pub test_accuracy: Option<f64>,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

#[cfg(feature = "ml")]
impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        schema: &FeatureSchema,
        output_width: usize,
        hidden_layers: Vec<usize>,
        dropout: f64,
        precision: Precision,
        num_epochs: usize,
        batch_size: usize,
        test_accuracy: Option<f64>,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            feature_columns: schema.feature_columns.clone(),
            target_column: schema.target_column.clone(),
            label_encoding: schema.label_encoding.clone(),
            num_classes: schema.num_classes,
            output_width,
            hidden_layers,
            dropout,
            scaler: schema.scaler.clone(),
            precision,
            num_epochs,
            batch_size,
            test_accuracy,
            trained_at,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.feature_columns.len()
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
