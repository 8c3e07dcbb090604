//! モデルメタデータを使用した推論設定
//!
//! 保存されたモデルメタデータから、学習時と同じ前処理を再現するための情報を取り出します。

#[cfg(feature = "ml")]
use anyhow::Context;
#[cfg(feature = "ml")]
use std::path::Path;

#[cfg(feature = "ml")]
use crate::error::{Result, TrainerError};
#[cfg(feature = "ml")]
use crate::ml::preprocessing::{LabelEncoding, StandardScaler};
#[cfg(feature = "ml")]
use crate::model::model_metadata::ModelMetadata;
#[cfg(feature = "ml")]
use crate::model::model_storage;
#[cfg(feature = "ml")]
use crate::product_store::Record;

/// モデルメタデータから推論用情報を取得
#[cfg(feature = "ml")]
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// 特徴量の列名（モデル入力の順序）
    pub feature_columns: Vec<String>,

    /// 目的変数の列名
    pub target_column: String,

    /// クラス番号とラベルの対応
    pub label_encoding: LabelEncoding,

    /// クラス数
    pub num_classes: usize,

    /// 出力層の幅
    pub output_width: usize,

    /// 学習時のスケーラー
    pub scaler: StandardScaler,
}

#[cfg(feature = "ml")]
impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            feature_columns: metadata.feature_columns.clone(),
            target_column: metadata.target_column.clone(),
            label_encoding: metadata.label_encoding.clone(),
            num_classes: metadata.num_classes,
            output_width: metadata.output_width,
            scaler: metadata.scaler.clone(),
        }
    }

    /// モデルファイルから推論設定を読み込む
    pub fn load_from_model(model_path: &Path) -> Result<Self> {
        let metadata = model_storage::load_metadata(model_path).context("Failed to load model metadata")?;
        Ok(Self::from_metadata(&metadata))
    }

    pub fn input_dim(&self) -> usize {
        self.feature_columns.len()
    }

    /// クラスインデックスから元のラベルを取得
    pub fn class_index_to_label(&self, index: usize) -> Option<String> {
        self.label_encoding.label_for(index)
    }

    /// 生の特徴量を学習時と同じ方法で標準化
    pub fn scale_features(&self, values: &[f64]) -> Result<Vec<f32>> {
        if values.len() != self.input_dim() {
            return Err(TrainerError::SchemaMismatch(format!(
                "特徴量の数が一致しません（期待: {}, 実際: {}）",
                self.input_dim(),
                values.len()
            )));
        }
        Ok(self.scaler.transform_row(values))
    }

    /// レコードから特徴量の列を順に取り出す（余分な列は無視）
    pub fn features_from_record(&self, record: &Record) -> Result<Vec<f64>> {
        self.feature_columns
            .iter()
            .map(|column| {
                let cell = record
                    .get(column)
                    .ok_or_else(|| TrainerError::SchemaMismatch(column.clone()))?;
                let text = cell.as_deref().unwrap_or_default();
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| TrainerError::NumericConversionError {
                        field: "feature",
                        value: format!("{}={}", column, text),
                    })
            })
            .collect()
    }

    /// 設定情報を表示用テキストにする
    pub fn info(&self) -> String {
        let mut text = String::from("=== 推論設定 ===\n");
        text += &format!("特徴量: {}\n", self.feature_columns.join(", "));
        text += &format!("目的変数: {}\n", self.target_column);
        text += &format!("ラベル: {}\n", self.label_encoding);
        text += &format!("総クラス数: {}\n", self.num_classes);
        text += "==================";
        text
    }
}

#[cfg(all(test, feature = "ml"))]
mod tests {
    use super::*;

    fn config() -> InferenceConfig {
        InferenceConfig {
            feature_columns: vec!["fat".into(), "weight".into()],
            target_column: "kind".into(),
            label_encoding: LabelEncoding::Text(vec!["beef".into(), "pork".into(), "lamb".into()]),
            num_classes: 3,
            output_width: 3,
            scaler: StandardScaler {
                means: vec![10.0, 2.0],
                scales: vec![5.0, 1.0],
            },
        }
    }

    #[test]
    fn test_scale_features() {
        let config = config();
        assert_eq!(config.scale_features(&[15.0, 1.0]).unwrap(), vec![1.0, -1.0]);
        assert!(matches!(config.scale_features(&[1.0]), Err(TrainerError::SchemaMismatch(_))));
    }

    #[test]
    fn test_features_from_record_uses_training_column_order() {
        let config = config();
        let mut record = Record::new();
        record.insert("weight".into(), Some("3".into()));
        record.insert("name".into(), Some("Loin".into()));
        record.insert("fat".into(), Some("12.5".into()));
        assert_eq!(config.features_from_record(&record).unwrap(), vec![12.5, 3.0]);

        record.insert("fat".into(), None);
        assert!(matches!(
            config.features_from_record(&record),
            Err(TrainerError::NumericConversionError { .. })
        ));

        record.shift_remove("fat");
        assert!(matches!(
            config.features_from_record(&record),
            Err(TrainerError::SchemaMismatch(c)) if c == "fat"
        ));
    }

    #[test]
    fn test_class_index_to_label() {
        let config = config();
        assert_eq!(config.class_index_to_label(2).as_deref(), Some("lamb"));
        assert_eq!(config.class_index_to_label(3), None);
    }
}
