//! モデル推論機能

#[cfg(feature = "ml")]
use std::path::Path;

#[cfg(feature = "ml")]
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder},
    tensor::Tensor,
};
#[cfg(feature = "ml")]
use burn_ndarray::{NdArray, NdArrayDevice};
#[cfg(feature = "ml")]
use log::info;

#[cfg(feature = "ml")]
use crate::error::{Result, TrainerError};
#[cfg(feature = "ml")]
use crate::ml::ml_model::{ClassifierConfig, TabularClassifier, HIDDEN_LAYERS};
#[cfg(feature = "ml")]
use crate::model::model_metadata::Precision;
#[cfg(feature = "ml")]
use crate::model::{load_model_with_metadata, InferenceConfig};
#[cfg(feature = "ml")]
use crate::product_store::Record;

/// 推論結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// 元のラベル
    pub label: String,
    /// クラス番号
    pub class_index: usize,
    /// 予測クラスの確率
    pub confidence: f32,
}

/// 推論エンジン（CPUバックエンド）
#[cfg(feature = "ml")]
pub struct InferenceEngine {
    model: TabularClassifier<NdArray>,
    config: InferenceConfig,
    device: NdArrayDevice,
}

#[cfg(feature = "ml")]
impl InferenceEngine {
    /// モデルバンドル（フル精度・軽量版どちらでも可）を読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        if metadata.hidden_layers != HIDDEN_LAYERS {
            return Err(TrainerError::SchemaMismatch(format!(
                "中間層の構成が一致しません: {:?}",
                metadata.hidden_layers
            )));
        }
        let config = InferenceConfig::from_metadata(&metadata);
        let device = NdArrayDevice::Cpu;

        let model = ClassifierConfig::new(metadata.input_dim(), metadata.output_width)
            .with_dropout(metadata.dropout)
            .init::<NdArray>(&device);

        // 保存時と同じ精度設定で重みを復元
        let record = match metadata.precision {
            Precision::Full => BinBytesRecorder::<FullPrecisionSettings>::default().load(model_binary, &device),
            Precision::Half => BinBytesRecorder::<HalfPrecisionSettings>::default().load(model_binary, &device),
        }
        .map_err(|e| TrainerError::Other(anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e)))?;
        let model = model.load_record(record);

        info!(
            "[Inference] モデルを読み込みました: {} ({:?})",
            model_path.as_ref().display(),
            metadata.precision
        );

        Ok(Self { model, config, device })
    }

    /// 生の特徴量（学習時の列順）から分類
    pub fn predict(&self, values: &[f64]) -> Result<Prediction> {
        let mut predictions = self.predict_batch(&[values.to_vec()])?;
        predictions
            .pop()
            .ok_or_else(|| TrainerError::TrainingFailed("推論結果が空です".to_string()))
    }

    /// 列名付きのレコードから分類
    pub fn predict_record(&self, record: &Record) -> Result<Prediction> {
        let values = self.config.features_from_record(record)?;
        self.predict(&values)
    }

    /// 複数行をまとめて分類
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<Prediction>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut flat = Vec::with_capacity(rows.len() * self.config.input_dim());
        for row in rows {
            flat.extend(self.config.scale_features(row)?);
        }
        let features = Tensor::<NdArray, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([rows.len(), self.config.input_dim()]);

        let probabilities = self
            .model
            .probabilities(features)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TrainerError::Other(anyhow::anyhow!("推論結果の取得エラー: {:?}", e)))?;

        let width = self.config.output_width;
        probabilities
            .chunks(width)
            .map(|row| {
                let (class_index, confidence) = if width == 1 {
                    if row[0] > 0.5 {
                        (1, row[0])
                    } else {
                        (0, 1.0 - row[0])
                    }
                } else {
                    row.iter()
                        .copied()
                        .enumerate()
                        .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
                };
                let label = self.config.class_index_to_label(class_index).ok_or_else(|| {
                    TrainerError::SchemaMismatch(format!("クラスインデックス {} は範囲外です", class_index))
                })?;
                Ok(Prediction {
                    label,
                    class_index,
                    confidence,
                })
            })
            .collect()
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}
