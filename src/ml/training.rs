//! モデル学習セッション
//!
//! 1つのセッションが1つのモデルを所有し、
//! `Idle → Prepared → Built → Trained → Saved` の順に進みます。

#[cfg(feature = "ml")]
use std::path::{Path, PathBuf};

#[cfg(feature = "ml")]
use burn::{
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, HalfPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
#[cfg(feature = "ml")]
use flate2::Compression;
#[cfg(feature = "ml")]
use log::{info, warn};
#[cfg(feature = "ml")]
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[cfg(feature = "ml")]
use crate::error::{Result, TrainerError};
#[cfg(feature = "ml")]
use crate::ml::ml_model::{classes_from_logits, ClassifierConfig, TabularClassifier, HIDDEN_LAYERS};
#[cfg(feature = "ml")]
use crate::ml::preprocessing::{self, output_width_for, FeatureSchema, PreparedData};
#[cfg(feature = "ml")]
use crate::model::config::TrainingSettings;
#[cfg(feature = "ml")]
use crate::model::model_metadata::{ModelMetadata, Precision};
#[cfg(feature = "ml")]
use crate::model::model_storage::{save_bundles_atomically, BundleEntry};
#[cfg(feature = "ml")]
use crate::types::Dataset;

/// セッションの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Idle,
    Prepared,
    Built,
    Trained,
    Saved,
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStage::Idle => "未準備",
            SessionStage::Prepared => "データ準備済み",
            SessionStage::Built => "モデル構築済み",
            SessionStage::Trained => "学習済み",
            SessionStage::Saved => "保存済み",
        };
        write!(f, "{}", name)
    }
}

/// 1エポック分の学習結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub valid_loss: f64,
    pub valid_accuracy: f64,
}

/// 保存したモデルバンドルのパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedModelPaths {
    /// フル精度（f32）
    pub full: PathBuf,
    /// 軽量版（f16）
    pub lite: PathBuf,
}

/// ユーザー入力（文字列）から作る学習リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    pub target_column: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub model_name: String,
}

impl TrainingRequest {
    /// 入力値を検証する
    ///
    /// 空欄は `EmptyField`、整数でない値や0は `NumericConversionError`。
    pub fn parse(target: &str, epochs: &str, batch_size: &str, model_name: &str) -> Result<Self> {
        let target_column = non_empty("target_column", target)?;
        let epochs = positive_integer("epochs", epochs)?;
        let batch_size = positive_integer("batch_size", batch_size)?;
        let model_name = non_empty("model_name", model_name)?;

        Ok(Self {
            target_column,
            epochs,
            batch_size,
            model_name,
        })
    }

    /// 未入力のエポック数・バッチサイズを設定値で補ってから検証する
    #[cfg(feature = "ml")]
    pub fn parse_or_default(
        target: &str,
        epochs: Option<&str>,
        batch_size: Option<&str>,
        model_name: &str,
        settings: &TrainingSettings,
    ) -> Result<Self> {
        let epochs = epochs.map_or_else(|| settings.num_epochs.to_string(), str::to_string);
        let batch_size = batch_size.map_or_else(|| settings.batch_size.to_string(), str::to_string);
        Self::parse(target, &epochs, &batch_size, model_name)
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrainerError::EmptyField(field));
    }
    Ok(value.to_string())
}

fn positive_integer(field: &'static str, value: &str) -> Result<usize> {
    let text = non_empty(field, value)?;
    match text.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TrainerError::NumericConversionError { field, value: text }),
    }
}

/// モデルの入出力の形が準備済みデータと合っているか確認する
#[cfg(feature = "ml")]
fn check_shape(schema: &FeatureSchema, input_dim: usize, output_width: usize) -> Result<()> {
    if schema.input_dim() != input_dim {
        return Err(TrainerError::InvalidState(format!(
            "入力次元 {} が準備済みデータの特徴量数 {} と一致しません",
            input_dim,
            schema.input_dim()
        )));
    }
    if schema.output_width() != output_width {
        return Err(TrainerError::InvalidState(format!(
            "出力幅 {} が準備済みデータのクラス数 {} に合いません（必要な出力幅: {}）",
            output_width,
            schema.num_classes,
            schema.output_width()
        )));
    }
    Ok(())
}

/// 学習済みモデルの情報
#[cfg(feature = "ml")]
struct TrainedInfo {
    schema: FeatureSchema,
    epochs: usize,
    batch_size: usize,
    accuracy: f64,
}

/// 学習セッション
#[cfg(feature = "ml")]
pub struct TrainingSession<B: AutodiffBackend> {
    device: B::Device,
    settings: TrainingSettings,
    models_dir: PathBuf,
    stage: SessionStage,
    schema: Option<FeatureSchema>,
    model_config: Option<ClassifierConfig>,
    model: Option<TabularClassifier<B>>,
    trained: Option<TrainedInfo>,
    history: Vec<EpochMetrics>,
}

#[cfg(feature = "ml")]
impl<B: AutodiffBackend> TrainingSession<B> {
    pub fn new<P: AsRef<Path>>(device: B::Device, settings: TrainingSettings, models_dir: P) -> Self {
        Self {
            device,
            settings,
            models_dir: models_dir.as_ref().to_path_buf(),
            stage: SessionStage::Idle,
            schema: None,
            model_config: None,
            model: None,
            trained: None,
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    /// エポックごとの学習履歴
    pub fn history(&self) -> &[EpochMetrics] {
        &self.history
    }

    /// セッションを初期状態に戻す
    pub fn reset(&mut self) {
        self.stage = SessionStage::Idle;
        self.schema = None;
        self.model_config = None;
        self.model = None;
        self.trained = None;
        self.history.clear();
    }

    /// 学習データを準備する
    pub fn prepare_data(
        &mut self,
        dataset: &Dataset,
        target_column: &str,
        test_fraction: f64,
    ) -> Result<PreparedData> {
        if !matches!(self.stage, SessionStage::Idle | SessionStage::Prepared) {
            return Err(TrainerError::InvalidState(format!(
                "{}の状態ではデータを準備できません（reset が必要です）",
                self.stage
            )));
        }

        let prepared = preprocessing::prepare(dataset, target_column, test_fraction, self.settings.seed)?;
        info!(
            "[Training] データ準備完了: 学習 {} 行 / 検証 {} 行, 特徴量 {} ({})",
            prepared.x_train.len(),
            prepared.x_test.len(),
            prepared.input_dim(),
            prepared.feature_columns().join(", ")
        );

        self.schema = Some(prepared.schema.clone());
        self.stage = SessionStage::Prepared;
        Ok(prepared)
    }

    /// モデルを構築する
    ///
    /// `num_classes` が3以上なら多クラス分類、それ以外（未指定を含む）は2値分類。
    /// 入力次元と出力幅が準備済みデータに合わない場合は `InvalidState`。
    pub fn build_model(&mut self, input_dim: usize, num_classes: Option<usize>) -> Result<()> {
        match self.stage {
            SessionStage::Idle => {
                return Err(TrainerError::InvalidState(
                    "先にデータを準備してください".to_string(),
                ))
            }
            SessionStage::Built | SessionStage::Trained | SessionStage::Saved => {
                return Err(TrainerError::ModelAlreadyBuilt)
            }
            SessionStage::Prepared => {}
        }

        let output_width = output_width_for(num_classes.unwrap_or(2));
        if let Some(schema) = &self.schema {
            check_shape(schema, input_dim, output_width)?;
        }

        let config = ClassifierConfig::new(input_dim, output_width).with_dropout(self.settings.dropout);
        let model = config.init::<B>(&self.device);

        info!(
            "[Training] モデル構築: 入力 {}, 出力 {} ({}), パラメータ数 {}",
            input_dim,
            output_width,
            if config.is_binary() { "2値分類" } else { "多クラス分類" },
            model.num_params()
        );

        self.model_config = Some(config);
        self.model = Some(model);
        self.stage = SessionStage::Built;
        Ok(())
    }

    /// モデルを学習し、検証データでの正解率を返す
    ///
    /// 損失が数値でなくなった場合はモデルを破棄し、データ準備済みの状態に戻ります。
    pub fn train(&mut self, prepared: &PreparedData, epochs: usize, batch_size: usize) -> Result<f64> {
        match self.stage {
            SessionStage::Idle | SessionStage::Prepared => return Err(TrainerError::ModelNotBuilt),
            SessionStage::Trained | SessionStage::Saved => {
                return Err(TrainerError::InvalidState(
                    "学習済みです（再学習には reset が必要です）".to_string(),
                ))
            }
            SessionStage::Built => {}
        }
        if epochs == 0 || batch_size == 0 {
            return Err(TrainerError::InvalidState(
                "エポック数とバッチサイズは1以上にしてください".to_string(),
            ));
        }

        let (model, width) = match (self.model.take(), &self.model_config) {
            (Some(model), Some(config)) => (model, config.output_width),
            _ => return Err(TrainerError::ModelNotBuilt),
        };
        if let Some(config) = &self.model_config {
            if let Err(e) = check_shape(&prepared.schema, config.input_dim, config.output_width) {
                self.model = Some(model);
                return Err(e);
            }
        }

        info!(
            "[Training] 学習開始: エポック {}, バッチサイズ {}, 学習率 {}",
            epochs, batch_size, self.settings.learning_rate
        );

        self.history.clear();
        match self.run_epochs(model, prepared, width, epochs, batch_size) {
            Ok((model, accuracy)) => {
                info!("[Training] 学習完了: 検証正解率 {:.4}", accuracy);
                self.model = Some(model);
                self.trained = Some(TrainedInfo {
                    schema: prepared.schema.clone(),
                    epochs,
                    batch_size,
                    accuracy,
                });
                self.stage = SessionStage::Trained;
                Ok(accuracy)
            }
            Err(e) => {
                warn!("[Training] 学習に失敗しました: {}", e);
                self.model_config = None;
                self.history.clear();
                self.stage = SessionStage::Prepared;
                Err(e)
            }
        }
    }

    fn run_epochs(
        &mut self,
        mut model: TabularClassifier<B>,
        prepared: &PreparedData,
        width: usize,
        epochs: usize,
        batch_size: usize,
    ) -> Result<(TabularClassifier<B>, f64)> {
        let mut optim = AdamConfig::new().init();
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let mut order: Vec<usize> = (0..prepared.x_train.len()).collect();

        for epoch in 1..=epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut correct = 0;

            for chunk in order.chunks(batch_size) {
                let (features, targets) =
                    batch_tensors::<B>(&prepared.x_train, &prepared.y_train, chunk, &self.device);
                let (loss, logits) = model.forward_loss(features, targets);

                let loss_value = loss.clone().into_scalar().elem::<f64>();
                if !loss_value.is_finite() {
                    return Err(TrainerError::TrainingFailed(format!(
                        "エポック {} で損失が数値ではなくなりました ({})",
                        epoch, loss_value
                    )));
                }
                loss_sum += loss_value * chunk.len() as f64;
                correct += count_correct(logits, width, chunk.iter().map(|&i| prepared.y_train[i]))?;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.settings.learning_rate, model, grads);
            }

            let n = order.len().max(1) as f64;
            let (valid_loss, valid_accuracy) = evaluate(
                &model.valid(),
                &prepared.x_test,
                &prepared.y_test,
                width,
                batch_size,
                &self.device,
            )?;
            let metrics = EpochMetrics {
                epoch,
                train_loss: loss_sum / n,
                train_accuracy: correct as f64 / n,
                valid_loss,
                valid_accuracy,
            };
            info!(
                "[Training] Epoch {}/{} - loss: {:.4}, acc: {:.4}, val_loss: {:.4}, val_acc: {:.4}",
                epoch, epochs, metrics.train_loss, metrics.train_accuracy, valid_loss, valid_accuracy
            );
            self.history.push(metrics);
        }

        // 最終評価
        let (_, accuracy) = evaluate(
            &model.valid(),
            &prepared.x_test,
            &prepared.y_test,
            width,
            batch_size,
            &self.device,
        )?;
        Ok((model, accuracy))
    }

    /// モデルをフル精度版と軽量版の2つのバンドルとして保存する
    pub fn save_model(&mut self, name: &str) -> Result<SavedModelPaths> {
        match self.stage {
            SessionStage::Idle | SessionStage::Prepared => return Err(TrainerError::NoModelToSave),
            SessionStage::Built => {
                return Err(TrainerError::InvalidState(
                    "モデルがまだ学習されていません".to_string(),
                ))
            }
            SessionStage::Trained | SessionStage::Saved => {}
        }
        let name = non_empty("model_name", name)?;

        let (model, config, trained) = match (&self.model, &self.model_config, &self.trained) {
            (Some(model), Some(config), Some(trained)) => (model, config, trained),
            _ => return Err(TrainerError::NoModelToSave),
        };

        let full_binary = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(model.valid().into_record(), ())
            .map_err(|e| TrainerError::Other(anyhow::anyhow!("モデルのシリアライズに失敗しました: {:?}", e)))?;
        let lite_binary = BinBytesRecorder::<HalfPrecisionSettings>::default()
            .record(model.valid().into_record(), ())
            .map_err(|e| TrainerError::Other(anyhow::anyhow!("軽量モデルのシリアライズに失敗しました: {:?}", e)))?;

        let metadata_for = |precision| {
            ModelMetadata::new(
                &trained.schema,
                config.output_width,
                HIDDEN_LAYERS.to_vec(),
                config.dropout,
                precision,
                trained.epochs,
                trained.batch_size,
                Some(trained.accuracy),
            )
        };

        let paths = SavedModelPaths {
            full: self.bundle_path(&name, Precision::Full),
            lite: self.bundle_path(&name, Precision::Half),
        };
        save_bundles_atomically(&[
            BundleEntry {
                path: paths.full.clone(),
                metadata: metadata_for(Precision::Full),
                model_binary: full_binary,
                compression: Compression::default(),
            },
            BundleEntry {
                path: paths.lite.clone(),
                metadata: metadata_for(Precision::Half),
                model_binary: lite_binary,
                compression: Compression::best(),
            },
        ])?;

        info!(
            "[Training] モデルを保存しました: {} / {}",
            paths.full.display(),
            paths.lite.display()
        );
        self.stage = SessionStage::Saved;
        Ok(paths)
    }

    fn bundle_path(&self, name: &str, precision: Precision) -> PathBuf {
        self.models_dir.join(format!("{}.{}", name, precision.extension()))
    }

    /// モデル構成の概要（表示用テキスト）
    pub fn summary(&self) -> String {
        let (Some(model), Some(config)) = (&self.model, &self.model_config) else {
            return "モデルが構築されていません".to_string();
        };

        let mut text = String::from("=== モデル概要 ===\n");
        let mut previous = config.input_dim;
        for (i, width) in HIDDEN_LAYERS.iter().enumerate() {
            text += &format!("Dense {:>3} -> {:>3} (ReLU)\n", previous, width);
            if i < 2 {
                text += &format!("Dropout ({})\n", config.dropout);
            }
            previous = *width;
        }
        let head = if config.is_binary() { "Sigmoid" } else { "Softmax" };
        text += &format!("Dense {:>3} -> {:>3} ({})\n", previous, config.output_width, head);
        text += &format!("パラメータ数: {}\n", model.num_params());
        text += &format!("状態: {}\n", self.stage);
        text += "==================";
        text
    }
}

/// 指定行のミニバッチをテンソルにする
#[cfg(feature = "ml")]
fn batch_tensors<B: Backend>(
    features: &[Vec<f32>],
    labels: &[usize],
    indices: &[usize],
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 1, Int>) {
    let input_dim = features.first().map_or(0, Vec::len);
    let flat: Vec<f32> = indices.iter().flat_map(|&i| features[i].iter().copied()).collect();
    let targets: Vec<i64> = indices.iter().map(|&i| labels[i] as i64).collect();

    let x = Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([indices.len(), input_dim]);
    let y = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), device);
    (x, y)
}

#[cfg(feature = "ml")]
fn count_correct<B: Backend>(
    logits: Tensor<B, 2>,
    width: usize,
    labels: impl Iterator<Item = usize>,
) -> Result<usize> {
    let values = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainerError::TrainingFailed(format!("出力の取得に失敗しました: {:?}", e)))?;
    Ok(classes_from_logits(&values, width)
        .into_iter()
        .zip(labels)
        .filter(|(predicted, actual)| predicted == actual)
        .count())
}

/// 勾配を使わずに損失と正解率を求める
#[cfg(feature = "ml")]
fn evaluate<B: Backend>(
    model: &TabularClassifier<B>,
    features: &[Vec<f32>],
    labels: &[usize],
    width: usize,
    batch_size: usize,
    device: &B::Device,
) -> Result<(f64, f64)> {
    if features.is_empty() {
        return Ok((0.0, 0.0));
    }

    let indices: Vec<usize> = (0..features.len()).collect();
    let mut loss_sum = 0.0;
    let mut correct = 0;
    for chunk in indices.chunks(batch_size) {
        let (x, y) = batch_tensors::<B>(features, labels, chunk, device);
        let (loss, logits) = model.forward_loss(x, y);
        loss_sum += loss.into_scalar().elem::<f64>() * chunk.len() as f64;
        correct += count_correct(logits, width, chunk.iter().map(|&i| labels[i]))?;
    }

    let n = features.len() as f64;
    Ok((loss_sum / n, correct as f64 / n))
}

#[cfg(all(test, feature = "ml"))]
mod tests {
    use super::*;
    use crate::ml::CpuBackend;
    use crate::model::model_storage::load_metadata;
    use burn_ndarray::NdArrayDevice;
    use tempfile::TempDir;

    fn dataset(n: usize) -> Dataset {
        let rows = (0..n)
            .map(|i| {
                let x = i as f64 / n as f64;
                let kind = if x > 0.5 { "wagyu" } else { "import" };
                vec![
                    Some(format!("{:.3}", x * 10.0)),
                    Some(format!("{:.3}", (i % 7) as f64)),
                    Some(format!("{:.3}", 1.0 - x)),
                    Some(kind.to_string()),
                ]
            })
            .collect();
        Dataset::from_rows(
            vec!["marbling".into(), "age".into(), "lean".into(), "kind".into()],
            rows,
        )
    }

    fn session(dir: &TempDir) -> TrainingSession<CpuBackend> {
        let settings = TrainingSettings {
            learning_rate: 1e-2,
            ..TrainingSettings::default()
        };
        TrainingSession::new(NdArrayDevice::Cpu, settings, dir.path())
    }

    #[test]
    fn test_end_to_end_binary_pipeline() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);

        let prepared = session.prepare_data(&dataset(100), "kind", 0.2).unwrap();
        assert_eq!(prepared.x_train.len(), 80);
        assert_eq!(prepared.x_test.len(), 20);
        assert_eq!(prepared.input_dim(), 3);

        session.build_model(3, Some(2)).unwrap();
        assert_eq!(session.stage(), SessionStage::Built);
        assert!(session.summary().contains("Sigmoid"));

        let accuracy = session.train(&prepared, 5, 16).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert_eq!(session.history().len(), 5);
        assert_eq!(session.stage(), SessionStage::Trained);

        let paths = session.save_model("beef").unwrap();
        assert!(paths.full.ends_with("beef.model.tar.gz"));
        assert!(paths.lite.ends_with("beef.lite.tar.gz"));
        let metadata = load_metadata(&paths.lite).unwrap();
        assert_eq!(metadata.precision, Precision::Half);
        assert_eq!(metadata.feature_columns, vec!["marbling", "age", "lean"]);
        assert_eq!(metadata.output_width, 1);
        assert!((metadata.test_accuracy.unwrap() - accuracy).abs() < 1e-9);
        assert_eq!(session.stage(), SessionStage::Saved);
    }

    fn five_cuts(n: usize) -> Dataset {
        let rows = (0..n)
            .map(|i| {
                let cut = ["loin", "rib", "chuck", "brisket", "shank"][i % 5];
                vec![
                    Some(format!("{}", (i % 5) as f64 * 2.0 + (i % 3) as f64 * 0.1)),
                    Some(format!("{}", i % 4)),
                    Some(cut.to_string()),
                ]
            })
            .collect();
        Dataset::from_rows(vec!["fat".into(), "grade".into(), "cut".into()], rows)
    }

    #[test]
    fn test_multiclass_head() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);
        let prepared = session.prepare_data(&five_cuts(40), "cut", 0.2).unwrap();
        assert_eq!(prepared.num_classes(), 5);
        session.build_model(2, Some(5)).unwrap();
        assert!(session.summary().contains("Softmax"));
        let accuracy = session.train(&prepared, 2, 8).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_head_must_match_prepared_classes() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);
        session.prepare_data(&five_cuts(40), "cut", 0.2).unwrap();

        assert!(matches!(session.build_model(2, Some(3)), Err(TrainerError::InvalidState(_))));
        assert!(matches!(session.build_model(2, None), Err(TrainerError::InvalidState(_))));
        assert_eq!(session.stage(), SessionStage::Prepared);

        // 2値分類のモデルに5クラスのデータを渡す
        let mut session = self::session(&dir);
        let binary = session.prepare_data(&dataset(40), "kind", 0.2).unwrap();
        session.build_model(binary.input_dim(), None).unwrap();
        let mut other = preprocessing::prepare(&five_cuts(40), "cut", 0.2, 42).unwrap();
        other.schema.feature_columns.push("lean".into());
        for row in other.x_train.iter_mut().chain(other.x_test.iter_mut()) {
            row.push(0.0);
        }
        assert_eq!(other.input_dim(), binary.input_dim());
        assert!(matches!(session.train(&other, 1, 8), Err(TrainerError::InvalidState(_))));
        assert_eq!(session.stage(), SessionStage::Built);
        session.train(&binary, 1, 8).unwrap();
    }

    #[test]
    fn test_stage_errors() {
        let dir = TempDir::new().unwrap();
        let mut session = session(&dir);

        assert!(matches!(session.build_model(3, None), Err(TrainerError::InvalidState(_))));
        assert!(matches!(session.save_model("m"), Err(TrainerError::NoModelToSave)));
        assert_eq!(session.summary(), "モデルが構築されていません");

        let prepared = session.prepare_data(&dataset(20), "kind", 0.2).unwrap();
        assert!(matches!(session.train(&prepared, 1, 4), Err(TrainerError::ModelNotBuilt)));
        assert!(matches!(session.save_model("m"), Err(TrainerError::NoModelToSave)));

        // 準備済みのまま再準備はできる
        let prepared = session.prepare_data(&dataset(20), "kind", 0.2).unwrap();

        assert!(matches!(session.build_model(4, None), Err(TrainerError::InvalidState(_))));
        session.build_model(3, None).unwrap();
        assert!(matches!(session.build_model(3, None), Err(TrainerError::ModelAlreadyBuilt)));
        assert!(matches!(session.save_model("m"), Err(TrainerError::InvalidState(_))));
        assert!(matches!(
            session.prepare_data(&dataset(20), "kind", 0.2),
            Err(TrainerError::InvalidState(_))
        ));

        session.train(&prepared, 1, 4).unwrap();
        assert!(matches!(session.train(&prepared, 1, 4), Err(TrainerError::InvalidState(_))));
        assert!(matches!(session.save_model("  "), Err(TrainerError::EmptyField("model_name"))));

        session.reset();
        assert_eq!(session.stage(), SessionStage::Idle);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_training_request_falls_back_to_settings() {
        let settings = TrainingSettings {
            num_epochs: 7,
            batch_size: 12,
            ..TrainingSettings::default()
        };
        let request = TrainingRequest::parse_or_default("kind", None, None, "beef", &settings).unwrap();
        assert_eq!((request.epochs, request.batch_size), (7, 12));

        let request = TrainingRequest::parse_or_default("kind", Some("3"), None, "beef", &settings).unwrap();
        assert_eq!((request.epochs, request.batch_size), (3, 12));

        assert!(matches!(
            TrainingRequest::parse_or_default("kind", None, Some("x"), "beef", &settings),
            Err(TrainerError::NumericConversionError { field: "batch_size", .. })
        ));
    }

    #[test]
    fn test_training_request_parse() {
        let request = TrainingRequest::parse(" kind ", "10", "32", "beef").unwrap();
        assert_eq!(request.target_column, "kind");
        assert_eq!(request.epochs, 10);
        assert_eq!(request.batch_size, 32);

        assert!(matches!(
            TrainingRequest::parse("", "10", "32", "m"),
            Err(TrainerError::EmptyField("target_column"))
        ));
        assert!(matches!(
            TrainingRequest::parse("kind", "ten", "32", "m"),
            Err(TrainerError::NumericConversionError { field: "epochs", .. })
        ));
        assert!(matches!(
            TrainingRequest::parse("kind", "10", "0", "m"),
            Err(TrainerError::NumericConversionError { field: "batch_size", .. })
        ));
        assert!(matches!(
            TrainingRequest::parse("kind", "10", "32", " "),
            Err(TrainerError::EmptyField("model_name"))
        ));
    }
}
