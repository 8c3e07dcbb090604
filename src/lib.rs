pub mod error;
pub mod types;
pub mod csv_loader;
pub mod dataset_store;
pub mod validator;
pub mod product_store;

// 設定とモデルの保存形式
pub mod model;
// 学習・推論機能のモジュール
#[cfg(feature = "ml")]
pub mod ml;

use std::path::{Path, PathBuf};

use log::info;

use dataset_store::DatasetStore;
use error::{Result, TrainerError};
use model::config::AppConfig;
use product_store::RecordStore;
use types::{Dataset, DatasetStatus, PendingSelection};
use validator::DataValidator;

#[cfg(feature = "ml")]
use burn::tensor::backend::AutodiffBackend;
#[cfg(feature = "ml")]
use ml::{EpochMetrics, SavedModelPaths, TrainingRequest, TrainingSession};

/// 学習を最後まで実行した結果
#[cfg(feature = "ml")]
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub accuracy: f64,
    pub paths: SavedModelPaths,
    pub history: Vec<EpochMetrics>,
}

/// 画面側から呼ばれる操作をまとめたもの
///
/// 画像・データファイルの選択状態、正規CSV、品質チェックを保持します。
pub struct Workbench {
    config: AppConfig,
    store: DatasetStore,
    validator: DataValidator,
    image_selection: PendingSelection,
    data_selection: PendingSelection,
}

impl Workbench {
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = DatasetStore::new(
            &config.storage.data_dir,
            &config.storage.images_subdir,
            &config.storage.dataset_file,
        )?;
        let validator = DataValidator::new(store.dataset_path());

        Ok(Self {
            config,
            store,
            validator,
            image_selection: PendingSelection::default(),
            data_selection: PendingSelection::default(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn models_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.storage.models_dir)
    }

    // --- ファイル選択 ---

    pub fn select_image<P: AsRef<Path>>(&mut self, path: P) {
        self.image_selection.select(path);
    }

    pub fn image_selection(&self) -> &PendingSelection {
        &self.image_selection
    }

    /// 選択中の画像を保存する。成功した場合のみ選択を解除
    pub fn save_selected_image(&mut self) -> Result<String> {
        let path = self
            .image_selection
            .path()
            .ok_or_else(|| TrainerError::InvalidState("画像が選択されていません".to_string()))?;
        let name = self.store.save_image(path)?;
        self.image_selection.take();
        Ok(name)
    }

    pub fn select_data_file<P: AsRef<Path>>(&mut self, path: P) {
        self.data_selection.select(path);
    }

    pub fn data_selection(&self) -> &PendingSelection {
        &self.data_selection
    }

    /// 選択中のデータファイルを正規CSVとして保存する。成功した場合のみ選択を解除
    pub fn save_selected_data_file(&mut self) -> Result<usize> {
        let path = self
            .data_selection
            .path()
            .ok_or_else(|| TrainerError::InvalidState("データファイルが選択されていません".to_string()))?;
        let rows = self.store.save_tabular_file(path)?;
        self.data_selection.take();
        Ok(rows)
    }

    // --- データセット ---

    pub fn list_images(&self) -> Result<Vec<String>> {
        self.store.list_images()
    }

    pub fn dataset_status(&self) -> DatasetStatus {
        self.store.dataset_status()
    }

    pub fn dataset_shape(&self) -> (usize, usize) {
        self.store.dataset_shape()
    }

    pub fn load_dataset(&self) -> Option<Dataset> {
        self.store.load_dataset()
    }

    // --- 品質チェック ---

    /// 正規CSVを読み直す（ファイルが無ければ未読み込みの状態にする）
    fn refresh_validator(&mut self) -> Result<()> {
        self.validator = DataValidator::new(self.store.dataset_path());
        if self.store.dataset_path().exists() {
            self.validator.load_data()?;
        }
        Ok(())
    }

    pub fn validator(&mut self) -> Result<&DataValidator> {
        self.refresh_validator()?;
        Ok(&self.validator)
    }

    pub fn summary_report(&mut self) -> Result<String> {
        self.refresh_validator()?;
        Ok(self.validator.summary_report())
    }

    pub fn remove_missing_values(&mut self) -> Result<usize> {
        self.refresh_validator()?;
        self.validator.remove_missing_values()
    }

    pub fn remove_duplicate_rows(&mut self) -> Result<usize> {
        self.refresh_validator()?;
        self.validator.remove_duplicate_rows()
    }

    // --- 商品レコード ---

    pub fn record_store(&self) -> Result<RecordStore> {
        RecordStore::open(self.store.dataset_path(), self.config.records.schema_policy)
    }

    // --- 学習 ---

    /// このワークベンチの設定で学習セッションを作る
    #[cfg(feature = "ml")]
    pub fn new_session<B: AutodiffBackend>(&self, device: B::Device) -> TrainingSession<B> {
        TrainingSession::new(device, self.config.training.clone(), self.models_dir())
    }

    /// データ準備 → モデル構築 → 学習 → 保存 を順に実行する
    #[cfg(feature = "ml")]
    pub fn run_training<B: AutodiffBackend>(
        &self,
        session: &mut TrainingSession<B>,
        request: &TrainingRequest,
    ) -> Result<TrainingOutcome> {
        let dataset = self.load_dataset().ok_or(TrainerError::NoDataLoaded)?;

        let prepared = session.prepare_data(&dataset, &request.target_column, self.config.training.test_fraction)?;
        session.build_model(prepared.input_dim(), Some(prepared.num_classes()))?;
        let accuracy = session.train(&prepared, request.epochs, request.batch_size)?;
        let paths = session.save_model(&request.model_name)?;

        info!("[Workbench] 学習完了: 正解率 {:.4}", accuracy);
        Ok(TrainingOutcome {
            accuracy,
            paths,
            history: session.history().to_vec(),
        })
    }
}
