//! データセット（正規CSV）と画像ファイルの保存・読み込み

use crate::csv_loader::{load_csv, load_tabular, save_csv, TabularFormat};
use crate::error::{Result, TrainerError};
use crate::types::{Dataset, DatasetStatus};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// 受け付ける画像の拡張子（小文字）
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// データセットと画像ディレクトリの管理
#[derive(Debug, Clone)]
pub struct DatasetStore {
    images_dir: PathBuf,
    data_file: PathBuf,
}

impl DatasetStore {
    /// ストアを作成（画像ディレクトリが無ければ作る）
    pub fn new<P: AsRef<Path>>(data_dir: P, images_subdir: &str, dataset_file: &str) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let images_dir = data_dir.join(images_subdir);
        fs::create_dir_all(&images_dir)?;

        Ok(Self {
            images_dir,
            data_file: data_dir.join(dataset_file),
        })
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn dataset_path(&self) -> &Path {
        &self.data_file
    }

    /// 画像ファイルを元のファイル名のまま画像ディレクトリへコピー
    ///
    /// 同名ファイルは上書きされます。
    pub fn save_image<P: AsRef<Path>>(&self, source: P) -> Result<String> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(TrainerError::SourceNotFound(source.to_path_buf()));
        }
        if !has_image_extension(source) {
            let ext = source
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(TrainerError::InvalidExtension(ext));
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| TrainerError::SourceNotFound(source.to_path_buf()))?;
        let destination = self.images_dir.join(file_name);
        if destination.exists() {
            warn!("[DatasetStore] 同名の画像を上書きします: {}", destination.display());
        }
        fs::copy(source, &destination)?;

        let name = file_name.to_string_lossy().to_string();
        info!("[DatasetStore] 画像を保存しました: {}", name);
        Ok(name)
    }

    /// CSV/Excel/JSONを読み込み、正規CSVとして保存し直す
    ///
    /// 戻り値は保存した行数。拡張子が未対応の場合は既存ファイルに触れません。
    pub fn save_tabular_file<P: AsRef<Path>>(&self, source: P) -> Result<usize> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(TrainerError::SourceNotFound(source.to_path_buf()));
        }
        TabularFormat::from_path(source)?;

        let dataset = load_tabular(source)?;
        save_csv(&dataset, &self.data_file)?;

        info!(
            "[DatasetStore] データを保存しました: {} 行 × {} 列 ({})",
            dataset.row_count(),
            dataset.column_count(),
            source.display()
        );
        Ok(dataset.row_count())
    }

    /// 保存済み画像のファイル名一覧（辞書順）
    pub fn list_images(&self) -> Result<Vec<String>> {
        let mut images = Vec::new();
        for entry in fs::read_dir(&self.images_dir)? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                if let Some(name) = path.file_name() {
                    images.push(name.to_string_lossy().to_string());
                }
            }
        }
        images.sort();
        Ok(images)
    }

    /// 正規データファイルの状態
    pub fn dataset_status(&self) -> DatasetStatus {
        if !self.data_file.exists() {
            return DatasetStatus::Empty;
        }
        match load_csv(&self.data_file) {
            Ok(dataset) if dataset.column_count() == 0 => DatasetStatus::Empty,
            Ok(dataset) => DatasetStatus::Ready {
                rows: dataset.row_count(),
                columns: dataset.column_count(),
            },
            Err(e) => DatasetStatus::Unreadable(e.to_string()),
        }
    }

    /// `(行数, 列数)`。ファイルが無い・読めない場合は `(0, 0)`
    pub fn dataset_shape(&self) -> (usize, usize) {
        self.dataset_status().shape()
    }

    /// データセットを読み込む（無い・読めない場合は `None`）
    pub fn load_dataset(&self) -> Option<Dataset> {
        if !self.data_file.exists() {
            return None;
        }
        match load_csv(&self.data_file) {
            Ok(dataset) => Some(dataset),
            Err(e) => {
                warn!("[DatasetStore] データの読み込みに失敗しました: {}", e);
                None
            }
        }
    }
}
