//! データ品質チェックとクリーニング
//!
//! 読み込んだデータセットに対して欠損値・重複行を調べ、削除した結果で
//! 正規CSVを上書きします。

use crate::csv_loader::{load_csv, save_csv};
use crate::error::{Result, TrainerError};
use crate::types::{ColumnType, Dataset};
use indexmap::IndexMap;
use log::info;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct DataValidator {
    data_file: PathBuf,
    dataset: Option<Dataset>,
}

impl DataValidator {
    pub fn new<P: AsRef<Path>>(data_file: P) -> Self {
        Self {
            data_file: data_file.as_ref().to_path_buf(),
            dataset: None,
        }
    }

    /// 正規CSVを読み込む。戻り値は行数
    pub fn load_data(&mut self) -> Result<usize> {
        if !self.data_file.exists() {
            return Err(TrainerError::SourceNotFound(self.data_file.clone()));
        }
        let dataset = load_csv(&self.data_file)?;
        let rows = dataset.row_count();
        self.dataset = Some(dataset);
        Ok(rows)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// 欠損値を含む列とその件数（件数 > 0 の列のみ、列順）
    pub fn missing_value_counts(&self) -> IndexMap<String, usize> {
        let Some(dataset) = &self.dataset else {
            return IndexMap::new();
        };
        dataset
            .columns()
            .iter()
            .zip(dataset.missing_counts())
            .filter(|(_, count)| *count > 0)
            .map(|(name, count)| (name.clone(), count))
            .collect()
    }

    /// 先行する行と全列一致する行の数
    pub fn duplicate_row_count(&self) -> usize {
        self.dataset
            .as_ref()
            .map(|dataset| duplicate_flags(dataset).into_iter().filter(|d| *d).count())
            .unwrap_or(0)
    }

    pub fn column_types(&self) -> IndexMap<String, ColumnType> {
        self.dataset
            .as_ref()
            .map(Dataset::column_types)
            .unwrap_or_default()
    }

    /// データの概要（表示用テキスト）
    pub fn summary_report(&self) -> String {
        let Some(dataset) = &self.dataset else {
            return "データがありません".to_string();
        };

        let mut summary = String::from("📊 データ概要:\n");
        summary += &format!("├─ 行数: {}\n", dataset.row_count());
        summary += &format!("├─ 列数: {}\n", dataset.column_count());
        summary += &format!("├─ 列: {}\n", dataset.columns().join(", "));

        let missing = self.missing_value_counts();
        if !missing.is_empty() {
            summary += "├─ ⚠️ 欠損値:\n";
            for (column, count) in &missing {
                summary += &format!("│  ├─ {}: {}\n", column, count);
            }
        }

        let duplicates = self.duplicate_row_count();
        if duplicates > 0 {
            summary += &format!("├─ ⚠️ 重複行: {}\n", duplicates);
        }

        summary += "└─ ✅ データ準備完了";
        summary
    }

    /// いずれかの列に欠損値がある行を削除して保存。戻り値は削除行数
    pub fn remove_missing_values(&mut self) -> Result<usize> {
        let mut cleaned = self.dataset.clone().ok_or(TrainerError::NoDataLoaded)?;

        let before = cleaned.row_count();
        cleaned.retain_rows(|_, row| row.iter().all(Option::is_some));
        let removed = before - cleaned.row_count();

        self.commit(cleaned)?;
        info!("[DataValidator] 欠損値を含む行を {} 行削除しました", removed);
        Ok(removed)
    }

    /// 重複行を削除（最初の出現を残す）して保存。戻り値は削除行数
    pub fn remove_duplicate_rows(&mut self) -> Result<usize> {
        let mut cleaned = self.dataset.clone().ok_or(TrainerError::NoDataLoaded)?;

        let flags = duplicate_flags(&cleaned);
        let before = cleaned.row_count();
        cleaned.retain_rows(|index, _| !flags[index]);
        let removed = before - cleaned.row_count();

        self.commit(cleaned)?;
        info!("[DataValidator] 重複行を {} 行削除しました", removed);
        Ok(removed)
    }

    /// ファイルへ書き込めた場合のみメモリ上のデータを差し替える
    fn commit(&mut self, dataset: Dataset) -> Result<()> {
        save_csv(&dataset, &self.data_file)?;
        self.dataset = Some(dataset);
        Ok(())
    }
}

/// 各行が先行する行の重複かどうか
fn duplicate_flags(dataset: &Dataset) -> Vec<bool> {
    let mut seen = HashSet::new();
    dataset
        .row_keys()
        .into_iter()
        .map(|key| !seen.insert(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = "kind,weight,price\n\
                          beef,1.5,100\n\
                          pork,,80\n\
                          beef,1.5,100\n\
                          chicken,0.8,\n\
                          beef,1.50,100\n";

    fn loaded(dir: &TempDir, content: &str) -> DataValidator {
        let path = dir.path().join("uploaded_data.csv");
        fs::write(&path, content).unwrap();
        let mut validator = DataValidator::new(&path);
        validator.load_data().unwrap();
        validator
    }

    #[test]
    fn test_checks_on_sample() {
        let dir = TempDir::new().unwrap();
        let validator = loaded(&dir, SAMPLE);

        let missing = validator.missing_value_counts();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing["weight"], 1);
        assert_eq!(missing["price"], 1);
        assert!(!missing.contains_key("kind"));

        // "1.50" は数値列なので "1.5" と同じ値
        assert_eq!(validator.duplicate_row_count(), 2);

        let types = validator.column_types();
        assert_eq!(types["kind"], ColumnType::Text);
        assert_eq!(types["weight"], ColumnType::Float);
        assert_eq!(types["price"], ColumnType::Integer);
    }

    #[test]
    fn test_summary_report_lists_problems() {
        let dir = TempDir::new().unwrap();
        let validator = loaded(&dir, SAMPLE);
        let report = validator.summary_report();
        assert!(report.contains("行数: 5"));
        assert!(report.contains("列: kind, weight, price"));
        assert!(report.contains("weight: 1"));
        assert!(report.contains("重複行: 2"));

        let clean = loaded(&TempDir::new().unwrap(), "a,b\n1,2\n");
        let report = clean.summary_report();
        assert!(!report.contains("欠損値"));
        assert!(!report.contains("重複行"));
    }

    #[test]
    fn test_remove_missing_values() {
        let dir = TempDir::new().unwrap();
        let mut validator = loaded(&dir, SAMPLE);

        assert_eq!(validator.remove_missing_values().unwrap(), 2);
        assert!(validator.missing_value_counts().is_empty());

        // ファイルも上書きされている
        let mut reloaded = DataValidator::new(dir.path().join("uploaded_data.csv"));
        assert_eq!(reloaded.load_data().unwrap(), 3);
        assert!(reloaded.missing_value_counts().is_empty());
    }

    #[test]
    fn test_remove_duplicates_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut validator = loaded(&dir, SAMPLE);

        assert_eq!(validator.remove_duplicate_rows().unwrap(), 2);
        assert_eq!(validator.remove_duplicate_rows().unwrap(), 0);

        let dataset = validator.dataset().unwrap();
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.cell(0, 0), Some("beef"));
        assert_eq!(dataset.cell(1, 0), Some("pork"));
    }

    #[test]
    fn test_failed_write_keeps_loaded_data() {
        let dir = TempDir::new().unwrap();
        let mut validator = loaded(&dir, SAMPLE);

        // 正規CSVの場所をディレクトリにして書き込みを失敗させる
        let path = dir.path().join("uploaded_data.csv");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        assert!(validator.remove_missing_values().is_err());
        assert!(validator.remove_duplicate_rows().is_err());
        assert_eq!(validator.dataset().unwrap().row_count(), 5);
        assert_eq!(validator.duplicate_row_count(), 2);
        assert_eq!(validator.missing_value_counts().len(), 2);
    }

    #[test]
    fn test_missing_rows_count_as_duplicates_of_each_other() {
        let dir = TempDir::new().unwrap();
        let validator = loaded(&dir, "a,b\n1,\n1,\n");
        assert_eq!(validator.duplicate_row_count(), 1);
    }

    #[test]
    fn test_mutations_require_loaded_data() {
        let dir = TempDir::new().unwrap();
        let mut validator = DataValidator::new(dir.path().join("none.csv"));

        assert!(matches!(validator.load_data(), Err(TrainerError::SourceNotFound(_))));
        assert!(matches!(validator.remove_missing_values(), Err(TrainerError::NoDataLoaded)));
        assert!(matches!(validator.remove_duplicate_rows(), Err(TrainerError::NoDataLoaded)));
        assert_eq!(validator.summary_report(), "データがありません");
        assert_eq!(validator.duplicate_row_count(), 0);
    }
}
