//! 商品レコードの管理
//!
//! 正規CSVの各行を商品レコードとして扱います。`barcode` 列で検索できますが、
//! 一意性は保証しません。

use crate::csv_loader::{load_csv, save_csv};
use crate::error::{Result, TrainerError};
use crate::model::config::SchemaPolicy;
use crate::types::{Cell, Dataset};
use indexmap::IndexMap;
use log::info;
use std::path::{Path, PathBuf};

/// バーコード列の名前
pub const BARCODE_COLUMN: &str = "barcode";

/// 列名 → 値（欠損は `None`）
pub type Record = IndexMap<String, Cell>;

pub struct RecordStore {
    data_file: PathBuf,
    table: Dataset,
    schema_policy: SchemaPolicy,
}

impl RecordStore {
    /// ファイルが存在すれば読み込み、無ければ空のストアを作る
    pub fn open<P: AsRef<Path>>(data_file: P, schema_policy: SchemaPolicy) -> Result<Self> {
        let data_file = data_file.as_ref().to_path_buf();
        let table = if data_file.exists() {
            load_csv(&data_file)?
        } else {
            Dataset::default()
        };

        Ok(Self {
            data_file,
            table,
            schema_policy,
        })
    }

    pub fn len(&self) -> usize {
        self.table.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// レコードを末尾に追加
    ///
    /// `AllowDrift` では未知の列を追加し、既存行は欠損で埋めます。
    pub fn add_record<I, K, V>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = collect_fields(fields);
        self.check_schema(&fields)?;

        let mut table = self.table.clone();
        let row_index = table.row_count();
        table.push_row(Vec::new());
        for (column, value) in fields {
            let column_index = table.add_column(&column);
            table.set_cell(row_index, column_index, value);
        }

        self.commit(table)?;
        info!("[RecordStore] レコードを追加しました（{} 件）", self.len());
        Ok(())
    }

    /// `barcode` 列が一致する最初のレコード
    pub fn find_by_barcode(&self, code: &str) -> Option<Record> {
        let column = self.table.column_index(BARCODE_COLUMN)?;
        let row = self
            .table
            .column_values(column)
            .position(|value| value == Some(code))?;
        Some(self.record_at(row))
    }

    pub fn list_all(&self) -> Vec<Record> {
        (0..self.len()).map(|row| self.record_at(row)).collect()
    }

    /// 指定位置のレコードを部分更新
    pub fn update_record<I, K, V>(&mut self, index: usize, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.check_index(index)?;
        let fields = collect_fields(fields);
        self.check_schema(&fields)?;

        let mut table = self.table.clone();
        for (column, value) in fields {
            let column_index = table.add_column(&column);
            table.set_cell(index, column_index, value);
        }

        self.commit(table)?;
        info!("[RecordStore] レコード {} を更新しました", index);
        Ok(())
    }

    /// 指定位置のレコードを削除（後続のインデックスは詰める）
    pub fn delete_record(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;

        let mut table = self.table.clone();
        table.remove_row(index);

        self.commit(table)?;
        info!("[RecordStore] レコード {} を削除しました", index);
        Ok(())
    }

    fn record_at(&self, row: usize) -> Record {
        self.table
            .columns()
            .iter()
            .enumerate()
            .map(|(column, name)| (name.clone(), self.table.cell(row, column).map(str::to_string)))
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(TrainerError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn check_schema(&self, fields: &[(String, Cell)]) -> Result<()> {
        // 列がまだ無いストアはどの列でも受け付ける
        if self.schema_policy == SchemaPolicy::AllowDrift || self.table.column_count() == 0 {
            return Ok(());
        }
        match fields.iter().find(|(c, _)| self.table.column_index(c).is_none()) {
            Some((column, _)) => Err(TrainerError::SchemaMismatch(column.clone())),
            None => Ok(()),
        }
    }

    /// ファイルへ書き込めた場合のみメモリ上のテーブルを差し替える
    fn commit(&mut self, table: Dataset) -> Result<()> {
        save_csv(&table, &self.data_file)?;
        self.table = table;
        Ok(())
    }
}

fn collect_fields<I, K, V>(fields: I) -> Vec<(String, Cell)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    fields
        .into_iter()
        .map(|(k, v)| {
            let value: String = v.into();
            (k.into(), crate::types::parse_cell(&value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn open(dir: &TempDir, policy: SchemaPolicy) -> RecordStore {
        RecordStore::open(dir.path().join("uploaded_data.csv"), policy).unwrap()
    }

    #[test]
    fn test_add_find_list() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, SchemaPolicy::AllowDrift);
        assert!(store.is_empty());

        store.add_record([("barcode", "111"), ("name", "Sirloin")]).unwrap();
        store.add_record([("barcode", "222"), ("name", "Ribeye")]).unwrap();
        store.add_record([("barcode", "111"), ("name", "Duplicate")]).unwrap();

        let found = store.find_by_barcode("111").unwrap();
        assert_eq!(found["name"], Some("Sirloin".to_string()));
        assert!(store.find_by_barcode("999").is_none());
        assert_eq!(store.list_all().len(), 3);

        // 再読み込みしても同じ内容
        let reopened = open(&dir, SchemaPolicy::AllowDrift);
        assert_eq!(reopened.list_all(), store.list_all());
    }

    #[test]
    fn test_find_without_barcode_column_is_absent() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, SchemaPolicy::AllowDrift);
        store.add_record([("name", "Brisket")]).unwrap();
        assert!(store.find_by_barcode("Brisket").is_none());
    }

    #[test]
    fn test_schema_drift_fills_missing() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, SchemaPolicy::AllowDrift);
        store.add_record([("barcode", "1")]).unwrap();
        store.add_record([("barcode", "2"), ("grade", "A5")]).unwrap();

        let records = store.list_all();
        assert_eq!(records[0]["grade"], None);
        assert_eq!(records[1]["grade"], Some("A5".to_string()));
    }

    #[test]
    fn test_strict_schema_rejects_unknown_column() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("uploaded_data.csv"), "barcode,name\n1,Tongue\n").unwrap();
        let mut store = open(&dir, SchemaPolicy::Strict);

        let err = store.add_record([("barcode", "2"), ("grade", "A5")]).unwrap_err();
        assert!(matches!(err, TrainerError::SchemaMismatch(c) if c == "grade"));
        assert_eq!(store.len(), 1);

        store.add_record([("barcode", "2")]).unwrap();
        assert_eq!(store.list_all()[1]["name"], None);
    }

    #[test]
    fn test_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, SchemaPolicy::AllowDrift);
        for code in ["a", "b", "c"] {
            store.add_record([("barcode", code), ("stock", "1")]).unwrap();
        }

        store.update_record(1, [("stock", "5")]).unwrap();
        assert_eq!(store.list_all()[1]["stock"], Some("5".to_string()));

        store.delete_record(0).unwrap();
        let records = store.list_all();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["barcode"], Some("b".to_string()));
        assert_eq!(records[1]["barcode"], Some("c".to_string()));

        let err = store.delete_record(2).unwrap_err();
        assert!(matches!(err, TrainerError::IndexOutOfRange { index: 2, len: 2 }));
        let err = store.update_record(5, [("stock", "0")]).unwrap_err();
        assert!(matches!(err, TrainerError::IndexOutOfRange { .. }));
    }
}
