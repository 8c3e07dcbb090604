//! 表形式ファイルの読み書き
//!
//! 正規形式はヘッダー付きのカンマ区切りCSVです。アップロード時のExcel/JSONは
//! 一度テーブルに読み込んでからCSVとして書き直します（元の型情報は保持しません）。

use crate::error::{Result, TrainerError};
use crate::types::{parse_cell, Cell, Dataset};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use indexmap::IndexSet;
use serde_json::Value;
use std::fs::{self, File};
use std::path::Path;

/// 対応するアップロード形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Excel,
    Json,
}

impl TabularFormat {
    /// 拡張子から形式を判定（大文字小文字は区別しない）
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(TabularFormat::Csv),
            "xlsx" | "xls" => Ok(TabularFormat::Excel),
            "json" => Ok(TabularFormat::Json),
            _ => Err(TrainerError::UnsupportedExtension(format!(".{}", ext))),
        }
    }
}

/// 拡張子に応じて表形式ファイルを読み込む
pub fn load_tabular(path: &Path) -> Result<Dataset> {
    match TabularFormat::from_path(path)? {
        TabularFormat::Csv => load_csv(path),
        TabularFormat::Excel => load_excel(path),
        TabularFormat::Json => load_json(path),
    }
}

pub fn load_csv(path: &Path) -> Result<Dataset> {
    let parse_err = |e: csv::Error| TrainerError::ParseError(e.to_string());

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(parse_err)?;

    let headers = reader.headers().map_err(parse_err)?.clone();
    if headers.is_empty() {
        return Err(TrainerError::ParseError(format!(
            "ヘッダー行がありません: {}",
            path.display()
        )));
    }

    let columns: Vec<String> = headers.iter().map(str::to_string).collect();
    let mut dataset = Dataset::new(columns);

    for result in reader.records() {
        let record = result.map_err(parse_err)?;
        dataset.push_row(record.iter().map(parse_cell).collect());
    }

    Ok(dataset)
}

/// 正規CSVとして書き出す
///
/// 同じディレクトリの一時ファイルに書いてからリネームするため、
/// 途中で失敗しても既存ファイルは壊れません。
pub fn save_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file());
        writer.write_record(dataset.columns())?;
        for row in dataset.rows() {
            writer.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
    }
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Excel（先頭シート、1行目がヘッダー）を読み込む
pub fn load_excel(path: &Path) -> Result<Dataset> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| TrainerError::ParseError(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TrainerError::ParseError("シートがありません".to_string()))?
        .map_err(|e| TrainerError::ParseError(e.to_string()))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| TrainerError::ParseError("ヘッダー行がありません".to_string()))?;

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match excel_cell(cell) {
            Some(name) => name,
            None => format!("Unnamed: {}", i),
        })
        .collect();

    let body = rows.map(|row| row.iter().map(excel_cell).collect()).collect();
    Ok(Dataset::from_rows(columns, body))
}

fn excel_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => parse_cell(s),
        other => Some(other.to_string()),
    }
}

/// JSONを読み込む
///
/// 対応する形:
/// - レコードの配列 `[{"a": 1, "b": 2}, ...]`
/// - 列ごとの配列 `{"a": [1, 2], "b": [3, 4]}`
/// - 列ごとのインデックス付きオブジェクト `{"a": {"0": 1, "1": 2}, ...}`
pub fn load_json(path: &Path) -> Result<Dataset> {
    let file = File::open(path)?;
    let value: Value = serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| TrainerError::ParseError(e.to_string()))?;
    dataset_from_json(value)
}

pub fn dataset_from_json(value: Value) -> Result<Dataset> {
    match value {
        Value::Array(records) => {
            let mut columns: IndexSet<String> = IndexSet::new();
            for record in &records {
                let object = record.as_object().ok_or_else(|| {
                    TrainerError::ParseError("配列の要素がオブジェクトではありません".to_string())
                })?;
                columns.extend(object.keys().cloned());
            }

            let rows = records
                .iter()
                .map(|record| {
                    columns
                        .iter()
                        .map(|c| record.get(c).and_then(json_cell))
                        .collect()
                })
                .collect();
            Ok(Dataset::from_rows(columns.into_iter().collect(), rows))
        }
        Value::Object(by_column) => {
            // 行インデックスを出現順に集める
            let mut index: IndexSet<String> = IndexSet::new();
            for values in by_column.values() {
                match values {
                    Value::Array(items) => index.extend((0..items.len()).map(|i| i.to_string())),
                    Value::Object(items) => index.extend(items.keys().cloned()),
                    _ => {
                        return Err(TrainerError::ParseError(
                            "列の値は配列かオブジェクトである必要があります".to_string(),
                        ))
                    }
                }
            }

            let columns: Vec<String> = by_column.keys().cloned().collect();
            let rows = index
                .iter()
                .enumerate()
                .map(|(position, key)| {
                    by_column
                        .values()
                        .map(|values| match values {
                            Value::Array(items) => items.get(position).and_then(json_cell),
                            Value::Object(items) => items.get(key).and_then(json_cell),
                            _ => None,
                        })
                        .collect()
                })
                .collect();
            Ok(Dataset::from_rows(columns, rows))
        }
        _ => Err(TrainerError::ParseError(
            "JSONのトップレベルは配列かオブジェクトである必要があります".to_string(),
        )),
    }
}

fn json_cell(value: &Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => parse_cell(s),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
