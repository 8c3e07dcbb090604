use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// セル値（`None` は欠損値）
pub type Cell = Option<String>;

/// 欠損値として扱う文字列
pub const MISSING_MARKERS: [&str; 13] = [
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "<NA>",
];

/// 文字列からセル値を作る（欠損マーカーは `None`）
pub fn parse_cell(raw: &str) -> Cell {
    if MISSING_MARKERS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// 列の推論型
///
/// ファイルには型情報を保存しないため、読み込むたびに内容から推論します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    /// 全セルが欠損
    Empty,
}

impl ColumnType {
    /// 演算可能な型か（学習の特徴量に使える）
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "int64"),
            ColumnType::Float => write!(f, "float64"),
            ColumnType::Boolean => write!(f, "bool"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Empty => write!(f, "empty"),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// 重複判定用のセルキー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Missing,
    Number(u64),
    Text(String),
}

/// 列名付きの矩形テーブル
///
/// 行は挿入順で、位置以外の識別子は持ちません。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// 行データからテーブルを作成（列数に合わせて欠損で埋める／切り詰める）
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut dataset = Self::new(columns);
        for row in rows {
            dataset.push_row(row);
        }
        dataset
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    /// 列のセル値を上から順に返す
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(column).and_then(|c| c.as_deref()))
    }

    /// 列の型を内容から推論
    pub fn column_type(&self, column: usize) -> ColumnType {
        let mut present = self.column_values(column).flatten().peekable();
        if present.peek().is_none() {
            return ColumnType::Empty;
        }

        let (mut integer, mut float, mut boolean) = (true, true, true);
        for value in present {
            integer &= value.parse::<i64>().is_ok();
            float &= value.parse::<f64>().is_ok();
            boolean &= parse_bool(value).is_some();
            if !integer && !float && !boolean {
                return ColumnType::Text;
            }
        }

        if integer {
            ColumnType::Integer
        } else if float {
            ColumnType::Float
        } else if boolean {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    /// 全列の型（列順）
    pub fn column_types(&self) -> IndexMap<String, ColumnType> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), self.column_type(i)))
            .collect()
    }

    /// 数値列を f64 として取り出す（欠損や非数値は `None`）
    pub fn numeric_column(&self, column: usize) -> Vec<Option<f64>> {
        self.column_values(column)
            .map(|v| v.and_then(|s| s.parse::<f64>().ok()))
            .collect()
    }

    /// 列ごとの欠損数（欠損のない列も含む）
    pub fn missing_counts(&self) -> Vec<usize> {
        (0..self.column_count())
            .map(|i| self.column_values(i).filter(Option::is_none).count())
            .collect()
    }

    /// 重複判定用に行をキー化する
    ///
    /// 数値列では `1` と `1.0` を同一視し、欠損同士も等しいとみなします。
    pub fn row_keys(&self) -> Vec<Vec<CellKey>> {
        let types: Vec<ColumnType> = (0..self.column_count()).map(|i| self.column_type(i)).collect();
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&types)
                    .map(|(cell, ty)| match (cell.as_deref(), ty) {
                        (None, _) => CellKey::Missing,
                        (Some(v), t) if t.is_numeric() => match v.parse::<f64>() {
                            // -0.0 と 0.0 を同一視
                            Ok(n) => CellKey::Number((n + 0.0).to_bits()),
                            Err(_) => CellKey::Text(v.to_string()),
                        },
                        (Some(v), ColumnType::Boolean) => CellKey::Text(v.to_lowercase()),
                        (Some(v), _) => CellKey::Text(v.to_string()),
                    })
                    .collect()
            })
            .collect()
    }

    /// 行を追加（列数に合わせて欠損で埋める／切り詰める）
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    /// 列を追加し、既存行は欠損で埋める
    pub fn add_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: Cell) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    pub fn remove_row(&mut self, row: usize) -> Vec<Cell> {
        self.rows.remove(row)
    }

    /// 位置と行を受け取る述語で行を絞り込む
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize, &[Cell]) -> bool,
    {
        let mut index = 0;
        self.rows.retain(|row| {
            let kept = keep(index, row);
            index += 1;
            kept
        });
    }
}

/// 正規データファイルの状態
///
/// 「空」と「読めない」を区別します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetStatus {
    Empty,
    Ready { rows: usize, columns: usize },
    Unreadable(String),
}

impl DatasetStatus {
    /// `(行数, 列数)`。空・読込不可は `(0, 0)`
    pub fn shape(&self) -> (usize, usize) {
        match self {
            DatasetStatus::Ready { rows, columns } => (*rows, *columns),
            _ => (0, 0),
        }
    }
}

impl std::fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetStatus::Empty => write!(f, "データなし"),
            DatasetStatus::Ready { rows, columns } => write!(f, "{} 行 × {} 列", rows, columns),
            DatasetStatus::Unreadable(reason) => write!(f, "読み込み不可: {}", reason),
        }
    }
}

/// 保存待ちのファイル選択
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PendingSelection {
    #[default]
    NoSelection,
    Selected(PathBuf),
}

impl PendingSelection {
    pub fn select<P: AsRef<Path>>(&mut self, path: P) {
        *self = PendingSelection::Selected(path.as_ref().to_path_buf());
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            PendingSelection::Selected(path) => Some(path),
            PendingSelection::NoSelection => None,
        }
    }

    pub fn is_selected(&self) -> bool {
        matches!(self, PendingSelection::Selected(_))
    }

    /// 選択を取り出して未選択に戻す
    pub fn take(&mut self) -> Option<PathBuf> {
        match std::mem::take(self) {
            PendingSelection::Selected(path) => Some(path),
            PendingSelection::NoSelection => None,
        }
    }
}
