//! エラー型の定義
//!
//! すべての操作は `Result<T, TrainerError>` を返し、メッセージはそのまま
//! 呼び出し側（GUI/CLI）に表示される想定です。

use std::path::PathBuf;

/// ライブラリ共通のエラー
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("ファイルが見つかりません: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("対応していない画像の拡張子です: {0}")]
    InvalidExtension(String),

    #[error("対応していないデータファイルの拡張子です: {0}")]
    UnsupportedExtension(String),

    #[error("データの解析に失敗しました: {0}")]
    ParseError(String),

    #[error("データが読み込まれていません")]
    NoDataLoaded,

    #[error("列が見つかりません: {0}")]
    TargetColumnNotFound(String),

    #[error("数値型の特徴量列がありません")]
    NoNumericFeatures,

    #[error("列 '{column}' に欠損値が {count} 件あります（先に欠損値を削除してください）")]
    MissingTrainingValues { column: String, count: usize },

    #[error("ラベルが不正です: {0}")]
    InvalidLabels(String),

    #[error("行数が不足しています: {rows} 行では学習用と検証用に分割できません")]
    NotEnoughRows { rows: usize },

    #[error("操作の順序が不正です: {0}")]
    InvalidState(String),

    #[error("モデルがまだ構築されていません")]
    ModelNotBuilt,

    #[error("モデルは既に構築されています（reset してから再構築してください）")]
    ModelAlreadyBuilt,

    #[error("保存するモデルがありません")]
    NoModelToSave,

    #[error("{field} は正の整数で入力してください: '{value}'")]
    NumericConversionError { field: &'static str, value: String },

    #[error("{0} を入力してください")]
    EmptyField(&'static str),

    #[error("インデックス {index} は範囲外です（件数: {len}）")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("未定義の列です: {0}")]
    SchemaMismatch(String),

    #[error("学習に失敗しました: {0}")]
    TrainingFailed(String),

    #[error("入出力エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
