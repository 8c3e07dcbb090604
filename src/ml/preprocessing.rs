//! 学習データの前処理
//!
//! 正規CSVのテーブルから特徴量行列とラベルを取り出し、シード固定で
//! 学習用と検証用に分割し、学習用データで標準化パラメータを求めます。

#[cfg(feature = "ml")]
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
#[cfg(feature = "ml")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "ml")]
use crate::error::{Result, TrainerError};
#[cfg(feature = "ml")]
use crate::types::Dataset;

/// 目的変数のエンコード方法
#[cfg(feature = "ml")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "classes", rename_all = "lowercase")]
pub enum LabelEncoding {
    /// 整数ラベル（値の昇順にクラス番号を割り当てる）
    Numeric(Vec<f64>),
    /// 文字列ラベル（出現順にクラス番号を割り当てる）
    Text(Vec<String>),
}

#[cfg(feature = "ml")]
impl LabelEncoding {
    /// クラス番号から元のラベルへ
    pub fn label_for(&self, index: usize) -> Option<String> {
        match self {
            LabelEncoding::Numeric(classes) => classes.get(index).map(|v| v.to_string()),
            LabelEncoding::Text(classes) => classes.get(index).cloned(),
        }
    }
}

#[cfg(feature = "ml")]
impl std::fmt::Display for LabelEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelEncoding::Numeric(classes) => {
                let labels: Vec<String> = classes.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", labels.join(", "))
            }
            LabelEncoding::Text(classes) => write!(f, "{}", classes.join(", ")),
        }
    }
}

/// 標準化（平均0・分散1）のパラメータ
///
/// 分散は母分散で計算し、分散0の列はスケール1として扱います。
#[cfg(feature = "ml")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

#[cfg(feature = "ml")]
impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], input_dim: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; input_dim];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut variances = vec![0.0; input_dim];
        for row in rows {
            for ((var, value), mean) in variances.iter_mut().zip(row).zip(&means) {
                *var += (value - mean).powi(2);
            }
        }
        let scales = variances
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std > 0.0 && std.is_finite() {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Self { means, scales }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f32> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| ((value - mean) / scale) as f32)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f32>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}

/// 推論時にも必要となる前処理の情報
#[cfg(feature = "ml")]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    pub feature_columns: Vec<String>,
    pub target_column: String,
    pub label_encoding: LabelEncoding,
    pub num_classes: usize,
    pub scaler: StandardScaler,
}

#[cfg(feature = "ml")]
impl FeatureSchema {
    pub fn input_dim(&self) -> usize {
        self.feature_columns.len()
    }

    /// 出力層の幅（3クラス以上はクラス数、それ以外は1）
    pub fn output_width(&self) -> usize {
        output_width_for(self.num_classes)
    }
}

/// クラス数に対応する出力層の幅
#[cfg(feature = "ml")]
pub fn output_width_for(num_classes: usize) -> usize {
    if num_classes > 2 {
        num_classes
    } else {
        1
    }
}

/// 分割・標準化済みの学習データ
#[cfg(feature = "ml")]
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub schema: FeatureSchema,
    pub x_train: Vec<Vec<f32>>,
    pub x_test: Vec<Vec<f32>>,
    pub y_train: Vec<usize>,
    pub y_test: Vec<usize>,
}

#[cfg(feature = "ml")]
impl PreparedData {
    pub fn input_dim(&self) -> usize {
        self.schema.input_dim()
    }

    pub fn num_classes(&self) -> usize {
        self.schema.num_classes
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.schema.feature_columns
    }

    pub fn target_column(&self) -> &str {
        &self.schema.target_column
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.schema.scaler
    }

    pub fn label_encoding(&self) -> &LabelEncoding {
        &self.schema.label_encoding
    }
}

/// テーブルから学習データを作る
#[cfg(feature = "ml")]
pub fn prepare(
    dataset: &Dataset,
    target_column: &str,
    test_fraction: f64,
    seed: u64,
) -> Result<PreparedData> {
    let target_index = dataset
        .column_index(target_column)
        .ok_or_else(|| TrainerError::TargetColumnNotFound(target_column.to_string()))?;

    // 目的変数以外の数値列を元の列順で使う
    let feature_indices: Vec<usize> = (0..dataset.column_count())
        .filter(|&i| i != target_index && dataset.column_type(i).is_numeric())
        .collect();
    if feature_indices.is_empty() {
        return Err(TrainerError::NoNumericFeatures);
    }

    let mut features = vec![Vec::with_capacity(feature_indices.len()); dataset.row_count()];
    for &column in &feature_indices {
        let values = dataset.numeric_column(column);
        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            return Err(TrainerError::MissingTrainingValues {
                column: dataset.columns()[column].clone(),
                count: missing,
            });
        }
        for (row, value) in features.iter_mut().zip(values.into_iter().flatten()) {
            row.push(value);
        }
    }

    let (labels, label_encoding, num_classes) = encode_labels(dataset, target_index)?;

    let n = dataset.row_count();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainerError::NotEnoughRows { rows: n });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test_indices, train_indices) = indices.split_at(n_test);

    let pick_rows = |idx: &[usize]| -> Vec<Vec<f64>> { idx.iter().map(|&i| features[i].clone()).collect() };
    let pick_labels = |idx: &[usize]| -> Vec<usize> { idx.iter().map(|&i| labels[i]).collect() };

    let raw_train = pick_rows(train_indices);
    let raw_test = pick_rows(test_indices);
    let scaler = StandardScaler::fit(&raw_train, feature_indices.len());

    let schema = FeatureSchema {
        feature_columns: feature_indices
            .iter()
            .map(|&i| dataset.columns()[i].clone())
            .collect(),
        target_column: target_column.to_string(),
        label_encoding,
        num_classes,
        scaler,
    };

    Ok(PreparedData {
        x_train: schema.scaler.transform(&raw_train),
        x_test: schema.scaler.transform(&raw_test),
        y_train: pick_labels(train_indices),
        y_test: pick_labels(test_indices),
        schema,
    })
}

/// 目的変数をクラス番号にする。戻り値は（ラベル、エンコード方法、クラス数）
#[cfg(feature = "ml")]
fn encode_labels(dataset: &Dataset, target_index: usize) -> Result<(Vec<usize>, LabelEncoding, usize)> {
    let target_name = &dataset.columns()[target_index];
    let missing = dataset.column_values(target_index).filter(Option::is_none).count();
    if missing > 0 {
        return Err(TrainerError::MissingTrainingValues {
            column: target_name.clone(),
            count: missing,
        });
    }

    if dataset.column_type(target_index).is_numeric() {
        let mut values = Vec::with_capacity(dataset.row_count());
        for value in dataset.numeric_column(target_index).into_iter().flatten() {
            if !value.is_finite() || value.fract() != 0.0 {
                return Err(TrainerError::InvalidLabels(format!(
                    "列 '{}' の値 {} はクラスラベルとして使えません",
                    target_name, value
                )));
            }
            // -0.0 と 0.0 を同じクラスにする
            values.push(value + 0.0);
        }

        let mut classes = values.clone();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        let labels = values
            .iter()
            .map(|v| classes.partition_point(|c| c < v))
            .collect();
        let num_classes = classes.len();
        return Ok((labels, LabelEncoding::Numeric(classes), num_classes));
    }

    let mut classes: Vec<String> = Vec::new();
    let labels = dataset
        .column_values(target_index)
        .flatten()
        .map(|value| match classes.iter().position(|c| c == value) {
            Some(index) => index,
            None => {
                classes.push(value.to_string());
                classes.len() - 1
            }
        })
        .collect();
    let num_classes = classes.len();
    Ok((labels, LabelEncoding::Text(classes), num_classes))
}
