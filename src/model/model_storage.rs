//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（特徴量の列順、ラベル、スケーラーなど）
//! - model.bin       - モデルの重み（バイナリ）

#[cfg(feature = "ml")]
use anyhow::{Context, Result};
#[cfg(feature = "ml")]
use flate2::read::GzDecoder;
#[cfg(feature = "ml")]
use flate2::write::GzEncoder;
#[cfg(feature = "ml")]
use flate2::Compression;
#[cfg(feature = "ml")]
use std::fs::File;
#[cfg(feature = "ml")]
use std::io::{Read, Write};
#[cfg(feature = "ml")]
use std::path::{Path, PathBuf};
#[cfg(feature = "ml")]
use log::warn;
#[cfg(feature = "ml")]
use tar::{Archive, Builder};
#[cfg(feature = "ml")]
use tempfile::{NamedTempFile, TempPath};

#[cfg(feature = "ml")]
use crate::model::model_metadata::ModelMetadata;

/// 保存するバンドル1件分
#[cfg(feature = "ml")]
pub struct BundleEntry {
    pub path: PathBuf,
    pub metadata: ModelMetadata,
    pub model_binary: Vec<u8>,
    pub compression: Compression,
}

/// tarに1ファイル追加
#[cfg(feature = "ml")]
fn append_file<W: Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, bytes)
        .with_context(|| format!("Failed to add {} to tar", name))?;
    Ok(())
}

/// メタデータとモデルバイナリをtar.gzとして書き出す
#[cfg(feature = "ml")]
fn write_bundle<W: Write>(
    writer: W,
    metadata: &ModelMetadata,
    model_binary: &[u8],
    compression: Compression,
) -> Result<W> {
    let encoder = GzEncoder::new(writer, compression);
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_file(&mut tar_builder, "metadata.json", json_str.as_bytes())?;
    append_file(&mut tar_builder, "model.bin", model_binary)?;

    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar archive")?;
    encoder.finish().context("Failed to finalize gzip stream")
}

/// メタデータと共にモデルをTar.gz形式で保存
#[cfg(feature = "ml")]
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<()> {
    save_bundles_atomically(&[BundleEntry {
        path: output_path.to_path_buf(),
        metadata: metadata.clone(),
        model_binary: model_binary.to_vec(),
        compression: Compression::default(),
    }])
}

/// 複数のバンドルをまとめて保存
///
/// すべてを保存先と同じディレクトリの一時ファイルに書き終えてからリネームします。
/// 書き込みやリネームに失敗した場合は、置き換え済みのファイルを元に戻します。
#[cfg(feature = "ml")]
pub fn save_bundles_atomically(entries: &[BundleEntry]) -> Result<()> {
    let mut staged = Vec::with_capacity(entries.len());

    for entry in entries {
        let dir = match entry.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create parent directory: {:?}", dir))?;

        let temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
        let file = write_bundle(
            temp.as_file(),
            &entry.metadata,
            &entry.model_binary,
            entry.compression,
        )?;
        file.sync_all()
            .with_context(|| format!("Failed to flush bundle: {:?}", entry.path))?;

        staged.push((temp, dir, entry.path.as_path()));
    }

    let mut replaced: Vec<(&Path, Option<TempPath>)> = Vec::with_capacity(staged.len());
    for (temp, dir, path) in staged {
        match replace_file(temp, &dir, path) {
            Ok(backup) => replaced.push((path, backup)),
            Err(e) => {
                for (path, backup) in replaced.into_iter().rev() {
                    restore(path, backup);
                }
                return Err(e);
            }
        }
    }

    // 成功時はバックアップ（TempPath）がdropで削除される
    Ok(())
}

/// 既存ファイルを退避してから一時ファイルを保存先へ移動する
#[cfg(feature = "ml")]
fn replace_file(temp: NamedTempFile, dir: &Path, path: &Path) -> Result<Option<TempPath>> {
    let backup = if path.exists() {
        let backup = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create backup file in {:?}", dir))?
            .into_temp_path();
        std::fs::rename(path, &backup)
            .with_context(|| format!("Failed to back up existing bundle: {:?}", path))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = temp.persist(path) {
        restore(path, backup);
        return Err(e).with_context(|| format!("Failed to move bundle into place: {:?}", path));
    }
    Ok(backup)
}

/// 保存前の状態に戻す（バックアップが無ければ新しいファイルを削除）
#[cfg(feature = "ml")]
fn restore(path: &Path, backup: Option<TempPath>) {
    let result = match &backup {
        Some(backup) => std::fs::rename(backup, path),
        None if path.is_file() => std::fs::remove_file(path),
        None => Ok(()),
    };
    if let Err(e) = result {
        warn!("[ModelStorage] 保存の取り消しに失敗しました: {:?}: {}", path, e);
    }
}

/// Tar.gzからモデルメタデータを読み込む
#[cfg(feature = "ml")]
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        if path.to_str() == Some("metadata.json") {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return ModelMetadata::from_json_string(&json_str);
        }
    }

    Err(anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
#[cfg(feature = "ml")]
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;

    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        match path.to_str() {
            Some("metadata.json") => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(ModelMetadata::from_json_string(&json_str)?);
            }
            Some("model.bin") => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

/// メタデータを表示用テキストにする
#[cfg(feature = "ml")]
pub fn metadata_info(metadata: &ModelMetadata) -> String {
    let mut text = String::from("=== モデルメタデータ ===\n");
    text += &format!("特徴量 ({}): {}\n", metadata.input_dim(), metadata.feature_columns.join(", "));
    text += &format!("目的変数: {}\n", metadata.target_column);
    text += &format!("ラベル: {}\n", metadata.label_encoding);
    text += &format!("クラス数: {} (出力幅 {})\n", metadata.num_classes, metadata.output_width);
    text += &format!(
        "中間層: {}\n",
        metadata
            .hidden_layers
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    text += &format!("精度: {:?}\n", metadata.precision);
    text += &format!("エポック数: {} / バッチサイズ: {}\n", metadata.num_epochs, metadata.batch_size);
    if let Some(accuracy) = metadata.test_accuracy {
        text += &format!("検証正解率: {:.4}\n", accuracy);
    }
    text += &format!("学習日時: {}\n", metadata.trained_at);
    text += "========================";
    text
}

#[cfg(all(test, feature = "ml"))]
mod tests {
    use super::*;
    use crate::ml::preprocessing::{FeatureSchema, LabelEncoding, StandardScaler};
    use crate::model::model_metadata::Precision;
    use tempfile::TempDir;

    fn metadata(precision: Precision) -> ModelMetadata {
        let schema = FeatureSchema {
            feature_columns: vec!["fat".into(), "weight".into()],
            target_column: "kind".into(),
            label_encoding: LabelEncoding::Text(vec!["beef".into(), "pork".into()]),
            num_classes: 2,
            scaler: StandardScaler {
                means: vec![1.0, 2.0],
                scales: vec![0.5, 1.0],
            },
        };
        ModelMetadata::new(&schema, 1, vec![128, 64, 32, 16], 0.2, precision, 5, 16, Some(0.9))
    }

    #[test]
    fn test_save_and_load_bundle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("m.model.tar.gz");
        save_model_with_metadata(&path, &metadata(Precision::Full), &[1, 2, 3]).unwrap();

        let (loaded, binary) = load_model_with_metadata(&path).unwrap();
        assert_eq!(binary, vec![1, 2, 3]);
        assert_eq!(loaded.feature_columns, vec!["fat", "weight"]);
        assert_eq!(loaded.scaler.means, vec![1.0, 2.0]);
        assert_eq!(load_metadata(&path).unwrap().precision, Precision::Full);
    }

    #[test]
    fn test_atomic_save_writes_all_entries() {
        let dir = TempDir::new().unwrap();
        let entries = vec![
            BundleEntry {
                path: dir.path().join("m.model.tar.gz"),
                metadata: metadata(Precision::Full),
                model_binary: vec![0; 64],
                compression: Compression::default(),
            },
            BundleEntry {
                path: dir.path().join("m.lite.tar.gz"),
                metadata: metadata(Precision::Half),
                model_binary: vec![0; 32],
                compression: Compression::best(),
            },
        ];
        save_bundles_atomically(&entries).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2, "一時ファイルが残っていないこと: {:?}", names);
        assert_eq!(load_metadata(&entries[1].path).unwrap().precision, Precision::Half);
    }

    #[test]
    fn test_failed_save_restores_previous_bundle() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("m.model.tar.gz");
        std::fs::write(&full, b"previous").unwrap();
        // ディレクトリがあるため2つ目のバンドルは置き換えられない
        let lite = dir.path().join("m.lite.tar.gz");
        std::fs::create_dir(&lite).unwrap();
        std::fs::write(lite.join("keep"), b"x").unwrap();

        let entries = vec![
            BundleEntry {
                path: full.clone(),
                metadata: metadata(Precision::Full),
                model_binary: vec![0; 64],
                compression: Compression::default(),
            },
            BundleEntry {
                path: lite.clone(),
                metadata: metadata(Precision::Half),
                model_binary: vec![0; 32],
                compression: Compression::best(),
            },
        ];
        assert!(save_bundles_atomically(&entries).is_err());

        assert_eq!(std::fs::read(&full).unwrap(), b"previous");
        assert!(lite.is_dir());
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2, "一時ファイルが残っていないこと: {:?}", names);
    }

    #[test]
    fn test_missing_entry_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.tar.gz");
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        append_file(&mut builder, "model.bin", &[1]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = load_model_with_metadata(&path).unwrap_err();
        assert!(err.to_string().contains("metadata.json"));
    }
}
