pub mod ml_model;
pub mod preprocessing;
pub mod training;
pub mod inference;

pub use ml_model::{ClassifierConfig, TabularClassifier, HIDDEN_LAYERS};
pub use preprocessing::{FeatureSchema, LabelEncoding, PreparedData, StandardScaler};
pub use training::{EpochMetrics, SavedModelPaths, SessionStage, TrainingRequest, TrainingSession};
pub use inference::{InferenceEngine, Prediction};

/// CPU (NdArray) 学習用バックエンド
pub type CpuBackend = burn::backend::Autodiff<burn_ndarray::NdArray>;

/// WGPU (GPU) 学習用バックエンド
pub type GpuBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
