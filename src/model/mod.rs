pub mod config;
#[cfg(feature = "ml")]
pub mod inference_config;
#[cfg(feature = "ml")]
pub mod model_metadata;
#[cfg(feature = "ml")]
pub mod model_storage;

pub use config::{AppConfig, DeviceType, RecordSettings, SchemaPolicy, StorageSettings, TrainingSettings};
#[cfg(feature = "ml")]
pub use inference_config::InferenceConfig;
#[cfg(feature = "ml")]
pub use model_metadata::{ModelMetadata, Precision};
#[cfg(feature = "ml")]
pub use model_storage::{load_metadata, load_model_with_metadata, metadata_info, save_model_with_metadata};
