//! Data preprocessing
//!
//! Label encoding, skew correction and importance-based feature selection,
//! chained by [`DataPreprocessor`] into the preprocessing stage.

mod encoder;
mod pipeline;
pub mod feature_selection;
pub mod transforms;

pub use encoder::{Classes, LabelEncoder};
pub use feature_selection::ImportanceSelector;
pub use pipeline::{DataPreprocessor, PreprocessingReport, STAGE_NAME};
pub use transforms::{skewness, SkewCorrector};
