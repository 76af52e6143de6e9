use thiserror::Error;

#[derive(Error, Debug)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

#[cfg(feature = "onnx")]
impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        InferenceError(err.to_string())
    }
}

/// Failures inside the detection pipeline. `analyze` turns every one of
/// these into an empty result.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("image decode failed: {0}")]
    Decoding(#[source] image::ImageError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("image encode failed: {0}")]
    Encoding(#[source] image::ImageError),

    #[error("no detection model loaded")]
    NoDetector,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty upload")]
    Empty,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("scale must be positive and finite, got {0}")]
    BadScale(f64),
}
