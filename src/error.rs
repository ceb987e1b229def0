use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Malformed tensor shape {shape:?} at output {scale}")]
    MalformedTensorShape { scale: usize, shape: Vec<usize> },

    #[error("No anchors/stride configured for output {scale}")]
    MissingScaleSpec { scale: usize },

    #[error("Inference engine produced no outputs")]
    NoOutputs,
}
