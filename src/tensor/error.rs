use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("incompatible tensor shapes {0:?} and {1:?}")]
    ShapeError(Vec<usize>, Vec<usize>),
    #[error("unexpected tensor shape {0:?}")]
    UnexpectedShape(Vec<usize>),
    #[error("index {index} out of bounds for dimension of size {size}")]
    InvalidIndex { index: usize, size: usize },
    #[error("tensor is not a scalar")]
    NotScalar,
    #[error("expected a {expected} tensor")]
    UnexpectedType { expected: &'static str },
    #[error("missing function input #{0}")]
    MissingInput(usize),
    #[error("invalid standard deviation {0}")]
    InvalidStd(f32),
}
