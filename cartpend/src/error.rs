use thiserror::Error;

/// Fatal analysis errors. None of these are recoverable: each one is a
/// programming or parameterization mistake and propagates to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("unbound symbol `{0}` in evaluation")]
    UnboundSymbol(String),

    #[error("binding for `{0}` is outside the declared symbol set")]
    UnknownBinding(String),

    #[error("transfer function denominator is identically zero")]
    SingularDenominator,

    #[error("unsupported input transform: {0}")]
    UnsupportedInputTransform(String),
}

pub type Result<T> = std::result::Result<T, Error>;
