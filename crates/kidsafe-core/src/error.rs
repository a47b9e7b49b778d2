use thiserror::Error;

/// Failure classes the pipeline distinguishes between.
///
/// Functions return `anyhow::Result` and attach one of these so callers (the
/// retry policy in particular) can classify a failure with `downcast_ref`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// True when any error in the chain is [`Error::Transient`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<Error>().is_some_and(Error::is_transient))
}

/// True when any error in the chain is [`Error::InvalidConfig`].
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| matches!(cause.downcast_ref::<Error>(), Some(Error::InvalidConfig(_))))
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn transient_is_found_through_context() {
        let err: anyhow::Result<()> = Err(Error::Transient("timeout".into())).context("calling reranker");
        let err = err.unwrap_err();
        assert!(is_transient(&err));
        assert!(!is_config_error(&err));
    }

    #[test]
    fn plain_anyhow_is_not_transient() {
        let err = anyhow::anyhow!("boom");
        assert!(!is_transient(&err));
    }
}
