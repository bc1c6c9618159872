// ABOUTME: Error types for the scour sanitizer: configuration, input, and transformer failures.
// ABOUTME: All errors propagate synchronously; a clean call either completes or fails outright.

/// The main error type for sanitize operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The policy carries an unsupported output format or encoding label.
    /// Raised before any parsing or tree mutation begins.
    #[error("unsupported configuration: {0}")]
    Config(String),

    /// The argument to a node-level entry point is not a live tree node.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A transformer returned a result that violates the pipeline contract.
    #[error("transformer contract violation: {0}")]
    TransformerContract(String),

    /// A transformer failed on its own terms.
    #[error("transformer error")]
    Transform {
        #[from]
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Returns true if this is a Config error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Returns true if this is an InvalidInput error.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// Returns true if this is a TransformerContract error.
    pub fn is_transformer_contract(&self) -> bool {
        matches!(self, Error::TransformerContract(_))
    }

    /// Returns true if this error originated inside a transformer.
    pub fn is_transform(&self) -> bool {
        matches!(self, Error::Transform { .. })
    }
}
