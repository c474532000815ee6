//! Model identifiers understood by the chat service.

/// The model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "lambda.mercury-coder-small";

/// Models the service is known to serve.
///
/// The service accepts any identifier; this list only feeds help text and defaults.
pub const KNOWN_MODELS: &[&str] = &[DEFAULT_MODEL, "lambda.mercury-coder-mini"];

/// Returns true if `model` is one of [`KNOWN_MODELS`].
pub fn is_known_model(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
}
