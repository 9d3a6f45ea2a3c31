//! Result type alias for agentwire operations.

use super::agentwire_error::AgentwireError;

/// Type alias for Results using AgentwireError.
///
/// # Example
///
/// ```ignore
/// use agentwire::error::AgentwireResult;
///
/// fn load() -> AgentwireResult<AppConfig> {
///     Ok(AppConfig::load(None)?)
/// }
/// ```
pub type AgentwireResult<T> = Result<T, AgentwireError>;
