use std::fmt;

/// Error types for fetching and analysing games
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// PGN could not be parsed or contained an illegal move
    InvalidGame(String),
    /// Network-level failure talking to the game archive
    FetchError(String),
    /// The game archive answered with a non-success status
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },
    /// UCI engine failed to start, answer or parse
    EngineError(String),
    /// File I/O operation failed
    IoError(String),
    /// Configuration error
    ConfigurationError(String),
    /// Nothing to analyse in the requested range
    NoGamesFound {
        username: String,
        start: String,
        end: String,
    },
    /// Operation failed after maximum retries
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
    /// Validation error with context
    ValidationError {
        field: String,
        value: String,
        expected: String,
    },
    /// Chained error with context
    ChainedError {
        source: Box<AnalysisError>,
        context: String,
    },
}

impl AnalysisError {
    /// Whether repeating the same request might succeed.
    ///
    /// Rate limiting (429), server errors and transport failures are
    /// transient; everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::FetchError(_) => true,
            AnalysisError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AnalysisError::ChainedError { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidGame(msg) => write!(f, "Invalid game: {}", msg),
            AnalysisError::FetchError(msg) => write!(f, "Fetch error: {}", msg),
            AnalysisError::HttpStatus { url, status, body } => {
                write!(f, "HTTP {} from {}: {}", status, url, body)
            }
            AnalysisError::EngineError(msg) => write!(f, "Engine error: {}", msg),
            AnalysisError::IoError(msg) => write!(f, "I/O error: {}", msg),
            AnalysisError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AnalysisError::NoGamesFound { username, start, end } => {
                write!(f, "No games found for '{}' between {} and {}", username, start, end)
            }
            AnalysisError::RetryExhausted { operation, attempts, last_error } => {
                write!(
                    f,
                    "Operation '{}' failed after {} attempts: {}",
                    operation, attempts, last_error
                )
            }
            AnalysisError::ValidationError { field, value, expected } => {
                write!(
                    f,
                    "Validation failed for field '{}': got '{}', expected '{}'",
                    field, value, expected
                )
            }
            AnalysisError::ChainedError { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

// Convenience type alias
pub type Result<T> = std::result::Result<T, AnalysisError>;

// Convert from common error types
impl From<std::io::Error> for AnalysisError {
    fn from(error: std::io::Error) -> Self {
        AnalysisError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(error: serde_json::Error) -> Self {
        AnalysisError::IoError(format!("JSON serialization error: {}", error))
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(error: reqwest::Error) -> Self {
        AnalysisError::FetchError(error.to_string())
    }
}

impl From<chrono::ParseError> for AnalysisError {
    fn from(error: chrono::ParseError) -> Self {
        AnalysisError::ValidationError {
            field: "date".to_string(),
            value: "unknown".to_string(),
            expected: format!("YYYY-MM-DD: {}", error),
        }
    }
}

impl From<std::num::ParseIntError> for AnalysisError {
    fn from(error: std::num::ParseIntError) -> Self {
        AnalysisError::ValidationError {
            field: "integer_parsing".to_string(),
            value: "unknown".to_string(),
            expected: format!("valid integer: {}", error),
        }
    }
}

/// Retry support for flaky network calls
pub mod resilience {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// Configuration for retry operations
    #[derive(Debug, Clone)]
    pub struct RetryConfig {
        pub max_attempts: u32,
        pub initial_delay_ms: u64,
        pub max_delay_ms: u64,
        pub backoff_multiplier: f64,
    }

    impl Default for RetryConfig {
        fn default() -> Self {
            Self {
                max_attempts: 3,
                initial_delay_ms: 500,
                max_delay_ms: 5000,
                backoff_multiplier: 2.0,
            }
        }
    }

    impl RetryConfig {
        /// Single attempt, no sleeping.
        pub fn none() -> Self {
            Self {
                max_attempts: 1,
                initial_delay_ms: 0,
                max_delay_ms: 0,
                backoff_multiplier: 1.0,
            }
        }
    }

    /// Retry an operation with exponential backoff.
    ///
    /// Non-retryable errors are returned as-is on the first failure.
    pub fn retry_with_backoff<T, F>(
        operation_name: &str,
        config: &RetryConfig,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = config.max_attempts.max(1);
        let mut delay_ms = config.initial_delay_ms;
        let mut last_error: Option<AnalysisError> = None;

        for attempt in 1..=max_attempts {
            match operation() {
                Ok(result) => return Ok(result),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        error = %error,
                        "retryable failure"
                    );
                    last_error = Some(error);

                    if attempt < max_attempts {
                        thread::sleep(Duration::from_millis(delay_ms));
                        delay_ms = ((delay_ms as f64) * config.backoff_multiplier) as u64;
                        delay_ms = delay_ms.min(config.max_delay_ms);
                    }
                }
            }
        }

        Err(AnalysisError::RetryExhausted {
            operation: operation_name.to_string(),
            attempts: max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

// Helper macros for error creation
#[macro_export]
macro_rules! invalid_game {
    ($msg:expr) => {
        $crate::errors::AnalysisError::InvalidGame($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AnalysisError::InvalidGame(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! engine_error {
    ($msg:expr) => {
        $crate::errors::AnalysisError::EngineError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AnalysisError::EngineError(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::AnalysisError::ConfigurationError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AnalysisError::ConfigurationError(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($field:expr, $value:expr, $expected:expr) => {
        $crate::errors::AnalysisError::ValidationError {
            field: $field.to_string(),
            value: $value.to_string(),
            expected: $expected.to_string(),
        }
    };
}

#[macro_export]
macro_rules! add_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| $crate::errors::AnalysisError::ChainedError {
            source: Box::new(e),
            context: $context.to_string(),
        })
    };
}

#[cfg(test)]
mod tests {
    use super::resilience::{retry_with_backoff, RetryConfig};
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_error_display() {
        let error = AnalysisError::InvalidGame("illegal move Qxh7".to_string());
        assert_eq!(error.to_string(), "Invalid game: illegal move Qxh7");

        let error = AnalysisError::NoGamesFound {
            username: "jay_fh".to_string(),
            start: "2026-01-01".to_string(),
            end: "2026-01-31".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "No games found for 'jay_fh' between 2026-01-01 and 2026-01-31"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: AnalysisError = io_error.into();

        match error {
            AnalysisError::IoError(msg) => assert!(msg.contains("file not found")),
            _ => panic!("Expected IoError"),
        }
    }

    #[test]
    fn test_error_macros() {
        let error = invalid_game!("Illegal SAN {} at ply {}", "Nf9", 3);
        match error {
            AnalysisError::InvalidGame(msg) => assert_eq!(msg, "Illegal SAN Nf9 at ply 3"),
            _ => panic!("Expected InvalidGame"),
        }

        let error = validation_error!("depth", "0", "at least 1");
        match error {
            AnalysisError::ValidationError { field, value, expected } => {
                assert_eq!(field, "depth");
                assert_eq!(value, "0");
                assert_eq!(expected, "at least 1");
            }
            _ => panic!("Expected ValidationError"),
        }
    }

    #[test]
    fn test_error_chaining() {
        let chained: Result<()> = Err(engine_error!("bestmove never arrived"));
        let enhanced = add_context!(chained, "Analysing game 3");

        match enhanced {
            Err(AnalysisError::ChainedError { source, context }) => {
                assert_eq!(context, "Analysing game 3");
                assert!(matches!(*source, AnalysisError::EngineError(_)));
            }
            _ => panic!("Expected ChainedError"),
        }
    }

    #[test]
    fn test_retryable_classification() {
        let status = |status| AnalysisError::HttpStatus {
            url: "u".to_string(),
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(AnalysisError::FetchError("reset".to_string()).is_retryable());
        assert!(!config_error!("bad").is_retryable());
    }

    #[test]
    fn test_retry_recovers_from_transient_failure() {
        let calls = Cell::new(0);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        };

        let result = retry_with_backoff("fetch", &config, || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(AnalysisError::FetchError("timeout".to_string()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_retry_stops_on_permanent_failure() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_backoff("fetch", &RetryConfig::default(), || {
            calls.set(calls.get() + 1);
            Err(AnalysisError::HttpStatus {
                url: "u".to_string(),
                status: 404,
                body: "not found".to_string(),
            })
        });

        assert!(matches!(result, Err(AnalysisError::HttpStatus { status: 404, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_retry_exhausted() {
        let result: Result<()> = retry_with_backoff("fetch", &RetryConfig::none(), || {
            Err(AnalysisError::FetchError("connection refused".to_string()))
        });

        match result {
            Err(AnalysisError::RetryExhausted { operation, attempts, last_error }) => {
                assert_eq!(operation, "fetch");
                assert_eq!(attempts, 1);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }
}
