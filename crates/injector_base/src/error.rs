use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

/* 📖 # Why a custom error type and not use anyhow/eyre/thiserror etc?

- Better control over error handling
- No dependencies to compile and integrate
- More transparency into error handling logic

Domain failures that callers are expected to branch on (page load failures,
malformed feed messages) get their own small enums in injector_client. This type
covers the infrastructure underneath them: files, transport and decoding.
 */

/// Error variants that can occur in injector operations.
/// Each variant represents a specific error category with its associated context.
#[derive(Debug)]
pub enum ErrorKind {
    /// File system operation failed
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The request never produced a response (connect, TLS, timeout, body read)
    Transport { url: String, message: String },

    /// A payload could not be decoded into the expected shape
    Decode {
        what: String,
        source: serde_json::Error,
    },

    /// Catch-all for other errors with a message
    Message { message: String },
}

/* 📖 # Why separate ErrorKind and Error?
This two-layer design provides a clear separation of concerns:
- ErrorKind: structural variants with specific contexts (file paths, urls, etc.)
- Error: wraps ErrorKind with additional runtime context strings

Users can pattern match on ErrorKind for specific handling, while context is
attached during propagation without nesting wrapper errors.
*/

/// Error type wrapping ErrorKind with optional context.
#[derive(Debug)]
pub struct InjectorError {
    kind: ErrorKind,
    context: Vec<String>,
}

impl InjectorError {
    /// Creates a new error from an ErrorKind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: vec![],
        }
    }

    /// Creates a message error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    /// Creates a transport error for the given url.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport {
            url: url.into(),
            message: message.into(),
        })
    }

    /// Attaches context to an error.
    /// Context is displayed before the error message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attaches context using lazy evaluation.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.context.push(f());
        self
    }

    /// Returns a reference to the underlying ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the attached context, outermost first.
    pub fn get_context(&self) -> &[String] {
        &self.context
    }

    /// Returns true if the error happened before any response was received.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport { .. })
    }

    /// Returns the innermost error in the chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

impl From<ErrorKind> for InjectorError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl StdError for InjectorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::FileError { source, .. } => Some(source),
            ErrorKind::Decode { source, .. } => Some(source),
            ErrorKind::Transport { .. } | ErrorKind::Message { .. } => None,
        }
    }
}

impl fmt::Display for InjectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ctx) in self.context.iter().enumerate() {
            if i == 0 {
                write!(f, "{}", ctx)?;
            } else {
                write!(f, ": {}", ctx)?;
            }
        }

        if !self.context.is_empty() {
            write!(f, ": ")?;
        }

        match &self.kind {
            ErrorKind::FileError { path, source } => {
                write!(f, "File error at {}: {}", path.display(), source)
            }
            ErrorKind::Transport { url, message } => {
                write!(f, "Request to {} failed: {}", url, message)
            }
            ErrorKind::Decode { what, source } => {
                write!(f, "Failed to decode {}: {}", what, source)
            }
            ErrorKind::Message { message } => {
                write!(f, "{}", message)
            }
        }
    }
}

/* 📖 # Why use Box<InjectorError> in the result type?

Boxing the error reduces the size of the result type, making it more efficient to return in the common case.
*/

/// Standard result type for injector operations.
pub type InjectorResult<T> = std::result::Result<T, Box<InjectorError>>;

/// Extension trait for attaching context to Results.
pub trait ResultExt<T> {
    /// Attaches context to an error, consuming and re-wrapping it.
    fn context(self, context: impl Into<String>) -> InjectorResult<T>;

    /// Attaches context using lazy evaluation.
    /// Context is only evaluated if the result is an error.
    fn with_context<F>(self, f: F) -> InjectorResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for InjectorResult<T> {
    fn context(self, context: impl Into<String>) -> InjectorResult<T> {
        self.map_err(|err| Box::new(err.context(context)))
    }

    fn with_context<F>(self, f: F) -> InjectorResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Box::new(err.with_context(f)))
    }
}

/// Builds a boxed message error from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        Box::new($crate::InjectorError::message(format!($($arg)*)))
    };
}

/// Returns early with a boxed message error.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}
