use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::lock::LockError;

/// Stable error codes printed alongside failures so scripts can branch on
/// them. Leading digit groups the failure: 1 config, 2 request, 3 record
/// format, 5 store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    IdentifierNotFound,
    InvalidParameter,
    MalformedRecord,
    StoreReadFailed,
    StoreWriteFailed,
    LockContention,
}

impl ErrorCode {
    pub const ALL: [Self; 7] = [
        Self::ConfigParseError,
        Self::IdentifierNotFound,
        Self::InvalidParameter,
        Self::MalformedRecord,
        Self::StoreReadFailed,
        Self::StoreWriteFailed,
        Self::LockContention,
    ];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::IdentifierNotFound => "E2001",
            Self::InvalidParameter => "E2002",
            Self::MalformedRecord => "E3001",
            Self::StoreReadFailed => "E5001",
            Self::StoreWriteFailed => "E5002",
            Self::LockContention => "E5003",
        }
    }

    /// What to try next, when there is something useful to say.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        Some(match self {
            Self::ConfigParseError => "Fix the TOML in cohort.toml (or the file given to --config).",
            Self::IdentifierNotFound => {
                "The identifier must appear in the store, as a record or in a neighbor list."
            }
            Self::InvalidParameter => {
                "Targets and tolerances must be finite and non-negative; versions cannot contain tabs or newlines."
            }
            Self::MalformedRecord => {
                "Store lines look like `identifier<TAB>version<TAB>neighbor,neighbor,...`."
            }
            Self::StoreReadFailed => "Check that --store points at a readable file.",
            Self::StoreWriteFailed => "Check free space and write permission on the store directory.",
            Self::LockContention => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised by graph queries, selection parameters, and the record store.
///
/// An infeasible limited rollout is not an error; see
/// [`crate::rollout::LimitedOutcome::Infeasible`].
#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    /// The identifier never appeared in the record stream.
    #[error("identifier not found: {identifier}")]
    NotFound { identifier: String },

    /// A target, tolerance, or pinned index is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A store line could not be split into identifier/version/neighbors.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// The config file exists but could not be parsed.
    #[error("failed to parse {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Store I/O error.
    #[error("store I/O: {0}")]
    Io(#[from] io::Error),

    /// Lock acquisition failed.
    #[error("store lock: {0}")]
    Lock(#[from] LockError),
}

impl RolloutError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::IdentifierNotFound,
            Self::InvalidParameter(_) => ErrorCode::InvalidParameter,
            Self::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::Io(_) => ErrorCode::StoreReadFailed,
            Self::Lock(err) => err.code(),
        }
    }

    pub(crate) fn not_found(identifier: &str) -> Self {
        Self::NotFound {
            identifier: identifier.to_string(),
        }
    }
}
