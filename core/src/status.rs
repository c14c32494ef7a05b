//! Engine status codes and their descriptions.

use std::fmt;

/// Status returned by engine calls (`TfLiteStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    DelegateError,
    ApplicationError,
    DelegateDataNotFound,
    DelegateDataWriteError,
    DelegateDataReadError,
    UnresolvedOps,
    Cancelled,
    /// A code this crate does not know about.
    Unknown(i32),
}

impl Status {
    /// Human-readable description, used in every engine error message.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Error => "Unexpected Interpreter Error",
            Self::DelegateError => "Error from delegate",
            Self::ApplicationError => {
                "Incompatability between runtime and delegate, possibly due to applying a \
                 delegate to a model graph that is already immutable"
            }
            Self::DelegateDataNotFound => "Serialized delegate data not found",
            Self::DelegateDataWriteError => "Could not write serialized data to delegate",
            Self::DelegateDataReadError => "Could not read serialized data from delegate",
            Self::UnresolvedOps => "Model contains ops that cannot be resolved at runtime",
            Self::Cancelled => "Invocation was cancelled",
            Self::Unknown(_) => "Unknown status code",
        }
    }

    /// `true` only for [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Raw code as passed across the C boundary.
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::DelegateError => 2,
            Self::ApplicationError => 3,
            Self::DelegateDataNotFound => 4,
            Self::DelegateDataWriteError => 5,
            Self::DelegateDataReadError => 6,
            Self::UnresolvedOps => 7,
            Self::Cancelled => 8,
            Self::Unknown(code) => *code,
        }
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Error,
            2 => Self::DelegateError,
            3 => Self::ApplicationError,
            4 => Self::DelegateDataNotFound,
            5 => Self::DelegateDataWriteError,
            6 => Self::DelegateDataReadError,
            7 => Self::UnresolvedOps,
            8 => Self::Cancelled,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_roundtrip() {
        for code in 0..=8 {
            let status = Status::from(code);
            assert!(!matches!(status, Status::Unknown(_)));
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn test_unknown_code() {
        let status = Status::from(42);
        assert_eq!(status, Status::Unknown(42));
        assert_eq!(status.describe(), "Unknown status code");
        assert_eq!(Status::from(-1).describe(), "Unknown status code");
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(Status::Ok.describe(), "Ok");
        assert_eq!(Status::Error.to_string(), "Unexpected Interpreter Error");
        assert_eq!(
            Status::UnresolvedOps.describe(),
            "Model contains ops that cannot be resolved at runtime"
        );
        assert!(Status::Ok.is_ok());
        assert!(!Status::DelegateError.is_ok());
    }
}
