use itertools::Itertools;

/// Failures raised by the communication backends.
///
/// None of these are recovered from: a failed collective leaves the group in an
/// unknown state, so callers are expected to propagate them and tear the group down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// the pe is not a member of the group
    InvalidPe(usize),
    /// the channel to the given pe has been closed
    Disconnected(usize),
    /// the given pe panicked while the group was still running
    PeerAborted(usize),
    /// a peer contributed a buffer whose length disagrees with the agreed count
    CountMismatch {
        pe: usize,
        expected: usize,
        received: usize,
    },
    Serialization(String),
}

impl std::fmt::Display for CommError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CommError::InvalidPe(pe) => write!(f, "pe {} is not part of this group", pe),
            CommError::Disconnected(pe) => write!(f, "connection to pe {} was closed", pe),
            CommError::PeerAborted(pe) => write!(f, "pe {} aborted during a collective", pe),
            CommError::CountMismatch {
                pe,
                expected,
                received,
            } => write!(
                f,
                "pe {} sent {} elements but {} were expected",
                pe, received, expected
            ),
            CommError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for CommError {}

impl From<bincode::Error> for CommError {
    fn from(err: bincode::Error) -> Self {
        CommError::Serialization(err.to_string())
    }
}

pub type CommResult<T> = Result<T, CommError>;

/// Errors produced by distributed array operations.
///
/// Every variant other than [DistArrayError::Comm] is computed from information known
/// identically on all pes (global shapes, tokens, parameters), so all pes of a group
/// reach the same verdict before any collective is issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistArrayError {
    /// unsupported distribution token, or a token that does not fit the data
    InvalidDistribution(String),
    IndexOutOfBounds {
        index: isize,
        axis: usize,
        len: usize,
    },
    TooManyIndices {
        given: usize,
        shape: Vec<usize>,
    },
    NotSupported(String),
    InvalidReductionParameter(String),
    ShapeMismatch {
        from: usize,
        to: Vec<usize>,
    },
    MissingRootData(usize),
    Comm(CommError),
}

impl std::fmt::Display for DistArrayError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DistArrayError::InvalidDistribution(token) => {
                write!(f, "Invalid distribution encountered: {}", token)
            }
            DistArrayError::IndexOutOfBounds { index, axis, len } => write!(
                f,
                "index {} is out of bounds for axis {} with global size {}",
                index, axis, len
            ),
            DistArrayError::TooManyIndices { given, shape } => write!(
                f,
                "too many indices ({}) for array with global shape ({})",
                given,
                shape.iter().join(", ")
            ),
            DistArrayError::NotSupported(what) => write!(f, "{} is not supported", what),
            DistArrayError::InvalidReductionParameter(msg) => {
                write!(f, "invalid reduction parameter: {}", msg)
            }
            DistArrayError::ShapeMismatch { from, to } => write!(
                f,
                "cannot reshape global array of size {} into shape ({}) of size {}",
                from,
                to.iter().join(", "),
                to.iter().product::<usize>()
            ),
            DistArrayError::MissingRootData(root) => {
                write!(f, "root pe {} did not provide any data", root)
            }
            DistArrayError::Comm(err) => write!(f, "communication failure: {}", err),
        }
    }
}

impl std::error::Error for DistArrayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DistArrayError::Comm(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommError> for DistArrayError {
    fn from(err: CommError) -> Self {
        DistArrayError::Comm(err)
    }
}

pub type DistResult<T> = Result<T, DistArrayError>;
