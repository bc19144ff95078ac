use std::fmt;

/// Closed classification shared by every failure that can reach a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    RemoteTransient,
    RemoteFatal,
    NotFound,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::RemoteTransient => "RemoteTransientError",
            Self::RemoteFatal => "RemoteFatalError",
            Self::NotFound => "NotFoundError",
        }
    }

    pub fn is_client_error(self) -> bool {
        matches!(self, Self::Validation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
