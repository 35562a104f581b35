use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The owning event is a series; callers must say which date they mean.
    SubeventRequired,
    InvalidScope(&'static str),
    LimitExceeded(&'static str),
    /// A demand-count query failed. Transient; retry policy belongs to the
    /// caller.
    DemandUnavailable(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::SubeventRequired => {
                write!(f, "this event is a series: a subevent must be supplied")
            }
            EngineError::InvalidScope(msg) => write!(f, "invalid scope: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::DemandUnavailable(e) => write!(f, "demand source unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
