use thiserror::Error;

/// Failure categories shared by every participant.
#[derive(Debug, Error)]
pub enum CosimError {
    /// Invalid run setup: participant count, unavailable variant, bad parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("i/o error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Peer data that does not fit the exchange protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("{op} is not allowed while the node is {state}")]
    Lifecycle { op: &'static str, state: &'static str },

    /// The peer reported a failure or the link went away.
    #[error("peer aborted: {0}")]
    PeerAborted(String),
}

pub type CosimResult<T> = Result<T, CosimError>;

impl CosimError {
    pub fn config(msg: impl Into<String>) -> Self { CosimError::Configuration(msg.into()) }
    pub fn protocol(msg: impl Into<String>) -> Self { CosimError::Protocol(msg.into()) }
    pub fn checkpoint(msg: impl Into<String>) -> Self { CosimError::Checkpoint(msg.into()) }
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CosimError::Io { context: context.into(), source }
    }
    #[inline] pub fn is_peer_abort(&self) -> bool { matches!(self, CosimError::PeerAborted(_)) }
}

/// Attach a lazily built context string to `std::io` results.
pub trait IoContext<T> {
    fn io_context<F: FnOnce() -> String>(self, f: F) -> CosimResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F: FnOnce() -> String>(self, f: F) -> CosimResult<T> {
        self.map_err(|e| CosimError::io(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_context_keeps_source() {
        let r: std::io::Result<()> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let e = r.io_context(|| "open results.dat".to_string()).unwrap_err();
        let msg = e.to_string();
        assert!(msg.contains("open results.dat"), "{msg}");
        assert!(msg.contains("gone"), "{msg}");
        assert!(std::error::Error::source(&e).is_some());
    }
}
