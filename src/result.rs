use core::fmt::Debug;

/// Error type
#[derive(Debug, thiserror::Error)]
pub enum Error<E: Sized + Debug> {
    /// Wire not high
    #[error("wire is not pulled high")]
    WireFault,
    /// No presence on wire
    #[error("no presence pulse on the wire")]
    NoPresence,
    #[error("port error: {0:?}")]
    PortError(E),
}

impl<E: Sized + Debug> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::PortError(e)
    }
}
