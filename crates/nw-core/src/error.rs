/// Alias for `Result<T, TrackError>`.
pub type TrackResult<T> = Result<T, TrackError>;

/// Errors raised by the tracking layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    /// The queried type never carried the trackable capability.
    #[error("cannot track instances of type {0}")]
    NotTrackable(&'static str),
}
