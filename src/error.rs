use thiserror::Error;

/// Failure to reach or parse the remote feed. All-or-nothing per request;
/// retried naturally on the next scheduled tick.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed request returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("feed parse failed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Delivery failure from the chat transport.
#[derive(Debug, Error)]
pub enum SendError {
    /// Permanent: the chat blocked the bot or no longer exists.
    #[error("recipient unreachable")]
    Unreachable,
    /// Transient: surfaced and logged, the same items may be re-attempted next tick.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Anything that can abort one subscriber's dispatch cycle.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("settings store error: {0}")]
    Store(#[from] sqlx::Error),
}
