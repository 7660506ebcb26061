//! Timing constants for provider and client calls.

pub mod timeouts {
    use std::time::Duration;

    /// Bound on the daemon-to-provider `Connect` call. ConnMan may prompt
    /// for credentials in between, so this is deliberately generous.
    pub const CONNECT: Duration = Duration::from_secs(5 * 60);

    /// Bound on a `RequestCredentials` call into a client's agent.
    pub const REQUEST_CREDENTIALS: Duration = Duration::from_secs(5 * 60);
}
