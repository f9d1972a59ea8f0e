use std::time::Duration;

/// Tunables for the mediator's forwarding and supervision policy.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Answer reply-expected invocations on an active server with a redirect
    /// to the server's real reference instead of re-issuing the call on the
    /// client's behalf.
    ///
    /// Default: true
    pub redirect: bool,
    /// Bound on how long `stop` waits for one server's exit confirmation.
    ///
    /// Default: 5s
    pub stop_timeout: Duration,
    /// Global bound on how long `shutdown` waits for all servers to exit.
    ///
    /// Default: 60s
    pub shutdown_timeout: Duration,
    /// Window after a pre-activation crash during which restarts are
    /// refused. Bypassed by `force_activate`.
    ///
    /// Default: 30s
    pub restart_backoff: Duration,
    /// Granularity of the bounded exit-confirmation polls.
    ///
    /// Default: 25ms
    pub poll_interval: Duration,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            redirect: true,
            stop_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(60),
            restart_backoff: Duration::from_secs(30),
            poll_interval: Duration::from_millis(25),
        }
    }
}
