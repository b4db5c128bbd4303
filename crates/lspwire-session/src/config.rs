use lspwire_frame::FrameConfig;

/// Default bound on outstanding requests per session.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default name of the dispatch thread.
pub const DEFAULT_THREAD_NAME: &str = "lspwire-dispatch";

/// Method of the notification sent when a request is cancelled locally.
pub const CANCEL_REQUEST_METHOD: &str = "$/cancelRequest";

/// Session runtime configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Framing limits applied to both directions.
    pub frame: FrameConfig,
    /// Requests beyond this many outstanding fail with `TooManyPending`.
    pub max_pending: usize,
    /// Send `$/cancelRequest` to the peer when a pending request is cancelled.
    pub send_cancel_notifications: bool,
    pub thread_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            max_pending: DEFAULT_MAX_PENDING,
            send_cancel_notifications: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}
