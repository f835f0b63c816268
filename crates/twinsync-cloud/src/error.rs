//! Error handling for the cloud adapter.
//!
//! Transient transport failures are recovered locally by the retry tick and
//! never reach the domain layer. Only startup failures are escalated, as an
//! [`ExitCode`] for the process supervisor.

use crate::transport::TransportError;

/// Process exit codes reported when the adapter cannot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean exit.
    Success = 0,
    /// The periodic event timer could not be created.
    InitEventTimer = 1,
    /// The transport rejected initialization.
    InitTransport = 2,
    /// Configuration could not be loaded or is invalid.
    InitConfig = 3,
    /// The runtime loop stopped unexpectedly.
    Runtime = 4,
}

impl ExitCode {
    /// Numeric value handed to `std::process::exit`.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::InitEventTimer => "init_event_timer",
            Self::InitTransport => "init_transport",
            Self::InitConfig => "init_config",
            Self::Runtime => "runtime",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// Error type for cloud adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The periodic event timer could not be created.
    #[error("Event timer error: {0}")]
    Timer(String),

    /// The transport failed to initialize.
    #[error("Transport initialization failed: {0}")]
    TransportInit(TransportError),

    /// A send or report was rejected by the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Payload serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The runtime loop is no longer running.
    #[error("Cloud adapter is stopped")]
    Stopped,
}

/// Result type alias for cloud adapter operations.
pub type CloudResult<T> = Result<T, CloudError>;

impl CloudError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn timer(msg: impl Into<String>) -> Self {
        Self::Timer(msg.into())
    }

    /// True when the transport reported that there is no network.
    pub fn is_no_network(&self) -> bool {
        matches!(self, Self::Transport(TransportError::NoNetwork))
    }

    /// Exit code the process should terminate with for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::InitConfig,
            Self::Timer(_) => ExitCode::InitEventTimer,
            Self::TransportInit(_) => ExitCode::InitTransport,
            Self::Transport(_) | Self::Serialization(_) | Self::Stopped => ExitCode::Runtime,
        }
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(e: serde_json::Error) -> Self {
        CloudError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CloudError {
    fn from(e: toml::de::Error) -> Self {
        CloudError::Config(e.to_string())
    }
}
