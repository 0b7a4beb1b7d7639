use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where the bridge helper runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeMode {
    /// A forked child process connected by OS pipes.
    #[default]
    Process,
    /// A thread of the current process connected by OS pipes.
    Thread,
}

impl BridgeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Thread => "thread",
        }
    }
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session behavior shared by [`Client`](crate::Client) and
/// [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between bridge iterations.
    pub poll_interval: Duration,
    /// How long a process helper gets between SIGTERM and SIGKILL.
    pub shutdown_grace: Duration,
    pub mode: BridgeMode,
    /// Append every decoded inbound packet here.
    pub backup_path: Option<PathBuf>,
    /// Name used for the bridge's log span.
    pub label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            shutdown_grace: Duration::from_secs(1),
            mode: BridgeMode::default(),
            backup_path: None,
            label: "payloadlink".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_mode(mut self, mode: BridgeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(path.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.mode, BridgeMode::Process);
        assert!(config.backup_path.is_none());
    }

    #[test]
    fn builders_override_fields() {
        let config = SessionConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_shutdown_grace(Duration::from_millis(200))
            .with_mode(BridgeMode::Thread)
            .with_backup_path("/tmp/backup.log")
            .with_label("pi2");

        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.shutdown_grace, Duration::from_millis(200));
        assert_eq!(config.mode.to_string(), "thread");
        assert_eq!(config.backup_path, Some(PathBuf::from("/tmp/backup.log")));
        assert_eq!(config.label, "pi2");
    }
}
