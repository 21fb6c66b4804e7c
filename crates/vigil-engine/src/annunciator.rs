//! Best-effort audible annunciation for newly admitted alerts.
//!
//! The annunciator is an injected optional capability: the engine calls it
//! fire-and-forget when a fresh notification is admitted, and nothing it
//! does (or fails to do) can block or fail admission. Throttled repeats
//! never announce.

use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use vigil_core::Severity;

/// Fire-and-forget announcement capability. Infallible by contract.
pub trait Annunciator: Send {
    /// Ask the environment for notification permission, if it has such a
    /// concept. Best-effort; the default does nothing.
    fn request_permission(&mut self) {}

    /// Announce a newly admitted alert of the given severity.
    fn announce(&mut self, severity: Severity);
}

/// Terminal-bell annunciator with per-severity enablement and a cooldown
/// so bursts of alerts do not turn into bell spam.
#[derive(Debug)]
pub struct TerminalBell {
    chime_on_critical: bool,
    chime_on_high: bool,
    cooldown: Duration,
    last_chime: Option<Instant>,
}

impl TerminalBell {
    /// Create a bell from the sound section of the config file.
    pub fn from_config(config: &vigil_config::SoundConfig) -> Self {
        Self {
            chime_on_critical: config.chime_on_critical,
            chime_on_high: config.chime_on_high,
            cooldown: Duration::from_secs(config.chime_cooldown_secs),
            last_chime: None,
        }
    }

    /// Whether a chime at `severity` is due at `now`, consuming the
    /// cooldown when it is.
    fn due(&mut self, severity: Severity, now: Instant) -> bool {
        let enabled = match severity {
            Severity::Critical => self.chime_on_critical,
            Severity::High => self.chime_on_high,
            _ => false,
        };
        if !enabled {
            return false;
        }
        if let Some(last) = self.last_chime {
            if now.duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_chime = Some(now);
        true
    }

    /// Ring the terminal bell (BEL character).
    fn ring() {
        print!("\x07");
        let _ = std::io::stdout().flush();
    }
}

impl Default for TerminalBell {
    fn default() -> Self {
        Self::from_config(&vigil_config::SoundConfig::default())
    }
}

impl Annunciator for TerminalBell {
    fn announce(&mut self, severity: Severity) {
        if self.due(severity, Instant::now()) {
            debug!(level = %severity, "alert chime");
            Self::ring();
        }
    }
}

/// No-op annunciator for headless runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Annunciator for Silent {
    fn announce(&mut self, _severity: Severity) {}
}
