//! Resource-based admission of new runs.
//!
//! The gate is soft backpressure: it is asked before each dispatch and a
//! denial only delays the next run, it never cancels one.

use std::fmt;
use std::time::Duration;

use crate::config::RunnerConfig;

/// Live resource signal polled before each dispatch.
pub trait ResourceProbe: Send + Sync {
    fn has_headroom(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAdmit;

impl ResourceProbe for AlwaysAdmit {
    fn has_headroom(&self) -> bool {
        true
    }
}

/// Probe backed by a closure.
pub struct FnProbe<F>(pub F);

impl<F> ResourceProbe for FnProbe<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn has_headroom(&self) -> bool {
        (self.0)()
    }
}

/// Memory and CPU thresholds read through `sysinfo`.
#[cfg(feature = "sysinfo")]
pub struct SystemProbe {
    system: std::sync::Mutex<sysinfo::System>,
    min_available_bytes: u64,
    max_cpu_percent: f32,
}

#[cfg(feature = "sysinfo")]
impl SystemProbe {
    pub fn new(min_available_mb: u64, max_cpu_percent: f32) -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        system.refresh_cpu();
        Self {
            system: std::sync::Mutex::new(system),
            min_available_bytes: min_available_mb.saturating_mul(1024 * 1024),
            max_cpu_percent,
        }
    }
}

#[cfg(feature = "sysinfo")]
impl ResourceProbe for SystemProbe {
    fn has_headroom(&self) -> bool {
        // A poisoned probe must not stall the exploration.
        let Ok(mut system) = self.system.lock() else {
            return true;
        };
        system.refresh_memory();
        system.refresh_cpu();
        system.available_memory() >= self.min_available_bytes
            && system.global_cpu_info().cpu_usage() <= self.max_cpu_percent
    }
}

pub struct AdmissionGate {
    probe: Box<dyn ResourceProbe>,
    poll: Duration,
}

impl AdmissionGate {
    pub fn new(probe: impl ResourceProbe + 'static, poll: Duration) -> Self {
        Self {
            probe: Box::new(probe),
            poll,
        }
    }

    pub fn always(poll: Duration) -> Self {
        Self::new(AlwaysAdmit, poll)
    }

    /// System probe when the config sets limits and the `sysinfo` feature is on.
    pub fn from_config(config: &RunnerConfig) -> Self {
        let poll = config.admission_poll();
        match config.admission {
            #[cfg(feature = "sysinfo")]
            Some(limits) => Self::new(
                SystemProbe::new(limits.min_available_mb, limits.max_cpu_percent),
                poll,
            ),
            #[cfg(not(feature = "sysinfo"))]
            Some(_) => {
                log::warn!("admission limits ignored: built without the `sysinfo` feature");
                Self::always(poll)
            }
            None => Self::always(poll),
        }
    }

    pub fn admits(&self) -> bool {
        self.probe.has_headroom()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_fn_probe_is_consulted_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let gate = AdmissionGate::new(
            FnProbe(move || counter.fetch_add(1, Ordering::SeqCst) >= 2),
            Duration::from_millis(1),
        );
        assert!(!gate.admits());
        assert!(!gate.admits());
        assert!(gate.admits());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gate_without_limits_always_admits() {
        let gate = AdmissionGate::from_config(&RunnerConfig::default());
        assert!(gate.admits());
        assert_eq!(gate.poll_interval(), Duration::from_millis(100));
    }
}
