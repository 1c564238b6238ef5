// Process resource probing

use parking_lot::Mutex;
use sysinfo::{Pid, System};

/// Source of process resource numbers for the memory check.
pub trait ResourceProbe: Send + Sync {
    /// Resident memory of this process in bytes
    fn memory_bytes(&self) -> Option<u64>;
}

/// `sysinfo`-backed probe for the current process
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::warn!(error = err, "cannot determine own pid, memory check disabled");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn memory_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }
}

/// Fixed value, for tests and embedders that measure memory themselves
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub Option<u64>);

impl ResourceProbe for FixedProbe {
    fn memory_bytes(&self) -> Option<u64> {
        self.0
    }
}
