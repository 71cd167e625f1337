use crate::error::{MonitorError, Result};

/// Zero-side-effect check that a PID still refers to a running process
pub trait LivenessProbe: Send + Sync {
    /// `Ok(())` when alive, `Err(MonitorError::ProcessNotFound)` otherwise
    fn check(&self, pid: u32) -> Result<()>;
}

/// Probe using signal 0 on unix and the process table elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

#[cfg(unix)]
impl LivenessProbe for SignalProbe {
    fn check(&self, pid: u32) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // 0 and negative values address process groups, never a single server
        let raw = match i32::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return Err(MonitorError::ProcessNotFound(pid)),
        };

        match kill(Pid::from_raw(raw), None) {
            Ok(()) => Ok(()),
            // Exists, but owned by another user
            Err(Errno::EPERM) => Ok(()),
            Err(_) => Err(MonitorError::ProcessNotFound(pid)),
        }
    }
}

#[cfg(not(unix))]
impl LivenessProbe for SignalProbe {
    fn check(&self, pid: u32) -> Result<()> {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

        // PID 0 is the idle process, never a server
        if pid == 0 {
            return Err(MonitorError::ProcessNotFound(pid));
        }

        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );

        if system.process(sys_pid).is_some() {
            Ok(())
        } else {
            Err(MonitorError::ProcessNotFound(pid))
        }
    }
}
