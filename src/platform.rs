//! OS helpers for worker threads: scheduling priority and per-thread CPU time.

use std::time::Duration;
use tracing::debug;

/// Worker thread scheduling priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Parse a config value; unknown names are rejected
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "lowest" | "below_normal" => Some(Priority::Low),
            "normal" | "" => Some(Priority::Normal),
            "high" | "highest" | "above_normal" => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// Apply `priority` to the calling thread. Failures are logged and ignored.
pub fn set_current_thread_priority(priority: Priority) {
    if priority == Priority::Normal {
        return;
    }
    if let Err(e) = imp::set_priority(priority) {
        debug!(priority = priority.as_str(), error = %e, "can't change thread priority");
    }
}

/// CPU time consumed by the calling thread (zero where unsupported)
pub fn thread_cpu_time() -> Duration {
    imp::thread_cpu_time().unwrap_or_default()
}

#[cfg(target_os = "linux")]
mod imp {
    use super::Priority;
    use std::io;
    use std::time::Duration;

    pub fn set_priority(priority: Priority) -> io::Result<()> {
        let nice = match priority {
            Priority::Low => 10,
            Priority::Normal => 0,
            Priority::High => -5,
        };
        // SAFETY: plain syscalls on the current thread id
        let rc = unsafe {
            let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
            libc::setpriority(libc::PRIO_PROCESS, tid, nice)
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub fn thread_cpu_time() -> Option<Duration> {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // SAFETY: ts is a valid out pointer
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
        (rc == 0).then(|| Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod imp {
    use super::Priority;
    use std::io;
    use std::time::Duration;

    pub fn set_priority(_priority: Priority) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "per-thread priority is not supported"))
    }

    pub fn thread_cpu_time() -> Option<Duration> {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        // SAFETY: ts is a valid out pointer
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
        (rc == 0).then(|| Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
    }
}

#[cfg(windows)]
mod imp {
    use super::Priority;
    use std::io;
    use std::time::Duration;
    use windows::Win32::Foundation::FILETIME;
    use windows::Win32::System::Threading::{
        GetCurrentThread, GetThreadTimes, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL,
        THREAD_PRIORITY_BELOW_NORMAL, THREAD_PRIORITY_NORMAL,
    };

    pub fn set_priority(priority: Priority) -> io::Result<()> {
        let level = match priority {
            Priority::Low => THREAD_PRIORITY_BELOW_NORMAL,
            Priority::Normal => THREAD_PRIORITY_NORMAL,
            Priority::High => THREAD_PRIORITY_ABOVE_NORMAL,
        };
        // SAFETY: pseudo handle of the current thread
        unsafe { SetThreadPriority(GetCurrentThread(), level) }
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    pub fn thread_cpu_time() -> Option<Duration> {
        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        // SAFETY: all out pointers are valid
        unsafe { GetThreadTimes(GetCurrentThread(), &mut creation, &mut exit, &mut kernel, &mut user) }.ok()?;
        let ticks = |ft: FILETIME| (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime);
        // FILETIME ticks are 100 ns
        Some(Duration::from_nanos((ticks(kernel) + ticks(user)) * 100))
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use super::Priority;
    use std::io;
    use std::time::Duration;

    pub fn set_priority(_priority: Priority) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "thread priority is not supported"))
    }

    pub fn thread_cpu_time() -> Option<Duration> {
        None
    }
}
