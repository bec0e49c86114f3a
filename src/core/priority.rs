use log::{debug, warn};

/// Scheduling hint for a thread. Applied best-effort; failure to apply is
/// logged and otherwise ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadPriority {
    Lowest,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    Highest,
}

impl ThreadPriority {
    #[inline(always)]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lowest => "Lowest",
            Self::BelowNormal => "BelowNormal",
            Self::Normal => "Normal",
            Self::AboveNormal => "AboveNormal",
            Self::Highest => "Highest",
        }
    }

    #[cfg(target_os = "linux")]
    #[inline(always)]
    const fn nice(self) -> i32 {
        match self {
            Self::Lowest => 10,
            Self::BelowNormal => 5,
            Self::Normal => 0,
            Self::AboveNormal => -5,
            Self::Highest => -10,
        }
    }

    #[cfg(windows)]
    #[inline(always)]
    const fn win32(self) -> i32 {
        use windows_sys::Win32::System::Threading::{
            THREAD_PRIORITY_ABOVE_NORMAL, THREAD_PRIORITY_BELOW_NORMAL, THREAD_PRIORITY_HIGHEST,
            THREAD_PRIORITY_LOWEST, THREAD_PRIORITY_NORMAL,
        };
        match self {
            Self::Lowest => THREAD_PRIORITY_LOWEST,
            Self::BelowNormal => THREAD_PRIORITY_BELOW_NORMAL,
            Self::Normal => THREAD_PRIORITY_NORMAL,
            Self::AboveNormal => THREAD_PRIORITY_ABOVE_NORMAL,
            Self::Highest => THREAD_PRIORITY_HIGHEST,
        }
    }
}

impl std::fmt::Display for ThreadPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThreadPriority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("lowest") {
            return Ok(Self::Lowest);
        }
        if s.eq_ignore_ascii_case("belownormal") || s.eq_ignore_ascii_case("below_normal") {
            return Ok(Self::BelowNormal);
        }
        if s.is_empty() || s.eq_ignore_ascii_case("normal") {
            return Ok(Self::Normal);
        }
        if s.eq_ignore_ascii_case("abovenormal") || s.eq_ignore_ascii_case("above_normal") {
            return Ok(Self::AboveNormal);
        }
        if s.eq_ignore_ascii_case("highest") {
            return Ok(Self::Highest);
        }
        Err(())
    }
}

/// Apply `priority` to the calling thread.
pub fn apply_to_current_thread(priority: ThreadPriority) {
    match set_current(priority) {
        Ok(()) => debug!(
            "Thread '{}' priority set to {priority}.",
            std::thread::current().name().unwrap_or("<unnamed>")
        ),
        Err(e) => warn!("Failed to set thread priority to {priority}: {e}"),
    }
}

#[cfg(target_os = "linux")]
fn set_current(priority: ThreadPriority) -> std::io::Result<()> {
    // Linux applies nice values per task, so the thread id targets only this thread.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, priority.nice()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(windows)]
fn set_current(priority: ThreadPriority) -> std::io::Result<()> {
    use windows_sys::Win32::System::Threading::{GetCurrentThread, SetThreadPriority};
    let ok = unsafe { SetThreadPriority(GetCurrentThread(), priority.win32()) };
    if ok != 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
fn set_current(priority: ThreadPriority) -> std::io::Result<()> {
    let _ = priority;
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "thread priority hints are not implemented on this platform",
    ))
}
