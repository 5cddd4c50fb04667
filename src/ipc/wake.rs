// src/ipc/wake.rs

//! Cross-process wake-up for idle consumers.
//!
//! The producer bumps `wake_seq` in the region trailer after every publish.
//! On Linux a waiting consumer sleeps on that word with a shared futex, so
//! the producer can wake it without any per-consumer file descriptor.
//! Elsewhere, and in `poll` mode, consumers sleep in short slices and
//! re-check.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::layout::Trailer;

/// Longest single sleep in polling mode.
const POLL_SLICE: Duration = Duration::from_micros(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeMode {
    /// Block on the shared futex word (Linux); falls back to polling
    /// elsewhere.
    #[default]
    Futex,
    /// Sleep-and-recheck.
    Poll,
}

/// Producer side: announce a publish (or close).
pub(crate) fn notify(trailer: &Trailer, mode: WakeMode) {
    trailer.wake_seq.fetch_add(1, Ordering::SeqCst);
    if mode == WakeMode::Futex && trailer.waiters.load(Ordering::SeqCst) > 0 {
        futex::wake_all(&trailer.wake_seq);
    }
}

/// Consumer side: sleep until `wake_seq` moves past `observed` or `timeout`
/// passes. May return early.
pub(crate) fn wait(trailer: &Trailer, observed: u32, timeout: Duration, mode: WakeMode) {
    if timeout.is_zero() {
        return;
    }
    match mode {
        WakeMode::Futex if futex::SUPPORTED => {
            trailer.waiters.fetch_add(1, Ordering::SeqCst);
            futex::wait(&trailer.wake_seq, observed, timeout);
            trailer.waiters.fetch_sub(1, Ordering::SeqCst);
        }
        _ => {
            if trailer.wake_seq.load(Ordering::Acquire) == observed {
                std::thread::sleep(timeout.min(POLL_SLICE));
            }
        }
    }
}

/// Whether the process owning a cursor or region is still running.
#[cfg(target_os = "linux")]
pub(crate) fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks that the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn process_alive(pid: u32) -> bool {
    pid != 0
}

#[cfg(target_os = "linux")]
mod futex {
    use std::ptr;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    pub(super) const SUPPORTED: bool = true;

    pub(super) fn wait(word: &AtomicU32, expected: u32, timeout: Duration) {
        let ts = libc::timespec {
            tv_sec: libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: libc::c_long::from(timeout.subsec_nanos() as i32),
        };
        // SAFETY: `word` lives in a shared mapping that outlives the call.
        // Non-private FUTEX_WAIT so other processes mapping the file can wake
        // us. EAGAIN/ETIMEDOUT/EINTR all just mean "go re-check".
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT,
                expected,
                &ts as *const libc::timespec,
                ptr::null::<u32>(),
                0u32,
            );
        }
    }

    pub(super) fn wake_all(word: &AtomicU32) {
        // SAFETY: as above; FUTEX_WAKE only reads the address.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAKE,
                i32::MAX,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod futex {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    pub(super) const SUPPORTED: bool = false;

    pub(super) fn wait(_word: &AtomicU32, _expected: u32, _timeout: Duration) {}

    pub(super) fn wake_all(_word: &AtomicU32) {}
}
