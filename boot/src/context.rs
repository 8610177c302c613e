//! Platform glue (spec §6's "platform-provided" interfaces).
//!
//! One struct collecting everything a board must supply beyond flash and
//! crypto: watchdog feeds, the security-counter store, logging, and the
//! final handoff into the application. The teacher's board crates select
//! a logging macro by feature (`semihosting`, `rtt`, or a no-op); `Logger`
//! generalizes that to a trait object so the core stays independent of
//! which transport a given board wires up.

use crate::crypto::Crypto;
use crate::fih;

/// Severity matching `log(level, fmt, ...)` in spec §6.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

/// Platform logging sink. A board backed by `defmt`/RTT or semihosting
/// implements this with one line per method; a host build can back it with
/// `std::eprintln!`; a board with nothing wired up uses a no-op impl.
pub trait Logger {
    fn log(&self, level: Level, message: &str);
}

pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Watchdog kick, fed once per sector during swap and once per
/// working-buffer iteration during hashing (spec §5's cadence) so a slow
/// flash device doesn't trip a board's hardware watchdog mid-operation.
pub trait Watchdog {
    fn feed(&self);
}

pub struct NoopWatchdog;

impl Watchdog for NoopWatchdog {
    fn feed(&self) {}
}

/// Monotonic security-counter store (spec §6): `security_counter_get`
/// returns `None` when the platform has no counter provisioned yet for
/// that image index (distinct from a counter of zero).
pub trait SecurityCounter {
    fn get(&self, image_index: u8) -> Option<u32>;
    fn update(&mut self, image_index: u8, new_value: u32) -> bool;
}

/// Where the selected image actually runs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LaunchTarget {
    /// Execute in place at the slot's base address.
    Xip(u32),
    /// Copied into RAM at this address first.
    Ram(u32),
}

/// The final handoff (spec §6 `platform_launch`): having decided which
/// image boots and where, the core never returns — it jumps there. A board
/// implements this with its own `cortex-m-rt` reset-and-branch sequence (or
/// the RAM-load copy-then-branch); nothing generic can be done here, which
/// is why this is a platform collaborator rather than code in `swap::*`.
pub trait Launcher {
    fn launch(&self, target: LaunchTarget, image_index: u8) -> !;
}

/// Stand-in for a board that hasn't wired a real launcher yet. There is no
/// sensible no-op for "jump to the image" — unlike `NoopLogger`/
/// `NoopWatchdog`, skipping the action isn't a valid alternative — so this
/// panics if ever actually invoked.
pub struct NoopLauncher;

impl Launcher for NoopLauncher {
    fn launch(&self, _target: LaunchTarget, _image_index: u8) -> ! {
        panic!("NoopLauncher::launch called — wire a real Launcher before booting");
    }
}

/// Everything the swap/policy/verify modules need from the platform,
/// bundled so call sites take one reference instead of four — the "Global
/// mutable state... becomes a single `BootContext` passed by reference"
/// design note.
pub struct BootContext<'a, C: Crypto, L: Logger, S: SecurityCounter, W: Watchdog = NoopWatchdog, Ln: Launcher = NoopLauncher> {
    pub crypto: &'a C,
    pub logger: &'a L,
    pub counters: &'a mut S,
    pub watchdog: &'a W,
    pub launcher: &'a Ln,
    pub caps: u32,
}

impl<'a, C: Crypto, L: Logger, S: SecurityCounter, W: Watchdog, Ln: Launcher> BootContext<'a, C, L, S, W, Ln> {
    pub fn new(crypto: &'a C, logger: &'a L, counters: &'a mut S, watchdog: &'a W, launcher: &'a Ln) -> Self {
        BootContext { crypto, logger, counters, watchdog, launcher, caps: crate::config::get_caps() }
    }

    pub fn log(&self, level: Level, message: &str) {
        self.logger.log(level, message);
    }

    /// Feed the platform watchdog. Callers driving a long-running loop (the
    /// swap strategies' per-sector copy, the verifier's per-chunk hash) pass
    /// `|| ctx.feed_watchdog()` as the closure those modules take, rather
    /// than threading the whole context down into them.
    pub fn feed_watchdog(&self) {
        self.watchdog.feed();
    }

    /// Report a violated compile-time-checkable invariant reached at
    /// runtime (a malformed flash map, an impossible layout) — logs at
    /// `Error` and returns, since halting is the caller's decision, not
    /// this crate's.
    pub fn assert_failed(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Fault-hardened gate in front of an irreversible action: the caller
    /// supplies two independently-computed [`fih::Eq`] witnesses (e.g. "the
    /// signature checked out" and "the hash matched"), both of which must
    /// independently read as success.
    pub fn guarded<T>(&self, a: fih::Eq, b: fih::Eq, action: impl FnOnce() -> T) -> Option<T> {
        if fih::boot_eq(a, b) {
            Some(action())
        } else {
            self.log(Level::Error, "fault-injection guard rejected an irreversible action");
            None
        }
    }

    /// Hand off to `target` for `image_index`. Never returns — this is the
    /// last thing a board's boot entry point calls.
    pub fn launch(&self, target: LaunchTarget, image_index: u8) -> ! {
        self.launcher.launch(target, image_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SigAlg;
    use std::cell::Cell;

    struct FakeCrypto;
    impl Crypto for FakeCrypto {
        fn sha256(&self, _data: &[u8], _out: &mut [u8; 32]) {}
        fn accept_key_hash(&self, _hash: &[u8]) -> Option<u8> {
            None
        }
        fn verify_by_key(&self, _alg: SigAlg, _key_index: u8, _digest: &[u8; 32], _sig: &[u8]) -> bool {
            false
        }
        fn unwrap_cek(&self, _alg: crate::image::TlvType, _wrapped: &[u8], _out: &mut [u8; 32]) -> Option<usize> {
            None
        }
    }

    struct FakeCounters(Cell<u32>);
    impl SecurityCounter for FakeCounters {
        fn get(&self, _image_index: u8) -> Option<u32> {
            Some(self.0.get())
        }
        fn update(&mut self, _image_index: u8, new_value: u32) -> bool {
            self.0.set(new_value);
            true
        }
    }

    #[test]
    fn guarded_runs_action_only_on_double_success() {
        let crypto = FakeCrypto;
        let logger = NoopLogger;
        let mut counters = FakeCounters(Cell::new(0));
        let watchdog = NoopWatchdog;
        let launcher = NoopLauncher;
        let ctx = BootContext::new(&crypto, &logger, &mut counters, &watchdog, &launcher);

        assert_eq!(ctx.guarded(fih::Eq::Success, fih::Eq::Success, || 42), Some(42));
        assert_eq!(ctx.guarded(fih::Eq::Success, fih::Eq::Failure, || 42), None);
        ctx.feed_watchdog();
    }

    #[test]
    #[should_panic(expected = "NoopLauncher")]
    fn noop_launcher_panics_if_actually_invoked() {
        let crypto = FakeCrypto;
        let logger = NoopLogger;
        let mut counters = FakeCounters(Cell::new(0));
        let watchdog = NoopWatchdog;
        let launcher = NoopLauncher;
        let ctx = BootContext::new(&crypto, &logger, &mut counters, &watchdog, &launcher);
        ctx.launch(LaunchTarget::Xip(0), 0);
    }
}
