//! Swap state machine (spec §4.6).
//!
//! One strategy is compiled in per board, selected by which `swap-*`
//! feature is enabled — the workspace keeps all four buildable at once only
//! so tests can exercise each in turn.

use storage::map::AreaHandle;
use storage::Flash;

use crate::error::{BootResult, Error};

pub mod scratch;

#[cfg(feature = "swap-move")]
pub mod mov;

#[cfg(feature = "overwrite-only")]
pub mod overwrite;

#[cfg(any(feature = "direct-xip", feature = "ram-load"))]
pub mod direct_xip;

/// Per-sector progress, encoded into a `swap_status` byte. `0xff` — the
/// trailer's own "unset" sentinel — doubles as `Untouched`, so a sector
/// that was never reached on a prior attempt needs no extra marker.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SectorState {
    Untouched,
    PrimaryInScratch,
    SecondaryInPrimary,
    ScratchInSecondary,
}

impl SectorState {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => SectorState::PrimaryInScratch,
            2 => SectorState::SecondaryInPrimary,
            3 => SectorState::ScratchInSecondary,
            _ => SectorState::Untouched,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            SectorState::Untouched => 0xff,
            SectorState::PrimaryInScratch => 1,
            SectorState::SecondaryInPrimary => 2,
            SectorState::ScratchInSecondary => 3,
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, SectorState::ScratchInSecondary)
    }
}

/// Copy `len` bytes from `src`/`src_off` to `dst`/`dst_off`, `buf.len()` at
/// a time. Used for every sector move regardless of strategy; when a
/// sector is larger than the working buffer this is the "chunking" spec
/// §4.6 calls for — resumption granularity stays per-sector, the chunking
/// only bounds how much RAM one copy pass needs.
pub(crate) fn copy_region<'a, F: Flash>(
    src: &AreaHandle<'a, F>,
    src_off: usize,
    dst: &AreaHandle<'a, F>,
    dst_off: usize,
    len: usize,
    buf: &mut [u8],
    mut watchdog: impl FnMut(),
) -> BootResult<()> {
    let mut done = 0;
    while done < len {
        let chunk = buf.len().min(len - done);
        src.read(src_off + done, &mut buf[..chunk])?;
        dst.write(dst_off + done, &buf[..chunk])?;
        done += chunk;
        watchdog();
    }
    Ok(())
}

/// A sector a strategy couldn't make sense of on resume: neither the
/// erase/copy it expected to have completed, nor a state it recognizes.
pub(crate) fn corrupt<T>() -> BootResult<T> {
    Err(Error::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_state_roundtrip() {
        for s in [
            SectorState::Untouched,
            SectorState::PrimaryInScratch,
            SectorState::SecondaryInPrimary,
            SectorState::ScratchInSecondary,
        ] {
            assert_eq!(SectorState::from_byte(s.to_byte()), s);
        }
        assert!(SectorState::ScratchInSecondary.is_done());
        assert!(!SectorState::Untouched.is_done());
    }
}
