//! Overwrite-only: no revert (spec §4.6).
//!
//! Erase primary, copy secondary into it, erase secondary, set
//! `image_ok`. No trailer bookkeeping beyond `image_ok` is needed since
//! there is nothing to resume into except "start over" — a reset midway
//! leaves primary partially written, which the verifier rejects on the
//! next boot, and the upgrade is simply retried from the still-intact
//! secondary.

use storage::map::AreaHandle;
use storage::Flash;

use crate::error::BootResult;
use crate::trailer::TrailerStore;

pub fn run<'a, F: Flash>(
    primary: &AreaHandle<'a, F>,
    secondary: &AreaHandle<'a, F>,
    trailer: &impl TrailerStore,
    buf: &mut [u8],
    mut watchdog: impl FnMut(),
) -> BootResult<()> {
    for (off, size) in primary.sector_iter() {
        primary.erase(off, size)?;
        super::copy_region(secondary, off, primary, off, size, buf, &mut watchdog)?;
        watchdog();
    }
    for (off, size) in secondary.sector_iter() {
        secondary.erase(off, size)?;
    }

    let mut fields = trailer.read()?;
    fields.image_ok = true;
    trailer.write(&fields)
}
