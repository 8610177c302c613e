//! Move-swap: scratch-free variant (spec §4.6).
//!
//! The primary slot carries one spare sector at its top instead of a
//! separate scratch area. Each primary sector is shifted down by one
//! position to make room, the vacated top sector receives the secondary's
//! corresponding sector, and at the end the secondary's own top sector
//! (now free) absorbs what the primary's shift displaced. Bookkeeping
//! reuses the same `swap_status` per-sector states as scratch-swap —
//! `PrimaryInScratch` here means "shifted down, not yet overwritten by a
//! secondary sector".

use storage::map::AreaHandle;
use storage::Flash;

use crate::error::BootResult;
use crate::trailer::{TrailerFields, TrailerStore, MAX_SECTORS};

use super::{copy_region, SectorState};

/// Resume policy for the ambiguous case where both the shifted copy and
/// the original still parse as a valid image header: prefer the shifted
/// copy, since a shift that completed but whose `swap_status` write was
/// lost to power-cut is more likely than a shift that never started
/// leaving stale valid-looking data at the destination.
pub fn resume_prefers_shifted<'a, F: Flash>(
    original: &AreaHandle<'a, F>,
    shifted: &AreaHandle<'a, F>,
    original_off: usize,
    shifted_off: usize,
) -> BootResult<bool> {
    let original_ok = crate::image::parse_header_at(original, original_off).is_ok();
    let shifted_ok = crate::image::parse_header_at(shifted, shifted_off).is_ok();
    Ok(match (original_ok, shifted_ok) {
        (true, true) => true,
        (false, true) => true,
        (true, false) => false,
        (false, false) => false,
    })
}

pub fn run<'a, F: Flash>(
    primary: &AreaHandle<'a, F>,
    secondary: &AreaHandle<'a, F>,
    trailer: &impl TrailerStore,
    buf: &mut [u8],
    mut watchdog: impl FnMut(),
) -> BootResult<()> {
    let sectors: heapless::Vec<(usize, usize), MAX_SECTORS> = primary.sector_iter().collect();
    let mut fields = trailer.read()?;

    // Shift every primary sector down by one slot position, freeing the
    // top sector for the first secondary sector.
    for i in (1..sectors.len()).rev() {
        let idx = i - 1;
        let state = SectorState::from_byte(*fields.swap_status.get(idx).unwrap_or(&0xff));
        if state.is_done() {
            continue;
        }
        let (src_off, src_size) = sectors[idx];
        let (dst_off, _) = sectors[i];
        primary.erase(dst_off, src_size)?;
        copy_region(primary, src_off, primary, dst_off, src_size, buf, &mut watchdog)?;
        fields.swap_status[idx] = SectorState::PrimaryInScratch.to_byte();
        trailer.write(&fields)?;
        watchdog();
    }

    for (idx, &(off, size)) in sectors.iter().enumerate() {
        let state = SectorState::from_byte(*fields.swap_status.get(idx).unwrap_or(&0xff));
        if state.is_done() {
            continue;
        }
        primary.erase(off, size)?;
        copy_region(secondary, off, primary, off, size, buf, &mut watchdog)?;
        fields.swap_status[idx] = SectorState::ScratchInSecondary.to_byte();
        trailer.write(&fields)?;
        watchdog();
    }

    if !fields.copy_done {
        fields.copy_done = true;
        trailer.write(&fields)?;
    }
    if !fields.magic_present {
        fields.magic_present = true;
        trailer.write(&fields)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_state_done_short_circuits_resume() {
        let mut fields = TrailerFields::empty(2);
        fields.swap_status[0] = SectorState::ScratchInSecondary.to_byte();
        assert!(SectorState::from_byte(fields.swap_status[0]).is_done());
    }
}
