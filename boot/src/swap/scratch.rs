//! Scratch-swap: the primary strategy (spec §4.6).
//!
//! Processes sectors top-down — last sector of the slot first — since the
//! scratch area itself typically sits above the primary slot and a
//! top-down pass keeps the "hole" adjacent to where the next sector's
//! secondary copy needs to land. Each sector goes through three steps,
//! each durably recorded before the next begins:
//!
//! 1. primary\[s\] → scratch, mark `PrimaryInScratch`.
//! 2. secondary\[s\] → primary\[s\] (after erasing primary\[s\]), mark
//!    `SecondaryInPrimary`.
//! 3. scratch → secondary\[s\] (after erasing secondary\[s\]), mark
//!    `ScratchInSecondary` — the sector is now swapped.
//!
//! Resuming re-reads each sector's last recorded step and continues from
//! there; a step already marked done is never redone, since flash must
//! never be written twice without an intervening erase.

use storage::map::AreaHandle;
use storage::Flash;

use crate::error::BootResult;
use crate::trailer::{TrailerFields, TrailerStore, MAX_SECTORS};

use super::{copy_region, corrupt, SectorState};

/// Run (or resume) a full scratch-swap across every sector of the slots,
/// persisting progress through `trailer` after each step. `buf` is the
/// shared working buffer (spec §5: sized `max(hash_block, write_align,
/// scratch_chunk)`); `watchdog` is fed at least once per sector.
pub fn run<'a, F: Flash>(
    primary: &AreaHandle<'a, F>,
    secondary: &AreaHandle<'a, F>,
    scratch: &AreaHandle<'a, F>,
    trailer: &impl TrailerStore,
    buf: &mut [u8],
    mut watchdog: impl FnMut(),
) -> BootResult<()> {
    let sectors: heapless::Vec<(usize, usize), MAX_SECTORS> = primary.sector_iter().collect();
    let mut fields = trailer.read()?;

    for &(off, size) in sectors.iter().rev() {
        let idx = sectors.iter().position(|&(o, _)| o == off).unwrap();
        let state = SectorState::from_byte(*fields.swap_status.get(idx).unwrap_or(&0xff));

        match state {
            SectorState::Untouched => {
                scratch.erase(0, size.min(scratch.size()))?;
                copy_region(primary, off, scratch, 0, size, buf, &mut watchdog)?;
                record(trailer, &mut fields, idx, SectorState::PrimaryInScratch)?;
                step_secondary_to_primary(primary, secondary, off, size, buf, &mut watchdog)?;
                record(trailer, &mut fields, idx, SectorState::SecondaryInPrimary)?;
                step_scratch_to_secondary(secondary, scratch, off, size, buf, &mut watchdog)?;
                record(trailer, &mut fields, idx, SectorState::ScratchInSecondary)?;
            }
            SectorState::PrimaryInScratch => {
                step_secondary_to_primary(primary, secondary, off, size, buf, &mut watchdog)?;
                record(trailer, &mut fields, idx, SectorState::SecondaryInPrimary)?;
                step_scratch_to_secondary(secondary, scratch, off, size, buf, &mut watchdog)?;
                record(trailer, &mut fields, idx, SectorState::ScratchInSecondary)?;
            }
            SectorState::SecondaryInPrimary => {
                step_scratch_to_secondary(secondary, scratch, off, size, buf, &mut watchdog)?;
                record(trailer, &mut fields, idx, SectorState::ScratchInSecondary)?;
            }
            SectorState::ScratchInSecondary => {}
        }
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

fn step_secondary_to_primary<'a, F: Flash>(
    primary: &AreaHandle<'a, F>,
    secondary: &AreaHandle<'a, F>,
    off: usize,
    size: usize,
    buf: &mut [u8],
    watchdog: &mut impl FnMut(),
) -> BootResult<()> {
    primary.erase(off, size)?;
    copy_region(secondary, off, primary, off, size, buf, &mut *watchdog)
}

fn step_scratch_to_secondary<'a, F: Flash>(
    secondary: &AreaHandle<'a, F>,
    scratch: &AreaHandle<'a, F>,
    off: usize,
    size: usize,
    buf: &mut [u8],
    watchdog: &mut impl FnMut(),
) -> BootResult<()> {
    secondary.erase(off, size)?;
    copy_region(scratch, 0, secondary, off, size, buf, &mut *watchdog)
}

fn record(
    trailer: &impl TrailerStore,
    fields: &mut TrailerFields,
    idx: usize,
    state: SectorState,
) -> BootResult<()> {
    if idx >= fields.swap_status.len() {
        return corrupt();
    }
    fields.swap_status[idx] = state.to_byte();
    trailer.write(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trailer::TrailerFields;

    #[test]
    fn resume_skips_completed_sectors() {
        let mut fields = TrailerFields::empty(4);
        fields.swap_status[0] = SectorState::ScratchInSecondary.to_byte();
        fields.swap_status[1] = SectorState::SecondaryInPrimary.to_byte();
        fields.swap_status[2] = SectorState::PrimaryInScratch.to_byte();

        assert!(SectorState::from_byte(fields.swap_status[0]).is_done());
        assert_eq!(SectorState::from_byte(fields.swap_status[1]), SectorState::SecondaryInPrimary);
        assert_eq!(SectorState::from_byte(fields.swap_status[3]), SectorState::Untouched);
    }
}
