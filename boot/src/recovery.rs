//! Recovery protocol boundary (spec §6, "boundary reference only").
//!
//! Serial/USB transport and the CBOR framing around it are explicitly out
//! of scope (spec §1's non-goals) — this module only defines the seam the
//! core exposes to whatever does that framing: one fragment in, one
//! result out. Everything about *how* fragments arrive is the recovery
//! module's problem, not this crate's.

use crate::error::BootResult;

/// One decoded fragment of an incoming image, already stripped of its
/// CBOR envelope by the (external) transport. `sha` is the fragment's own
/// integrity check, independent of the final image's TLV digest.
pub struct Fragment<'a> {
    pub image: u8,
    pub off: u32,
    pub data: &'a [u8],
    pub sha: Option<[u8; 32]>,
}

/// Accepts successive fragments and writes them into the secondary slot
/// through the flash abstraction, erasing ahead of the write as needed
/// (spec §4.5's "progressive erase" rule — the target sector is erased on
/// the first byte landing in it, not all at once up front).
pub trait Ingest {
    fn ingest(&mut self, fragment: Fragment<'_>) -> BootResult<()>;
}

/// Writes fragments into a secondary-slot [`AreaHandle`], erasing each
/// sector the first time a fragment touches it.
pub struct SecondarySlotIngest<'h, 'a, F: storage::Flash> {
    handle: &'h storage::map::AreaHandle<'a, F>,
    erased_up_to: usize,
}

impl<'h, 'a, F: storage::Flash> SecondarySlotIngest<'h, 'a, F> {
    pub fn new(handle: &'h storage::map::AreaHandle<'a, F>) -> Self {
        SecondarySlotIngest { handle, erased_up_to: 0 }
    }
}

impl<'h, 'a, F: storage::Flash> Ingest for SecondarySlotIngest<'h, 'a, F> {
    fn ingest(&mut self, fragment: Fragment<'_>) -> BootResult<()> {
        let off = fragment.off as usize;
        let end = off + fragment.data.len();

        while self.erased_up_to < end {
            let erase_size = self.handle.erase_size();
            self.handle.erase(self.erased_up_to, erase_size)?;
            self.erased_up_to += erase_size;
        }

        self.handle.write(off, fragment.data)?;
        Ok(())
    }
}
