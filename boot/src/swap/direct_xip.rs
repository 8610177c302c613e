//! Direct-XIP and RAM-load: no-copy strategies (spec §4.6).
//!
//! Neither strategy moves flash around. The selector ranks the two slots
//! by version and picks the highest-valid one; "revert" is then just
//! toggling which slot is preferred next boot, recorded the same way a
//! swap-capable strategy records a pending test (trailer `swap_info`).
//! Direct-XIP executes the chosen slot's image in place; RAM-load copies
//! it once into RAM first — the selection logic is identical, only what
//! `BootContext::launch` does with the result differs.

use crate::image::ImageVersion;

/// One slot's candidacy: its parsed version and the security-counter
/// value carried by its `SEC_CNT` TLV, already read by the caller (the
/// verifier owns TLV access; this module only ranks what it's given).
#[derive(Debug, Copy, Clone)]
pub struct Candidate {
    pub slot: u8,
    pub version: ImageVersion,
    pub security_counter: u32,
}

/// Pick the highest-version valid candidate. Ties prefer `preferred_slot`
/// (the slot the last boot's toggle favored) so an unrelated rebuild with
/// an identical version doesn't flip execution.
pub fn select(candidates: &[Candidate], preferred_slot: u8) -> Option<Candidate> {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| {
            a.version.cmp_for_upgrade(&b.version).then_with(|| {
                // Ties broken towards the preferred slot.
                (a.slot == preferred_slot).cmp(&(b.slot == preferred_slot))
            })
        })
}

/// The security counter is advanced to the selected candidate's value at
/// *selection* time, not at confirmation: direct-XIP never "commits" a
/// swap the way scratch/move-swap do by setting `image_ok`, so selection
/// is the only durable checkpoint available to prevent a downgrade on the
/// next reset from re-selecting an older, already-superseded image.
pub fn counter_to_persist(selected: &Candidate, current: u32) -> Option<u32> {
    if selected.security_counter > current {
        Some(selected.security_counter)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u8) -> ImageVersion {
        ImageVersion { major, minor: 0, revision: 0, build_num: 0 }
    }

    #[test]
    fn picks_highest_version() {
        let candidates = [
            Candidate { slot: 0, version: v(1), security_counter: 1 },
            Candidate { slot: 1, version: v(2), security_counter: 2 },
        ];
        let chosen = select(&candidates, 0).unwrap();
        assert_eq!(chosen.slot, 1);
    }

    #[test]
    fn ties_prefer_preferred_slot() {
        let candidates = [
            Candidate { slot: 0, version: v(1), security_counter: 1 },
            Candidate { slot: 1, version: v(1), security_counter: 1 },
        ];
        assert_eq!(select(&candidates, 1).unwrap().slot, 1);
        assert_eq!(select(&candidates, 0).unwrap().slot, 0);
    }

    #[test]
    fn counter_only_advances_forward() {
        let c = Candidate { slot: 0, version: v(1), security_counter: 5 };
        assert_eq!(counter_to_persist(&c, 4), Some(5));
        assert_eq!(counter_to_persist(&c, 5), None);
    }
}
