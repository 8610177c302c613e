//! Boot selector (spec §4.7).
//!
//! Consumes both slots' trailers (already read into [`TrailerFields`]) and
//! decides what to do before a single byte of flash is copied: whether to
//! run a swap, resume one, revert a tentative upgrade, or just boot the
//! primary as-is.

use crate::trailer::{FieldState, TrailerFields};

/// What the selector decided to do, before verification runs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Decision {
    /// Boot primary unchanged; no swap involved.
    BootPrimary,
    /// `BOOTSTRAP` is enabled and primary is invalid/absent — treat
    /// secondary as the pending candidate.
    Bootstrap,
    /// Primary is unset and secondary carries a pending test image.
    SwapTest,
    /// `copy_done` is unset on an already-started swap — finish it.
    ResumeSwap,
    /// Primary booted once unconfirmed — undo it.
    Revert,
}

fn magic_field(present: bool) -> FieldState {
    if present {
        FieldState::Set
    } else {
        FieldState::Unset
    }
}

/// Spec §4.7's decision table, generalized only in that `bootstrap`
/// gating is an explicit argument rather than a `cfg!()` inside the
/// function — callers decide once per boot, not per call.
pub fn decide(primary: &TrailerFields, secondary: &TrailerFields, bootstrap_enabled: bool) -> Decision {
    let primary_magic = magic_field(primary.magic_present);
    let secondary_magic = magic_field(secondary.magic_present);

    match (primary_magic, secondary_magic) {
        (FieldState::Unset, FieldState::Unset) => {
            if bootstrap_enabled {
                Decision::Bootstrap
            } else {
                Decision::BootPrimary
            }
        }
        (FieldState::Unset, FieldState::Set) => Decision::SwapTest,
        (FieldState::Set, FieldState::Set) if !primary.copy_done => Decision::ResumeSwap,
        (FieldState::Set, _) if primary.copy_done && primary.image_ok => Decision::BootPrimary,
        (FieldState::Set, _) if primary.copy_done && !primary.image_ok => Decision::Revert,
        _ => Decision::BootPrimary,
    }
}

/// Downgrade prevention (spec §4.6's final paragraph): a candidate must
/// not regress version or security counter against what's already primary.
/// Version may tie; the counter may not.
pub fn allows_upgrade(
    candidate_version: &crate::image::ImageVersion,
    candidate_counter: u32,
    current_version: &crate::image::ImageVersion,
    current_counter: u32,
) -> bool {
    use core::cmp::Ordering;
    match candidate_version.cmp_for_upgrade(current_version) {
        Ordering::Less => false,
        Ordering::Equal => candidate_counter >= current_counter,
        Ordering::Greater => candidate_counter >= current_counter,
    }
}

/// One image's provisional verification result, carrying what the second
/// dependency-resolution pass needs: its own (image_index, version) and
/// what it depends on.
pub struct Provisional {
    pub image_index: u8,
    pub version: crate::image::ImageVersion,
    pub dependencies: heapless::Vec<(u8, crate::image::ImageVersion), 4>,
}

/// Spec §4.3 step 6: resolve `DEPENDENCY` TLVs across every provisionally
/// verified image at once. Returns, in input order, whether each image
/// survives — `false` means its dependency wasn't met and it's demoted to
/// `NONE` (the caller then treats that slot as if verification failed).
///
/// A dependency on an image index not present among `booting` — i.e. that
/// image isn't part of this boot at all — also fails to resolve, since
/// there is no "currently-booting slot" to compare against.
pub fn resolve_dependencies(booting: &[Provisional]) -> heapless::Vec<bool, 4> {
    let mut ok: heapless::Vec<bool, 4> = heapless::Vec::new();
    for candidate in booting {
        let mut satisfied = true;
        for &(dep_index, dep_version) in &candidate.dependencies {
            let found = booting
                .iter()
                .find(|p| p.image_index == dep_index)
                .map(|p| p.version.cmp_for_upgrade(&dep_version) != core::cmp::Ordering::Less)
                .unwrap_or(false);
            if !found {
                satisfied = false;
                break;
            }
        }
        let _ = ok.push(satisfied);
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trailer::TrailerFields;

    fn fields(magic: bool, copy_done: bool, image_ok: bool) -> TrailerFields {
        let mut f = TrailerFields::empty(4);
        f.magic_present = magic;
        f.copy_done = copy_done;
        f.image_ok = image_ok;
        f
    }

    #[test]
    fn first_boot_with_no_images_boots_primary() {
        let p = fields(false, false, false);
        let s = fields(false, false, false);
        assert_eq!(decide(&p, &s, false), Decision::BootPrimary);
    }

    #[test]
    fn bootstrap_enabled_on_empty_primary() {
        let p = fields(false, false, false);
        let s = fields(false, false, false);
        assert_eq!(decide(&p, &s, true), Decision::Bootstrap);
    }

    #[test]
    fn pending_secondary_triggers_swap_test() {
        let p = fields(false, false, false);
        let s = fields(true, false, false);
        assert_eq!(decide(&p, &s, false), Decision::SwapTest);
    }

    #[test]
    fn unconfirmed_primary_reverts() {
        let p = fields(true, true, false);
        let s = fields(false, false, false);
        assert_eq!(decide(&p, &s, false), Decision::Revert);
    }

    #[test]
    fn confirmed_primary_boots_clean() {
        let p = fields(true, true, true);
        let s = fields(false, false, false);
        assert_eq!(decide(&p, &s, false), Decision::BootPrimary);
    }

    #[test]
    fn interrupted_swap_resumes() {
        let p = fields(true, false, false);
        let s = fields(true, false, false);
        assert_eq!(decide(&p, &s, false), Decision::ResumeSwap);
    }

    #[test]
    fn dependency_on_absent_image_fails() {
        use crate::image::ImageVersion;
        let v = ImageVersion { major: 1, minor: 0, revision: 0, build_num: 0 };
        let mut deps = heapless::Vec::new();
        let _ = deps.push((9u8, v));
        let booting = [Provisional { image_index: 0, version: v, dependencies: deps }];
        assert_eq!(resolve_dependencies(&booting).as_slice(), [false]);
    }

    #[test]
    fn dependency_satisfied_by_peer_image() {
        use crate::image::ImageVersion;
        let low = ImageVersion { major: 1, minor: 0, revision: 0, build_num: 0 };
        let high = ImageVersion { major: 2, minor: 0, revision: 0, build_num: 0 };
        let mut deps = heapless::Vec::new();
        let _ = deps.push((1u8, low));
        let booting = [
            Provisional { image_index: 0, version: high, dependencies: deps },
            Provisional { image_index: 1, version: high, dependencies: heapless::Vec::new() },
        ];
        assert_eq!(resolve_dependencies(&booting).as_slice(), [true, true]);
    }
}
