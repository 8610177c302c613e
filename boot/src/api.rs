//! Core-provided application API (spec §6, "Core-provided (for the
//! application)").
//!
//! These three calls are the only trailer-mutating operations an
//! application makes once it's running — everything else about the
//! trailer is the swap machine's own business during boot. Each is a thin
//! wrapper over [`TrailerStore`]: read the current fields, set what's
//! being asked for, write back. `TrailerStore::write` only performs the
//! writes still missing against what's already on flash, so calling any of
//! these twice with the same arguments is a no-op the second time (spec
//! §8.5).

use crate::error::BootResult;
use crate::trailer::{SwapType, TrailerStore};

/// A read-only snapshot of one slot's trailer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrailerView {
    pub swap_type: SwapType,
    pub copy_done: bool,
    pub image_ok: bool,
    pub magic_present: bool,
}

/// Stage the image currently in the secondary slot for the next boot:
/// write its trailer magic, and `image_ok` too when `permanent` (spec §6:
/// "write secondary trailer magic (and `image_ok` if permanent)").
pub fn boot_set_pending(secondary: &impl TrailerStore, permanent: bool) -> BootResult<()> {
    let mut fields = secondary.read()?;
    fields.magic_present = true;
    if permanent {
        fields.image_ok = true;
    }
    secondary.write(&fields)
}

/// Spec §6 names this alongside `boot_set_pending` with no behavior of its
/// own described beyond it — same "stage an upgrade" action under the name
/// an application calls when it's the one requesting the swap rather than
/// the bootloader defaulting to test mode.
pub fn boot_request_upgrade(secondary: &impl TrailerStore, permanent: bool) -> BootResult<()> {
    boot_set_pending(secondary, permanent)
}

/// Confirm the image currently booted from the primary slot: write its
/// `image_ok` flag, so the next reset neither reverts nor re-enters test
/// mode (spec §8.4's round-trip: stage, boot, confirm → `image_ok=SET`).
pub fn boot_set_confirmed(primary: &impl TrailerStore) -> BootResult<()> {
    let mut fields = primary.read()?;
    fields.image_ok = true;
    primary.write(&fields)
}

/// Read a slot's current swap state without mutating anything.
pub fn boot_read_swap_state(slot: &impl TrailerStore) -> BootResult<TrailerView> {
    let fields = slot.read()?;
    Ok(TrailerView {
        swap_type: fields.swap_info.map(|(ty, _)| ty).unwrap_or(SwapType::None),
        copy_done: fields.copy_done,
        image_ok: fields.image_ok,
        magic_present: fields.magic_present,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::trailer::TrailerFields;

    struct FakeStore(RefCell<TrailerFields>);

    impl TrailerStore for FakeStore {
        fn read(&self) -> BootResult<TrailerFields> {
            Ok(self.0.borrow().clone())
        }

        fn write(&self, fields: &TrailerFields) -> BootResult<()> {
            *self.0.borrow_mut() = fields.clone();
            Ok(())
        }

        fn erase_all(&self) -> BootResult<()> {
            let sectors = self.0.borrow().swap_status.len();
            *self.0.borrow_mut() = TrailerFields::empty(sectors);
            Ok(())
        }
    }

    #[test]
    fn set_pending_is_idempotent() {
        let store = FakeStore(RefCell::new(TrailerFields::empty(4)));
        boot_set_pending(&store, true).unwrap();
        let first = store.0.borrow().clone();
        boot_set_pending(&store, true).unwrap();
        let second = store.0.borrow().clone();
        assert_eq!(first.magic_present, second.magic_present);
        assert_eq!(first.image_ok, second.image_ok);
        assert!(second.magic_present);
        assert!(second.image_ok);
    }

    #[test]
    fn set_pending_without_permanent_leaves_image_ok_unset() {
        let store = FakeStore(RefCell::new(TrailerFields::empty(4)));
        boot_set_pending(&store, false).unwrap();
        let view = boot_read_swap_state(&store).unwrap();
        assert!(view.magic_present);
        assert!(!view.image_ok);
    }

    #[test]
    fn set_confirmed_marks_image_ok() {
        let store = FakeStore(RefCell::new(TrailerFields::empty(4)));
        boot_set_confirmed(&store).unwrap();
        let view = boot_read_swap_state(&store).unwrap();
        assert!(view.image_ok);
    }

    #[test]
    fn request_upgrade_matches_set_pending() {
        let store = FakeStore(RefCell::new(TrailerFields::empty(4)));
        boot_request_upgrade(&store, false).unwrap();
        let view = boot_read_swap_state(&store).unwrap();
        assert!(view.magic_present);
        assert!(!view.image_ok);
    }

    #[test]
    fn read_swap_state_reports_pending_swap_type() {
        let mut fields = TrailerFields::empty(4);
        fields.swap_info = Some((SwapType::Test, 0));
        let store = FakeStore(RefCell::new(fields));
        let view = boot_read_swap_state(&store).unwrap();
        assert_eq!(view.swap_type, SwapType::Test);
    }
}
