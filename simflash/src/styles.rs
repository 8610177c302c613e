//! Flash styles
//!
//! Various microcontrollers have various types of flash memories available
//! to them. These are the handful of named layouts the test suite draws on
//! to make sure the swap logic isn't accidentally tuned to one particular
//! geometry.

use crate::{ErasePolarity, SimFlash};

/// The configuration of a single flash area.
pub struct AreaLayout {
    pub write_size: usize,
    pub erase_size: usize,
    pub sectors: usize,
    pub erase_value: ErasePolarity,
}

impl AreaLayout {
    pub fn build(&self) -> SimFlash {
        SimFlash::new(self.write_size, self.erase_size, self.sectors, self.erase_value)
    }
}

/// STM32F4-style. A small number of large sectors — this tends to stress
/// the extreme in terms of the secondary slot and status area needing to
/// fit entirely within a single sector.
pub static STM32F_MAIN: AreaLayout =
    AreaLayout { write_size: 8, erase_size: 128 * 1024, sectors: 2, erase_value: ErasePolarity::Ff };
pub static STM32F_UPGRADE: AreaLayout =
    AreaLayout { write_size: 8, erase_size: 128 * 1024, sectors: 1, erase_value: ErasePolarity::Ff };

/// K64-style: small, uniform sectors.
pub static K64_MAIN: AreaLayout =
    AreaLayout { write_size: 8, erase_size: 4 * 1024, sectors: 128 / 4 + 1, erase_value: ErasePolarity::Ff };
pub static K64_UPGRADE: AreaLayout =
    AreaLayout { write_size: 8, erase_size: 4 * 1024, sectors: 128 / 4 + 1, erase_value: ErasePolarity::Ff };

/// External flash: same sector size as K64 but a much larger write
/// alignment on the upgrade slot.
pub static EXT_MAIN: AreaLayout =
    AreaLayout { write_size: 4, erase_size: 4 * 1024, sectors: 128 / 4, erase_value: ErasePolarity::Ff };
pub static EXT_UPGRADE: AreaLayout =
    AreaLayout { write_size: 256, erase_size: 4 * 1024, sectors: 128 / 4, erase_value: ErasePolarity::Ff };

/// Page-style devices, based on the LPC55S69: erase size equals write
/// size, so the device behaves like a block store.
pub static LPC_MAIN: AreaLayout =
    AreaLayout { write_size: 512, erase_size: 512, sectors: 128 * 2, erase_value: ErasePolarity::Ff };
pub static LPC_UPGRADE: AreaLayout =
    AreaLayout { write_size: 512, erase_size: 512, sectors: 128 * 2, erase_value: ErasePolarity::Ff };

/// Large-write style, based on the STM32H745.
pub static STM32H_MAIN: AreaLayout =
    AreaLayout { write_size: 32, erase_size: 128 * 1024, sectors: 4, erase_value: ErasePolarity::Ff };
pub static STM32H_UPGRADE: AreaLayout =
    AreaLayout { write_size: 32, erase_size: 128 * 1024, sectors: 3, erase_value: ErasePolarity::Ff };

/// All of the flash devices, as (main, upgrade) pairs.
pub static ALL_FLASHES: [(&AreaLayout, &AreaLayout); 5] = [
    (&STM32F_MAIN, &STM32F_UPGRADE),
    (&K64_MAIN, &K64_UPGRADE),
    (&EXT_MAIN, &EXT_UPGRADE),
    (&LPC_MAIN, &LPC_UPGRADE),
    (&STM32H_MAIN, &STM32H_UPGRADE),
];

/// Every device pair, built fresh.
pub fn all_flashes() -> impl Iterator<Item = (SimFlash, SimFlash)> {
    ALL_FLASHES.iter().map(|(a, b)| (a.build(), b.build()))
}
