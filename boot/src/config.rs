//! Compile-time configuration (spec §9; grounded in
//! `examples/original_source/boot/bootutil/src/caps.c`'s `MCUBOOT_*`
//! switches, expressed as Cargo features rather than a C preprocessor
//! capability bitmask).

/// Bits mirroring `bootutil_get_caps()`'s return value — a runtime-queryable
/// summary of which compile-time switches this build carries, for hosts
/// (CLI tooling, tests) that want to branch on it without `cfg!()` at every
/// call site.
pub mod caps {
    pub const SWAP_SCRATCH: u32 = 1 << 0;
    pub const SWAP_MOVE: u32 = 1 << 1;
    pub const OVERWRITE_ONLY: u32 = 1 << 2;
    pub const DIRECT_XIP: u32 = 1 << 3;
    pub const RAM_LOAD: u32 = 1 << 4;
    pub const VALIDATE_PRIMARY: u32 = 1 << 5;
    pub const DOWNGRADE_PREVENTION: u32 = 1 << 6;
    pub const BOOTSTRAP: u32 = 1 << 7;
    pub const HW_ROLLBACK_PROT: u32 = 1 << 8;
    pub const VERSION_CMP_BUILD_NUMBER: u32 = 1 << 9;
    pub const HW_KEY: u32 = 1 << 10;
    pub const ENCRYPTION: u32 = 1 << 11;
    pub const EXTERNAL_SWAP_STATUS: u32 = 1 << 12;
}

/// The bitmask for this build, computed from which features were enabled
/// at compile time.
pub fn get_caps() -> u32 {
    let mut c = 0;
    if cfg!(feature = "swap-scratch") {
        c |= caps::SWAP_SCRATCH;
    }
    if cfg!(feature = "swap-move") {
        c |= caps::SWAP_MOVE;
    }
    if cfg!(feature = "overwrite-only") {
        c |= caps::OVERWRITE_ONLY;
    }
    if cfg!(feature = "direct-xip") {
        c |= caps::DIRECT_XIP;
    }
    if cfg!(feature = "ram-load") {
        c |= caps::RAM_LOAD;
    }
    if cfg!(feature = "validate-primary") {
        c |= caps::VALIDATE_PRIMARY;
    }
    if cfg!(feature = "downgrade-prevention") {
        c |= caps::DOWNGRADE_PREVENTION;
    }
    if cfg!(feature = "bootstrap") {
        c |= caps::BOOTSTRAP;
    }
    if cfg!(feature = "hw-rollback-prot") {
        c |= caps::HW_ROLLBACK_PROT;
    }
    if cfg!(feature = "version-cmp-build-number") {
        c |= caps::VERSION_CMP_BUILD_NUMBER;
    }
    if cfg!(feature = "hw-key") {
        c |= caps::HW_KEY;
    }
    if cfg!(feature = "encryption") {
        c |= caps::ENCRYPTION;
    }
    if cfg!(feature = "external-swap-status") {
        c |= caps::EXTERNAL_SWAP_STATUS;
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_reflect_default_features() {
        let c = get_caps();
        assert_ne!(c & caps::SWAP_SCRATCH, 0);
        assert_ne!(c & caps::DOWNGRADE_PREVENTION, 0);
    }
}
