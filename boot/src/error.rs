//! The error taxonomy (spec §7). Propagated as tagged results, never via
//! panics or exceptions; only `assert!` guards compile-time-checkable
//! invariants (alignment powers of two, and the like), matching the
//! teacher's `status.rs` style.

/// Every failure mode the core can report, generic over the underlying
/// flash device's error type the way the teacher's `image::Error<E>`
/// already was.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error<E> {
    /// The underlying read/write/erase failed. Usually fatal at the call
    /// site, but a swap resume may still recover via the opposite slot.
    FlashIO(E),
    /// Header magic, size, or TLV structure invalid.
    BadImage,
    /// Signature check failed.
    BadSignature,
    /// Hash didn't match the TLV-borne digest.
    BadHash,
    /// Candidate's security counter would be a downgrade.
    BadSecurityCounter,
    /// A `DEPENDENCY` TLV referenced an image/version not present.
    UnsatisfiedDependency,
    /// Compile-time/layout inconsistency discovered at runtime (e.g. an
    /// area's sector count exceeds `MAX_IMG_SECTORS`).
    BadFlashMap,
    /// After all fallbacks, nothing is bootable.
    NoBootableImage,
    /// Trailer/swap-status combination cannot be reconciled.
    Corrupt,
}

impl From<storage::Error> for Error<storage::Error> {
    fn from(e: storage::Error) -> Self {
        Error::FlashIO(e)
    }
}

/// Convenience alias matching the teacher's `type Result<T, E>` shape in
/// `image.rs`.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Every flash area in this workspace is backed by `storage::Flash`, whose
/// error type is the fixed `storage::Error` (unlike the teacher's
/// `embedded_storage`-generic version) — this is the result type used
/// pervasively once a flash operation is in the picture.
pub type BootResult<T> = Result<T, storage::Error>;
