//! Per-image AES-CTR encryption (spec §4.4).
//!
//! An encrypted image carries its content-encryption key (CEK) wrapped in
//! an `ENC*` TLV; `crypto::Crypto::unwrap_cek` recovers the clear CEK using
//! the platform's key-encryption key. From there the keystream is plain
//! AES-128/256-CTR over the image payload, counted in flash-read order
//! starting at the first byte past the header. The CEK is cached in the
//! trailer (`enc_key_0`/`enc_key_1`) across reboots, since unwrap may not be
//! idempotent (an RSA-OAEP unwrap, say, need not be deterministic-safe to
//! repeat against hardware key stores) and a mid-swap reset must resume
//! without re-unwrapping.

use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;

use crate::error::BootResult;

/// AES-128 or AES-256, selected by which `ENCRYPTED_*` header flag is set.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CekWidth {
    Aes128,
    Aes256,
}

impl CekWidth {
    pub fn key_len(self) -> usize {
        match self {
            CekWidth::Aes128 => 16,
            CekWidth::Aes256 => 32,
        }
    }
}

/// A running AES-CTR keystream over one image's payload. `skip_to` reseeks
/// the counter rather than buffering discarded bytes, so resuming a
/// part-copied image after reset costs one seek, not a re-read from the
/// start.
pub enum Keystream {
    Aes128(Ctr128BE<aes::Aes128>),
    Aes256(Ctr128BE<aes::Aes256>),
}

impl Keystream {
    /// `nonce` is the 16-byte big-endian counter block; by convention here
    /// it starts at zero and counts whole AES blocks of plaintext offset
    /// from the first byte after the image header, matching the layout the
    /// verifier already walks in `image.rs`.
    pub fn new(width: CekWidth, cek: &[u8], nonce: &[u8; 16]) -> Self {
        match width {
            CekWidth::Aes128 => {
                Keystream::Aes128(Ctr128BE::<aes::Aes128>::new(cek.into(), nonce.into()))
            }
            CekWidth::Aes256 => {
                Keystream::Aes256(Ctr128BE::<aes::Aes256>::new(cek.into(), nonce.into()))
            }
        }
    }

    pub fn apply(&mut self, buf: &mut [u8]) {
        match self {
            Keystream::Aes128(c) => c.apply_keystream(buf),
            Keystream::Aes256(c) => c.apply_keystream(buf),
        }
    }

    /// Seek to the AES block containing plaintext byte offset `pos`.
    pub fn seek(&mut self, pos: u64) {
        match self {
            Keystream::Aes128(c) => c.seek(pos),
            Keystream::Aes256(c) => c.seek(pos),
        }
    }
}

/// Unwrap a TLV-carried CEK and cache it in the trailer so a reset mid-swap
/// doesn't have to ask the platform to unwrap twice.
pub fn unwrap_and_cache<'h, 'a, F: storage::Flash, C: crate::crypto::Crypto>(
    crypto: &C,
    alg: crate::image::TlvType,
    wrapped: &[u8],
    trailer: &crate::trailer::InSlotTrailer<'h, 'a, F>,
    slot: u8,
) -> BootResult<[u8; 32]> {
    let mut cek = [0u8; 32];
    match trailer.enc_key(slot, &mut cek)? {
        crate::trailer::FieldState::Set => Ok(cek),
        _ => {
            let len = crypto.unwrap_cek(alg, wrapped, &mut cek).ok_or(crate::error::Error::BadImage)?;
            trailer.write_enc_key(slot, &cek[..len])?;
            Ok(cek)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystream_seek_matches_sequential_apply() {
        let key = [0x42u8; 16];
        let nonce = [0u8; 16];

        let mut sequential = Keystream::new(CekWidth::Aes128, &key, &nonce);
        let mut buf_seq = [0xAAu8; 64];
        sequential.apply(&mut buf_seq);

        let mut seeking = Keystream::new(CekWidth::Aes128, &key, &nonce);
        let mut tail = [0xAAu8; 32];
        seeking.seek(32);
        seeking.apply(&mut tail);

        assert_eq!(&buf_seq[32..], &tail[..]);
    }
}
