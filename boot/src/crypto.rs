//! Cryptographic boundary (spec §4.3, §6).
//!
//! The verifier never calls into a crypto library directly — it drives a
//! `Crypto` trait object supplied by `BootContext`, the same seam
//! `loadstone`'s `Bootloader` leaves for its flash/serial devices and the
//! teacher's board crates leave for logging. This keeps the core buildable
//! without pulling any crypto crate in by default, and lets a board swap in
//! a hardware crypto engine without touching `verify.rs`.

use crate::image::TlvType;

/// One supported key/signature scheme. Mirrors the `TlvType` signature and
/// key-hash variants the verifier needs to dispatch on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SigAlg {
    EcdsaP256,
    Ed25519,
    Rsa2048Pss,
    Rsa3072Pss,
}

/// Everything the verifier asks of the platform's crypto backend. All
/// methods take pre-sliced byte buffers and return a bare success/failure —
/// no allocation, no owned key material crossing the boundary.
pub trait Crypto {
    /// SHA-256 of `data`, written into `out[..32]`.
    fn sha256(&self, data: &[u8], out: &mut [u8; 32]);

    /// Compare a candidate `KEYHASH` TLV value against this platform's
    /// configured root-of-trust key hash(es). Returns the matching key's
    /// index if the candidate is accepted (spec §4.3's "KEYHASH selects a
    /// root key" step), else `None`.
    fn accept_key_hash(&self, hash: &[u8]) -> Option<u8>;

    /// Verify `sig` over `digest` using the key `accept_key_hash` already
    /// selected, for the given scheme. The key never leaves the backend —
    /// the verifier only ever carries an index.
    fn verify_by_key(&self, alg: SigAlg, key_index: u8, digest: &[u8; 32], sig: &[u8]) -> bool;

    /// Unwrap a TLV-carried content-encryption key using this platform's
    /// key-encryption key. `alg` names which `ENC*` TLV produced `wrapped`.
    /// Returns the unwrapped CEK length on success.
    fn unwrap_cek(&self, alg: TlvType, wrapped: &[u8], out: &mut [u8; 32]) -> Option<usize>;
}

/// Reference backend built from RustCrypto crates, enabled by the
/// `software` feature. Exists for host-side tests and tooling; no board in
/// this workspace builds with it enabled by default, mirroring how the
/// teacher's board crates gate `defmt`/`semihosting` logging shims behind
/// features rather than compiling both in.
#[cfg(feature = "software")]
pub mod software {
    use super::{Crypto, SigAlg};
    use crate::image::TlvType;

    use ecdsa::signature::Verifier;
    use sha2::{Digest, Sha256};

    /// Root keys this backend trusts, identified by the SHA-256 of their
    /// encoded form (the same digest a `KEYHASH` TLV carries).
    pub struct SoftwareCrypto<'k> {
        pub ecdsa_p256_keys: &'k [(&'k [u8; 32], p256::ecdsa::VerifyingKey)],
        pub ed25519_keys: &'k [(&'k [u8; 32], ed25519_dalek::VerifyingKey)],
        pub kek: Option<&'k [u8]>,
    }

    impl<'k> Crypto for SoftwareCrypto<'k> {
        fn sha256(&self, data: &[u8], out: &mut [u8; 32]) {
            let digest = Sha256::digest(data);
            out.copy_from_slice(&digest);
        }

        fn accept_key_hash(&self, hash: &[u8]) -> Option<u8> {
            if hash.len() != 32 {
                return None;
            }
            for (i, (h, _)) in self.ecdsa_p256_keys.iter().enumerate() {
                if h.as_slice() == hash {
                    return Some(i as u8);
                }
            }
            for (i, (h, _)) in self.ed25519_keys.iter().enumerate() {
                if h.as_slice() == hash {
                    return Some((self.ecdsa_p256_keys.len() + i) as u8);
                }
            }
            None
        }

        fn verify_by_key(&self, alg: SigAlg, key_index: u8, digest: &[u8; 32], sig: &[u8]) -> bool {
            let idx = key_index as usize;
            match alg {
                SigAlg::EcdsaP256 => {
                    let Some((_, key)) = self.ecdsa_p256_keys.get(idx) else {
                        return false;
                    };
                    let Ok(sig) = p256::ecdsa::Signature::from_der(sig)
                        .or_else(|_| p256::ecdsa::Signature::from_slice(sig))
                    else {
                        return false;
                    };
                    key.verify(digest, &sig).is_ok()
                }
                SigAlg::Ed25519 => {
                    let ed_idx = idx.wrapping_sub(self.ecdsa_p256_keys.len());
                    let Some((_, key)) = self.ed25519_keys.get(ed_idx) else {
                        return false;
                    };
                    let Ok(sig_bytes): Result<[u8; 64], _> = sig.try_into() else {
                        return false;
                    };
                    key.verify_strict(digest, &ed25519_dalek::Signature::from_bytes(&sig_bytes)).is_ok()
                }
                SigAlg::Rsa2048Pss | SigAlg::Rsa3072Pss => {
                    // RSA-PSS verification needs the full public key, not
                    // just a key-hash match; deferred until a board
                    // actually ships an RSA root key.
                    false
                }
            }
        }

        fn unwrap_cek(&self, alg: TlvType, wrapped: &[u8], out: &mut [u8; 32]) -> Option<usize> {
            use aes_kw::Kek;

            let kek = self.kek?;
            match alg {
                TlvType::EncKw => {
                    let kek = Kek::<aes::Aes256>::try_from(kek).ok()?;
                    let mut unwrapped = [0u8; 40];
                    kek.unwrap(wrapped, &mut unwrapped[..wrapped.len() - 8]).ok()?;
                    let len = wrapped.len() - 8;
                    out[..len].copy_from_slice(&unwrapped[..len]);
                    Some(len)
                }
                TlvType::EncRsa | TlvType::EncEc256 | TlvType::EncX25519 => {
                    // RSA-OAEP and ECIES unwrap need the board's private
                    // key material, which this host-side reference
                    // backend doesn't carry; boards needing these wire
                    // their own `Crypto` impl instead.
                    None
                }
                _ => None,
            }
        }
    }
}

#[cfg(all(test, feature = "software"))]
mod tests {
    use super::software::SoftwareCrypto;
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        let backend = SoftwareCrypto { ecdsa_p256_keys: &[], ed25519_keys: &[], kek: None };
        let mut out = [0u8; 32];
        backend.sha256(b"abc", &mut out);
        assert_eq!(
            out,
            [
                0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
                0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
                0xf2, 0x00, 0x15, 0xad,
            ]
        );
    }
}
