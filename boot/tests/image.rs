//! End-to-end image verification against a simulated primary slot.

#![cfg(feature = "software")]

use std::cell::RefCell;

use boot::crypto::software::SoftwareCrypto;
use boot::verify;
use simflash::gen::{self, ImageRequest};
use storage::map::{AreaGeometry, AreaId, ErasePolarity, FlashMap};

#[test]
fn signed_image_verifies_against_its_key_hash() {
    let key = gen::signing_key_from_seed(3);
    let key_hash = gen::verifying_key_hash(&key);
    let verifying_key = key.verifying_key();

    let req = ImageRequest { signing_key: Some(&key), security_counter: Some(1), ..Default::default() };
    let bytes = gen::build_image(&req);

    for (mut main, _upgrade) in simflash::styles::all_flashes() {
        main.install(&bytes, 0);
        let cell = RefCell::new(main);

        let mut map = FlashMap::new();
        map.register(
            AreaGeometry {
                id: AreaId::Primary(0),
                device_id: 0,
                base_offset: 0,
                size: bytes.len(),
                erase_size: bytes.len(),
                erase_value: ErasePolarity::Ff,
                write_alignment: 1,
            },
            &cell,
        )
        .unwrap();
        let handle = map.open(AreaId::Primary(0)).unwrap();

        let crypto = SoftwareCrypto {
            ecdsa_p256_keys: &[],
            ed25519_keys: &[(&key_hash, verifying_key)],
            kek: None,
        };

        let verified = verify::verify(&handle, &crypto, None).unwrap();
        assert_eq!(verified.security_counter, 1);
    }
}

#[test]
fn tampered_payload_fails_verification() {
    let key = gen::signing_key_from_seed(9);
    let key_hash = gen::verifying_key_hash(&key);
    let verifying_key = key.verifying_key();

    let req = ImageRequest { signing_key: Some(&key), ..Default::default() };
    let mut bytes = gen::build_image(&req);
    // Flip a payload byte after signing; the hash TLV no longer matches.
    let hdr_len = core::mem::size_of::<boot::image::ImageHeader>();
    bytes[hdr_len] ^= 0xff;

    let mut flash = simflash::SimFlash::new(1, bytes.len(), 1, simflash::ErasePolarity::Ff);
    flash.install(&bytes, 0);
    let cell = RefCell::new(flash);

    let mut map = FlashMap::new();
    map.register(
        AreaGeometry {
            id: AreaId::Primary(0),
            device_id: 0,
            base_offset: 0,
            size: bytes.len(),
            erase_size: bytes.len(),
            erase_value: ErasePolarity::Ff,
            write_alignment: 1,
        },
        &cell,
    )
    .unwrap();
    let handle = map.open(AreaId::Primary(0)).unwrap();

    let crypto = SoftwareCrypto { ecdsa_p256_keys: &[], ed25519_keys: &[(&key_hash, verifying_key)], kek: None };

    assert!(verify::verify(&handle, &crypto, None).is_err());
}
