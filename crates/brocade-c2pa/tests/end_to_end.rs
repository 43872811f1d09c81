//! Sign/verify scenarios over a complete store.

use brocade_c2pa::{
    Assertion, ExclusionRange, Manifest, SignOptions, StatusCode, Store, all_ok,
    assertion::{LABEL_CREATIVE_WORK, LABEL_DATA_HASH, LABEL_INGREDIENT},
};
use brocade_jose::{Algorithm, Jwk};
use brocade_node::Node;

fn p256_signer() -> Jwk {
    Jwk::from_p256(&p256::SecretKey::random(&mut rand::rngs::OsRng))
}

fn sample_asset() -> Vec<u8> {
    (0u32..4096).flat_map(|i| i.to_le_bytes()).collect()
}

/// A manifest with a data-hash hard binding and a CreativeWork
fn sample_store() -> Store {
    let mut manifest = Manifest::new("urn:uuid:9f2a0cf4-21a8-4f9a-8a6e-1d2c8d9f3b11");
    manifest.add_assertion(Assertion::cbor(LABEL_DATA_HASH, Node::map()));
    let work = Node::map();
    work.put("[\"@context\"]", "https://schema.org").unwrap();
    work.put("[\"@type\"]", "CreativeWork").unwrap();
    work.put("author[0].name", "Joe Bloggs").unwrap();
    manifest.add_assertion(Assertion::json(LABEL_CREATIVE_WORK, work));

    let claim = manifest.claim().unwrap();
    claim.put("[\"dc:format\"]", "image/jpeg").unwrap();
    claim.put("instanceID", "xmp:iid:1280ffd4").unwrap();

    let mut store = Store::new();
    store.add_manifest(manifest);
    store
}

fn options(key: &Jwk) -> SignOptions {
    SignOptions::builder()
        .key(key.clone())
        .alg(Algorithm::Es256)
        .build()
}

#[test]
fn sign_then_verify_all_ok() {
    let key = p256_signer();
    let asset = sample_asset();
    let mut store = sample_store();
    store.sign(&asset, &options(&key)).expect("sign");

    // round-trip through bytes, as a consumer would see it
    let bytes = store.to_bytes().expect("encode");
    let reloaded = Store::from_bytes(&bytes).expect("decode");
    let statuses = reloaded.verify(&asset, Some(&key.public()));
    assert!(all_ok(&statuses), "unexpected failures: {statuses:?}");
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::ClaimSignatureValidated)
    );
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::AssertionDataHashMatch)
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| s.code == StatusCode::AssertionHashedUriMatch)
            .count(),
        2
    );
}

#[test]
fn tampered_assertion_flips_hashed_uri_only() {
    let key = p256_signer();
    let asset = sample_asset();
    let mut store = sample_store();
    store.sign(&asset, &options(&key)).expect("sign");
    let mut bytes = store.to_bytes().expect("encode");

    // flip a byte inside the CreativeWork JSON content
    let at = bytes
        .windows(3)
        .position(|w| w == b"Joe")
        .expect("author present");
    bytes[at] = b'Z';

    let reloaded = Store::from_bytes(&bytes).expect("decode");
    let statuses = reloaded.verify(&asset, Some(&key.public()));
    assert!(!all_ok(&statuses));
    // the assertion digest breaks
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::AssertionHashedUriMismatch)
    );
    // but the claim itself is intact, so its signature still checks
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::ClaimSignatureValidated)
    );
}

#[test]
fn tampered_asset_flips_hard_binding() {
    let key = p256_signer();
    let mut asset = sample_asset();
    let mut store = sample_store();
    store.sign(&asset, &options(&key)).expect("sign");

    asset[100] ^= 0xff;
    let statuses = store.verify(&asset, Some(&key.public()));
    assert!(!all_ok(&statuses));
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::AssertionDataHashMismatch)
    );
}

#[test]
fn tampered_claim_flips_signature() {
    let key = p256_signer();
    let asset = sample_asset();
    let mut store = sample_store();
    store.sign(&asset, &options(&key)).expect("sign");

    // mutate the claim after signing
    store
        .active_manifest()
        .unwrap()
        .claim()
        .unwrap()
        .put("claim_generator", "someone else")
        .unwrap();
    let statuses = store.verify(&asset, Some(&key.public()));
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::ClaimSignatureMismatch)
    );
}

#[test]
fn exclusion_ranges_are_skipped() {
    let key = p256_signer();
    let mut asset = sample_asset();
    let mut store = sample_store();
    let opts = SignOptions::builder()
        .key(key.clone())
        .alg(Algorithm::Es256)
        .exclusions(vec![ExclusionRange {
            start: 64,
            length: 32,
        }])
        .build();
    store.sign(&asset, &opts).expect("sign");

    // bytes inside the exclusion may change freely
    asset[70] ^= 0xff;
    assert!(all_ok(&store.verify(&asset, Some(&key.public()))));
    // bytes outside may not
    asset[200] ^= 0xff;
    assert!(!all_ok(&store.verify(&asset, Some(&key.public()))));
}

#[test]
fn signing_preconditions() {
    let key = p256_signer();
    let asset = sample_asset();

    // no hard binding
    let mut manifest = Manifest::new("urn:uuid:a");
    manifest.add_assertion(Assertion::json(LABEL_CREATIVE_WORK, Node::map()));
    manifest.claim().unwrap().put("[\"dc:format\"]", "image/jpeg").unwrap();
    manifest.claim().unwrap().put("instanceID", "xmp:iid:1").unwrap();
    let mut store = Store::new();
    store.add_manifest(manifest);
    let err = store.sign(&asset, &options(&key)).unwrap_err();
    assert!(matches!(
        err,
        brocade_c2pa::C2paError::Precondition(ref s)
            if s.code == StatusCode::ClaimHardBindingsMissing
    ));

    // two hard bindings
    let mut manifest = Manifest::new("urn:uuid:b");
    manifest.add_assertion(Assertion::cbor(LABEL_DATA_HASH, Node::map()));
    manifest.add_assertion(Assertion::cbor("c2pa.hash.bmff", Node::map()));
    manifest.claim().unwrap().put("[\"dc:format\"]", "image/jpeg").unwrap();
    manifest.claim().unwrap().put("instanceID", "xmp:iid:2").unwrap();
    let mut store = Store::new();
    store.add_manifest(manifest);
    let err = store.sign(&asset, &options(&key)).unwrap_err();
    assert!(matches!(
        err,
        brocade_c2pa::C2paError::Precondition(ref s)
            if s.code == StatusCode::AssertionMultipleHardBindings
    ));

    // missing required claim field
    let mut manifest = Manifest::new("urn:uuid:c");
    manifest.add_assertion(Assertion::cbor(LABEL_DATA_HASH, Node::map()));
    let mut store = Store::new();
    store.add_manifest(manifest);
    let err = store.sign(&asset, &options(&key)).unwrap_err();
    assert!(matches!(
        err,
        brocade_c2pa::C2paError::Precondition(ref s)
            if s.code == StatusCode::ClaimRequiredMissing
    ));
}

#[test]
fn claim_gets_defaults_when_signing() {
    let key = p256_signer();
    let asset = sample_asset();
    let mut store = sample_store();
    store.sign(&asset, &options(&key)).expect("sign");
    let claim = store.active_manifest().unwrap().claim().unwrap();
    assert_eq!(claim.get("alg").unwrap().string_value().unwrap(), "sha256");
    assert!(claim.get("claim_generator").is_some());
    assert_eq!(
        claim.get("signature").unwrap().string_value().unwrap(),
        store.active_manifest().unwrap().signature_uri()
    );
    assert_eq!(claim.get("assertions").unwrap().size(), 2);
}

#[test]
fn ingredient_relationship_rules() {
    let key = p256_signer();
    let asset = sample_asset();

    let mut manifest = Manifest::new("urn:uuid:parents");
    manifest.add_assertion(Assertion::cbor(LABEL_DATA_HASH, Node::map()));
    for (i, label_suffix) in ["", "__1"].iter().enumerate() {
        let ingredient = Node::map();
        ingredient.put("relationship", "parentOf").unwrap();
        ingredient.put("[\"dc:title\"]", format!("parent {i}")).unwrap();
        manifest.add_assertion(Assertion::cbor(
            format!("{LABEL_INGREDIENT}{label_suffix}"),
            ingredient,
        ));
    }
    manifest.claim().unwrap().put("[\"dc:format\"]", "image/jpeg").unwrap();
    manifest.claim().unwrap().put("instanceID", "xmp:iid:3").unwrap();
    let mut store = Store::new();
    store.add_manifest(manifest);
    store.sign(&asset, &options(&key)).expect("sign");

    let statuses = store.verify(&asset, Some(&key.public()));
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::ManifestMultipleParents)
    );
}

#[test]
fn embedded_ingredient_failures_surface() {
    let key = p256_signer();
    let asset = sample_asset();

    let mut manifest = Manifest::new("urn:uuid:ing");
    manifest.add_assertion(Assertion::cbor(LABEL_DATA_HASH, Node::map()));
    let ingredient = Node::map();
    ingredient.put("relationship", "componentOf").unwrap();
    ingredient
        .put("validationStatus[0].code", "assertion.dataHash.mismatch")
        .unwrap();
    manifest.add_assertion(Assertion::cbor(LABEL_INGREDIENT, ingredient));
    manifest.claim().unwrap().put("[\"dc:format\"]", "image/jpeg").unwrap();
    manifest.claim().unwrap().put("instanceID", "xmp:iid:4").unwrap();
    let mut store = Store::new();
    store.add_manifest(manifest);
    store.sign(&asset, &options(&key)).expect("sign");

    let statuses = store.verify(&asset, Some(&key.public()));
    assert!(
        statuses
            .iter()
            .any(|s| s.code == StatusCode::AssertionDataHashMismatch
                && s.url.as_deref().is_some_and(|u| u.contains(LABEL_INGREDIENT)))
    );
}

#[test]
fn jpeg_embedding_cycle() {
    let key = p256_signer();

    // minimal JPEG: SOI, APP0, SOS, scan, EOI
    let mut jpeg = vec![0xff, 0xd8];
    jpeg.extend_from_slice(&[0xff, 0xe0, 0x00, 0x04, 0x4a, 0x46]);
    jpeg.extend_from_slice(&[0xff, 0xda, 0x00, 0x02]);
    jpeg.extend_from_slice(&[0xaa; 64]);
    jpeg.extend_from_slice(&[0xff, 0xd9]);

    let mut store = sample_store();
    store.sign(&jpeg, &options(&key)).expect("sign");
    let embedded = store.embed_in_jpeg(&jpeg).expect("embed");

    let recovered = Store::from_jpeg(&embedded).expect("scan").expect("present");
    assert_eq!(recovered.manifests.len(), 1);
    // the signature still verifies over the original asset bytes
    let statuses = recovered.verify(&jpeg, Some(&key.public()));
    assert!(all_ok(&statuses), "{statuses:?}");

    assert!(Store::from_jpeg(&jpeg).expect("scan").is_none());
}
