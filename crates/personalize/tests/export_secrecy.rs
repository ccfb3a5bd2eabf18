//! Integration tests for the export bundle.
//!
//! The bundle is the only artifact that leaves the station. These tests
//! inspect the simulated storage directly and check that none of the secret
//! bytes written there appear in the bundle, and that the HSM can recover
//! the RMA unlock token from the wrapped form.

use manuf_core::Config;
use manuf_personalize::secrets::RmaToken;
use manuf_personalize::sim::{SimEntropy, SimFlash, SimLifecycle, SimOtp};
use manuf_personalize::{
    provision_device, unwrap_rma_token, EcKeyPair, EccPrimitive, ExportBundle, InfoPage,
    LifecycleState, OsEntropy, OtpSlot, P256Primitive, UnwrapError,
};

/// Helper to provision a device with the given host key configured.
fn provision_with_host(
    host: Option<&EcKeyPair>,
    seed: u64,
) -> (ExportBundle, SimFlash, SimOtp) {
    let mut config = Config::default();
    config.personalization.host_public_key = host.map(|h| hex::encode(h.public_key()));

    let mut flash = SimFlash::new();
    let mut otp = SimOtp::new();
    let bundle = provision_device(
        &mut flash,
        &SimLifecycle::new(LifecycleState::Prod),
        &mut otp,
        SimEntropy::seeded(seed),
        &config,
    )
    .expect("provisioning should succeed");
    (bundle, flash, otp)
}

/// Every secret value the device holds, as raw bytes.
fn stored_secrets(flash: &SimFlash, otp: &SimOtp) -> Vec<Vec<u8>> {
    let mut secrets = Vec::new();
    for page in InfoPage::ALL {
        secrets.push(flash.page_contents(page).expect("seed written").to_vec());
    }
    for slot in OtpSlot::ALL {
        secrets.push(otp.slot_contents(slot).expect("secret written").to_vec());
    }
    secrets
}

fn contains_window(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_bundle_leaks_no_stored_secret() {
    let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
    let (bundle, flash, otp) = provision_with_host(Some(&host), 21);
    let json = bundle.to_json().unwrap();

    // Every byte-valued field of the bundle, decoded
    let mut exported = hex::decode(bundle.device_public_key.as_ref().unwrap()).unwrap();
    let wrapped = bundle.wrapped_rma_token.as_ref().unwrap();
    exported.extend(hex::decode(&wrapped.nonce).unwrap());
    exported.extend(hex::decode(&wrapped.ciphertext).unwrap());
    exported.extend(hex::decode(&wrapped.host_key_id).unwrap());

    for secret in stored_secrets(&flash, &otp) {
        assert!(
            !json.contains(&hex::encode(&secret)),
            "secret appears hex encoded in bundle JSON"
        );
        assert!(
            !contains_window(&exported, &secret),
            "secret appears in decoded bundle fields"
        );
        // Any 8-byte window of a secret is already too much
        for chunk in secret.chunks(8) {
            assert!(!contains_window(&exported, chunk), "secret fragment exported");
        }
    }
}

#[test]
fn test_hsm_recovers_rma_token() {
    let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
    let (bundle, _, otp) = provision_with_host(Some(&host), 22);

    let device_public_key = hex::decode(bundle.device_public_key.as_ref().unwrap()).unwrap();
    let wrapped = bundle.wrapped_rma_token.as_ref().unwrap();
    let token: RmaToken =
        unwrap_rma_token(&P256Primitive, &host, &device_public_key, wrapped).unwrap();

    // The device only stores the digest, which the recovered token must match
    assert_eq!(
        otp.slot_contents(OtpSlot::RmaToken),
        Some(&token.digest().expose_secret()[..])
    );

    // And the plain token is not in the bundle
    let json = bundle.to_json().unwrap();
    assert!(!json.contains(&hex::encode(token.expose_secret())));
}

#[test]
fn test_stored_token_is_not_the_plain_token() {
    let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
    let (bundle, _, otp) = provision_with_host(Some(&host), 23);

    let device_public_key = hex::decode(bundle.device_public_key.unwrap()).unwrap();
    let token = unwrap_rma_token(
        &P256Primitive,
        &host,
        &device_public_key,
        bundle.wrapped_rma_token.as_ref().unwrap(),
    )
    .unwrap();

    assert_ne!(
        otp.slot_contents(OtpSlot::RmaToken),
        Some(&token.expose_secret()[..])
    );
}

#[test]
fn test_other_host_cannot_unwrap() {
    let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
    let other = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
    let (bundle, _, _) = provision_with_host(Some(&host), 24);

    let device_public_key = hex::decode(bundle.device_public_key.as_ref().unwrap()).unwrap();
    let err = unwrap_rma_token(
        &P256Primitive,
        &other,
        &device_public_key,
        bundle.wrapped_rma_token.as_ref().unwrap(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, UnwrapError::WrongHostKey { .. }));
}

#[test]
fn test_no_host_key_exports_public_key_only() {
    let (bundle, flash, otp) = provision_with_host(None, 25);

    assert!(bundle.wrapped_rma_token.is_none());
    assert_eq!(hex::decode(bundle.device_public_key.as_ref().unwrap()).unwrap().len(), 33);
    assert_eq!(stored_secrets(&flash, &otp).len(), 5, "token still stored on device");

    let value: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
    assert!(value.get("wrapped_rma_token").is_none());
    assert_eq!(value["status"], "provisioned");
}

#[test]
fn test_bundle_round_trips_through_json() {
    let host = P256Primitive.generate_keypair(&mut OsEntropy).unwrap();
    let (bundle, _, _) = provision_with_host(Some(&host), 26);

    let parsed = ExportBundle::from_json(&bundle.to_json().unwrap()).unwrap();
    assert_eq!(parsed, bundle);
}
