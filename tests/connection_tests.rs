mod common;

use common::{connected_device, emulated_device, shared_keystore};
use droidbridge::transport::mock::AuthMode;
use droidbridge::AdbError;
use rsa::{RsaPrivateKey, RsaPublicKey};

#[tokio::test]
async fn test_connect_without_auth() {
    let (mut device, handle) = emulated_device(AuthMode::Open);
    device.connect().await.unwrap();
    assert!(device.is_connected());
    assert_eq!(handle.host_cnxn_count(), 1);
    assert_eq!(handle.cnxn_replies(), 1);
}

#[tokio::test]
async fn test_trusted_first_use() {
    // The device already trusts our key: one token challenge, one signed
    // reply, CNXN. The emulator only answers CNXN if the signature verifies
    // against the registered public key.
    let keystore = shared_keystore();
    let (mut device, handle) =
        emulated_device(AuthMode::Trusted(keystore.public_key().clone()));

    device.connect().await.unwrap();
    assert!(device.is_connected());
    assert_eq!(handle.host_cnxn_count(), 1);
    assert_eq!(handle.cnxn_replies(), 1);
    // Key was trusted, so the public key never went over the wire.
    assert!(handle.received_public_key().is_none());
}

#[tokio::test]
async fn test_unknown_key_falls_back_to_public_key() {
    // The device trusts some other key: our signature is rejected with a
    // fresh challenge, we present our public key, then hang on approval.
    let mut rng = rsa::rand_core::OsRng;
    let other_key = RsaPublicKey::from(&RsaPrivateKey::new(&mut rng, 2048).unwrap());
    let (mut device, handle) = emulated_device(AuthMode::Trusted(other_key));

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, AdbError::PendingUserApproval));
    assert!(!device.is_connected());
    assert!(handle.received_public_key().is_some());
}

#[tokio::test]
async fn test_untrusted_then_approved() {
    let (mut device, handle) = emulated_device(AuthMode::UntrustedApprove);
    device.connect().await.unwrap();
    assert!(device.is_connected());

    // The AUTH(RSAPUBLICKEY) payload is the adbkey.pub line plus a NUL.
    let payload = handle.received_public_key().unwrap();
    assert_eq!(*payload.last().unwrap(), 0);
    let line = std::str::from_utf8(&payload[..payload.len() - 1]).unwrap();
    assert_eq!(line, shared_keystore().public_key_line().unwrap());
}

#[tokio::test]
async fn test_untrusted_never_approved_is_retryable() {
    let (mut device, handle) = emulated_device(AuthMode::UntrustedSilent);

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, AdbError::PendingUserApproval));
    assert!(!device.is_connected());

    // The user taps "allow"; a second connect succeeds on the same handle.
    handle.set_auth_mode(AuthMode::UntrustedApprove);
    device.connect().await.unwrap();
    assert!(device.is_connected());
}

#[tokio::test]
async fn test_handshake_timeout_resets_fsm() {
    let (mut device, handle) = emulated_device(AuthMode::Unresponsive);

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, AdbError::Timeout));
    assert!(!device.is_connected());

    handle.set_auth_mode(AuthMode::Open);
    device.connect().await.unwrap();
    assert!(device.is_connected());
}

#[tokio::test]
async fn test_command_before_connect_fails() {
    let (mut device, _handle) = emulated_device(AuthMode::Open);
    let err = device.shell("id", false).await.unwrap_err();
    assert!(matches!(err, AdbError::NotConnected));
}

#[tokio::test]
async fn test_banner_is_parsed() {
    let (device, _handle) = connected_device().await;
    let banner = device.banner().unwrap();
    assert_eq!(banner.property("ro.product.model"), Some("Emulator"));
    assert_eq!(banner.property("nope"), None);
}

#[tokio::test]
async fn test_close_requires_reconnect() {
    let (mut device, _handle) = connected_device().await;
    device.close();
    assert!(!device.is_connected());
    let err = device.shell("id", false).await.unwrap_err();
    assert!(matches!(err, AdbError::NotConnected));
}
