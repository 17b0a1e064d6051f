mod common;

use common::connected_device;
use droidbridge::{CommandOutput, HostCommand};

#[tokio::test]
async fn test_install_stages_installs_and_cleans_up() {
    let (mut device, handle) = connected_device().await;
    handle.add_shell_command("pm install -r '/data/local/tmp/app.apk'", b"Success\n");

    let dir = tempfile::tempdir().unwrap();
    let apk = dir.path().join("app.apk");
    std::fs::write(&apk, b"PK\x03\x04fake apk bytes").unwrap();

    let output = device.install(&apk).await.unwrap();
    assert!(output.contains("Success"));

    // The APK was staged over sync, and both pm and rm ran.
    assert_eq!(
        handle.file("/data/local/tmp/app.apk").unwrap(),
        b"PK\x03\x04fake apk bytes"
    );
    assert_eq!(
        handle.shell_log(),
        vec![
            "pm install -r '/data/local/tmp/app.apk'".to_string(),
            "rm '/data/local/tmp/app.apk'".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_uninstall() {
    let (mut device, handle) = connected_device().await;
    handle.add_shell_command("pm uninstall 'com.example.app'", b"Success\n");

    let output = device.uninstall("com.example.app").await.unwrap();
    assert!(output.contains("Success"));
    assert_eq!(
        handle.shell_log(),
        vec!["pm uninstall 'com.example.app'".to_string()]
    );
}

#[tokio::test]
async fn test_execute_dispatches_tagged_requests() {
    let (mut device, handle) = connected_device().await;
    handle.add_shell_command("getprop ro.serialno", b"ABC123\n");
    handle.add_file("/sdcard/f", 0o100644, 5, b"12345");

    let output = device
        .execute(HostCommand::Shell {
            command: "getprop ro.serialno".to_string(),
            echo: false,
        })
        .await
        .unwrap();
    match output {
        CommandOutput::Text(text) => assert_eq!(text, "ABC123\n"),
        other => panic!("expected text output, got {:?}", other),
    }

    let output = device
        .execute(HostCommand::Stat {
            path: "/sdcard/f".to_string(),
        })
        .await
        .unwrap();
    match output {
        CommandOutput::Stat(stat) => assert_eq!(stat.size, 5),
        other => panic!("expected stat output, got {:?}", other),
    }

    let output = device
        .execute(HostCommand::List {
            path: "/sdcard".to_string(),
        })
        .await
        .unwrap();
    match output {
        CommandOutput::Entries(entries) => assert_eq!(entries.len(), 1),
        other => panic!("expected entries, got {:?}", other),
    }

    let output = device
        .execute(HostCommand::Reboot { target: None })
        .await
        .unwrap();
    assert!(matches!(output, CommandOutput::Done));
    assert!(handle.reboot_requested());
}
