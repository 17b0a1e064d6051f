mod common;

use common::connected_device;
use droidbridge::AdbError;

#[tokio::test]
async fn test_push_splits_into_maxdata_frames() {
    let (mut device, handle) = connected_device().await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("payload.bin");
    let contents: Vec<u8> = (0..12 * 1024).map(|i| (i % 251) as u8).collect();
    std::fs::write(&local, &contents).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&local, std::fs::Permissions::from_mode(0o666)).unwrap();
    }

    device.push(&local, "/sdcard/x").await.unwrap();

    assert_eq!(handle.file("/sdcard/x").unwrap(), contents);
    #[cfg(unix)]
    {
        assert_eq!(handle.file_mode("/sdcard/x"), Some(0o100666));
        assert_eq!(
            handle.sync_requests(),
            vec![
                "SEND /sdcard/x,33206".to_string(),
                "DATA 4096".to_string(),
                "DATA 4096".to_string(),
                "DATA 4096".to_string(),
                "DONE".to_string(),
                "QUIT".to_string(),
            ]
        );
    }
    assert_eq!(handle.open_stream_count(), 0);
}

#[tokio::test]
async fn test_push_missing_local_aborts_before_sync() {
    let (mut device, handle) = connected_device().await;

    let err = device
        .push(std::path::Path::new("/nonexistent/nope.bin"), "/sdcard/nope")
        .await
        .unwrap_err();
    assert!(matches!(err, AdbError::Io(_)));

    // The local stat failed before any stream was opened.
    assert!(handle.open_requests().is_empty());
}

#[tokio::test]
async fn test_push_directory_rejected() {
    let (mut device, _handle) = connected_device().await;
    let dir = tempfile::tempdir().unwrap();

    let err = device.push(dir.path(), "/sdcard/dir").await.unwrap_err();
    assert!(matches!(err, AdbError::Sync(_)));
}

#[tokio::test]
async fn test_pull_round_trip() {
    let (mut device, handle) = connected_device().await;
    let contents: Vec<u8> = (0..5000).map(|i| (i % 241) as u8).collect();
    handle.add_file("/sdcard/data.bin", 0o100644, 1_700_000_000, &contents);

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("data.bin");
    device.pull("/sdcard/data.bin", &local).await.unwrap();

    assert_eq!(std::fs::read(&local).unwrap(), contents);
    // The temp file was renamed away.
    assert!(!dir.path().join("data.bin.partial").exists());
}

#[tokio::test]
async fn test_pull_missing_file_reports_device_message() {
    let (mut device, _handle) = connected_device().await;

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("missing.bin");
    let err = device.pull("/sdcard/missing.bin", &local).await.unwrap_err();

    match err {
        AdbError::Sync(message) => assert!(message.contains("No such file")),
        other => panic!("expected Sync error, got {:?}", other),
    }
    // No partial output left behind.
    assert!(!local.exists());
    assert!(!dir.path().join("missing.bin.partial").exists());
}

#[tokio::test]
async fn test_pull_corrupt_wrte_keeps_device_connected() {
    let (mut device, handle) = connected_device().await;
    handle.add_file("/sdcard/a.bin", 0o100644, 0, b"some data");
    handle.corrupt_next_wrte();

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("a.bin");
    let err = device.pull("/sdcard/a.bin", &local).await.unwrap_err();
    assert!(matches!(err, AdbError::Protocol(_)));
    assert!(!local.exists());

    // The violation killed the stream, not the connection.
    assert!(device.is_connected());
    device.pull("/sdcard/a.bin", &local).await.unwrap();
    assert_eq!(std::fs::read(&local).unwrap(), b"some data");
}

#[tokio::test]
async fn test_list_directory() {
    let (mut device, handle) = connected_device().await;
    handle.add_file("/sdcard/a.txt", 0o100644, 111, b"abc");
    handle.add_file("/sdcard/music", 0o040755, 222, b"");
    handle.add_file("/sdcard/music/song.mp3", 0o100644, 333, b"xxxx");
    handle.add_file("/other/b.txt", 0o100644, 444, b"zz");

    let mut entries = device.list("/sdcard").await.unwrap();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[0].size, 3);
    assert_eq!(entries[0].mtime, 111);
    assert!(entries[0].is_file());
    assert_eq!(entries[1].name, "music");
    assert!(entries[1].is_directory());
}

#[tokio::test]
async fn test_stat_existing_file() {
    let (mut device, handle) = connected_device().await;
    handle.add_file("/sdcard/a.txt", 0o100600, 999, b"hello");

    let stat = device.stat("/sdcard/a.txt").await.unwrap();
    assert_eq!(stat.mode, 0o100600);
    assert_eq!(stat.size, 5);
    assert_eq!(stat.mtime, 999);
    assert!(stat.exists());
}

#[tokio::test]
async fn test_stat_missing_path_is_zeroed() {
    let (mut device, _handle) = connected_device().await;
    let stat = device.stat("/sdcard/ghost").await.unwrap();
    assert!(!stat.exists());
    assert_eq!(stat.size, 0);
}
