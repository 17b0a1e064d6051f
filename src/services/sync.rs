//! The SYNC file service.
//!
//! Each operation opens one `sync:` stream and speaks the length-prefixed
//! sub-protocol over WRTE payloads. Frame boundaries are independent of
//! message boundaries, so responses are reassembled through a small
//! buffering reader. Response frames are not uniform: `DENT`, the LIST
//! terminator and the `STAT` reply carry fixed-size bodies where the second
//! word is `mode`, not a length.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::AdbError;
use crate::protocol::constants::MAXDATA;
use crate::stream::StreamSession;

/// Largest DATA frame body the device may send during RECV.
const MAX_DATA_FRAME: usize = 64 * 1024;

/// File metadata as reported by `STAT` / carried in `DENT` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub size: u32,
    pub mtime: u32,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.mode & 0o170000 == 0o100000
    }

    pub fn is_directory(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }

    /// STAT returns all-zero fields for paths that do not exist.
    pub fn exists(&self) -> bool {
        self.mode != 0
    }
}

/// One directory entry from `LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub mode: u32,
    pub size: u32,
    pub mtime: u32,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.mode & 0o170000 == 0o100000
    }

    pub fn is_directory(&self) -> bool {
        self.mode & 0o170000 == 0o040000
    }
}

/// List a remote directory.
pub async fn list(device: &mut Device, path: &str) -> Result<Vec<DirEntry>, AdbError> {
    let mut session = device.open_stream("sync:").await?;
    let result = list_inner(&mut session, path).await;
    finish(&mut session, result.is_ok()).await;
    result
}

async fn list_inner(
    session: &mut StreamSession<'_>,
    path: &str,
) -> Result<Vec<DirEntry>, AdbError> {
    send_request(session, b"LIST", path.as_bytes()).await?;

    let mut reader = FrameReader::new();
    let mut entries = Vec::new();
    loop {
        let id = reader.read_id(session).await?;
        match &id {
            b"DENT" => {
                let mode = reader.read_u32(session).await?;
                let size = reader.read_u32(session).await?;
                let mtime = reader.read_u32(session).await?;
                let name_len = reader.read_u32(session).await? as usize;
                let name = reader.read_exact(session, name_len).await?;
                entries.push(DirEntry {
                    name: String::from_utf8_lossy(&name).into_owned(),
                    mode,
                    size,
                    mtime,
                });
            }
            b"DONE" => {
                // The LIST terminator carries a zeroed dent body.
                reader.read_exact(session, 16).await?;
                break;
            }
            b"FAIL" => return Err(read_failure(&mut reader, session).await?),
            other => {
                return Err(AdbError::Sync(format!(
                    "unexpected response id {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        }
    }
    debug!("listed {} entries under {:?}", entries.len(), path);
    Ok(entries)
}

/// Stat a remote path. Missing paths come back with all-zero fields.
pub async fn stat(device: &mut Device, path: &str) -> Result<FileStat, AdbError> {
    let mut session = device.open_stream("sync:").await?;
    let result = stat_inner(&mut session, path).await;
    finish(&mut session, result.is_ok()).await;
    result
}

async fn stat_inner(
    session: &mut StreamSession<'_>,
    path: &str,
) -> Result<FileStat, AdbError> {
    send_request(session, b"STAT", path.as_bytes()).await?;

    let mut reader = FrameReader::new();
    let id = reader.read_id(session).await?;
    match &id {
        b"STAT" => Ok(FileStat {
            mode: reader.read_u32(session).await?,
            size: reader.read_u32(session).await?,
            mtime: reader.read_u32(session).await?,
        }),
        b"FAIL" => Err(read_failure(&mut reader, session).await?),
        other => Err(AdbError::Sync(format!(
            "unexpected response id {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Upload a local file. The local path is checked before any sync traffic;
/// the transfer is DATA frames followed by DONE carrying the mtime, answered
/// by OKAY or FAIL.
pub async fn push(device: &mut Device, local: &Path, remote: &str) -> Result<(), AdbError> {
    let metadata = tokio::fs::metadata(local).await?;
    if !metadata.is_file() {
        return Err(AdbError::Sync(format!("{:?} is not a regular file", local)));
    }
    let mode = local_mode(&metadata);
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    let contents = tokio::fs::read(local).await?;

    let mut session = device.open_stream("sync:").await?;
    let result = push_inner(&mut session, remote, mode, mtime, &contents).await;
    finish(&mut session, result.is_ok()).await;
    result
}

async fn push_inner(
    session: &mut StreamSession<'_>,
    remote: &str,
    mode: u32,
    mtime: u32,
    contents: &[u8],
) -> Result<(), AdbError> {
    let path_and_mode = format!("{},{}", remote, mode);
    send_request(session, b"SEND", path_and_mode.as_bytes()).await?;

    for chunk in contents.chunks(MAXDATA) {
        send_request(session, b"DATA", chunk).await?;
    }

    let mut done = Vec::with_capacity(8);
    done.extend_from_slice(b"DONE");
    done.extend_from_slice(&mtime.to_le_bytes());
    session.write_all(&done).await?;

    let mut reader = FrameReader::new();
    let id = reader.read_id(session).await?;
    match &id {
        b"OKAY" => {
            reader.read_u32(session).await?;
            debug!("pushed {} bytes to {:?}", contents.len(), remote);
            Ok(())
        }
        b"FAIL" => Err(read_failure(&mut reader, session).await?),
        other => Err(AdbError::Sync(format!(
            "unexpected response id {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

/// Download a remote file. Data lands in a sibling temp file which is
/// fsynced and renamed into place only after DONE, so an aborted transfer
/// never leaves a partial file at the destination.
pub async fn pull(device: &mut Device, remote: &str, local: &Path) -> Result<(), AdbError> {
    let mut session = device.open_stream("sync:").await?;
    let result = pull_inner(&mut session, remote, local).await;
    finish(&mut session, result.is_ok()).await;
    result
}

async fn pull_inner(
    session: &mut StreamSession<'_>,
    remote: &str,
    local: &Path,
) -> Result<(), AdbError> {
    send_request(session, b"RECV", remote.as_bytes()).await?;

    let tmp_path = temp_sibling(local);
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    let mut written = 0usize;

    let mut reader = FrameReader::new();
    let outcome = loop {
        let id = match reader.read_id(session).await {
            Ok(id) => id,
            Err(e) => break Err(e),
        };
        match &id {
            b"DATA" => {
                let len = match reader.read_u32(session).await {
                    Ok(len) => len as usize,
                    Err(e) => break Err(e),
                };
                if len > MAX_DATA_FRAME {
                    break Err(AdbError::Sync(format!("oversized DATA frame: {}", len)));
                }
                let chunk = match reader.read_exact(session, len).await {
                    Ok(chunk) => chunk,
                    Err(e) => break Err(e),
                };
                if let Err(e) = file.write_all(&chunk).await {
                    break Err(e.into());
                }
                written += len;
            }
            b"DONE" => {
                let _ = reader.read_u32(session).await;
                break Ok(());
            }
            b"FAIL" => {
                break Err(match read_failure(&mut reader, session).await {
                    Ok(fail) => fail,
                    Err(e) => e,
                });
            }
            other => {
                break Err(AdbError::Sync(format!(
                    "unexpected response id {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        }
    };

    match outcome {
        Ok(()) => {
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, local).await?;
            debug!("pulled {} bytes from {:?}", written, remote);
            Ok(())
        }
        Err(e) => {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                warn!("failed to remove partial download {:?}: {}", tmp_path, cleanup);
            }
            Err(e)
        }
    }
}

/// Send QUIT and close the sync stream. Errors here are secondary; the
/// primary result has already been decided.
async fn finish(session: &mut StreamSession<'_>, send_quit: bool) {
    if send_quit {
        let mut quit = Vec::with_capacity(8);
        quit.extend_from_slice(b"QUIT");
        quit.extend_from_slice(&0u32.to_le_bytes());
        let _ = session.write_all(&quit).await;
    }
    let _ = session.close().await;
}

async fn send_request(
    session: &mut StreamSession<'_>,
    id: &[u8; 4],
    body: &[u8],
) -> Result<(), AdbError> {
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(id);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(body);
    session.write_all(&frame).await
}

async fn read_failure(
    reader: &mut FrameReader,
    session: &mut StreamSession<'_>,
) -> Result<AdbError, AdbError> {
    let len = reader.read_u32(session).await? as usize;
    let message = reader.read_exact(session, len.min(MAX_DATA_FRAME)).await?;
    Ok(AdbError::Sync(
        String::from_utf8_lossy(&message).into_owned(),
    ))
}

fn local_mode(metadata: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        0o100000 | (metadata.permissions().mode() & 0o777)
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        0o100644
    }
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Reassembles sync frames from stream reads; WRTE payload boundaries carry
/// no meaning at this layer.
struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    async fn read_exact(
        &mut self,
        session: &mut StreamSession<'_>,
        n: usize,
    ) -> Result<Vec<u8>, AdbError> {
        while self.buf.len() < n {
            let chunk = session.read().await?;
            self.buf.extend_from_slice(&chunk);
        }
        Ok(self.buf.drain(..n).collect())
    }

    async fn read_id(&mut self, session: &mut StreamSession<'_>) -> Result<[u8; 4], AdbError> {
        let bytes = self.read_exact(session, 4).await?;
        Ok(bytes.try_into().unwrap())
    }

    async fn read_u32(&mut self, session: &mut StreamSession<'_>) -> Result<u32, AdbError> {
        let bytes = self.read_exact(session, 4).await?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_classification() {
        let file = FileStat {
            mode: 0o100644,
            size: 10,
            mtime: 0,
        };
        assert!(file.is_file());
        assert!(!file.is_directory());
        assert!(file.exists());

        let dir = FileStat {
            mode: 0o040755,
            size: 0,
            mtime: 0,
        };
        assert!(dir.is_directory());

        let missing = FileStat {
            mode: 0,
            size: 0,
            mtime: 0,
        };
        assert!(!missing.exists());
    }

    #[test]
    fn test_dir_entry_classification() {
        let entry = DirEntry {
            name: "x".into(),
            mode: 0o100600,
            size: 1,
            mtime: 2,
        };
        assert!(entry.is_file());
        assert!(!entry.is_directory());
    }
}
