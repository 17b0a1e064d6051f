//! In-memory device emulator.
//!
//! Implements [`Transport`] by modelling the daemon side of the wire
//! protocol: handshake and authentication, stream bookkeeping, a shell
//! command table, and a small in-memory filesystem behind the sync
//! sub-protocol. Integration tests drive a real [`crate::device::Device`]
//! against it and then inspect the emulator through [`EmulatorHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;

use super::{Transport, TransportError, TransportType};
use crate::protocol::constants::{
    AUTH_RSAPUBLICKEY, AUTH_SIGNATURE, AUTH_TOKEN, AUTH_TOKEN_SIZE, A_VERSION, HEADER_SIZE,
    MAXDATA,
};
use crate::protocol::message::{AdbMessage, Header};
use crate::protocol::Command;

/// How the emulated device treats authentication attempts.
#[derive(Clone)]
pub enum AuthMode {
    /// Accept the CNXN outright, no challenge.
    Open,
    /// Challenge with a token and accept a valid signature from this key.
    Trusted(RsaPublicKey),
    /// Reject the signature, then accept once the public key is presented.
    UntrustedApprove,
    /// Reject the signature and never answer the public key (user never
    /// taps "allow").
    UntrustedSilent,
    /// Never answer anything, not even the CNXN.
    Unresponsive,
}

#[derive(Clone)]
struct DeviceFile {
    mode: u32,
    mtime: u32,
    data: Vec<u8>,
}

struct EmuStream {
    remote_id: u32,
    sync: Option<SyncSession>,
}

struct State {
    auth_mode: AuthMode,
    token: [u8; AUTH_TOKEN_SIZE],
    banner: String,
    shell_commands: HashMap<String, Vec<u8>>,
    files: HashMap<String, DeviceFile>,

    inbound: Vec<u8>,
    outbound: Vec<u8>,

    streams: HashMap<u32, EmuStream>,
    next_remote_id: u32,

    corrupt_next_wrte: bool,
    refuse_next_open: bool,

    // observations for test assertions
    open_requests: Vec<String>,
    shell_log: Vec<String>,
    sync_requests: Vec<String>,
    host_cnxn_count: usize,
    cnxn_replies: usize,
    host_wrte_acks: usize,
    received_public_key: Option<Vec<u8>>,
    reboot_requested: bool,
}

/// Test-side view into the emulator. Cloneable; shares state with the
/// transport handed to the device.
#[derive(Clone)]
pub struct EmulatorHandle(Arc<Mutex<State>>);

pub struct EmulatedDevice {
    state: Arc<Mutex<State>>,
}

impl EmulatedDevice {
    pub fn new(auth_mode: AuthMode) -> (Self, EmulatorHandle) {
        let mut token = [0u8; AUTH_TOKEN_SIZE];
        for (i, b) in token.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(7).wrapping_add(3);
        }
        let state = Arc::new(Mutex::new(State {
            auth_mode,
            token,
            banner: "device::ro.product.name=emu;ro.product.model=Emulator;".to_string(),
            shell_commands: HashMap::new(),
            files: HashMap::new(),
            inbound: Vec::new(),
            outbound: Vec::new(),
            streams: HashMap::new(),
            next_remote_id: 100,
            corrupt_next_wrte: false,
            refuse_next_open: false,
            open_requests: Vec::new(),
            shell_log: Vec::new(),
            sync_requests: Vec::new(),
            host_cnxn_count: 0,
            cnxn_replies: 0,
            host_wrte_acks: 0,
            received_public_key: None,
            reboot_requested: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            EmulatorHandle(state),
        )
    }
}

impl EmulatorHandle {
    pub fn set_auth_mode(&self, mode: AuthMode) {
        self.0.lock().unwrap().auth_mode = mode;
    }

    pub fn add_shell_command(&self, command: &str, output: &[u8]) {
        self.0
            .lock()
            .unwrap()
            .shell_commands
            .insert(command.to_string(), output.to_vec());
    }

    pub fn add_file(&self, path: &str, mode: u32, mtime: u32, data: &[u8]) {
        self.0.lock().unwrap().files.insert(
            path.to_string(),
            DeviceFile {
                mode,
                mtime,
                data: data.to_vec(),
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.0
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| f.data.clone())
    }

    pub fn file_mode(&self, path: &str) -> Option<u32> {
        self.0.lock().unwrap().files.get(path).map(|f| f.mode)
    }

    pub fn remove_file(&self, path: &str) {
        self.0.lock().unwrap().files.remove(path);
    }

    pub fn open_requests(&self) -> Vec<String> {
        self.0.lock().unwrap().open_requests.clone()
    }

    pub fn shell_log(&self) -> Vec<String> {
        self.0.lock().unwrap().shell_log.clone()
    }

    /// Sync sub-protocol requests in arrival order, e.g. `SEND /x,33206`,
    /// `DATA 4096`, `DONE`, `QUIT`.
    pub fn sync_requests(&self) -> Vec<String> {
        self.0.lock().unwrap().sync_requests.clone()
    }

    /// Refuse the next OPEN with a CLSE.
    pub fn refuse_next_open(&self) {
        self.0.lock().unwrap().refuse_next_open = true;
    }

    pub fn host_cnxn_count(&self) -> usize {
        self.0.lock().unwrap().host_cnxn_count
    }

    pub fn cnxn_replies(&self) -> usize {
        self.0.lock().unwrap().cnxn_replies
    }

    pub fn host_wrte_acks(&self) -> usize {
        self.0.lock().unwrap().host_wrte_acks
    }

    pub fn received_public_key(&self) -> Option<Vec<u8>> {
        self.0.lock().unwrap().received_public_key.clone()
    }

    pub fn reboot_requested(&self) -> bool {
        self.0.lock().unwrap().reboot_requested
    }

    pub fn token(&self) -> [u8; AUTH_TOKEN_SIZE] {
        self.0.lock().unwrap().token
    }

    /// Corrupt the magic of the next WRTE the device emits.
    pub fn corrupt_next_wrte(&self) {
        self.0.lock().unwrap().corrupt_next_wrte = true;
    }

    /// Streams the device still considers open.
    pub fn open_stream_count(&self) -> usize {
        self.0.lock().unwrap().streams.len()
    }
}

#[async_trait]
impl Transport for EmulatedDevice {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.inbound.extend_from_slice(data);
        state.pump();
        Ok(())
    }

    async fn recv_exact(
        &mut self,
        len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.outbound.len() < len {
            // The modelled device has nothing more to say; the host sees a
            // read timeout, exactly as with a silent physical device.
            return Err(TransportError::Timeout { timeout_ms: 0 });
        }
        Ok(state.outbound.drain(..len).collect())
    }

    fn device_id(&self) -> &str {
        "emulator"
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Emulated
    }
}

impl State {
    /// Consume every complete message in the inbound buffer.
    fn pump(&mut self) {
        loop {
            if self.inbound.len() < HEADER_SIZE {
                return;
            }
            let header = match Header::decode(&self.inbound[..HEADER_SIZE]) {
                Ok(h) => h,
                Err(_) => {
                    // A real daemon drops the connection on garbage.
                    self.inbound.clear();
                    return;
                }
            };
            let total = HEADER_SIZE + header.data_length as usize;
            if self.inbound.len() < total {
                return;
            }
            let payload =
                Bytes::copy_from_slice(&self.inbound[HEADER_SIZE..total]);
            self.inbound.drain(..total);
            let message = match AdbMessage::from_parts(header, payload) {
                Ok(m) => m,
                Err(_) => continue,
            };
            self.handle(message);
        }
    }

    fn handle(&mut self, message: AdbMessage) {
        match message.command {
            Command::Cnxn => {
                self.host_cnxn_count += 1;
                match self.auth_mode.clone() {
                    AuthMode::Open => self.push_cnxn(),
                    AuthMode::Unresponsive => {}
                    _ => self.push_auth_token(),
                }
            }
            Command::Auth => self.handle_auth(message),
            Command::Open => self.handle_open(message),
            Command::Wrte => self.handle_wrte(message),
            Command::Okay => {
                self.host_wrte_acks += 1;
            }
            Command::Clse => {
                let local_id = message.arg0;
                if let Some(stream) = self.streams.remove(&local_id) {
                    self.push_message(AdbMessage::simple(
                        Command::Clse,
                        stream.remote_id,
                        local_id,
                    ));
                }
            }
            Command::Sync => {}
        }
    }

    fn handle_auth(&mut self, message: AdbMessage) {
        match (message.arg0, self.auth_mode.clone()) {
            (AUTH_SIGNATURE, AuthMode::Trusted(key)) => {
                let ok = key
                    .verify(
                        Pkcs1v15Sign::new::<Sha1>(),
                        &self.token,
                        &message.payload,
                    )
                    .is_ok();
                if ok {
                    self.push_cnxn();
                } else {
                    self.push_auth_token();
                }
            }
            (AUTH_SIGNATURE, _) => {
                // Unknown key: challenge again, forcing the public-key path.
                self.push_auth_token();
            }
            (AUTH_RSAPUBLICKEY, mode) => {
                self.received_public_key = Some(message.payload.to_vec());
                if matches!(mode, AuthMode::UntrustedApprove) {
                    self.push_cnxn();
                }
                // UntrustedSilent: say nothing; the host read times out.
            }
            _ => {}
        }
    }

    fn handle_open(&mut self, message: AdbMessage) {
        let local_id = message.arg0;
        let service = String::from_utf8_lossy(&message.payload)
            .trim_end_matches('\0')
            .to_string();
        self.open_requests.push(service.clone());

        if self.refuse_next_open {
            self.refuse_next_open = false;
            self.push_message(AdbMessage::simple(Command::Clse, 0, local_id));
            return;
        }

        if let Some(command) = service.strip_prefix("shell:") {
            let remote_id = self.alloc_remote_id();
            self.streams.insert(
                local_id,
                EmuStream {
                    remote_id,
                    sync: None,
                },
            );
            self.push_message(AdbMessage::simple(Command::Okay, remote_id, local_id));
            self.shell_log.push(command.to_string());
            let output = self
                .shell_commands
                .get(command)
                .cloned()
                .unwrap_or_default();
            if !output.is_empty() {
                self.push_wrte_chunks(remote_id, local_id, &output);
            }
            self.push_message(AdbMessage::simple(Command::Clse, remote_id, local_id));
            self.streams.remove(&local_id);
        } else if service == "sync:" {
            let remote_id = self.alloc_remote_id();
            self.streams.insert(
                local_id,
                EmuStream {
                    remote_id,
                    sync: Some(SyncSession::default()),
                },
            );
            self.push_message(AdbMessage::simple(Command::Okay, remote_id, local_id));
        } else if service.starts_with("reboot:") {
            self.reboot_requested = true;
            let remote_id = self.alloc_remote_id();
            self.push_message(AdbMessage::simple(Command::Okay, remote_id, local_id));
            self.push_message(AdbMessage::simple(Command::Clse, remote_id, local_id));
        } else {
            self.push_message(AdbMessage::simple(Command::Clse, 0, local_id));
        }
    }

    fn handle_wrte(&mut self, message: AdbMessage) {
        let local_id = message.arg0;
        let Some(stream) = self.streams.get_mut(&local_id) else {
            return;
        };
        let remote_id = stream.remote_id;
        let responses = match stream.sync.as_mut() {
            Some(sync) => sync.feed(&message.payload, &mut self.files, &mut self.sync_requests),
            None => Vec::new(),
        };

        self.push_message(AdbMessage::simple(Command::Okay, remote_id, local_id));
        for response in responses {
            self.push_wrte_chunks(remote_id, local_id, &response);
        }
    }

    fn alloc_remote_id(&mut self) -> u32 {
        let id = self.next_remote_id;
        self.next_remote_id += 1;
        id
    }

    fn push_cnxn(&mut self) {
        self.cnxn_replies += 1;
        let banner = format!("{}\0", self.banner).into_bytes();
        self.push_message(AdbMessage::new(
            Command::Cnxn,
            A_VERSION,
            MAXDATA as u32,
            banner,
        ));
    }

    fn push_auth_token(&mut self) {
        let token = self.token.to_vec();
        self.push_message(AdbMessage::new(Command::Auth, AUTH_TOKEN, 0, token));
    }

    fn push_wrte_chunks(&mut self, remote_id: u32, local_id: u32, data: &[u8]) {
        for chunk in data.chunks(MAXDATA) {
            self.push_message(AdbMessage::new(
                Command::Wrte,
                remote_id,
                local_id,
                chunk.to_vec(),
            ));
        }
    }

    fn push_message(&mut self, message: AdbMessage) {
        let mut bytes = message.encode();
        if self.corrupt_next_wrte && message.command == Command::Wrte {
            bytes[20] ^= 0xff;
            self.corrupt_next_wrte = false;
        }
        self.outbound.extend_from_slice(&bytes);
    }
}

// ---------------------------------------------------------------------------
// Device-side sync sub-protocol
// ---------------------------------------------------------------------------

const SYNC_DATA_CHUNK: usize = 2048;

#[derive(Default)]
struct SyncSession {
    buf: Vec<u8>,
    upload: Option<Upload>,
}

struct Upload {
    path: String,
    mode: u32,
    data: Vec<u8>,
}

impl SyncSession {
    /// Feed host bytes into the session, returning response byte streams
    /// (each already a complete frame sequence, to be carried in WRTEs).
    fn feed(
        &mut self,
        bytes: &[u8],
        files: &mut HashMap<String, DeviceFile>,
        log: &mut Vec<String>,
    ) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut responses = Vec::new();

        loop {
            if self.buf.len() < 8 {
                break;
            }
            let id: [u8; 4] = self.buf[0..4].try_into().unwrap();
            let arg = u32::from_le_bytes(self.buf[4..8].try_into().unwrap());

            match &id {
                b"DATA" => {
                    let total = 8 + arg as usize;
                    if self.buf.len() < total {
                        break;
                    }
                    log.push(format!("DATA {}", arg));
                    if let Some(upload) = self.upload.as_mut() {
                        upload.data.extend_from_slice(&self.buf[8..total]);
                    }
                    self.buf.drain(..total);
                }
                b"DONE" => {
                    self.buf.drain(..8);
                    log.push("DONE".to_string());
                    if let Some(upload) = self.upload.take() {
                        files.insert(
                            upload.path,
                            DeviceFile {
                                mode: upload.mode,
                                mtime: arg,
                                data: upload.data,
                            },
                        );
                        responses.push(frame(b"OKAY", &0u32.to_le_bytes()));
                    }
                }
                b"QUIT" => {
                    self.buf.drain(..8);
                    log.push("QUIT".to_string());
                }
                b"STAT" | b"LIST" | b"RECV" | b"SEND" => {
                    let total = 8 + arg as usize;
                    if self.buf.len() < total {
                        break;
                    }
                    let argument =
                        String::from_utf8_lossy(&self.buf[8..total]).to_string();
                    self.buf.drain(..total);
                    log.push(format!("{} {}", String::from_utf8_lossy(&id), argument));
                    match &id {
                        b"STAT" => responses.push(stat_response(&argument, files)),
                        b"LIST" => responses.push(list_response(&argument, files)),
                        b"RECV" => responses.push(recv_response(&argument, files)),
                        b"SEND" => {
                            let (path, mode) = match argument.rsplit_once(',') {
                                Some((p, m)) => {
                                    (p.to_string(), m.parse().unwrap_or(0o100644))
                                }
                                None => (argument, 0o100644),
                            };
                            self.upload = Some(Upload {
                                path,
                                mode,
                                data: Vec::new(),
                            });
                        }
                        _ => unreachable!(),
                    }
                }
                _ => {
                    // Unknown request id: report and drop the session buffer.
                    responses.push(frame(b"FAIL", b"unknown sync request"));
                    self.buf.clear();
                }
            }
        }
        responses
    }
}

fn frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(id);
    if id == b"DATA" || id == b"FAIL" {
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(body);
    out
}

fn stat_response(path: &str, files: &HashMap<String, DeviceFile>) -> Vec<u8> {
    let mut body = [0u8; 12];
    if let Some(file) = files.get(path) {
        body[0..4].copy_from_slice(&file.mode.to_le_bytes());
        body[4..8].copy_from_slice(&(file.data.len() as u32).to_le_bytes());
        body[8..12].copy_from_slice(&file.mtime.to_le_bytes());
    }
    frame(b"STAT", &body)
}

fn list_response(path: &str, files: &HashMap<String, DeviceFile>) -> Vec<u8> {
    let prefix = if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    };
    let mut out = Vec::new();
    for (full_path, file) in files {
        let Some(name) = full_path.strip_prefix(&prefix) else {
            continue;
        };
        if name.is_empty() || name.contains('/') {
            continue;
        }
        out.extend_from_slice(b"DENT");
        out.extend_from_slice(&file.mode.to_le_bytes());
        out.extend_from_slice(&(file.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&file.mtime.to_le_bytes());
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
    }
    out.extend_from_slice(b"DONE");
    out.extend_from_slice(&[0u8; 16]);
    out
}

fn recv_response(path: &str, files: &HashMap<String, DeviceFile>) -> Vec<u8> {
    let Some(file) = files.get(path) else {
        return frame(b"FAIL", format!("No such file or directory: {}", path).as_bytes());
    };
    let mut out = Vec::new();
    for chunk in file.data.chunks(SYNC_DATA_CHUNK) {
        out.extend_from_slice(&frame(b"DATA", chunk));
    }
    out.extend_from_slice(b"DONE");
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}
