use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use vd_core::SconId;

use crate::error::FailOverError;
use crate::protocol::{decode_add_entries, encode_entry_stream, read_opcode, write_status, Opcode, Status};
use crate::store::FailOverStore;

/// How often the accept loop checks the stop flag while polling in
/// non-blocking mode.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Remote FailOverCache server (spec §4.3): accepts connections, keeps one
/// durable append-only per-namespace store, and serves the opcode table of
/// §6. RDMA transport is out of scope; only TCP is implemented.
pub struct Server {
    stop: Arc<AtomicBool>,
    live_connections: Arc<Mutex<Vec<TcpStream>>>,
    handle: Option<JoinHandle<()>>,
    local_addr: std::net::SocketAddr,
}

impl Server {
    pub fn bind(addr: &str, store: Arc<dyn FailOverStore>) -> Result<Self, FailOverError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let live_connections: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
        let live_clone = live_connections.clone();

        let handle = std::thread::spawn(move || {
            let mut conn_handles = Vec::new();
            loop {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        log::debug!("failovercache: accepted connection from {peer}");
                        let store = store.clone();
                        let tracked = stream.try_clone().ok();
                        if let Some(tracked) = tracked {
                            live_clone.lock().push(tracked);
                        }
                        conn_handles.push(std::thread::spawn(move || {
                            if let Err(e) = handle_connection(stream, store.as_ref()) {
                                log::warn!("failovercache: connection from {peer} ended: {e}");
                            }
                        }));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        if stop_clone.load(Ordering::Acquire) {
                            break;
                        }
                        std::thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                    Err(e) => {
                        log::error!("failovercache: accept error: {e}");
                        if stop_clone.load(Ordering::Acquire) {
                            break;
                        }
                        std::thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                }
            }
            for h in conn_handles {
                let _ = h.join();
            }
        });

        Ok(Self {
            stop,
            live_connections,
            handle: Some(handle),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Clean stop-event shutdown: the accept loop is in non-blocking poll
    /// and observes this flag within one `ACCEPT_POLL_INTERVAL`, rather than
    /// relying on a signal or an interruptible blocking accept. Live
    /// connections are shut down so their blocking reads unwind too.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        for stream in self.live_connections.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for stream in self.live_connections.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(stream: TcpStream, store: &dyn FailOverStore) -> Result<(), FailOverError> {
    stream.set_nodelay(true).ok();
    let peer = stream.peer_addr().ok();
    let _log_on_close = scopeguard::guard((), move |_| {
        log::debug!("failovercache: connection from {peer:?} closed");
    });
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    let mut namespace: Option<String> = None;

    loop {
        let (op, payload) = match read_opcode(&mut reader) {
            Ok(v) => v,
            Err(FailOverError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let result = dispatch(op, &payload, &mut namespace, store, &mut writer);
        if let Err(e) = result {
            write_status(&mut writer, Status::NotOk, &[])?;
            writer.flush()?;
            return Err(e);
        }
        writer.flush()?;
    }
}

fn dispatch(
    op: Opcode,
    payload: &[u8],
    namespace: &mut Option<String>,
    store: &dyn FailOverStore,
    writer: &mut impl Write,
) -> Result<(), FailOverError> {
    match op {
        Opcode::Register => {
            let ns = String::from_utf8_lossy(payload).into_owned();
            *namespace = Some(ns);
            write_status(writer, Status::Ok, &[])?;
        }
        Opcode::Unregister => {
            *namespace = None;
            write_status(writer, Status::Ok, &[])?;
        }
        Opcode::AddEntries => {
            let ns = current_namespace(namespace)?;
            let entries = decode_add_entries(payload)?;
            let sco = entries.first().map(|e| e.location.sco);
            if entries.iter().any(|e| Some(e.location.sco) != sco) {
                return Err(FailOverError::MixedSco);
            }
            store.add_entries(&ns, entries)?;
            write_status(writer, Status::Ok, &[])?;
        }
        Opcode::Flush => {
            write_status(writer, Status::Ok, &[])?;
        }
        Opcode::Clear => {
            let ns = current_namespace(namespace)?;
            store.clear(&ns)?;
            write_status(writer, Status::Ok, &[])?;
        }
        Opcode::RemoveUpTo => {
            let ns = current_namespace(namespace)?;
            let sco_name = String::from_utf8_lossy(payload);
            let sco = parse_sco_number(&sco_name)?;
            store.remove_up_to(&ns, sco)?;
            write_status(writer, Status::Ok, &[])?;
        }
        Opcode::GetEntries => {
            let ns = current_namespace(namespace)?;
            let entries = store.entries(&ns)?;
            write_status(writer, Status::Ok, &encode_entry_stream(&entries))?;
        }
        Opcode::GetSco => {
            let ns = current_namespace(namespace)?;
            let sco_name = String::from_utf8_lossy(payload);
            let sco = parse_sco_number(&sco_name)?;
            let entries = store.entries_for_sco(&ns, sco)?;
            write_status(writer, Status::Ok, &encode_entry_stream(&entries))?;
        }
        Opcode::GetScoRange => {
            let ns = current_namespace(namespace)?;
            let (oldest, youngest) = store.sco_range(&ns)?;
            let mut buf = Vec::with_capacity(8);
            buf.extend_from_slice(&oldest.map(|s| s.0).unwrap_or(0).to_le_bytes());
            buf.extend_from_slice(&youngest.map(|s| s.0).unwrap_or(0).to_le_bytes());
            write_status(writer, Status::Ok, &buf)?;
        }
    }
    Ok(())
}

fn current_namespace(namespace: &Option<String>) -> Result<String, FailOverError> {
    namespace
        .clone()
        .ok_or_else(|| FailOverError::Protocol("no namespace registered on this connection".into()))
}

fn parse_sco_number(sco_name: &str) -> Result<SconId, FailOverError> {
    let number_part = sco_name.split('_').next().unwrap_or(sco_name);
    number_part
        .parse::<u32>()
        .map(SconId)
        .map_err(|_| FailOverError::Protocol(format!("malformed sco name {sco_name}")))
}
