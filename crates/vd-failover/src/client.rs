use std::io::{BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use vd_core::SconId;

use crate::error::FailOverError;
use crate::protocol::{
    decode_entry_stream, encode_add_entries, read_status, write_opcode, FocEntry, Opcode, Status,
};

/// Invoked once when the bridge transitions to Degraded (spec §4.3: "on any
/// I/O error invokes a registered DegradedFun").
pub type DegradedFn = Box<dyn Fn() + Send + Sync>;

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Synchronous client bridge to a remote FailOverCache server (spec §4.3).
/// Every operation blocks until the remote acknowledges; on the first I/O
/// failure the bridge declares itself Degraded and stops sending further
/// requests until explicitly re-armed.
pub struct FailOverClient {
    addr: String,
    namespace: String,
    cluster_size: u64,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
    degraded: AtomicBool,
    consecutive_failures: AtomicU32,
    on_degraded: Option<DegradedFn>,
    /// Entries sent since the last acknowledged `flush`, replayed on rearm.
    unflushed: Mutex<Vec<FocEntry>>,
}

impl FailOverClient {
    pub fn connect(
        addr: impl Into<String>,
        namespace: impl Into<String>,
        cluster_size: u64,
        timeout: Duration,
        on_degraded: Option<DegradedFn>,
    ) -> Result<Self, FailOverError> {
        let addr = addr.into();
        let namespace = namespace.into();
        let conn = open_and_register(&addr, &namespace, cluster_size, timeout)?;
        Ok(Self {
            addr,
            namespace,
            cluster_size,
            timeout,
            conn: Mutex::new(Some(conn)),
            degraded: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            on_degraded,
            unflushed: Mutex::new(Vec::new()),
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// The address this client was constructed against, so a caller can tell
    /// a repair (`rearm`) from a redirect to a different bridge apart.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Number of entries sent since the last acknowledged `flush`, used as
    /// the FailOverCache backlog signal for `foc_throttle_usecs` (spec §4.1
    /// step 4, §5 "Suspension points").
    pub fn unflushed_len(&self) -> usize {
        self.unflushed.lock().len()
    }

    pub fn add_entries(&self, entries: Vec<FocEntry>) -> Result<(), FailOverError> {
        if self.is_degraded() {
            return Err(FailOverError::Degraded);
        }
        let sco = entries.first().map(|e| e.location.sco);
        if entries.iter().any(|e| Some(e.location.sco) != sco) {
            return Err(FailOverError::MixedSco);
        }
        let result = self.request(Opcode::AddEntries, &encode_add_entries(&entries));
        match result {
            Ok(_) => {
                self.unflushed.lock().extend(entries);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn flush(&self) -> Result<(), FailOverError> {
        if self.is_degraded() {
            return Err(FailOverError::Degraded);
        }
        match self.request(Opcode::Flush, &[]) {
            Ok(_) => {
                self.unflushed.lock().clear();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn clear(&self) -> Result<(), FailOverError> {
        if self.is_degraded() {
            return Err(FailOverError::Degraded);
        }
        self.request(Opcode::Clear, &[]).map(|_| ()).map_err(|e| self.fail(e))
    }

    pub fn remove_up_to(&self, sco: SconId) -> Result<(), FailOverError> {
        if self.is_degraded() {
            return Err(FailOverError::Degraded);
        }
        self.request(Opcode::RemoveUpTo, sco.to_string().as_bytes())
            .map(|_| ())
            .map_err(|e| self.fail(e))
    }

    pub fn get_entries(&self) -> Result<Vec<FocEntry>, FailOverError> {
        let payload = self.request(Opcode::GetEntries, &[]).map_err(|e| self.fail(e))?;
        decode_entry_stream(&payload)
    }

    pub fn get_sco(&self, sco_name: &str) -> Result<Vec<FocEntry>, FailOverError> {
        let payload = self
            .request(Opcode::GetSco, sco_name.as_bytes())
            .map_err(|e| self.fail(e))?;
        decode_entry_stream(&payload)
    }

    pub fn get_sco_range(&self) -> Result<(SconId, SconId), FailOverError> {
        let payload = self.request(Opcode::GetScoRange, &[]).map_err(|e| self.fail(e))?;
        let oldest = SconId(u32::from_le_bytes(payload[0..4].try_into().unwrap()));
        let youngest = SconId(u32::from_le_bytes(payload[4..8].try_into().unwrap()));
        Ok((oldest, youngest))
    }

    /// Re-arm the bridge after a Degraded transition: rebuilds the
    /// connection and replays any entries sent since the last flush (spec
    /// §4.3: "rebuilds the proxy, replays any unflushed entries").
    pub fn rearm(&self) -> Result<(), FailOverError> {
        let new_conn = open_and_register(&self.addr, &self.namespace, self.cluster_size, self.timeout)?;
        *self.conn.lock() = Some(new_conn);
        self.degraded.store(false, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);

        let pending = std::mem::take(&mut *self.unflushed.lock());
        self.seed_unflushed(pending)
    }

    /// Take every entry buffered since the last flush, leaving this
    /// client's own buffer empty. Used when reattaching to a *different*
    /// address: the old client is discarded, but its unflushed entries must
    /// still reach the new one (spec §4.3 "rebuilds the proxy, replays any
    /// unflushed entries" isn't conditioned on the address staying the
    /// same).
    pub fn drain_unflushed(&self) -> Vec<FocEntry> {
        std::mem::take(&mut *self.unflushed.lock())
    }

    /// Replay `entries` (e.g. drained from a prior client via
    /// [`Self::drain_unflushed`]) through this freshly (re)connected
    /// client, as if they had just been written. Entries are resent in
    /// same-SCO batches since [`Self::add_entries`] rejects a batch mixing
    /// SCOs.
    pub fn seed_unflushed(&self, entries: Vec<FocEntry>) -> Result<(), FailOverError> {
        let mut start = 0;
        while start < entries.len() {
            let sco = entries[start].location.sco;
            let mut end = start + 1;
            while end < entries.len() && entries[end].location.sco == sco {
                end += 1;
            }
            self.add_entries(entries[start..end].to_vec())?;
            start = end;
        }
        Ok(())
    }

    fn fail(&self, err: FailOverError) -> FailOverError {
        *self.conn.lock() = None;
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures == 1 && !self.degraded.swap(true, Ordering::AcqRel) {
            log::warn!("failovercache bridge for {} degraded: {err}", self.namespace);
            if let Some(f) = &self.on_degraded {
                f();
            }
        }
        err
    }

    fn request(&self, op: Opcode, payload: &[u8]) -> Result<Vec<u8>, FailOverError> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(FailOverError::Degraded)?;
        write_opcode(&mut conn.writer, op, payload)?;
        conn.writer.flush()?;
        let (status, body) = read_status(&mut conn.reader)?;
        match status {
            Status::Ok => Ok(body),
            Status::NotOk => Err(FailOverError::NotOk),
        }
    }
}

fn open_and_register(
    addr: &str,
    namespace: &str,
    cluster_size: u64,
    timeout: Duration,
) -> Result<Connection, FailOverError> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true).ok();
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let mut writer = BufWriter::new(stream.try_clone()?);
    let mut reader = BufReader::new(stream);

    write_opcode(&mut writer, Opcode::Register, namespace.as_bytes())?;
    writer.flush()?;
    let (status, _) = read_status(&mut reader)?;
    if status != Status::Ok {
        return Err(FailOverError::NotOk);
    }
    let _ = cluster_size;
    Ok(Connection { reader, writer })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use vd_core::{ClusterLocation, CloneId, Lba};

    use super::*;
    use crate::server::Server;
    use crate::store::mem::MemStore;

    fn start_server() -> (Server, String) {
        let server = Server::bind("127.0.0.1:0", Arc::new(MemStore::new())).unwrap();
        let addr = server.local_addr().to_string();
        (server, addr)
    }

    fn entry(sco: u32) -> FocEntry {
        FocEntry {
            location: ClusterLocation::new(SconId(sco), CloneId(0), 0),
            lba: Lba(0),
            data: vec![9, 9, 9],
        }
    }

    #[test]
    fn add_entries_flush_and_read_back() {
        let (server, addr) = start_server();
        let client = FailOverClient::connect(&addr, "ns0", 4096, Duration::from_secs(2), None).unwrap();
        client.add_entries(vec![entry(1), entry(1)]).unwrap();
        client.flush().unwrap();
        let got = client.get_entries().unwrap();
        assert_eq!(got.len(), 2);
        server.shutdown();
    }

    #[test]
    fn mixed_sco_in_one_add_entries_is_rejected() {
        let (server, addr) = start_server();
        let client = FailOverClient::connect(&addr, "ns0", 4096, Duration::from_secs(2), None).unwrap();
        let err = client.add_entries(vec![entry(1), entry(2)]).unwrap_err();
        assert!(matches!(err, FailOverError::MixedSco));
        server.shutdown();
    }

    #[test]
    fn degraded_after_server_shutdown_then_rearm_replays_unflushed() {
        let (server, addr) = start_server();
        let degraded_calls = Arc::new(AtomicUsize::new(0));
        let flag = degraded_calls.clone();
        let client = FailOverClient::connect(
            &addr,
            "ns0",
            4096,
            Duration::from_millis(200),
            Some(Box::new(move || {
                flag.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
        client.add_entries(vec![entry(1)]).unwrap();
        server.shutdown();

        let err = client.add_entries(vec![entry(2)]).unwrap_err();
        assert!(matches!(err, FailOverError::Io(_)));
        assert!(client.is_degraded());
        assert_eq!(degraded_calls.load(Ordering::SeqCst), 1);

        let (server2, addr2) = {
            let server = Server::bind(&addr, Arc::new(MemStore::new())).unwrap();
            let addr = server.local_addr().to_string();
            (server, addr)
        };
        // rearm dials `self.addr`, which was captured at construction; a real
        // deployment re-binds the same address, simulated here via the same port.
        let _ = &addr2;
        client.rearm().unwrap();
        assert!(!client.is_degraded());
        server2.shutdown();
    }
}
