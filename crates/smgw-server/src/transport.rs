//! TCP transport for the IP-T listener.
//!
//! One reader task and one writer task per connection. Writes go through
//! an in-order FIFO: the writer task takes the next buffer only after
//! the previous write completed, which keeps the scrambled stream
//! strictly ordered. Gatekeeper timers live here too — they observe the
//! driver's session map and fail silently when the session is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smgw_crypto::ScrambleKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::driver::{Output, ServerDriver};
use crate::error::ServerError;

/// Shared driver handle.
pub type SharedDriver = Arc<Mutex<ServerDriver>>;

/// Writer-side handle of one connection.
struct ConnectionHandle {
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    gate: Option<tokio::task::JoinHandle<()>>,
}

/// Connection handles, shared with the gatekeeper tasks.
type Handles = Arc<Mutex<HashMap<Uuid, ConnectionHandle>>>;

/// The IP-T TCP listener.
pub struct IptListener {
    listener: TcpListener,
    driver: SharedDriver,
    handles: Handles,
    initial_key: ScrambleKey,
}

impl IptListener {
    /// Bind to `address`.
    pub async fn bind(
        address: &str,
        driver: SharedDriver,
        initial_key: ScrambleKey,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Config(format!("cannot bind '{address}': {e}")))?;
        tracing::info!("ip-t listener bound to {address}");
        Ok(Self { listener, driver, handles: Arc::new(Mutex::new(HashMap::new())), initial_key })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::from)
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (stream, remote) = self.listener.accept().await?;
            let tag = Uuid::new_v4();
            tracing::info!(tag = %tag, %remote, "connection accepted");
            spawn_connection(
                stream,
                tag,
                remote.to_string(),
                Arc::clone(&self.driver),
                Arc::clone(&self.handles),
                self.initial_key,
            );
        }
    }
}

/// Wire one accepted connection into the driver.
fn spawn_connection(
    stream: TcpStream,
    tag: Uuid,
    remote: String,
    driver: SharedDriver,
    handles: Handles,
    initial_key: ScrambleKey,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    {
        let mut map = lock(&handles);
        map.insert(tag, ConnectionHandle { write_tx: write_tx.clone(), gate: None });
    }

    // Writer task: strictly one write at a time, FIFO order
    let writer_driver = Arc::clone(&driver);
    let writer_handles = Arc::clone(&handles);
    tokio::spawn(async move {
        while let Some(buffer) = write_rx.recv().await {
            let len = buffer.len() as u64;
            if let Err(err) = write_half.write_all(&buffer).await {
                tracing::warn!(tag = %tag, "write failed: {err}");
                break;
            }
            let outputs = lock(&writer_driver).written(tag, len);
            execute(&writer_driver, &writer_handles, outputs);
        }
    });

    // Reader task drives the state machine
    tokio::spawn(async move {
        {
            let outputs = lock(&driver).connected(tag, remote, initial_key);
            execute(&driver, &handles, outputs);
        }

        let mut buffer = vec![0u8; 8 * 1024];
        loop {
            match read_half.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => {
                    let outputs = lock(&driver).received(tag, &buffer[..n]);
                    execute(&driver, &handles, outputs);
                },
                Err(err) => {
                    tracing::warn!(tag = %tag, "read failed: {err}");
                    break;
                },
            }
        }

        let outputs = lock(&driver).disconnected(tag);
        execute(&driver, &handles, outputs);
        remove_handle(&handles, tag);
    });
}

/// Execute driver outputs against the connection handles.
fn execute(driver: &SharedDriver, handles: &Handles, outputs: Vec<Output>) {
    for output in outputs {
        match output {
            Output::Write { session, bytes } => {
                let map = lock(handles);
                if let Some(handle) = map.get(&session) {
                    // The writer task drains the FIFO in order
                    let _ = handle.write_tx.send(bytes);
                }
            },
            Output::CloseSession { session, reason } => {
                tracing::info!(tag = %session, %reason, "closing session");
                remove_handle(handles, session);
                lock(driver).disconnected(session);
            },
            Output::StartGate { session, timeout } => {
                start_gate(driver, handles, session, timeout);
            },
            Output::CancelGate { session } => {
                let mut map = lock(handles);
                if let Some(handle) = map.get_mut(&session) {
                    if let Some(gate) = handle.gate.take() {
                        gate.abort();
                    }
                }
            },
        }
    }
}

/// Arm the login gatekeeper for a session.
fn start_gate(driver: &SharedDriver, handles: &Handles, session: Uuid, timeout: Duration) {
    let gate_driver = Arc::clone(driver);
    let gate_handles = Arc::clone(handles);
    let task = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        // The session may be long gone; the driver no-ops in that case
        let outputs = lock(&gate_driver).gate_timeout(session);
        execute(&gate_driver, &gate_handles, outputs);
    });
    let mut map = lock(handles);
    if let Some(handle) = map.get_mut(&session) {
        handle.gate = Some(task);
    } else {
        task.abort();
    }
}

/// Drop a connection handle, closing its write FIFO and gatekeeper.
fn remove_handle(handles: &Handles, session: Uuid) {
    let mut map = lock(handles);
    if let Some(handle) = map.remove(&session) {
        if let Some(gate) = handle.gate {
            gate.abort();
        }
        // Dropping write_tx ends the writer task
    }
}

/// Lock a mutex, recovering from poisoning.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use smgw_cluster::ClusterNode;
    use smgw_core::session::SessionConfig;
    use smgw_proto::ipt::payload::{LoginPublicReq, LoginRes};
    use smgw_proto::ipt::response::LoginCode;
    use smgw_proto::ipt::{Command, FrameReader, codec::encode_frame};

    use super::*;

    fn test_driver() -> SharedDriver {
        let accounts = StdHashMap::from([("root".to_string(), "root".to_string())]);
        Arc::new(Mutex::new(ServerDriver::new(
            SessionConfig::default(),
            accounts,
            false,
            ClusterNode::new(StdHashMap::new()),
        )))
    }

    #[tokio::test]
    async fn listener_binds_on_ephemeral_port() {
        let listener = IptListener::bind("127.0.0.1:0", test_driver(), ScrambleKey::NULL)
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn rejects_bad_bind_address() {
        let result = IptListener::bind("not-an-address", test_driver(), ScrambleKey::NULL).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn login_round_trip_over_tcp() {
        let listener = IptListener::bind("127.0.0.1:0", test_driver(), ScrambleKey::NULL)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        let req = LoginPublicReq { name: "root".into(), pwd: "root".into() };
        let frame = encode_frame(Command::CtrlReqLoginPublic, 1, &req.encode());
        client.write_all(&frame).await.unwrap();

        // Read until the login response decodes
        let mut reader = FrameReader::new();
        let mut buffer = vec![0u8; 1024];
        let response = loop {
            let n = client.read(&mut buffer).await.unwrap();
            assert!(n > 0, "server closed before answering");
            reader.push(&buffer[..n]);
            if let Some(result) = reader.next() {
                break result.unwrap();
            }
        };

        let (header, body) = response;
        assert_eq!(header.command, Command::CtrlResLoginPublic);
        assert_eq!(header.sequence, 1);
        let res = LoginRes::decode(&body).unwrap();
        assert!(LoginCode::from_u8(res.code).is_success());
    }
}
