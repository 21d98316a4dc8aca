// chat-test-utils: In-process cluster harness for the integration suites.
//
// Spins up n replicas on loopback ports inside the test's runtime, waits
// for bring-up and election to settle, and exposes the knobs the
// end-to-end scenarios need: connect a client, kill a replica, read a
// replica's store logs.

use chat_wire::{ClusterConfig, Frame, Payload, ReplicaDescriptor};
use client::{ChatClient, Incoming};
use server::{Server, ShutdownHandle};
use std::collections::HashMap;
use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// How long harness waits (polling) for cluster conditions to settle.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

struct ReplicaHandle {
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), server::ServerError>>,
}

pub struct TestCluster {
    pub config: ClusterConfig,
    replicas: HashMap<u32, ReplicaHandle>,
    dir: TempDir,
}

/// Reserve `n` distinct loopback ports.
///
/// The listeners are held until all ports are collected, then dropped; a
/// replica binding "its" port immediately afterwards is subject to the
/// usual (harmless in practice) reuse race.
pub fn free_ports(n: u32) -> Vec<u16> {
    let listeners: Vec<StdTcpListener> = (0..n)
        .map(|_| StdTcpListener::bind("127.0.0.1:0").expect("bind loopback"))
        .collect();
    listeners
        .iter()
        .map(|listener| listener.local_addr().expect("local addr").port())
        .collect()
}

/// Start an `n`-replica cluster with ids `1..=n` and wait until every
/// replica answers GET_PRIMARY with the same elected id.
pub async fn start_cluster(n: u32) -> TestCluster {
    let ports = free_ports(n);
    let config = ClusterConfig {
        servers: (1..=n)
            .map(|id| ReplicaDescriptor {
                host: "127.0.0.1".to_owned(),
                port: ports[(id - 1) as usize],
                id,
            })
            .collect(),
    };
    let dir = tempfile::tempdir().expect("tempdir");

    let mut replicas = HashMap::new();
    for id in 1..=n {
        let server = Server::bind(config.clone(), id, dir.path())
            .await
            .expect("bind replica");
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.serve());
        replicas.insert(id, ReplicaHandle { shutdown, task });
    }

    let cluster = TestCluster { config, replicas, dir };
    cluster.wait_for_primary(1).await;
    cluster
}

impl TestCluster {
    pub fn servers(&self) -> &[ReplicaDescriptor] {
        &self.config.servers
    }

    /// Connect a failover client to the whole fleet.
    pub async fn connect_client(&self) -> (ChatClient, mpsc::Receiver<Incoming>) {
        client::connect(&self.config.servers)
            .await
            .expect("client connect")
    }

    /// Stop one replica and wait for its tasks to unwind, closing all of
    /// its sockets.
    pub async fn kill(&mut self, id: u32) {
        let handle = self.replicas.remove(&id).expect("replica exists");
        handle.shutdown.shutdown();
        let _ = timeout(SETTLE_TIMEOUT, handle.task).await;
    }

    /// Stop every remaining replica.
    pub async fn shutdown(mut self) {
        let ids: Vec<u32> = self.replicas.keys().copied().collect();
        for id in ids {
            self.kill(id).await;
        }
    }

    pub fn log_path(&self, prefix: &str, id: u32) -> PathBuf {
        self.dir.path().join(format!("{prefix}_{id}.log"))
    }

    /// Current contents of one replica's store log (empty if absent).
    pub fn read_log(&self, prefix: &str, id: u32) -> String {
        std::fs::read_to_string(self.log_path(prefix, id)).unwrap_or_default()
    }

    /// Ask one replica who the primary is, off to the side of any client.
    pub async fn query_primary(&self, id: u32) -> Option<u32> {
        let descriptor = self.config.replica(id)?;
        let stream = TcpStream::connect(descriptor.addr()).await.ok()?;
        let (mut read_half, write_half) = stream.into_split();
        let writer = std::sync::Arc::new(tokio::sync::Mutex::new(write_half));
        chat_wire::send(&writer, &Frame::new(0, Payload::GetPrimary))
            .await
            .ok()?;
        let frame = timeout(Duration::from_secs(1), chat_wire::read_frame(&mut read_half))
            .await
            .ok()?
            .ok()?;
        match frame.payload {
            Payload::AssignPrimaryResponse { id } => Some(id),
            _ => None,
        }
    }

    /// Poll until every live replica reports `expected` as primary.
    pub async fn wait_for_primary(&self, expected: u32) {
        let ids: Vec<u32> = self.replicas.keys().copied().collect();
        let settled = timeout(SETTLE_TIMEOUT, async {
            loop {
                let mut all_agree = true;
                for &id in &ids {
                    if self.query_primary(id).await != Some(expected) {
                        all_agree = false;
                        break;
                    }
                }
                if all_agree {
                    return;
                }
                sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        assert!(
            settled.is_ok(),
            "cluster did not settle on primary {expected} within {SETTLE_TIMEOUT:?}"
        );
    }

    /// Poll a synchronous condition (typically over store logs) until it
    /// holds or the settle timeout expires.
    pub async fn eventually<F>(&self, what: &str, condition: F)
    where
        F: Fn() -> bool,
    {
        let settled = timeout(SETTLE_TIMEOUT, async {
            while !condition() {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "condition not reached within timeout: {what}");
    }
}

/// Retry a client request until it stops failing with a connection error.
/// Useful right after a failover, when an in-flight request may be lost.
pub async fn retry_until_ok<T, F, Fut>(call: F) -> T
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, client::ClientError>>,
{
    let outcome = timeout(SETTLE_TIMEOUT, async {
        loop {
            match call().await {
                Ok(value) => return value,
                Err(_) => sleep(POLL_INTERVAL).await,
            }
        }
    })
    .await;
    outcome.expect("request kept failing past the settle timeout")
}
