//! Integration tests for file uploads.
//!
//! Each test runs a real [`Server`] and [`Client`] on the loopback interface.
//! The server is spawned as a tokio task; the client drives the upload and
//! then sends `END_SESSION`, after which the server task must finish cleanly.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use udp_file_transfer::{
    client::Client,
    config::WindowConfig,
    packet::{Request, CHUNK_SIZE},
    server::Server,
    simulator::{Simulator, SimulatorConfig},
    socket::{Socket, Transport},
    TransferError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn window(ack_timeout_ms: u64) -> WindowConfig {
    WindowConfig {
        capacity: 5,
        ack_timeout: Duration::from_millis(ack_timeout_ms),
    }
}

/// Deterministic, non-repeating-per-chunk file content.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

fn spawn_server<T>(transport: T, root: &Path) -> (SocketAddr, JoinHandle<Result<(), TransferError>>)
where
    T: Transport + 'static,
{
    let addr = transport.local_addr();
    let mut server = Server::with_transport(transport, root, WindowConfig::default());
    (addr, tokio::spawn(async move { server.serve().await }))
}

async fn stop_server<T: Transport>(
    client: &Client<T>,
    server: JoinHandle<Result<(), TransferError>>,
) {
    client.end_session().await.expect("end session");
    timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .expect("server task panicked")
        .expect("server failed");
}

// ---------------------------------------------------------------------------
// Lossless round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn round_trip_is_byte_identical_for_boundary_sizes() {
    for size in [0usize, 1, 199, 200, 1024, 1025, 5000] {
        let root = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let data = pattern(size);
        let src = local.path().join(format!("file-{size}.bin"));
        std::fs::write(&src, &data).unwrap();

        let (addr, server) = spawn_server(ephemeral().await, root.path());
        let client = Client::with_config(ephemeral().await, addr, window(1000));

        let report = timeout(Duration::from_secs(10), client.upload(&src, ""))
            .await
            .expect("upload timed out")
            .expect("upload failed");
        assert_eq!(report.bytes, size as u64);
        assert_eq!(report.chunks as usize, size.div_ceil(CHUNK_SIZE));

        stop_server(&client, server).await;

        let received = std::fs::read(root.path().join(format!("file-{size}.bin"))).unwrap();
        assert_eq!(received.len(), size);
        assert_eq!(received, data, "size {size} corrupted");
    }
}

#[tokio::test]
async fn upload_into_nested_folder_creates_directories() {
    let root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let src = local.path().join("report.txt");
    std::fs::write(&src, b"quarterly numbers").unwrap();

    let (addr, server) = spawn_server(ephemeral().await, root.path());
    let client = Client::with_config(ephemeral().await, addr, window(1000));

    client.upload(&src, "2024/q3").await.expect("upload");
    stop_server(&client, server).await;

    let received = std::fs::read(root.path().join("2024/q3/report.txt")).unwrap();
    assert_eq!(received, b"quarterly numbers");
}

#[tokio::test]
async fn consecutive_uploads_share_one_server_session() {
    let root = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(ephemeral().await, root.path());
    let client = Client::with_config(ephemeral().await, addr, window(1000));

    let first = pattern(3000);
    let second = pattern(7000);
    client
        .begin_upload("first.bin", first.as_slice())
        .await
        .expect("first upload");
    client
        .begin_upload("second.bin", second.as_slice())
        .await
        .expect("second upload");
    stop_server(&client, server).await;

    assert_eq!(std::fs::read(root.path().join("first.bin")).unwrap(), first);
    assert_eq!(std::fs::read(root.path().join("second.bin")).unwrap(), second);
}

// ---------------------------------------------------------------------------
// Loss recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropped_chunk_is_recovered_by_one_retransmission_burst() {
    let root = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(ephemeral().await, root.path());

    // Drop every fragment of chunk 2 the first time it is sent.
    let seen: Arc<Mutex<HashSet<u16>>> = Arc::default();
    let filter_seen = Arc::clone(&seen);
    let sim = Simulator::new(ephemeral().await, SimulatorConfig::default()).with_filter(Box::new(
        move |datagram: &[u8], _| match Request::decode(datagram) {
            Ok(Request::Fragment(f)) if f.seq == 2 => filter_seen.lock().unwrap().insert(f.index),
            _ => false,
        },
    ));
    let client = Client::with_config(sim, addr, window(500));

    let data = pattern(3000);
    let report = timeout(
        Duration::from_secs(10),
        client.begin_upload("lossy.bin", data.as_slice()),
    )
    .await
    .expect("upload timed out")
    .expect("upload failed");

    assert_eq!(report.chunks, 3);
    assert_eq!(report.retransmit_bursts, 1);
    assert_eq!(client.transport().stats().dropped, 6);
    assert_eq!(seen.lock().unwrap().len(), 6);

    stop_server(&client, server).await;

    let received = std::fs::read(root.path().join("lossy.bin")).unwrap();
    assert_eq!(received.len(), 3000);
    assert_eq!(received, data);
}

#[tokio::test]
async fn random_fragment_and_ack_loss_still_delivers_exact_bytes() {
    let root = tempfile::tempdir().unwrap();

    // Server side: lose 30% of acknowledgments.
    let server_sim = Simulator::new(
        ephemeral().await,
        SimulatorConfig {
            loss_rate: 0.3,
            seed: 11,
            ..Default::default()
        },
    );
    let (addr, server) = spawn_server(server_sim, root.path());

    // Client side: duplicate some datagrams and lose ~15% of fragments.
    // Control messages are never lost: END is sent exactly once.
    let mut rng = StdRng::seed_from_u64(7);
    let client_sim = Simulator::new(
        ephemeral().await,
        SimulatorConfig {
            duplicate_rate: 0.2,
            seed: 3,
            ..Default::default()
        },
    )
    .with_filter(Box::new(move |datagram: &[u8], _| {
        matches!(Request::decode(datagram), Ok(Request::Fragment(_))) && rng.gen_bool(0.15)
    }));
    let client = Client::with_config(client_sim, addr, window(200));

    let data = pattern(8 * CHUNK_SIZE + 321);
    let report = timeout(
        Duration::from_secs(60),
        client.begin_upload("noisy.bin", data.as_slice()),
    )
    .await
    .expect("upload timed out")
    .expect("upload failed");
    assert_eq!(report.chunks, 9);

    stop_server(&client, server).await;

    let received = std::fs::read(root.path().join("noisy.bin")).unwrap();
    assert_eq!(received, data);
}

#[tokio::test]
async fn reordered_datagrams_are_written_in_sequence_order() {
    let root = tempfile::tempdir().unwrap();
    let (addr, server) = spawn_server(ephemeral().await, root.path());

    let client_sim = Simulator::new(
        ephemeral().await,
        SimulatorConfig {
            reorder_rate: 0.4,
            seed: 5,
            ..Default::default()
        },
    );
    let client = Client::with_config(client_sim, addr, window(200));

    let data = pattern(6 * CHUNK_SIZE + 77);
    let report = timeout(
        Duration::from_secs(30),
        client.begin_upload("shuffled.bin", data.as_slice()),
    )
    .await
    .expect("upload timed out")
    .expect("upload failed");
    assert_eq!(report.chunks, 7);
    assert!(client.transport().stats().reordered > 0);

    stop_server(&client, server).await;

    let received = std::fs::read(root.path().join("shuffled.bin")).unwrap();
    assert_eq!(received, data);
}

// ---------------------------------------------------------------------------
// Sender wire behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sender_emits_begin_fragments_and_single_end() {
    // A bare socket stands in for the server and acks every completed chunk.
    let fake = ephemeral().await;
    let addr = fake.local_addr;
    let client = Client::with_config(ephemeral().await, addr, window(1000));

    let fake_server = tokio::spawn(async move {
        let mut log = Vec::new();
        loop {
            let (datagram, peer) = fake.recv_from().await.unwrap();
            let request = Request::decode(&datagram).unwrap();
            if let Request::Fragment(f) = &request {
                if f.index + 1 == f.total {
                    fake.send_to(&f.seq.to_be_bytes(), peer).await.unwrap();
                }
            }
            let done = request == Request::End;
            log.push(request);
            if done {
                return log;
            }
        }
    });

    let data = pattern(1500);
    client
        .begin_upload("wire.bin", data.as_slice())
        .await
        .expect("upload");
    let log = timeout(Duration::from_secs(5), fake_server)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        log.first(),
        Some(&Request::UploadBegin {
            path: "wire.bin".into()
        })
    );
    assert_eq!(log.last(), Some(&Request::End));
    let fragments: Vec<(u32, u16, u16)> = log
        .iter()
        .filter_map(|r| match r {
            Request::Fragment(f) => Some((f.seq, f.index, f.total)),
            _ => None,
        })
        .collect();
    // 1500 bytes → chunk 1 (1024 B, 6 fragments) + chunk 2 (476 B, 3 fragments).
    let expected: Vec<(u32, u16, u16)> = (0..6)
        .map(|i| (1, i, 6))
        .chain((0..3).map(|i| (2, i, 3)))
        .collect();
    assert_eq!(fragments, expected);
    assert_eq!(log.iter().filter(|r| **r == Request::End).count(), 1);
}
