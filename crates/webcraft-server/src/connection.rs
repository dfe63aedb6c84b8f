//! TCP transport. Each connection exchanges newline-terminated packet
//! batches and forwards decoded batches to the world loop as events.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use webcraft_proto::batch::{decode_batch, encode_batch};
use webcraft_proto::codec::Packet;
use webcraft_proto::packets::{Connect, ErrorMessage};

use crate::player::PacketSender;

/// Longest accepted batch line in bytes.
pub const MAX_BATCH_LEN: usize = 1 << 20;

/// Transport events consumed by the world loop.
#[derive(Debug)]
pub enum ServerEvent {
    Join {
        id: u64,
        username: String,
        tx: PacketSender,
    },
    Packets {
        id: u64,
        packets: Vec<Packet>,
    },
    Leave {
        id: u64,
    },
}

/// Accept connections until shutdown is signalled.
pub async fn serve(
    listener: TcpListener,
    events: mpsc::Sender<ServerEvent>,
    max_players: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let next_id = Arc::new(AtomicU64::new(1));
    let online = Arc::new(AtomicUsize::new(0));
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        warn!("Accept error: {e}");
                        continue;
                    }
                };
                if online.load(Ordering::Relaxed) >= max_players {
                    info!("Rejecting {peer}: server full");
                    tokio::spawn(reject(stream, "server is full"));
                    continue;
                }
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let events = events.clone();
                let online = online.clone();
                online.fetch_add(1, Ordering::Relaxed);
                debug!("Connection {id} from {peer}");
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(id, stream, &events).await {
                        debug!("Connection {id} closed: {e}");
                    }
                    online.fetch_sub(1, Ordering::Relaxed);
                    let _ = events.send(ServerEvent::Leave { id }).await;
                });
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn reject(mut stream: TcpStream, message: &'static str) {
    if let Ok(packet) = Packet::new(&ErrorMessage {
        message: message.into(),
    }) {
        if let Ok(bytes) = encode_batch(&[packet]) {
            let _ = stream.write_all(&bytes).await;
        }
    }
}

async fn handle_connection(
    id: u64,
    stream: TcpStream,
    events: &mpsc::Sender<ServerEvent>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (read, write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(id, write, rx));

    let mut line = Vec::new();
    let mut joined = false;
    loop {
        line.clear();
        let n = (&mut reader)
            .take(MAX_BATCH_LEN as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Ok(());
        }
        if line.last() != Some(&b'\n') && n >= MAX_BATCH_LEN {
            return Err("batch too long".into());
        }
        let packets = match decode_batch(&line) {
            Ok(p) => p,
            Err(e) => {
                trace!("Connection {id} sent undecodable batch: {e}");
                continue;
            }
        };

        if !joined {
            let Some(connect) = packets.iter().find_map(|p| p.decode::<Connect>().ok()) else {
                send_error(&tx, "expected connect");
                continue;
            };
            if connect.username.trim().is_empty() {
                send_error(&tx, "empty username");
                continue;
            }
            joined = true;
            events
                .send(ServerEvent::Join {
                    id,
                    username: connect.username,
                    tx: tx.clone(),
                })
                .await?;
            continue;
        }
        events.send(ServerEvent::Packets { id, packets }).await?;
    }
}

fn send_error(tx: &PacketSender, message: &str) {
    if let Ok(packet) = Packet::new(&ErrorMessage {
        message: message.into(),
    }) {
        let _ = tx.send(vec![packet]);
    }
}

async fn write_loop(
    id: u64,
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<Packet>>,
) {
    while let Some(batch) = rx.recv().await {
        let bytes = match encode_batch(&batch) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to encode batch for connection {id}: {e}");
                continue;
            }
        };
        if let Err(e) = write.write_all(&bytes).await {
            debug!("Write to connection {id} failed: {e}");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webcraft_proto::packets::{Ping, Pong};

    async fn start(
        max_players: usize,
    ) -> (
        std::net::SocketAddr,
        mpsc::Receiver<ServerEvent>,
        watch::Sender<bool>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, events_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve(listener, events_tx, max_players, shutdown_rx));
        (addr, events_rx, shutdown_tx)
    }

    async fn send<P: webcraft_proto::codec::GamePacket>(stream: &mut TcpStream, packet: &P) {
        let bytes = encode_batch(&[Packet::new(packet).unwrap()]).unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn read_batch(stream: &mut TcpStream) -> Vec<Packet> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.unwrap();
            buf.push(byte[0]);
            if byte[0] == b'\n' {
                return decode_batch(&buf).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn join_packets_and_leave() {
        let (addr, mut events, _shutdown) = start(4).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        send(&mut client, &Ping).await;
        assert!(read_batch(&mut client).await[0].is::<ErrorMessage>());

        send(
            &mut client,
            &Connect {
                username: "alex".into(),
                session_id: None,
            },
        )
        .await;
        let (id, tx) = match events.recv().await.unwrap() {
            ServerEvent::Join { id, username, tx } => {
                assert_eq!(username, "alex");
                (id, tx)
            }
            other => panic!("unexpected event {other:?}"),
        };

        send(&mut client, &Ping).await;
        match events.recv().await.unwrap() {
            ServerEvent::Packets { id: got, packets } => {
                assert_eq!(got, id);
                assert!(packets[0].is::<Ping>());
            }
            other => panic!("unexpected event {other:?}"),
        }

        tx.send(vec![Packet::new(&Pong).unwrap()]).unwrap();
        assert!(read_batch(&mut client).await[0].is::<Pong>());

        drop(client);
        match events.recv().await.unwrap() {
            ServerEvent::Leave { id: got } => assert_eq!(got, id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_server_rejects() {
        let (addr, _events, _shutdown) = start(0).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let batch = read_batch(&mut client).await;
        let err: ErrorMessage = batch[0].decode().unwrap();
        assert_eq!(err.message, "server is full");
    }
}
