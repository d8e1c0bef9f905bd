use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use a2squery::{QueryConfig, SourceQueryError};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const CHALLENGE: i32 = 0x2468_ace0;

fn single(payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0xff, 0xff, 0xff, 0xff];
    packet.extend_from_slice(payload);
    packet
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn info_payload() -> Vec<u8> {
    let mut data = vec![0x49, 17];
    put_string(&mut data, "Test Server");
    put_string(&mut data, "de_dust2");
    put_string(&mut data, "csgo");
    put_string(&mut data, "Counter-Strike: Global Offensive");
    data.extend_from_slice(&730u16.to_le_bytes());
    data.extend_from_slice(&[5, 16, 1, b'd', b'l', 0, 1]);
    put_string(&mut data, "1.38.7.9");
    data.push(0x80 | 0x20);
    data.extend_from_slice(&27015u16.to_le_bytes());
    put_string(&mut data, "secure");
    data
}

fn players_payload() -> Vec<u8> {
    let mut data = vec![0x44, 2];
    for (name, score) in [("alice", 12i32), ("bob", 3)] {
        data.push(0);
        put_string(&mut data, name);
        data.extend_from_slice(&score.to_le_bytes());
        data.extend_from_slice(&42.0f32.to_le_bytes());
    }
    data
}

fn rules_payload(count: u16) -> Vec<u8> {
    let mut data = vec![0x45];
    data.extend_from_slice(&count.to_le_bytes());
    for i in 0..count {
        put_string(&mut data, &format!("rule_{i:03}"));
        put_string(&mut data, &"x".repeat(40));
    }
    data
}

/// Split `packet` into Source fragments of at most `chunk` bytes, last first.
fn split_reversed(id: u32, packet: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    let total = packet.chunks(chunk).count() as u8;
    let mut datagrams: Vec<Vec<u8>> = packet
        .chunks(chunk)
        .enumerate()
        .map(|(index, data)| {
            let mut datagram = vec![0xfe, 0xff, 0xff, 0xff];
            datagram.extend_from_slice(&id.to_le_bytes());
            datagram.extend_from_slice(&[total, index as u8]);
            datagram.extend_from_slice(&(chunk as u16).to_le_bytes());
            datagram.extend_from_slice(data);
            datagram
        })
        .collect();
    datagrams.reverse();
    datagrams
}

/// A server that challenges players/rules requests and answers with the
/// given datagrams once the right token comes back.
async fn spawn_server(
    info: Vec<Vec<u8>>,
    players: Vec<Vec<u8>>,
    rules: Vec<Vec<u8>>,
) -> (String, JoinHandle<()>) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 1400];
        loop {
            let Ok((len, from)) = sock.recv_from(&mut buf).await else {
                return;
            };
            let request = &buf[..len];
            let replies = match request[4] {
                0x54 => info.clone(),
                kind @ (0x55 | 0x56) => {
                    let token = i32::from_le_bytes([request[5], request[6], request[7], request[8]]);
                    if token != CHALLENGE {
                        let mut challenge = vec![0x41];
                        challenge.extend_from_slice(&CHALLENGE.to_le_bytes());
                        vec![single(&challenge)]
                    } else if kind == 0x55 {
                        players.clone()
                    } else {
                        rules.clone()
                    }
                }
                _ => continue,
            };
            for reply in replies {
                sock.send_to(&reply, from).await.unwrap();
            }
        }
    });
    (addr, handle)
}

#[tokio::test]
async fn queries_info() {
    let (addr, server) = spawn_server(vec![single(&info_payload())], vec![], vec![]).await;

    let info = a2squery::info(addr.as_str(), &QueryConfig::default())
        .await
        .unwrap();
    assert_eq!(info.name, "Test Server");
    assert_eq!(info.map, "de_dust2");
    assert_eq!(info.players, 5);
    assert_eq!(info.max_players, 16);
    assert_eq!(info.bots, 1);
    assert_eq!(info.port, Some(27015));
    assert_eq!(info.keywords.as_deref(), Some("secure"));
    assert_eq!(info.steam_id, None);

    server.abort();
}

#[tokio::test]
async fn queries_players_through_challenge() {
    let (addr, server) = spawn_server(vec![], vec![single(&players_payload())], vec![]).await;

    let players = a2squery::players(addr.as_str(), &QueryConfig::default())
        .await
        .unwrap();
    let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["alice", "bob"]);
    assert_eq!(players[0].score, 12);
    assert_eq!(players[1].duration, 42.0);

    server.abort();
}

#[tokio::test]
async fn queries_split_rules() {
    let packet = single(&rules_payload(60));
    assert!(packet.len() > 1400);
    let (addr, server) = spawn_server(vec![], vec![], split_reversed(0x51, &packet, 1248)).await;

    let rules = a2squery::rules(addr.as_str(), &QueryConfig::default())
        .await
        .unwrap();
    assert_eq!(rules.len(), 60);
    assert_eq!(rules["rule_059"].len(), 40);

    server.abort();
}

#[tokio::test]
async fn concurrent_queries_are_independent() {
    let (a, server_a) = spawn_server(vec![single(&info_payload())], vec![], vec![]).await;
    let (b, server_b) = spawn_server(vec![], vec![single(&players_payload())], vec![]).await;

    let config = QueryConfig::default();
    let (info, players) = tokio::join!(
        a2squery::info(a.as_str(), &config),
        a2squery::players(b.as_str(), &config)
    );
    assert_eq!(info.unwrap().name, "Test Server");
    assert_eq!(players.unwrap().len(), 2);

    server_a.abort();
    server_b.abort();
}

#[tokio::test]
async fn silent_server_gets_exactly_three_attempts() {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    let server = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        while sock.recv_from(&mut buf).await.is_ok() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let config = QueryConfig::default()
        .with_timeout(Duration::from_millis(100))
        .with_retries(3);
    let err = a2squery::info(addr, &config).await.unwrap_err();
    assert!(matches!(err, SourceQueryError::Timeout));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(received.load(Ordering::SeqCst), 3);
    server.abort();
}

#[tokio::test]
async fn garbage_header_is_malformed() {
    let (addr, server) = spawn_server(vec![vec![0x12, 0x34, 0x56, 0x78, 0x49]], vec![], vec![]).await;

    let err = a2squery::info(addr.as_str(), &QueryConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceQueryError::UnknownPacketHeader(_)));

    server.abort();
}

#[tokio::test]
async fn oversized_info_datagram_is_not_decoded() {
    let mut data = vec![0x49, 17];
    put_string(&mut data, &"x".repeat(1340));
    put_string(&mut data, "de_dust2");
    put_string(&mut data, "csgo");
    put_string(&mut data, "Counter-Strike");
    data.extend_from_slice(&730u16.to_le_bytes());
    data.extend_from_slice(&[5, 16, 0, b'd', b'l', 0, 1]);
    put_string(&mut data, "1.38.7.9");
    data.push(0x80 | 0x20);
    data.extend_from_slice(&27015u16.to_le_bytes());
    put_string(&mut data, &"tag,".repeat(20));
    let datagram = single(&data);
    assert!(datagram.len() > 1400);
    let (addr, server) = spawn_server(vec![datagram], vec![], vec![]).await;

    let err = a2squery::info(addr.as_str(), &QueryConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceQueryError::MalformedPacket(_)));

    server.abort();
}
