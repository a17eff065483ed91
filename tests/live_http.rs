use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use pistream::ServerPipeline;
use pistream::config::ServerConfig;
use pistream::core::shutdown::ShutdownSignal;
use pistream::io::wire;
use pistream::testing::mocks::CopyTranscoder;

fn get(addr: SocketAddr, path: &str) -> anyhow::Result<String> {
    let mut conn = TcpStream::connect(addr)?;
    conn.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(
        conn,
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    )?;
    let mut body = Vec::new();
    conn.read_to_end(&mut body)?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Reads from an open event stream until `needle` shows up.
fn read_until(conn: &mut TcpStream, needle: &str, timeout: Duration) -> anyhow::Result<String> {
    conn.set_read_timeout(Some(Duration::from_millis(200)))?;
    let deadline = Instant::now() + timeout;
    let mut seen = String::new();
    let mut buf = [0u8; 4096];
    while !seen.contains(needle) && Instant::now() < deadline {
        match conn.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => seen.push_str(&String::from_utf8_lossy(&buf[..n])),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(seen)
}

#[test]
fn sse_viewer_gets_segment_paths_and_can_fetch_them() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = ServerConfig {
        listen_address: "127.0.0.1:0".into(),
        http_address: "127.0.0.1:0".into(),
        media_dir: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let pipeline = ServerPipeline::bind(&cfg)?;
    let ingest_addr = pipeline.ingest_addr()?;
    let http_addr = pipeline.http_addr()?;

    let shutdown = ShutdownSignal::new();
    let server = {
        let s = shutdown.clone();
        thread::spawn(move || pipeline.run(CopyTranscoder::new(), s))
    };

    assert!(get(http_addr, "/health")?.contains("ok"));

    let mut events = TcpStream::connect(http_addr)?;
    write!(
        events,
        "GET /ready_segments_stream HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n"
    )?;
    let head = read_until(&mut events, "\r\n\r\n", Duration::from_secs(5))?;
    assert!(head.contains("200 OK"), "unexpected response: {}", head);
    assert!(head.to_ascii_lowercase().contains("text/event-stream"));

    let mut ingest = TcpStream::connect(ingest_addr)?;
    for size in [1000usize, 2048, 500] {
        wire::write_frame(&mut ingest, &vec![3u8; size])?;
    }

    let stream = read_until(&mut events, "segment_2.mp4", Duration::from_secs(10))?;
    let first = stream.find(r#"{"segment_path":"segment_0.mp4"}"#);
    let second = stream.find(r#"{"segment_path":"segment_1.mp4"}"#);
    let third = stream.find(r#"{"segment_path":"segment_2.mp4"}"#);
    assert!(first.is_some() && second.is_some() && third.is_some(), "stream: {}", stream);
    assert!(first < second && second < third);

    let fragment = get(http_addr, "/segments/segment_1.mp4")?;
    assert!(fragment.contains("200 OK"));
    assert!(fragment.to_ascii_lowercase().contains("content-length: 2048"));

    let missing = get(http_addr, "/segments/segment_9.mp4")?;
    assert!(missing.contains("404"));

    drop(ingest);
    drop(events);
    let report = server.join().expect("server thread")?;
    assert_eq!(report.published, 3);
    assert!(shutdown.is_triggered());
    Ok(())
}
