//! HTTP probe tests against local fixtures.
//!
//! Each fixture is a bare `TcpListener` speaking just enough HTTP/1.1:
//! target servers with a canned status, a server that never answers, and a
//! fake forward proxy that records the request heads it receives.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use hostcheck_probe::*;
use hostcheck_state::{HostStatus, StateStore};

type Heads = Arc<Mutex<Vec<String>>>;

async fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve `status` to every connection; returns the address and captured request heads.
async fn spawn_server(status: &'static str) -> (SocketAddr, Heads) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let heads: Heads = Arc::default();
    let captured = Arc::clone(&heads);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let captured = Arc::clone(&captured);
            tokio::spawn(async move {
                let head = read_head(&mut stream).await;
                captured.lock().unwrap().push(head);
                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (addr, heads)
}

/// Accept connections, read the request, never answer.
async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_head(&mut stream).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr
}

/// Forward proxy that reads each request and hangs up without answering
/// for the first `drops` connections, then answers 200. Returns the
/// address and the number of connections accepted.
async fn spawn_hangup_proxy(drops: usize) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let _ = read_head(&mut stream).await;
                if seen < drops {
                    drop(stream);
                    return;
                }
                let response = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (addr, accepted)
}

/// An address with nothing listening on it.
async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn direct() -> HttpProber {
    HttpProber::new(None, "hostcheck-test").unwrap()
}

#[tokio::test]
async fn direct_200_is_a_response() {
    let (addr, heads) = spawn_server("200 OK").await;
    let task = ProbeTask::new(&addr.to_string(), Duration::from_secs(2));

    let outcome = direct().probe(&task).await.unwrap();
    match outcome {
        ProbeOutcome::Response { status, elapsed } => {
            assert_eq!(status, 200);
            assert!(elapsed < Duration::from_secs(2));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let heads = heads.lock().unwrap();
    assert!(heads[0].starts_with("GET / HTTP/1.1\r\n"), "head: {}", heads[0]);
    assert!(heads[0].to_ascii_lowercase().contains("user-agent: hostcheck-test"));
}

#[tokio::test]
async fn direct_500_is_a_response() {
    let (addr, _) = spawn_server("500 Internal Server Error").await;
    let task = ProbeTask::new(&addr.to_string(), Duration::from_secs(2));

    let outcome = direct().probe(&task).await.unwrap();
    assert!(matches!(outcome, ProbeOutcome::Response { status: 500, .. }));
}

#[tokio::test]
async fn silent_server_times_out() {
    let addr = spawn_silent_server().await;
    let task = ProbeTask::new(&addr.to_string(), Duration::from_millis(300));

    let outcome = direct().probe(&task).await.unwrap();
    assert_eq!(outcome, ProbeOutcome::Timeout);
}

#[tokio::test]
async fn refused_target_is_a_connect_error() {
    let addr = closed_addr().await;
    let task = ProbeTask::new(&addr.to_string(), Duration::from_secs(2));

    let err = direct().probe(&task).await.unwrap_err();
    assert!(matches!(err, ProbeError::Connect(_)), "unexpected error: {err}");
    assert!(!err.is_proxy_failure());
}

#[tokio::test]
async fn plain_http_goes_through_proxy_in_absolute_form() {
    let (proxy_addr, heads) = spawn_server("200 OK").await;
    let prober = HttpProber::new(Some(&format!("http://{proxy_addr}")), "hostcheck-test").unwrap();
    // The target name never resolves; only the proxy is contacted.
    let task = ProbeTask::new("ok.invalid", Duration::from_secs(2));

    let outcome = prober.probe(&task).await.unwrap();
    assert!(matches!(outcome, ProbeOutcome::Response { status: 200, .. }));

    let heads = heads.lock().unwrap();
    assert!(
        heads[0].starts_with("GET http://ok.invalid/ HTTP/1.1\r\n"),
        "head: {}",
        heads[0]
    );
    assert!(heads[0].to_ascii_lowercase().contains("host: ok.invalid"));
}

#[tokio::test]
async fn unreachable_proxy_is_a_proxy_failure() {
    let proxy_addr = closed_addr().await;
    let prober = HttpProber::new(Some(&proxy_addr.to_string()), "hostcheck-test").unwrap();
    let task = ProbeTask::new("ok.invalid", Duration::from_secs(2));

    let err = prober.probe(&task).await.unwrap_err();
    assert!(err.is_proxy_failure(), "unexpected error: {err}");
}

#[tokio::test]
async fn proxy_hanging_up_on_plain_http_is_a_proxy_failure() {
    let (proxy_addr, accepted) = spawn_hangup_proxy(usize::MAX).await;
    let prober = HttpProber::new(Some(&proxy_addr.to_string()), "hostcheck-test").unwrap();
    let task = ProbeTask::new("ok.invalid", Duration::from_secs(2));

    let err = prober.probe(&task).await.unwrap_err();
    assert!(err.is_proxy_failure(), "unexpected error: {err}");
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn target_hanging_up_directly_is_not_retried() {
    // Same fixture, but contacted as the target rather than as a proxy.
    let (addr, _) = spawn_hangup_proxy(usize::MAX).await;
    let task = ProbeTask::new(&addr.to_string(), Duration::from_secs(2));

    let err = direct().probe(&task).await.unwrap_err();
    assert!(matches!(err, ProbeError::Http(_)), "unexpected error: {err}");
    assert!(!err.is_proxy_failure());
}

#[tokio::test]
async fn proxy_hang_ups_below_ceiling_end_up() {
    let (proxy_addr, accepted) = spawn_hangup_proxy(3).await;
    let prober = HttpProber::new(Some(&proxy_addr.to_string()), "hostcheck-test").unwrap();
    let hostnames = vec!["ok.invalid".to_string()];

    let store = StateStore::open_in_memory().unwrap();
    let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(50));
    let scheduler = ProbeScheduler::new(
        Arc::new(prober),
        SchedulerConfig {
            threads: 1,
            timeout: Duration::from_secs(2),
            retry_ceiling: 5,
        },
    );
    let summary = scheduler.run(&hostnames, &writer, |_| {}).await;
    writer.finish().await;

    assert_eq!(summary, RunSummary { up: 1, down: 0, error: 0, retries: 3 });
    assert_eq!(accepted.load(Ordering::SeqCst), 4);
    let row = store.get_host("ok.invalid").unwrap().unwrap();
    assert_eq!(row.status, HostStatus::Up);
}

#[tokio::test]
async fn rejected_tunnel_is_a_proxy_failure() {
    let (proxy_addr, heads) = spawn_server("403 Forbidden").await;
    let prober = HttpProber::new(Some(&proxy_addr.to_string()), "hostcheck-test").unwrap();
    let task = ProbeTask::new("https://secure.invalid", Duration::from_secs(2));

    let err = prober.probe(&task).await.unwrap_err();
    assert!(err.is_proxy_failure(), "unexpected error: {err}");
    assert!(err.to_string().contains("403"));

    let heads = heads.lock().unwrap();
    assert!(
        heads[0].starts_with("CONNECT secure.invalid:443 HTTP/1.1\r\n"),
        "head: {}",
        heads[0]
    );
}

#[tokio::test]
async fn scenario_ok_timeout_and_500_end_up_in_store() {
    let (ok_addr, _) = spawn_server("200 OK").await;
    let silent_addr = spawn_silent_server().await;
    let (err_addr, _) = spawn_server("500 Internal Server Error").await;
    let hostnames = vec![ok_addr.to_string(), silent_addr.to_string(), err_addr.to_string()];

    let timeout = Duration::from_secs(1);
    let store = StateStore::open_in_memory().unwrap();
    let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(50));
    let scheduler = ProbeScheduler::new(
        Arc::new(direct()),
        SchedulerConfig {
            threads: 5,
            timeout,
            retry_ceiling: 5,
        },
    );

    let mut lines = Vec::new();
    let summary = scheduler
        .run(&hostnames, &writer, |record| lines.push(status_line(record)))
        .await;
    let stats = writer.finish().await;

    assert_eq!(summary, RunSummary { up: 1, down: 2, error: 0, retries: 0 });
    assert_eq!(stats, WriterStats { written: 3, failed: 0 });
    assert_eq!(lines.len(), 3);
    assert_eq!(store.count_hosts().unwrap(), 3);

    let ok = store.get_host(&hostnames[0]).unwrap().unwrap();
    assert_eq!(ok.status, HostStatus::Up);
    assert!(ok.latency >= 0.0 && ok.latency < 1.0);

    let slow = store.get_host(&hostnames[1]).unwrap().unwrap();
    assert_eq!(slow.status, HostStatus::Down);
    assert_eq!(slow.reason, "TIMEOUT");
    assert_eq!(slow.latency, 1.0);

    let failed = store.get_host(&hostnames[2]).unwrap().unwrap();
    assert_eq!(failed.status, HostStatus::Down);
    assert!(failed.reason.contains("500"));
    assert_eq!(failed.latency, 1.0);
}

#[tokio::test]
async fn rerun_refreshes_rows_but_keeps_added() {
    let (addr, _) = spawn_server("503 Service Unavailable").await;
    let hostnames = vec![addr.to_string()];
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.db");

    let config = SchedulerConfig {
        threads: 1,
        timeout: Duration::from_secs(1),
        retry_ceiling: 5,
    };
    let scheduler = ProbeScheduler::new(Arc::new(direct()), config);

    let first = {
        let store = StateStore::open(&path).unwrap();
        let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(50));
        scheduler.run(&hostnames, &writer, |_| {}).await;
        writer.finish().await;
        store.get_host(&hostnames[0]).unwrap().unwrap()
    };

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let store = StateStore::open(&path).unwrap();
    let writer = WriterHandle::spawn(store.clone(), Duration::from_millis(50));
    scheduler.run(&hostnames, &writer, |_| {}).await;
    writer.finish().await;
    let second = store.get_host(&hostnames[0]).unwrap().unwrap();

    assert_eq!(second.added, first.added);
    assert!(second.updated > first.updated);
    assert_eq!(second.reason, "DOWN (503)");
}
