//! Integration tests for the download manager
//!
//! A scripted in-memory transport stands in for the network so every
//! scenario (redirects, range resume, stalls, timeouts) is deterministic.

use async_trait::async_trait;
use bytes::Bytes;
use filestream_core::download::{
    BodyStream, DownloadBeginEvent, DownloadCompleteEvent, DownloadErrorEvent, DownloadProgressEvent, HttpRequest,
    HttpResponse,
};
use filestream_core::{
    DownloadConfig, DownloadManager, DownloadOptions, DownloadState, HttpTransport, Result, StreamError, Subscription,
};
use futures_util::stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

type Handler = dyn Fn(usize, &HttpRequest) -> HttpResponse + Send + Sync;

/// Answers each request with `handler(attempt, request)` and records it
struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn new(handler: impl Fn(usize, &HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let attempt = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        Ok((self.handler)(attempt, &request))
    }
}

/// Never produces a response head
struct HangingTransport;

#[async_trait]
impl HttpTransport for HangingTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
        futures_util::future::pending().await
    }
}

fn body(data: &[u8], chunk: usize, stall: bool) -> BodyStream {
    let chunks: Vec<Result<Bytes>> = data.chunks(chunk).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
    let body = stream::iter(chunks);
    if stall {
        body.chain(stream::pending()).boxed()
    } else {
        body.boxed()
    }
}

fn response(status: u16, headers: &[(&str, &str)], content_length: Option<u64>, body: BodyStream) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        content_length,
        body,
    }
}

fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn payload(len: usize) -> Arc<Vec<u8>> {
    Arc::new((0..len).map(|i| (i % 251) as u8).collect())
}

#[derive(Debug)]
enum Event {
    Begin(DownloadBeginEvent),
    Progress(DownloadProgressEvent),
    Complete(DownloadCompleteEvent),
    Error(DownloadErrorEvent),
    Resumable(u64),
}

/// Subscribe to every download event kind, in arrival order
fn record(manager: &DownloadManager) -> (Vec<Subscription>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (t1, t2, t3, t4) = (tx.clone(), tx.clone(), tx.clone(), tx.clone());
    let subs = vec![
        manager.listen_to_download_begin(move |e| {
            let _ = t1.send(Event::Begin(e));
        }),
        manager.listen_to_download_progress(move |e| {
            let _ = t2.send(Event::Progress(e));
        }),
        manager.listen_to_download_complete(move |e| {
            let _ = t3.send(Event::Complete(e));
        }),
        manager.listen_to_download_error(move |e| {
            let _ = t4.send(Event::Error(e));
        }),
        manager.listen_to_download_can_be_resumed(move |e| {
            let _ = tx.send(Event::Resumable(e.bytes_written));
        }),
    ];
    (subs, rx)
}

#[derive(Debug, Default)]
struct Run {
    begins: Vec<DownloadBeginEvent>,
    progress: Vec<DownloadProgressEvent>,
    last: Option<Event>,
}

/// Collect events up to and including the next terminal one
async fn until_terminal(rx: &mut mpsc::UnboundedReceiver<Event>) -> Run {
    let mut run = Run::default();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for download events")
            .expect("event channel closed");
        match event {
            Event::Begin(e) => run.begins.push(e),
            Event::Progress(e) => run.progress.push(e),
            terminal => {
                run.last = Some(terminal);
                return run;
            }
        }
    }
}

/// Wait for a progress event reporting at least `bytes`
async fn until_progress(rx: &mut mpsc::UnboundedReceiver<Event>, bytes: u64) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("event channel closed");
        match event {
            Event::Progress(e) if e.bytes_written >= bytes => return,
            Event::Begin(_) | Event::Progress(_) => {}
            other => panic!("unexpected event before progress: {:?}", other),
        }
    }
}

fn dest(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn options(job_id: u64, url: &str, to_file: &str) -> DownloadOptions {
    DownloadOptions::new(job_id, url, to_file)
}

/// Serves `data`; the first attempt stalls after `stall_at` bytes
fn ranged_server(data: Arc<Vec<u8>>, stall_at: usize, accept_ranges: bool) -> Arc<ScriptedTransport> {
    ScriptedTransport::new(move |attempt, request| {
        let total = data.len() as u64;
        let mut headers = vec![("etag", "\"v1\"")];
        if accept_ranges {
            headers.push(("accept-ranges", "bytes"));
        }

        if attempt == 0 {
            return response(200, &headers, Some(total), body(&data[..stall_at], 500, true));
        }

        let offset = header(request, "range")
            .and_then(|r| r.strip_prefix("bytes="))
            .and_then(|r| r.trim_end_matches('-').parse::<usize>().ok());
        match offset {
            Some(offset) if accept_ranges => {
                let range = format!("bytes {}-{}/{}", offset, total - 1, total);
                let mut headers = headers.clone();
                headers.push(("content-range", range.as_str()));
                response(
                    206,
                    &headers,
                    Some(total - offset as u64),
                    body(&data[offset..], 500, false),
                )
            }
            _ => response(200, &headers, Some(total), body(&data, 500, false)),
        }
    })
}

#[tokio::test]
async fn test_progress_divider_limits_events() {
    let dir = TempDir::new().unwrap();
    let path = dest(&dir, "d.bin");
    let data = payload(1000);
    let served = Arc::clone(&data);
    let transport = ScriptedTransport::new(move |_, _| {
        response(200, &[], Some(1000), body(&served, 100, false))
    });
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    let mut opts = options(1, "https://example.com/d.bin", &path);
    opts.progress_divider = 25;
    manager.download_file(opts).await.unwrap();
    let run = until_terminal(&mut rx).await;

    assert!(run.progress.len() <= 5, "got {} progress events", run.progress.len());
    assert!(!run.progress.is_empty());
    for pair in run.progress.windows(2) {
        assert!(pair[0].bytes_written <= pair[1].bytes_written);
    }
    match run.last {
        Some(Event::Complete(e)) => {
            assert_eq!(e.status_code, 200);
            assert_eq!(e.bytes_written, 1000);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(std::fs::read(&path).unwrap(), *data);
    assert!(manager.active_jobs().await.is_empty());
}

#[tokio::test]
async fn test_every_chunk_reported_without_throttle() {
    let dir = TempDir::new().unwrap();
    let data = payload(1000);
    let served = Arc::clone(&data);
    let transport = ScriptedTransport::new(move |_, _| {
        response(200, &[], Some(1000), body(&served, 100, false))
    });
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/d", &dest(&dir, "d")))
        .await
        .unwrap();
    let run = until_terminal(&mut rx).await;

    let written: Vec<u64> = run.progress.iter().map(|e| e.bytes_written).collect();
    assert_eq!(written, (1..=10).map(|i| i * 100).collect::<Vec<_>>());
    assert_eq!(run.begins.len(), 1);
    assert_eq!(run.begins[0].content_length, Some(1000));
}

#[tokio::test]
async fn test_stop_and_resume_with_range() {
    let dir = TempDir::new().unwrap();
    let path = dest(&dir, "resume.bin");
    let data = payload(4000);
    let transport = ranged_server(Arc::clone(&data), 2000, true);
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport.clone()).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/big", &path))
        .await
        .unwrap();
    until_progress(&mut rx, 2000).await;

    manager.stop_download(1).await.unwrap();
    match until_terminal(&mut rx).await.last {
        Some(Event::Resumable(bytes)) => assert_eq!(bytes, 2000),
        other => panic!("expected can-be-resumed, got {:?}", other),
    }
    assert!(manager.is_resumable(1).await);
    assert_eq!(manager.job_state(1).await, Some(DownloadState::StoppedResumable));
    assert_eq!(manager.bytes_written(1).await, Some(2000));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 2000);

    manager.resume_download(1).await.unwrap();
    let run = until_terminal(&mut rx).await;
    match run.last {
        Some(Event::Complete(e)) => {
            assert_eq!(e.status_code, 206);
            assert_eq!(e.bytes_written, 4000);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    // Begin already fired for the first attempt
    assert!(run.begins.is_empty());
    assert!(run.progress.iter().all(|e| e.bytes_written > 2000));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(header(&requests[1], "range"), Some("bytes=2000-"));
    assert_eq!(header(&requests[1], "if-range"), Some("\"v1\""));
    assert_eq!(std::fs::read(&path).unwrap(), *data);
    assert!(!manager.is_resumable(1).await);
    assert!(manager.active_jobs().await.is_empty());
}

#[tokio::test]
async fn test_stop_without_range_support_removes_job() {
    let dir = TempDir::new().unwrap();
    let transport = ranged_server(payload(4000), 2000, false);
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/big", &dest(&dir, "x")))
        .await
        .unwrap();
    until_progress(&mut rx, 2000).await;
    manager.stop_download(1).await.unwrap();

    match until_terminal(&mut rx).await.last {
        Some(Event::Error(e)) => assert_eq!(e.code, "ECANCELED"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(!manager.is_resumable(1).await);
    assert!(manager.active_jobs().await.is_empty());
    assert!(matches!(
        manager.resume_download(1).await,
        Err(StreamError::JobNotFound(1))
    ));
}

#[tokio::test]
async fn test_non_resumable_option_never_keeps_token() {
    let dir = TempDir::new().unwrap();
    let transport = ranged_server(payload(4000), 2000, true);
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    let mut opts = options(1, "https://example.com/big", &dest(&dir, "x"));
    opts.resumable = false;
    manager.download_file(opts).await.unwrap();
    until_progress(&mut rx, 2000).await;
    manager.stop_download(1).await.unwrap();

    assert!(matches!(until_terminal(&mut rx).await.last, Some(Event::Error(_))));
    assert!(manager.active_jobs().await.is_empty());
}

#[tokio::test]
async fn test_server_ignoring_range_restarts_from_zero() {
    let dir = TempDir::new().unwrap();
    let path = dest(&dir, "restart.bin");
    let data = payload(3000);
    let served = Arc::clone(&data);
    let transport = ScriptedTransport::new(move |attempt, _| {
        let headers = [("accept-ranges", "bytes")];
        if attempt == 0 {
            response(200, &headers, Some(3000), body(&served[..1500], 500, true))
        } else {
            response(200, &headers, Some(3000), body(&served, 500, false))
        }
    });
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/r", &path))
        .await
        .unwrap();
    until_progress(&mut rx, 1500).await;
    manager.stop_download(1).await.unwrap();
    assert!(matches!(until_terminal(&mut rx).await.last, Some(Event::Resumable(1500))));

    manager.resume_download(1).await.unwrap();
    match until_terminal(&mut rx).await.last {
        Some(Event::Complete(e)) => assert_eq!(e.bytes_written, 3000),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(std::fs::read(&path).unwrap(), *data);
}

#[tokio::test]
async fn test_truncated_body_becomes_resumable() {
    let dir = TempDir::new().unwrap();
    let served = payload(4000);
    let transport = ScriptedTransport::new(move |_, _| {
        let headers = [("accept-ranges", "bytes")];
        response(200, &headers, Some(4000), body(&served[..2500], 500, false))
    });
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/t", &dest(&dir, "t")))
        .await
        .unwrap();
    assert!(matches!(until_terminal(&mut rx).await.last, Some(Event::Resumable(2500))));
    assert!(manager.is_resumable(1).await);
}

#[tokio::test]
async fn test_read_timeout_mid_body() {
    let dir = TempDir::new().unwrap();
    let transport = ranged_server(payload(4000), 1000, true);
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    let mut opts = options(1, "https://example.com/slow", &dest(&dir, "slow"));
    opts.read_timeout = 50;
    manager.download_file(opts).await.unwrap();

    assert!(matches!(until_terminal(&mut rx).await.last, Some(Event::Resumable(1000))));
    assert_eq!(manager.job_state(1).await, Some(DownloadState::StoppedResumable));
}

#[tokio::test]
async fn test_connect_timeout_reports_error() {
    let dir = TempDir::new().unwrap();
    let manager = DownloadManager::with_transport(DownloadConfig::default(), Arc::new(HangingTransport)).unwrap();
    let (_subs, mut rx) = record(&manager);

    let mut opts = options(1, "https://example.com/never", &dest(&dir, "never"));
    opts.connection_timeout = 50;
    manager.download_file(opts).await.unwrap();

    let run = until_terminal(&mut rx).await;
    match run.last {
        Some(Event::Error(e)) => assert_eq!(e.code, "ETIMEDOUT"),
        other => panic!("expected timeout error, got {:?}", other),
    }
    assert!(run.begins.is_empty());
    assert!(manager.active_jobs().await.is_empty());
}

#[tokio::test]
async fn test_redirects_followed() {
    let dir = TempDir::new().unwrap();
    let path = dest(&dir, "redirected");
    let transport = ScriptedTransport::new(|_, request| match request.url.path() {
        "/start" => response(302, &[("location", "/middle")], None, body(&[], 1, false)),
        "/middle" => response(
            307,
            &[("location", "https://cdn.example.com/final")],
            None,
            body(&[], 1, false),
        ),
        _ => response(200, &[], Some(5), body(b"hello", 5, false)),
    });
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport.clone()).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/start", &path))
        .await
        .unwrap();
    let run = until_terminal(&mut rx).await;

    assert!(matches!(run.last, Some(Event::Complete(ref e)) if e.bytes_written == 5));
    assert_eq!(run.begins[0].status_code, 200);
    let urls: Vec<String> = transport.requests().iter().map(|r| r.url.to_string()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.com/start",
            "https://example.com/middle",
            "https://cdn.example.com/final",
        ]
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
}

#[tokio::test]
async fn test_redirect_limit() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, _| {
        response(301, &[("location", "/loop")], None, body(&[], 1, false))
    });
    let config = DownloadConfig {
        max_redirects: 2,
        ..DownloadConfig::default()
    };
    let manager = DownloadManager::with_transport(config, transport.clone()).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/loop", &dest(&dir, "loop")))
        .await
        .unwrap();

    match until_terminal(&mut rx).await.last {
        Some(Event::Error(e)) => assert!(e.error.contains("redirect"), "{}", e.error),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn test_error_status_completes_without_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dest(&dir, "missing");
    let transport = ScriptedTransport::new(|_, _| {
        response(404, &[], Some(9), body(b"not found", 9, false))
    });
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    manager
        .download_file(options(1, "https://example.com/missing", &path))
        .await
        .unwrap();
    let run = until_terminal(&mut rx).await;

    match run.last {
        Some(Event::Complete(e)) => {
            assert_eq!(e.status_code, 404);
            assert_eq!(e.bytes_written, 0);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(run.progress.is_empty());
    assert_eq!(run.begins.len(), 1);
    assert!(!std::path::Path::new(&path).exists());
}

#[tokio::test]
async fn test_custom_headers_forwarded() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, _| response(200, &[], Some(2), body(b"ok", 2, false)));
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport.clone()).unwrap();
    let (_subs, mut rx) = record(&manager);

    let mut opts = options(1, "https://example.com/h", &dest(&dir, "h"));
    opts.headers.insert("Authorization".to_string(), "Bearer t".to_string());
    opts.headers.insert("Range".to_string(), "bytes=5-".to_string());
    manager.download_file(opts).await.unwrap();
    until_terminal(&mut rx).await;

    let request = &transport.requests()[0];
    assert_eq!(header(request, "authorization"), Some("Bearer t"));
    assert_eq!(header(request, "range"), None);
}

#[tokio::test]
async fn test_unsubscribed_listener_not_called() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, _| response(200, &[], Some(2), body(b"ok", 2, false)));
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let removed = manager.listen_to_download_complete(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (_subs, mut rx) = record(&manager);
    removed.unsubscribe();
    removed.unsubscribe();

    manager
        .download_file(options(1, "https://example.com/u", &dest(&dir, "u")))
        .await
        .unwrap();
    until_terminal(&mut rx).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_job_ids_reusable_after_completion() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, _| response(200, &[], Some(2), body(b"ok", 2, false)));
    let manager = DownloadManager::with_transport(DownloadConfig::default(), transport).unwrap();
    let (_subs, mut rx) = record(&manager);

    for round in 0..2 {
        manager
            .download_file(options(5, "https://example.com/again", &dest(&dir, &format!("a{}", round))))
            .await
            .unwrap();
        assert!(matches!(until_terminal(&mut rx).await.last, Some(Event::Complete(_))));
    }
}
