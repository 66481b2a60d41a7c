//! End-to-end tests against an in-process echo server.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use wyre::{auth, Client, FormData, Options, STATUS_CLIENT_CLOSED_REQUEST, STATUS_UNKNOWN};

mod echo {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Minimal HTTP/1.1 server: echoes the request body and content type
    /// back, with a few special routes for timeout, chunked and slow-stream
    /// scenarios.
    pub struct EchoServer {
        port: u16,
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl EchoServer {
        pub fn start() -> EchoServer {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo server");
            let port = listener.local_addr().expect("local addr").port();
            let stop = Arc::new(AtomicBool::new(false));
            let stop_flag = stop.clone();
            let handle = thread::spawn(move || {
                for conn in listener.incoming() {
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let Ok(conn) = conn else { break };
                    thread::spawn(move || handle_connection(conn));
                }
            });
            EchoServer {
                port,
                stop,
                handle: Some(handle),
            }
        }

        pub fn base_url(&self) -> String {
            format!("http://127.0.0.1:{}", self.port)
        }
    }

    impl Drop for EchoServer {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            // Wake the accept loop so the thread can exit.
            let _ = TcpStream::connect(("127.0.0.1", self.port));
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn handle_connection(mut conn: TcpStream) {
        let _ = conn.set_read_timeout(Some(Duration::from_secs(30)));

        let mut buf = Vec::new();
        let (head_len, path, content_type, content_length, request_headers) = loop {
            let mut headers = [httparse::EMPTY_HEADER; 32];
            let mut request = httparse::Request::new(&mut headers);
            match request.parse(&buf) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let path = request.path.unwrap_or("/").to_owned();
                    let request_headers: Vec<(String, String)> = request
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_ascii_lowercase(),
                                String::from_utf8_lossy(h.value).into_owned(),
                            )
                        })
                        .collect();
                    let content_type = request_headers
                        .iter()
                        .find(|(name, _)| name == "content-type")
                        .map(|(_, value)| value.clone());
                    let content_length: usize = request_headers
                        .iter()
                        .find(|(name, _)| name == "content-length")
                        .and_then(|(_, value)| value.parse().ok())
                        .unwrap_or(0);
                    break (head_len, path, content_type, content_length, request_headers);
                }
                Ok(httparse::Status::Partial) => {
                    let mut chunk = [0u8; 4096];
                    match conn.read(&mut chunk) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                Err(_) => return,
            }
        };

        let mut body = buf[head_len..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0u8; 4096];
            match conn.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => body.extend_from_slice(&chunk[..n]),
            }
        }
        body.truncate(content_length);

        match path.as_str() {
            "/slow" => serve_slow(&mut conn),
            "/chunked" => serve_chunked(&mut conn),
            "/stall" => {
                thread::sleep(Duration::from_secs(5));
                write_response(&mut conn, None, b"");
            }
            "/headers" => {
                let mut listing = String::new();
                for (name, value) in &request_headers {
                    listing.push_str(&format!("{name}: {value}\n"));
                }
                write_response(&mut conn, Some("text/plain"), listing.as_bytes());
            }
            _ => {
                let is_multipart = content_type
                    .as_deref()
                    .is_some_and(|ct| ct.starts_with("multipart/form-data"));
                if is_multipart {
                    // Multipart uploads are acknowledged with the received
                    // byte count; echoing multipart back is not supported.
                    let count = body.len().to_string();
                    write_response(&mut conn, Some("text/plain"), count.as_bytes());
                } else {
                    write_response(&mut conn, content_type.as_deref(), &body);
                }
            }
        }
    }

    fn write_response(conn: &mut TcpStream, content_type: Option<&str>, body: &[u8]) {
        let mut head = String::from("HTTP/1.1 200 OK\r\n");
        if let Some(content_type) = content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
        let _ = conn.write_all(head.as_bytes());
        let _ = conn.write_all(body);
    }

    fn serve_chunked(conn: &mut TcpStream) {
        let _ = conn.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        for part in ["hello ", "chunked ", "world"] {
            let _ = conn.write_all(format!("{:x}\r\n{part}\r\n", part.len()).as_bytes());
        }
        let _ = conn.write_all(b"0\r\n\r\n");
    }

    const SLOW_TOTAL: usize = 1_000_000;

    fn serve_slow(conn: &mut TcpStream) {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {SLOW_TOTAL}\r\n\r\n"
        );
        if conn.write_all(head.as_bytes()).is_err() {
            return;
        }
        let chunk = [0u8; 10_000];
        let mut written = 0;
        while written < SLOW_TOTAL {
            if conn.write_all(&chunk).is_err() {
                // Client went away; expected for cancellation tests.
                return;
            }
            written += chunk.len();
            thread::sleep(Duration::from_millis(25));
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u32,
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wyre-it-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

#[test]
fn get_with_no_body_round_trips_empty() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let response = client.get("/").send().wait();
    assert!(response.ok(), "reason: {}", response.reason());
    assert!(response.body().is_empty());
}

#[test]
fn text_body_round_trips() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let response = client.get("/").body("hello world").send().wait();
    assert!(response.ok(), "reason: {}", response.reason());
    assert!(response.body().is_text());
    assert_eq!(response.body().text().expect("text"), "hello world");
}

#[test]
fn json_body_round_trips() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let payload = json!({"name": "captain", "age": 42});
    let response = client.get("/").body(payload.clone()).send().wait();
    assert!(response.ok(), "reason: {}", response.reason());
    assert!(response.body().is_json());
    assert_eq!(response.body().json().expect("json"), &payload);
}

#[test]
fn typed_payloads_round_trip_through_every_verb() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");
    let person = Person {
        name: "captain".into(),
        age: 42,
    };

    for request in [
        client.get("/"),
        client.post("/"),
        client.put("/"),
        client.patch("/"),
        client.delete("/"),
    ] {
        let response = request.json(&person).send().wait();
        assert!(response.ok(), "reason: {}", response.reason());
        let back: Person = response.body().json_as().expect("typed body");
        assert_eq!(back, person);
    }
}

#[test]
fn unknown_content_type_streams_to_a_file() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");
    let dir = scratch_dir("download");

    let payload = vec![0x5au8; 150_000];
    let upload = dir.join("upload.bin");
    std::fs::write(&upload, &payload).expect("write upload");

    let downloads = dir.join("downloads");
    std::fs::create_dir_all(&downloads).expect("downloads dir");
    let response = client
        .get("/")
        .body(upload.as_path())
        .options(Options::new().temp_dir(&downloads))
        .send()
        .wait();

    assert!(response.ok(), "reason: {}", response.reason());
    assert!(response.body().is_file());
    let path = response.body().file_path().expect("file path").to_path_buf();
    assert_eq!(response.temp_path(), Some(path.as_path()));
    assert_eq!(std::fs::read(&path).expect("read download"), payload);

    // Persisting moves the temp file into place.
    let saved = dir.join("saved.bin");
    response.save(&saved).expect("save");
    assert!(!path.exists());
    assert_eq!(std::fs::read(&saved).expect("read saved").len(), payload.len());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn chunked_responses_decode_as_text() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let response = client.get("/chunked").send().wait();
    assert!(response.ok(), "reason: {}", response.reason());
    assert_eq!(response.body().text().expect("text"), "hello chunked world");
}

#[test]
fn multipart_upload_sends_exactly_its_size() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");
    let dir = scratch_dir("multipart");

    let empty = dir.join("empty.bin");
    std::fs::write(&empty, b"").expect("write empty");
    let small = dir.join("small.bin");
    std::fs::write(&small, vec![1u8; 70_000]).expect("write small");

    let form = FormData::new()
        .field("kind", "upload")
        .file("empty", "empty.bin", &empty)
        .expect("add empty")
        .file("small", "small.bin", &small)
        .expect("add small");
    let expected = form.size();

    let response = client.post("/").body(form).send().wait();
    assert!(response.ok(), "reason: {}", response.reason());
    assert_eq!(
        response.body().text().expect("text"),
        expected.to_string(),
        "server must receive exactly the advertised byte count"
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn auth_and_custom_headers_reach_the_server() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let response = client
        .get("/headers")
        .header("X-Custom", "yes")
        .header("User-Agent", "wyre-tests/1.0")
        .options(Options::new().auth(auth::bearer("tok123")))
        .send()
        .wait();

    assert!(response.ok(), "reason: {}", response.reason());
    let listing = response.body().text().expect("text").to_owned();
    assert!(listing.contains("authorization: Bearer tok123"), "{listing}");
    assert!(listing.contains("x-custom: yes"), "{listing}");
    // Caller headers override the client identifier.
    assert!(listing.contains("user-agent: wyre-tests/1.0"), "{listing}");
}

#[test]
fn progress_reports_are_monotonic_and_end_at_total() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let sent: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let received: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sent_sink = sent.clone();
    let received_sink = received.clone();

    let body = "x".repeat(10_000);
    let options = Options::new()
        .send_progress(move |total, processed| {
            sent_sink.lock().expect("lock").push((total, processed));
        })
        .send_step(0.13)
        .recv_progress(move |total, processed| {
            received_sink.lock().expect("lock").push((total, processed));
        })
        .recv_step(0.13)
        .write_buffer_size(1_024)
        .read_buffer_size(1_024);

    let response = client.post("/").body(body).options(options).send().wait();
    assert!(response.ok(), "reason: {}", response.reason());

    for reports in [sent, received] {
        let reports = reports.lock().expect("lock");
        assert!(!reports.is_empty());
        for pair in reports.windows(2) {
            assert!(pair[1].1 >= pair[0].1, "non-decreasing: {reports:?}");
        }
        assert_eq!(reports.last(), Some(&(10_000, 10_000)));
        assert_eq!(
            reports.iter().filter(|(_, p)| *p == 10_000).count(),
            1,
            "exactly one final report: {reports:?}"
        );
    }
}

#[test]
fn cancel_mid_download_leaves_no_partial_file() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");
    let downloads = scratch_dir("cancel");

    let pending = client
        .get("/slow")
        .options(Options::new().temp_dir(&downloads))
        .send();
    // Let the download get underway before cancelling.
    thread::sleep(Duration::from_millis(300));
    pending.cancel();
    let response = pending.wait();

    assert_eq!(response.status(), STATUS_CLIENT_CLOSED_REQUEST);
    assert_eq!(response.reason(), "Request canceled");
    assert!(response.body().is_empty());
    assert_eq!(
        std::fs::read_dir(&downloads).expect("dir").count(),
        0,
        "partial download must be deleted"
    );

    std::fs::remove_dir_all(&downloads).ok();
}

#[test]
fn cancel_after_completion_is_a_noop() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let pending = client.get("/").body("done").send();
    let id = pending.id();
    let response = pending.wait();
    assert!(response.ok(), "reason: {}", response.reason());

    client.cancel(id);
    client.cancel_all();
    assert_eq!(response.body().text().expect("text"), "done");
}

#[test]
fn request_timeout_fails_the_header_read() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let response = client
        .get("/stall")
        .options(Options::new().request_timeout(200))
        .send()
        .wait();
    assert_eq!(response.status(), STATUS_UNKNOWN);
    assert!(
        response.reason().starts_with("Socket read header failed; "),
        "reason: {}",
        response.reason()
    );
}

#[test]
fn oversized_responses_are_rejected_by_the_body_limit() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");

    let response = client
        .post("/")
        .body("x".repeat(1_000))
        .options(Options::new().body_limit(100))
        .send()
        .wait();
    assert_eq!(response.status(), STATUS_UNKNOWN);
    assert!(
        response.reason().starts_with("Failed to create parser; "),
        "reason: {}",
        response.reason()
    );
}

#[test]
fn connect_failure_is_reported_through_the_response() {
    // Nothing listens here; the request must resolve with a reasoned failure.
    let client = Client::new("http://127.0.0.1:9").expect("client");
    let response = client
        .get("/")
        .options(Options::new().connection_timeout(2_000))
        .send()
        .wait();
    assert_eq!(response.status(), STATUS_UNKNOWN);
    assert!(
        response.reason().starts_with("Failed to connect to 127.0.0.1:9; "),
        "reason: {}",
        response.reason()
    );
}

#[test]
fn shutdown_stops_new_work_and_is_idempotent() {
    let server = echo::EchoServer::start();
    let client = Client::new(&server.base_url()).expect("client");
    client.shutdown();
    client.shutdown();

    let response = client.get("/").send().wait();
    assert_eq!(response.status(), STATUS_UNKNOWN);
    assert_eq!(response.reason(), "");
}

#[test]
fn multiple_workers_serve_concurrent_requests() {
    let server = echo::EchoServer::start();
    let client =
        Client::with_options(&server.base_url(), Options::new().nb_threads(4)).expect("client");

    let pendings: Vec<_> = (0..8)
        .map(|i| client.get("/").body(format!("req-{i}")).send())
        .collect();
    for (i, pending) in pendings.into_iter().enumerate() {
        let response = pending.wait();
        assert!(response.ok(), "reason: {}", response.reason());
        assert_eq!(response.body().text().expect("text"), format!("req-{i}"));
    }
}
