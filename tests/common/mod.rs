//! In-process HTTP servers standing in for backends and the control plane.

#![allow(dead_code)]

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A request as seen by a mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct MockServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests().pop().expect("no request recorded")
    }
}

/// Spawn a server answering every request with `respond`.
pub async fn spawn_server<F>(respond: F) -> MockServer
where
    F: Fn(&Recorded) -> Response<Full<Bytes>> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let server = MockServer {
        addr,
        hits: hits.clone(),
        requests: requests.clone(),
    };

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let respond = respond.clone();
            let hits = hits.clone();
            let requests = requests.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let respond = respond.clone();
                    let hits = hits.clone();
                    let requests = requests.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body.collect().await.unwrap().to_bytes();
                        let recorded = Recorded {
                            method: parts.method.to_string(),
                            path: parts
                                .uri
                                .path_and_query()
                                .map(|pq| pq.as_str().to_string())
                                .unwrap_or_default(),
                            headers: parts.headers,
                            body,
                        };
                        hits.fetch_add(1, Ordering::SeqCst);
                        let response = respond(&recorded);
                        requests.lock().unwrap().push(recorded);
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(socket), service)
                    .await;
            });
        }
    });

    server
}

/// Spawn a server that answers 200 with `body`.
pub async fn spawn_text_server(body: &'static str) -> MockServer {
    spawn_server(move |_| Response::new(Full::new(Bytes::from_static(body.as_bytes())))).await
}

/// Spawn a server that answers at once, without reading the request body,
/// with a body that sends `first_chunk` and then never ends.
pub async fn spawn_stalling_server(first_chunk: &'static str) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let server = MockServer {
        addr,
        hits: hits.clone(),
        requests: requests.clone(),
    };

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let hits = hits.clone();
            let requests = requests.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let hits = hits.clone();
                    let requests = requests.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        requests.lock().unwrap().push(Recorded {
                            method: req.method().to_string(),
                            path: req.uri().to_string(),
                            headers: req.headers().clone(),
                            body: Bytes::new(),
                        });
                        Ok::<_, Infallible>(Response::new(endless_body(first_chunk)))
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(socket), service)
                    .await;
            });
        }
    });

    server
}

/// A body that yields `first_chunk` and then never finishes.
pub fn endless_body(
    first_chunk: &'static str,
) -> StreamBody<impl futures_util::Stream<Item = Result<Frame<Bytes>, Infallible>> + Send + 'static>
{
    let first = Frame::data(Bytes::from_static(first_chunk.as_bytes()));
    StreamBody::new(stream::iter([Ok(first)]).chain(stream::pending()))
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write an executable shell script standing in for the tunneling agent.
#[cfg(unix)]
pub fn write_agent_script(name: &str, body: &str) -> std::path::PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("tunnelgate-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{body}").unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
