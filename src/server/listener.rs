//! Accept loop for the public listener

use crate::proxy::ProxyHandler;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP front door: one task per inbound connection, all sharing one handler.
pub struct ProxyServer {
    listener: TcpListener,
    handler: Arc<ProxyHandler>,
}

impl ProxyServer {
    pub async fn bind(addr: SocketAddr, handler: Arc<ProxyHandler>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Listening on http://{}", addr);
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Listener stopped");
                    return;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let handler = self.handler.clone();
                        tokio::spawn(serve_connection(socket, peer, handler));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }
    }
}

async fn serve_connection(socket: TcpStream, peer: SocketAddr, handler: Arc<ProxyHandler>) {
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(socket), service)
        .await
    {
        debug!("Connection error from {}: {}", peer, e);
    }
}
