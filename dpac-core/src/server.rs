use crate::error::{PacError, Result};
use crate::pac::{client_ipv4, PacService, PAC_CONTENT_TYPE};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task;
use tracing::{debug, info, warn};

/// PAC HTTP server configuration
#[derive(Clone)]
pub struct PacServerConfig {
    /// Address to listen on
    pub listen: SocketAddr,
    /// Client-to-PAC resolution
    pub service: Arc<PacService>,
}

/// Serves each client the PAC script for its own address
pub struct PacServer {
    config: PacServerConfig,
}

impl PacServer {
    pub fn new(config: PacServerConfig) -> Self {
        Self { config }
    }

    /// Bind the configured address and serve forever
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("PAC server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("Client connected: {}", peer);

            let service = self.config.service.clone();
            tokio::spawn(async move {
                let handler = service_fn(move |req| {
                    let service = service.clone();
                    async move { Ok::<_, Infallible>(respond(service, req, peer.ip()).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), handler)
                    .await
                {
                    debug!("Connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn respond(
    service: Arc<PacService>,
    req: Request<Incoming>,
    peer: IpAddr,
) -> Response<Full<Bytes>> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return status(StatusCode::METHOD_NOT_ALLOWED);
    }

    let Some(client) = client_ipv4(peer) else {
        debug!("No IPv4 address for client {}", peer);
        return status(StatusCode::NOT_FOUND);
    };

    // PAC files are read from disk on every request
    let lookup = task::spawn_blocking(move || service.document_for(client)).await;
    let doc = match lookup {
        Ok(Ok(doc)) => doc,
        Ok(Err(PacError::NoRoute { client })) => {
            debug!("No network route for {}", client);
            return status(StatusCode::NOT_FOUND);
        }
        Ok(Err(e)) => {
            warn!("Failed to build PAC for {}: {}", client, e);
            return status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(e) => {
            warn!("PAC lookup for {} did not complete: {}", client, e);
            return status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    info!("{} {} -> {} bytes", client, req.uri().path(), doc.content_length());
    let length = doc.content_length();
    let body = if req.method() == Method::HEAD {
        Bytes::new()
    } else {
        Bytes::from(doc.body)
    };
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, PAC_CONTENT_TYPE)
        .header(CONTENT_LENGTH, length)
        .body(Full::new(body))
        .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR))
}

fn status(code: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = code;
    response
}
