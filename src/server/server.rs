use crate::server::{
    handler,
    handler::Handler,
    server::Error::{
        BufferError, LocalSocketAddrError, PublishSocketAddrError, RouterError,
        ServerConnectionError, SocketBindError,
    },
};
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder as ServerBuilder,
};
use std::{
    future::{pending, Future},
    net::SocketAddr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot::Sender,
    task::spawn,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind to socket addr {0}: {1}")]
    SocketBindError(SocketAddr, std::io::Error),
    #[error("cannot parse socket address: {0}")]
    SocketAddrParseError(#[from] std::net::AddrParseError),
    #[error("cannot obtain local address: {0}")]
    LocalSocketAddrError(std::io::Error),
    #[error("cannot publish bound TCP address {0}")]
    PublishSocketAddrError(SocketAddr),
    #[error("buffering error: {0}")]
    BufferError(hyper::Error),
    #[error("HTTP error: {0}")]
    HTTPError(#[from] http::Error),
    #[error("cannot process request: {0}")]
    RouterError(#[from] handler::Error),
    #[error("Server error: {0}")]
    ServerConnectionError(Box<dyn std::error::Error + Send + Sync>),
}

pub struct MockServerConfig {
    pub static_port: Option<u16>,
    pub expose: bool,
}

/// Accepts TCP connections and hands every buffered request to its handler.
pub struct MockServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    handler: Box<H>,
    config: MockServerConfig,
}

impl<H> MockServer<H>
where
    H: Handler + Send + Sync + 'static,
{
    pub(crate) fn new(handler: Box<H>, config: MockServerConfig) -> Self {
        MockServer { handler, config }
    }

    /// Runs the server until the process ends.
    pub async fn start(self) -> Result<(), Error> {
        self.start_with_signals(None, pending()).await
    }

    /// Runs the server until `shutdown` resolves.
    ///
    /// If a sender is given, the bound address is published through it as soon as the listener
    /// is ready. This is how callers learn the port when the server binds to port 0.
    pub async fn start_with_signals<F>(
        self,
        socket_addr_sender: Option<Sender<SocketAddr>>,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let host = if self.config.expose {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        };
        let addr: SocketAddr =
            format!("{}:{}", host, self.config.static_port.unwrap_or(0)).parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SocketBindError(addr, e))?;

        let local_addr = listener.local_addr().map_err(LocalSocketAddrError)?;
        if let Some(sender) = socket_addr_sender {
            sender.send(local_addr).map_err(PublishSocketAddrError)?;
        }

        tracing::info!("Listening on {}", local_addr);
        self.run_accept_loop(listener, shutdown).await
    }

    pub async fn run_accept_loop<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let shutdown = shutdown.shared();
        let server = Arc::new(self);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, _)) => {
                            let server = server.clone();
                            spawn(async move {
                                if let Err(err) = serve_connection(server, tcp_stream).await {
                                    tracing::error!("{:?}", err);
                                }
                            });
                        },
                        Err(err) => {
                            tracing::error!("TCP error: {:?}", err);
                        },
                    };
                }
                _ = shutdown.clone() => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn service(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
        tracing::trace!("New HTTP request received: {}", req.uri());

        let req = match buffer_request(req).await {
            Ok(req) => req,
            Err(err) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, BufferError(err));
            }
        };

        match self.handler.handle(req).await {
            Ok(response) => to_service_response(response),
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, RouterError(err)),
        }
    }
}

async fn serve_connection<H>(server: Arc<MockServer<H>>, stream: TcpStream) -> Result<(), Error>
where
    H: Handler + Send + Sync + 'static,
{
    tracing::trace!("new TCP connection incoming");

    #[allow(unused_mut)]
    let mut server_builder = ServerBuilder::new(TokioExecutor::new());

    #[cfg(feature = "http2")]
    server_builder.http2();

    server_builder
        .serve_connection(
            TokioIo::new(stream),
            service_fn(|req| server.clone().service(req)),
        )
        .await
        .map_err(ServerConnectionError)
}

async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, body))
}

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

fn error_response(
    code: StatusCode,
    err: Error,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    tracing::error!("failed to process request: {}", err);
    Ok(Response::builder()
        .status(code)
        .body(full(err.to_string()))?)
}

fn to_service_response(
    response: Response<Bytes>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, full(body)))
}
