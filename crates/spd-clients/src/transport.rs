//! Minimal JSON-over-HTTP/1.1 transport on hyper client connections.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, Uri, header};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Where to connect and what to ask for.
struct Target {
    /// `host:port` to open the TCP connection to.
    address: String,
    host: String,
    path: String,
}

fn target(endpoint: &str) -> ClientResult<Target> {
    let invalid = |reason: &str| ClientError::Endpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let uri: Uri = endpoint.parse().map_err(|_| invalid("not a URI"))?;
    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => return Err(invalid(&format!("unsupported scheme {other}"))),
        None => return Err(invalid("missing scheme")),
    }
    let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
    let port = authority.port_u16().unwrap_or(80);
    Ok(Target {
        address: format!("{}:{port}", authority.host()),
        host: authority.as_str().to_string(),
        path: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    })
}

/// Send one request and return the body of a 2xx response.
pub async fn send(
    method: Method,
    endpoint: &str,
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> ClientResult<Bytes> {
    let target = target(endpoint)?;
    let failed = |reason: String| ClientError::Request {
        endpoint: endpoint.to_string(),
        reason,
    };

    let exchange = async move {
        let stream = tokio::net::TcpStream::connect(&target.address)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| failed(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(target.path.as_str())
            .header(header::HOST, target.host.as_str())
            .header(header::USER_AGENT, "spd/0.1")
            .header(header::ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| failed(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| failed(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            debug!(%status, %endpoint, "non-2xx response");
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(bytes)
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            endpoint: endpoint.to_string(),
        }),
    }
}

pub async fn get_json<T: DeserializeOwned>(endpoint: &str, timeout: Duration) -> ClientResult<T> {
    let body = send(Method::GET, endpoint, None, timeout).await?;
    serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

pub async fn post_json<B: Serialize>(
    endpoint: &str,
    payload: &B,
    timeout: Duration,
) -> ClientResult<()> {
    let body = serde_json::to_vec(payload).map_err(|source| ClientError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })?;
    send(Method::POST, endpoint, Some(body), timeout).await?;
    Ok(())
}
