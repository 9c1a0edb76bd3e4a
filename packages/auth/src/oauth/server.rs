// ABOUTME: OAuth callback server for handling the Google consent redirect
// ABOUTME: Listens on localhost:42813 and hands /callback requests to the login session

use std::net::SocketAddr;
use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinSet,
    time::timeout,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    error::{AuthError, AuthResult},
    oauth::provider::{callback_url, CALLBACK_PATH},
};

/// How long an accepted connection may take to send its request line
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameters of a redirect to the callback path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// A callback request whose connection is still open for a response
pub struct CallbackRequest {
    stream: TcpStream,
    pub params: CallbackParams,
}

impl CallbackRequest {
    /// Answer with the success page
    pub async fn respond_success(mut self) {
        let response = http_response("200 OK", SUCCESS_HTML);
        if let Err(e) = self.stream.write_all(response.as_bytes()).await {
            error!("Failed to send success response: {}", e);
        }
    }

    /// Answer with an error page
    pub async fn respond_error(mut self, message: &str) {
        let response = http_response("400 Bad Request", &error_html(message));
        if let Err(e) = self.stream.write_all(response.as_bytes()).await {
            error!("Failed to send error response: {}", e);
        }
    }
}

/// Local listener bound for the lifetime of one login session
pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Bind on 127.0.0.1; port 0 picks a free port
    pub async fn bind(port: u16) -> AuthResult<Self> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::CallbackServer(format!("Failed to bind to {}: {}", addr, e)))?;
        let addr = listener.local_addr()?;

        info!("📡 OAuth callback server listening on {}", addr);
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URI matching the bound port
    pub fn callback_url(&self) -> String {
        callback_url(self.addr.port())
    }

    /// Wait for the next request on the callback path.
    ///
    /// Connections are read concurrently, so a socket that never sends a
    /// request cannot hold up the redirect. Other paths (favicon probes and
    /// the like) get a 404 and are skipped; unreadable connections are dropped.
    pub async fn next_callback(&self) -> AuthResult<CallbackRequest> {
        let mut reads = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = accepted.map_err(|e| {
                        AuthError::CallbackServer(format!("Failed to accept connection: {}", e))
                    })?;
                    debug!("Received connection from {}", peer_addr);
                    reads.spawn(read_request(stream));
                }
                Some(joined) = reads.join_next() => {
                    if let Ok(Some(request)) = joined {
                        return Ok(request);
                    }
                }
            }
        }
    }
}

/// Read one request; `None` when it is not a callback or never arrives
async fn read_request(mut stream: TcpStream) -> Option<CallbackRequest> {
    let mut buffer = vec![0; 4096];
    let n = match timeout(REQUEST_READ_TIMEOUT, stream.read(&mut buffer)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            warn!("Failed to read request: {}", e);
            return None;
        }
        Err(_) => {
            debug!("Connection sent no request within {:?}, dropping", REQUEST_READ_TIMEOUT);
            return None;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..n]);
    match parse_callback(&request) {
        Some(params) => Some(CallbackRequest { stream, params }),
        None => {
            debug!("Ignoring request outside the callback path");
            let response = http_response("404 Not Found", "Not Found");
            let _ = stream.write_all(response.as_bytes()).await;
            None
        }
    }
}

/// Parse the request line; `None` unless it targets the callback path
fn parse_callback(request: &str) -> Option<CallbackParams> {
    let first_line = request.lines().next()?;
    let target = first_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;

    if url.path() != CALLBACK_PATH {
        return None;
    }

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(params)
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

fn error_html(message: &str) -> String {
    format!(
        r#"<html><body><h1>❌ Authentication Failed</h1><p>{}</p><p>You can close this tab and return to the application.</p></body></html>"#,
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const SUCCESS_HTML: &str = r#"<html>
<head>
    <title>Authentication Successful</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 600px; margin: 100px auto; text-align: center; }
        h1 { color: #22c55e; }
        p { color: #64748b; }
    </style>
</head>
<body>
    <h1>✅ Authentication successful!</h1>
    <p>Google Calendar access has been granted.</p>
    <p>Please return to the application.</p>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code_and_state() {
        let request =
            "GET /callback?code=abc123&state=xyz789 HTTP/1.1\r\nHost: localhost:42813\r\n";
        let params = parse_callback(request).unwrap();
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz789"));
        assert_eq!(params.error, None);
    }

    #[test]
    fn test_parse_state_as_first_param_and_decodes() {
        let request = "GET /callback?state=a-b_c&code=4%2F0Ab&scope=email%20profile HTTP/1.1\r\n";
        let params = parse_callback(request).unwrap();
        assert_eq!(params.state.as_deref(), Some("a-b_c"));
        assert_eq!(params.code.as_deref(), Some("4/0Ab"));
    }

    #[test]
    fn test_parse_error() {
        let request = "GET /callback?error=access_denied&state=s HTTP/1.1\r\n";
        let params = parse_callback(request).unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.code, None);
    }

    #[test]
    fn test_parse_no_params() {
        let params = parse_callback("GET /callback HTTP/1.1\r\n").unwrap();
        assert_eq!(params, CallbackParams::default());
    }

    #[test]
    fn test_other_paths_are_ignored() {
        assert!(parse_callback("GET /favicon.ico HTTP/1.1\r\n").is_none());
        assert!(parse_callback("GET /callbacks?code=x HTTP/1.1\r\n").is_none());
        assert!(parse_callback("").is_none());
    }

    #[test]
    fn test_error_html_is_escaped() {
        let html = error_html("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(server.callback_url(), format!("http://localhost:{}/callback", port));
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let server = CallbackServer::bind(0).await.unwrap();
        let addr = server.local_addr();

        let _idle = TcpStream::connect(addr).await.unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /callback?state=s&code=c HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let request = tokio::time::timeout(Duration::from_secs(2), server.next_callback())
            .await
            .expect("callback should not wait on the idle connection")
            .unwrap();
        assert_eq!(request.params.code.as_deref(), Some("c"));
        assert_eq!(request.params.state.as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn test_second_bind_on_same_port_fails() {
        let server = CallbackServer::bind(0).await.unwrap();
        let result = CallbackServer::bind(server.local_addr().port()).await;
        assert!(matches!(result, Err(AuthError::CallbackServer(_))));
    }
}
