use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::Filter;

use crate::auth::latch::{LatchError, LatchWaiter, OneShotLatch};
use crate::error::{AuthError, AuthResult};

/// How long the listener gets to finish in-flight responses after delivery.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Query parameters of the redirect that reached the listener first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub params: HashMap<String, String>,
}

impl CallbackParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn code(&self) -> Option<&str> {
        self.get("code").filter(|c| !c.is_empty())
    }

    pub fn error(&self) -> Option<&str> {
        self.get("error").filter(|e| !e.is_empty())
    }

    /// Resolves the redirect into an authorization code.
    pub fn into_code(self) -> AuthResult<String> {
        if let Some(error) = self.error() {
            let detail = match self.get("error_description") {
                Some(description) => format!("{} ({})", error, description),
                None => error.to_string(),
            };
            return Err(AuthError::AccessDenied(detail));
        }
        self.code().map(str::to_string).ok_or(AuthError::MissingCode)
    }
}

/// Local HTTP listener that receives exactly one OAuth2 redirect.
///
/// A `localhost` redirect is served on 127.0.0.1 and, when the host has an
/// IPv6 loopback, on [::1] with the same port, since browsers may resolve
/// `localhost` to either.
#[derive(Debug, Clone)]
pub struct CallbackServer {
    bind_addr: SocketAddr,
    ipv6_loopback: bool,
    path: String,
    timeout: Duration,
}

impl CallbackServer {
    /// Derives the bind address and route from the configured redirect URI.
    pub fn from_redirect_uri(redirect_uri: &str, timeout: Duration) -> AuthResult<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::config_error(format!("invalid redirect_uri {}: {}", redirect_uri, e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| AuthError::config_error("redirect_uri has no host"))?;
        let is_localhost = host.eq_ignore_ascii_case("localhost");
        let ip: IpAddr = if is_localhost {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.trim_start_matches('[')
                .trim_end_matches(']')
                .parse()
                .map_err(|_| {
                    AuthError::config_error(format!(
                        "redirect_uri host {} is not localhost or an IP address",
                        host
                    ))
                })?
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AuthError::config_error("redirect_uri has no port"))?;

        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            ipv6_loopback: is_localhost,
            path,
            timeout,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether `listen` also tries the IPv6 loopback.
    pub fn serves_ipv6_loopback(&self) -> bool {
        self.ipv6_loopback
    }

    /// Binds the listener and starts accepting on its own task.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn listen(self) -> AuthResult<PendingCallback> {
        let (latch, waiter) = OneShotLatch::<CallbackParams>::new();
        let expected_path = self.path.clone();

        let callback_route = warp::get()
            .and(warp::path::full())
            .and(warp::query::<HashMap<String, String>>())
            .map(move |full: FullPath, params: HashMap<String, String>| {
                if full.as_str() != expected_path {
                    return warp::reply::with_status(warp::reply::html(NOT_FOUND_PAGE), StatusCode::NOT_FOUND);
                }

                let params = CallbackParams { params };
                let page = if params.error().is_some() { ERROR_PAGE } else { SUCCESS_PAGE };

                if latch.fire(params) {
                    log::info!("📥 OAuth2 redirect received");
                    warp::reply::with_status(warp::reply::html(page), StatusCode::OK)
                } else {
                    log::debug!("Ignoring repeated OAuth2 redirect");
                    warp::reply::with_status(warp::reply::html(ALREADY_RECEIVED_PAGE), StatusCode::OK)
                }
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (local_addr, server_future) = warp::serve(callback_route.clone())
            .try_bind_with_graceful_shutdown(self.bind_addr, async {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| AuthError::callback_error(format!("failed to bind {}: {}", self.bind_addr, e)))?;

        log::info!("👂 Callback server listening on http://{}{}", local_addr, self.path);

        let mut listeners = vec![Listener {
            shutdown: shutdown_tx,
            server: tokio::spawn(server_future),
        }];

        if self.ipv6_loopback {
            let v6_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local_addr.port());
            let (v6_tx, v6_rx) = oneshot::channel::<()>();
            match warp::serve(callback_route).try_bind_with_graceful_shutdown(v6_addr, async {
                let _ = v6_rx.await;
            }) {
                Ok((bound, server_future)) => {
                    log::debug!("Callback server also listening on http://{}{}", bound, self.path);
                    listeners.push(Listener {
                        shutdown: v6_tx,
                        server: tokio::spawn(server_future),
                    });
                }
                // The IPv4 listener alone still serves the redirect.
                Err(e) => log::debug!("IPv6 loopback not available for the callback: {}", e),
            }
        }

        Ok(PendingCallback {
            local_addr,
            path: self.path,
            timeout: self.timeout,
            waiter,
            listeners,
        })
    }
}

struct Listener {
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl Listener {
    async fn close(self) {
        let Listener { shutdown, mut server } = self;
        let _ = shutdown.send(());
        match tokio::time::timeout(CLOSE_GRACE, &mut server).await {
            Ok(Ok(())) => log::debug!("Callback server closed"),
            Ok(Err(e)) => log::warn!("⚠️ Callback server task failed while closing: {}", e),
            Err(_) => {
                log::warn!("⚠️ Callback server did not close within {:?}, aborting", CLOSE_GRACE);
                server.abort();
            }
        }
    }
}

/// A bound listener waiting for its redirect.
pub struct PendingCallback {
    local_addr: SocketAddr,
    path: String,
    timeout: Duration,
    waiter: LatchWaiter<CallbackParams>,
    listeners: Vec<Listener>,
}

impl PendingCallback {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn callback_url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.path)
    }

    /// Blocks until the first redirect arrives or the wait budget runs out,
    /// then closes the listener in both cases.
    pub async fn wait(self) -> AuthResult<CallbackParams> {
        let PendingCallback {
            timeout,
            waiter,
            listeners,
            ..
        } = self;

        let outcome = waiter.wait(timeout).await;

        for listener in listeners {
            listener.close().await;
        }

        match outcome {
            Ok(params) => Ok(params),
            Err(LatchError::TimedOut) => Err(AuthError::Timeout(timeout)),
            Err(LatchError::Abandoned) => Err(AuthError::callback_error("callback listener stopped before delivery")),
        }
    }
}

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Twitch authorization complete</title><meta charset="UTF-8"></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 60px;">
    <h1 style="color: #9146ff;">Authorization complete</h1>
    <p>You can close this window and return to the application.</p>
</body>
</html>
"#;

const ERROR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Twitch authorization failed</title><meta charset="UTF-8"></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 60px;">
    <h1 style="color: #dc3545;">Authorization failed</h1>
    <p>Check the application logs, then restart the authorization.</p>
</body>
</html>
"#;

const ALREADY_RECEIVED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Already received</title><meta charset="UTF-8"></head>
<body style="font-family: Arial, sans-serif; text-align: center; margin-top: 60px;">
    <p>This authorization was already received. You can close this window.</p>
</body>
</html>
"#;

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html><html><body><p>Not found</p></body></html>";

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> CallbackParams {
        CallbackParams {
            params: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_from_redirect_uri_localhost() {
        let server = CallbackServer::from_redirect_uri(
            "http://localhost:3030/userauth",
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(server.bind_addr(), "127.0.0.1:3030".parse::<SocketAddr>().unwrap());
        assert_eq!(server.path(), "/userauth");
        assert!(server.serves_ipv6_loopback());

        let literal = CallbackServer::from_redirect_uri("http://127.0.0.1:3030/userauth", Duration::from_secs(30))
            .unwrap();
        assert!(!literal.serves_ipv6_loopback());
    }

    #[test]
    fn test_from_redirect_uri_rejects_remote_host() {
        let err = CallbackServer::from_redirect_uri("https://example.com/cb", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn test_into_code() {
        assert_eq!(params(&[("code", "abc123"), ("scope", "x")]).into_code().unwrap(), "abc123");
        assert!(matches!(params(&[]).into_code(), Err(AuthError::MissingCode)));
        assert!(matches!(params(&[("code", "")]).into_code(), Err(AuthError::MissingCode)));

        let denied = params(&[("error", "access_denied"), ("error_description", "user said no")])
            .into_code()
            .unwrap_err();
        assert_eq!(
            denied.to_string(),
            "authorization denied on redirect: access_denied (user said no)"
        );
    }

    #[tokio::test]
    async fn test_delivers_first_code_once() {
        let pending = CallbackServer::from_redirect_uri("http://127.0.0.1:0/userauth", Duration::from_secs(5))
            .unwrap()
            .listen()
            .unwrap();
        let url = pending.callback_url();
        let http = reqwest::Client::new();

        let first = http.get(format!("{}?code=abc123", url)).send().await.unwrap();
        assert_eq!(first.status(), 200);
        assert!(first.text().await.unwrap().contains("Authorization complete"));

        let second = http.get(format!("{}?code=other", url)).send().await.unwrap();
        assert_eq!(second.status(), 200);
        assert!(second.text().await.unwrap().contains("already received"));

        let received = pending.wait().await.unwrap();
        assert_eq!(received.code(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_concurrent_redirects_fire_once() {
        let pending = CallbackServer::from_redirect_uri("http://127.0.0.1:0/userauth", Duration::from_secs(5))
            .unwrap()
            .listen()
            .unwrap();
        let url = pending.callback_url();
        let waiting = tokio::spawn(pending.wait());

        let http = reqwest::Client::new();
        let (a, b) = tokio::join!(
            http.get(format!("{}?code=first", url)).send(),
            http.get(format!("{}?code=second", url)).send(),
        );
        let bodies = [a.unwrap().text().await.unwrap(), b.unwrap().text().await.unwrap()];
        let delivered = bodies.iter().filter(|b| b.contains("Authorization complete")).count();
        assert_eq!(delivered, 1);

        let code = waiting.await.unwrap().unwrap().into_code().unwrap();
        assert!(code == "first" || code == "second");
    }

    #[tokio::test]
    async fn test_other_paths_do_not_deliver() {
        let pending = CallbackServer::from_redirect_uri("http://127.0.0.1:0/userauth", Duration::from_millis(300))
            .unwrap()
            .listen()
            .unwrap();
        let addr = pending.local_addr();

        let resp = reqwest::get(format!("http://{}/elsewhere?code=abc", addr)).await.unwrap();
        assert_eq!(resp.status(), 404);

        assert!(matches!(pending.wait().await, Err(AuthError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_times_out_without_redirect() {
        let pending = CallbackServer::from_redirect_uri("http://127.0.0.1:0/userauth", Duration::from_millis(50))
            .unwrap()
            .listen()
            .unwrap();
        let addr = pending.local_addr();

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout(d) if d == Duration::from_millis(50)));

        // Listener is released after the timeout.
        assert!(std::net::TcpListener::bind(addr).is_ok());
    }

    #[tokio::test]
    async fn test_localhost_redirect_is_served_on_both_loopbacks() {
        if std::net::TcpListener::bind("[::1]:0").is_err() {
            eprintln!("no IPv6 loopback on this host, skipping");
            return;
        }

        let pending = CallbackServer::from_redirect_uri("http://localhost:0/userauth", Duration::from_secs(5))
            .unwrap()
            .listen()
            .unwrap();
        let port = pending.local_addr().port();
        assert!(pending.local_addr().ip().is_ipv4());

        let resp = reqwest::get(format!("http://[::1]:{}/userauth?code=v6code", port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let received = pending.wait().await.unwrap();
        assert_eq!(received.code(), Some("v6code"));

        // Both listeners are released.
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
        assert!(std::net::TcpListener::bind(("::1", port)).is_ok());
    }
}
