// ═══════════════════════════════════════════════════════════════════
// Provider Tests: Nordnet endpoints and status mapping
// ═══════════════════════════════════════════════════════════════════

use reqwest::StatusCode;

use nordnet_holdings_core::errors::CoreError;
use nordnet_holdings_core::providers::nordnet::{
    fetch_status, login_status, NordnetProvider, BASE_URL, CLIENT_HEADERS,
};
use nordnet_holdings_core::providers::traits::BrokerProvider;

// ── Endpoints ───────────────────────────────────────────────────────

mod endpoints {
    use super::*;

    #[test]
    fn defaults_to_danish_site() {
        let provider = NordnetProvider::new();
        assert_eq!(provider.base_url(), BASE_URL);
        assert_eq!(provider.base_url(), "https://www.nordnet.dk");
        assert_eq!(provider.name(), "Nordnet");
    }

    #[test]
    fn login_urls() {
        let provider = NordnetProvider::default();
        assert_eq!(provider.login_page_url(), "https://www.nordnet.dk/logind");
        assert_eq!(
            provider.login_url(),
            "https://www.nordnet.dk/api/2/authentication/basic/login"
        );
    }

    #[test]
    fn account_urls_embed_the_account_id() {
        let provider = NordnetProvider::new();
        assert_eq!(
            provider.account_info_url(1),
            "https://www.nordnet.dk/api/2/accounts/1/info"
        );
        assert_eq!(
            provider.positions_url(42),
            "https://www.nordnet.dk/api/2/accounts/42/positions"
        );
    }

    #[test]
    fn custom_base_url_drops_trailing_slash() {
        let provider = NordnetProvider::with_base_url("https://www.nordnet.se/");
        assert_eq!(provider.base_url(), "https://www.nordnet.se");
        assert_eq!(
            provider.positions_url(3),
            "https://www.nordnet.se/api/2/accounts/3/positions"
        );
    }

    #[test]
    fn client_identification_headers() {
        assert_eq!(
            CLIENT_HEADERS,
            [("client-id", "NEXT"), ("sub-client-id", "NEXT")]
        );
    }

    #[test]
    fn new_context_builds_a_client() {
        let provider = NordnetProvider::new();
        assert!(provider.new_context().is_ok());
    }
}

// ── Status mapping ──────────────────────────────────────────────────

mod status_mapping {
    use super::*;

    #[test]
    fn success_passes() {
        assert_eq!(login_status(StatusCode::OK), Ok(()));
        assert_eq!(login_status(StatusCode::NO_CONTENT), Ok(()));
        assert_eq!(fetch_status(StatusCode::OK), Ok(()));
    }

    #[test]
    fn login_failure_is_authentication_error() {
        assert_eq!(
            login_status(StatusCode::UNAUTHORIZED),
            Err(CoreError::Authentication { status: 401 })
        );
        assert_eq!(
            login_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(CoreError::Authentication { status: 503 })
        );
    }

    #[test]
    fn fetch_failure_is_fetch_error() {
        assert_eq!(
            fetch_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(CoreError::Fetch { status: 500 })
        );
        assert_eq!(
            fetch_status(StatusCode::UNAUTHORIZED),
            Err(CoreError::Fetch { status: 401 })
        );
    }

    #[test]
    fn login_failures_map_to_setup_codes() {
        let code = |status| login_status(status).unwrap_err().setup_error_code();
        assert_eq!(code(StatusCode::UNAUTHORIZED), "auth_error");
        assert_eq!(code(StatusCode::BAD_REQUEST), "http_error");
        assert_eq!(code(StatusCode::BAD_GATEWAY), "http_error");
    }
}

// ── Requests against a local HTTP server ────────────────────────────

mod context {
    use super::*;
    use nordnet_holdings_core::models::config::Credentials;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Request {
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: String,
    }

    impl Request {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).map(String::as_str)
        }
    }

    /// Minimal HTTP/1.1 server: answers each path with a fixed status and
    /// body and records every request it sees.
    struct TestServer {
        base_url: String,
        requests: Arc<Mutex<Vec<Request>>>,
    }

    impl TestServer {
        async fn start(routes: Vec<(&str, u16, &str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
                routes
                    .into_iter()
                    .map(|(path, status, body)| (path.to_string(), (status, body.to_string())))
                    .collect(),
            );
            let requests = Arc::new(Mutex::new(Vec::new()));

            let recorded = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move { serve(stream, &routes, &recorded).await });
                }
            });

            Self { base_url, requests }
        }

        fn provider(&self) -> NordnetProvider {
            NordnetProvider::with_base_url(self.base_url.clone())
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn serve(
        mut stream: TcpStream,
        routes: &HashMap<String, (u16, String)>,
        recorded: &Mutex<Vec<Request>>,
    ) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap().split(' ');
        let method = request_line.next().unwrap().to_string();
        let path = request_line.next().unwrap().to_string();
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[head_end..]).to_string();

        let (status, payload) = routes
            .get(&path)
            .cloned()
            .unwrap_or((404, String::new()));
        recorded.lock().unwrap().push(Request {
            method,
            path: path.clone(),
            headers,
            body,
        });

        let cookie = if path == "/logind" {
            "Set-Cookie: NEXT=baseline; Path=/\r\n"
        } else {
            ""
        };
        let response = format!(
            "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\n{cookie}Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
            payload.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    }

    const LOGIN: &str = "/api/2/authentication/basic/login";

    fn credentials() -> Credentials {
        Credentials {
            username: "alice".into(),
            password: "p&ss word".into(),
        }
    }

    fn position_json() -> &'static str {
        r#"[{
            "accno": 12345678, "accid": 1,
            "instrument": {"symbol": "NOVO B", "name": "Novo Nordisk B", "instrument_id": 1},
            "main_market_price": {"currency": "DKK", "value": 105.0},
            "morning_price": {"currency": "DKK", "value": 103.0},
            "acq_price": {"currency": "DKK", "value": 100.0},
            "acq_price_acc": {"currency": "DKK", "value": 100.0},
            "market_value": {"currency": "DKK", "value": 1050.0},
            "market_value_acc": {"currency": "DKK", "value": 1050.0},
            "qty": 10.0, "is_custom_gav": false, "margin_percent": 0, "pawn_percent": 0
        }]"#
    }

    #[tokio::test]
    async fn login_visits_page_then_posts_form_with_headers() {
        let server = TestServer::start(vec![("/logind", 200, "<html/>"), (LOGIN, 200, "{}")]).await;
        let context = server.provider().new_context().unwrap();

        context.visit_login_page().await.unwrap();
        context.submit_credentials(&credentials()).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);

        let page = &requests[0];
        assert_eq!((page.method.as_str(), page.path.as_str()), ("GET", "/logind"));
        assert_eq!(page.header("client-id"), None);

        let login = &requests[1];
        assert_eq!((login.method.as_str(), login.path.as_str()), ("POST", LOGIN));
        assert_eq!(login.header("client-id"), Some("NEXT"));
        assert_eq!(login.header("sub-client-id"), Some("NEXT"));
        assert_eq!(
            login.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(login.body, "username=alice&password=p%26ss+word");
        // Cookie from the login page travels with the credentials.
        assert!(login
            .header("cookie")
            .is_some_and(|c| c.contains("NEXT=baseline")));
    }

    #[tokio::test]
    async fn rejected_credentials_are_authentication_error() {
        let server = TestServer::start(vec![("/logind", 200, ""), (LOGIN, 401, "")]).await;
        let context = server.provider().new_context().unwrap();

        context.visit_login_page().await.unwrap();
        let err = context.submit_credentials(&credentials()).await.unwrap_err();
        assert_eq!(err, CoreError::Authentication { status: 401 });
    }

    #[tokio::test]
    async fn failing_login_page_is_authentication_error() {
        let server = TestServer::start(vec![("/logind", 503, "")]).await;
        let context = server.provider().new_context().unwrap();

        let err = context.visit_login_page().await.unwrap_err();
        assert_eq!(err, CoreError::Authentication { status: 503 });
    }

    #[tokio::test]
    async fn positions_are_fetched_with_headers_and_parsed() {
        let server =
            TestServer::start(vec![("/api/2/accounts/7/positions", 200, position_json())]).await;
        let context = server.provider().new_context().unwrap();

        let positions = context.positions(7).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].instrument.symbol, "NOVO B");
        assert_eq!(positions[0].qty, 10.0);

        let request = &server.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.header("client-id"), Some("NEXT"));
        assert_eq!(request.header("sub-client-id"), Some("NEXT"));
    }

    #[tokio::test]
    async fn account_info_is_parsed() {
        let server = TestServer::start(vec![(
            "/api/2/accounts/7/info",
            200,
            r#"[{"account_currency": "DKK", "accno": 12345678}]"#,
        )])
        .await;
        let context = server.provider().new_context().unwrap();

        let info = context.account_info(7).await.unwrap();
        assert_eq!(info[0].account_currency, "DKK");
    }

    #[tokio::test]
    async fn server_error_is_fetch_error() {
        let server = TestServer::start(vec![("/api/2/accounts/7/positions", 500, "oops")]).await;
        let context = server.provider().new_context().unwrap();

        let err = context.positions(7).await.unwrap_err();
        assert_eq!(err, CoreError::Fetch { status: 500 });
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server =
            TestServer::start(vec![("/api/2/accounts/7/positions", 200, r#"{"not": "a list"}"#)])
                .await;
        let context = server.provider().new_context().unwrap();

        let err = context.positions(7).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn closed_port_is_connectivity_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let context = NordnetProvider::with_base_url(base_url).new_context().unwrap();

        let err = context.visit_login_page().await.unwrap_err();
        assert!(matches!(err, CoreError::Connectivity(_)), "{err:?}");
    }
}
