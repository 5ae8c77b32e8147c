//! HTTP client for the remote shop API.
//!
//! Every component talks to the server through [`ShopApi`] so the game,
//! report and commission logic can be exercised against an in-memory double.

use std::future::Future;

use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{ConsoleError, Result, LOGIN_FAILED},
    game::WinningPattern,
};

/// Body of `POST /loginshop`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Shop the operator signs in to.
    #[serde(rename = "shopId")]
    pub shop_id: String,
    /// Operator user name.
    pub username: String,
    /// Operator password; never logged.
    pub password: String,
}

/// Successful login payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Bearer token, absent for shops without token auth.
    #[serde(default)]
    pub token: Option<String>,
    /// Server-side user object, stored as-is.
    #[serde(default)]
    pub user: Option<Value>,
}

/// Shop balance and commission from `GET /shop/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ShopProfile {
    /// Prepaid balance of the shop.
    #[serde(default)]
    pub balance: f64,
    /// Company commission as a fraction; may be unset on the server.
    #[serde(default)]
    pub commission_rate: Option<f64>,
}

/// Body of `POST /savegame`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveGameRequest {
    /// Shop starting the game.
    pub shop_id: String,
    /// Stake per card.
    pub bet_per_card: f64,
    /// Projected prize computed client-side.
    pub prize: f64,
    /// Number of selected cards.
    pub total_cards: usize,
    /// Selected card numbers in ascending order.
    pub selected_cards: Vec<u32>,
    /// Draw interval in milliseconds.
    pub interval: u64,
    /// Caller voice language.
    pub language: String,
    /// Commission rate reported by the shop, `null` when the server has none.
    pub commission_rate: Option<f64>,
    /// Pattern that wins the round.
    pub winning_pattern: WinningPattern,
}

/// Payload of `GET /reports/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShopReport {
    /// Shop the history belongs to.
    #[serde(default)]
    pub shop_id: String,
    /// One row per day, in server order.
    #[serde(default)]
    pub reports: Vec<RawReportRow>,
}

/// Daily report row as sent by the server.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReportRow {
    pub date: String,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub placed_bets: f64,
    #[serde(default)]
    pub awarded: f64,
    #[serde(default)]
    pub net_cash: f64,
    #[serde(default)]
    pub company_commission: f64,
}

/// Body of `PUT /shops/{id}/commission`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommissionUpdate {
    /// Requested rate in `[0, 1]`.
    pub commission_rate: f64,
}

/// Server confirmation of a commission change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommissionUpdated {
    /// Shop whose rate changed.
    pub shop_id: String,
    /// Rate now stored on the server.
    pub new_commission_rate: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// Endpoints of the remote shop API.
pub trait ShopApi: Send + Sync {
    /// `POST /loginshop`.
    fn login(&self, request: &LoginRequest) -> impl Future<Output = Result<LoginResponse>> + Send;

    /// `GET /shop/{shop_id}`.
    fn shop_profile(&self, shop_id: &str) -> impl Future<Output = Result<ShopProfile>> + Send;

    /// `POST /savegame`.
    fn save_game(&self, request: &SaveGameRequest) -> impl Future<Output = Result<()>> + Send;

    /// `GET /reports/{shop_id}`.
    fn reports(&self, shop_id: &str) -> impl Future<Output = Result<ShopReport>> + Send;

    /// `PUT /shops/{shop_id}/commission`, bearer authenticated.
    fn update_commission(
        &self,
        shop_id: &str,
        token: Option<&str>,
        update: CommissionUpdate,
    ) -> impl Future<Output = Result<CommissionUpdated>> + Send;
}

/// [`ShopApi`] over HTTPS with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpShopApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpShopApi {
    /// Create a client rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint URL for `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| format!("invalid API base URL {}: {err}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| format!("API base URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl ShopApi for HttpShopApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        debug!(shop_id = %request.shop_id, username = %request.username, "POST /loginshop");
        let url = self
            .endpoint(&["loginshop"])
            .map_err(|err| ConsoleError::Auth(format!("{LOGIN_FAILED}: {err}")))?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                warn!(shop_id = %request.shop_id, error = %err, "Login request failed");
                ConsoleError::Auth(format!("{LOGIN_FAILED}: unable to reach server"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            warn!(shop_id = %request.shop_id, %status, "Login rejected");
            return Err(ConsoleError::Auth(
                detail.unwrap_or_else(|| LOGIN_FAILED.to_string()),
            ));
        }

        response.json::<LoginResponse>().await.map_err(|err| {
            warn!(shop_id = %request.shop_id, error = %err, "Unreadable login response");
            ConsoleError::Auth("Invalid response from server".to_string())
        })
    }

    async fn shop_profile(&self, shop_id: &str) -> Result<ShopProfile> {
        debug!(shop_id, "GET /shop");
        let url = self.endpoint(&["shop", shop_id]).map_err(ConsoleError::Fetch)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| fetch_error(shop_id, "shop", err))?;
        let response = ensure_success(response, shop_id, "shop")
            .await
            .map_err(|detail| ConsoleError::Fetch(format!("failed to fetch shop data: {detail}")))?;
        response
            .json()
            .await
            .map_err(|err| fetch_error(shop_id, "shop", err))
    }

    async fn save_game(&self, request: &SaveGameRequest) -> Result<()> {
        debug!(
            shop_id = %request.shop_id,
            cards = request.total_cards,
            pattern = request.winning_pattern.label(),
            "POST /savegame"
        );
        let url = self.endpoint(&["savegame"]).map_err(ConsoleError::GameStart)?;
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                warn!(shop_id = %request.shop_id, error = %err, "Game start request failed");
                ConsoleError::GameStart(err.to_string())
            })?;
        ensure_success(response, &request.shop_id, "savegame")
            .await
            .map_err(ConsoleError::GameStart)?;
        Ok(())
    }

    async fn reports(&self, shop_id: &str) -> Result<ShopReport> {
        debug!(shop_id, "GET /reports");
        let url = self.endpoint(&["reports", shop_id]).map_err(ConsoleError::Fetch)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| fetch_error(shop_id, "reports", err))?;
        let response = ensure_success(response, shop_id, "reports")
            .await
            .map_err(|detail| ConsoleError::Fetch(format!("failed to fetch reports: {detail}")))?;
        response
            .json()
            .await
            .map_err(|err| fetch_error(shop_id, "reports", err))
    }

    async fn update_commission(
        &self,
        shop_id: &str,
        token: Option<&str>,
        update: CommissionUpdate,
    ) -> Result<CommissionUpdated> {
        debug!(shop_id, rate = update.commission_rate, "PUT /shops/commission");
        let url = self
            .endpoint(&["shops", shop_id, "commission"])
            .map_err(ConsoleError::Update)?;
        let mut request = self
            .client
            .put(url)
            .json(&update);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|err| {
            warn!(shop_id, error = %err, "Commission update request failed");
            ConsoleError::Update(err.to_string())
        })?;
        let response = ensure_success(response, shop_id, "commission")
            .await
            .map_err(ConsoleError::Update)?;
        response
            .json()
            .await
            .map_err(|err| ConsoleError::Update(format!("unreadable confirmation: {err}")))
    }
}

fn fetch_error(shop_id: &str, endpoint: &str, err: reqwest::Error) -> ConsoleError {
    warn!(shop_id, endpoint, error = %err, "Fetch failed");
    ConsoleError::Fetch(err.to_string())
}

/// Pass successful responses through; otherwise describe the failure.
async fn ensure_success(
    response: Response,
    shop_id: &str,
    endpoint: &str,
) -> std::result::Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = error_detail(response).await;
    warn!(shop_id, endpoint, %status, "Request rejected");
    Err(describe_status(status, detail))
}

fn describe_status(status: StatusCode, detail: Option<String>) -> String {
    match detail {
        Some(detail) => format!("{detail} ({status})"),
        None => format!("server responded with {status}"),
    }
}

/// Extract the `detail` field of an error body, if the server sent one.
async fn error_detail(response: Response) -> Option<String> {
    let body = response.text().await.ok()?;
    parse_detail(&body)
}

fn parse_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        task::JoinHandle,
    };

    #[test]
    fn login_request_uses_camel_case_shop_id() {
        let request = LoginRequest {
            shop_id: "lidu".to_string(),
            username: "cashier".to_string(),
            password: "secret".to_string(),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({"shopId": "lidu", "username": "cashier", "password": "secret"})
        );
    }

    #[test]
    fn save_game_body_matches_endpoint_contract() {
        let request = SaveGameRequest {
            shop_id: "lidu".to_string(),
            bet_per_card: 10.0,
            prize: 24.0,
            total_cards: 3,
            selected_cards: vec![1, 5, 9],
            interval: 4000,
            language: "Amharic".to_string(),
            commission_rate: None,
            winning_pattern: WinningPattern::AnyOneLine,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["commission_rate"], Value::Null);
        assert_eq!(body["winning_pattern"], json!("any 1 Line"));
        assert_eq!(body["interval"], json!(4000));
        assert_eq!(body["selected_cards"], json!([1, 5, 9]));
        assert_eq!(body["total_cards"], json!(3));
    }

    #[test]
    fn report_payload_tolerates_missing_fields() {
        let report: ShopReport = serde_json::from_value(json!({
            "shop_id": "lidu",
            "reports": [{"date": "2024-01-01", "play_count": 5, "placed_bets": 50.0}]
        }))
        .unwrap();
        assert_eq!(report.reports.len(), 1);
        assert_eq!(report.reports[0].awarded, 0.0);
        assert_eq!(report.reports[0].play_count, 5);
    }

    #[test]
    fn shop_profile_accepts_null_commission() {
        let profile: ShopProfile =
            serde_json::from_value(json!({"balance": 120.5, "commission_rate": null})).unwrap();
        assert_eq!(profile.balance, 120.5);
        assert_eq!(profile.commission_rate, None);
    }

    #[test]
    fn detail_extraction() {
        assert_eq!(
            parse_detail(r#"{"detail": "Invalid credentials"}"#),
            Some("Invalid credentials".to_string())
        );
        assert_eq!(parse_detail(r#"{"detail": ""}"#), None);
        assert_eq!(parse_detail(r#"{"message": "nope"}"#), None);
        assert_eq!(parse_detail("<html>bad gateway</html>"), None);
        assert!(parse_detail(r#"{"detail": [{"msg": "field required"}]}"#)
            .unwrap()
            .contains("field required"));
    }

    #[test]
    fn base_url_is_normalised() -> anyhow::Result<()> {
        let api = HttpShopApi::new("http://localhost:8000/");
        assert_eq!(api.base_url(), "http://localhost:8000");
        let url = api.endpoint(&["loginshop"]).map_err(anyhow::Error::msg)?;
        assert_eq!(url.as_str(), "http://localhost:8000/loginshop");

        let nested = HttpShopApi::new("http://localhost:8000/api/");
        let url = nested
            .endpoint(&["shops", "lidu", "commission"])
            .map_err(anyhow::Error::msg)?;
        assert_eq!(url.as_str(), "http://localhost:8000/api/shops/lidu/commission");
        Ok(())
    }

    #[test]
    fn shop_id_stays_inside_its_path_segment() -> anyhow::Result<()> {
        let api = HttpShopApi::new("http://localhost:8000");

        let url = api.endpoint(&["reports", "a#b"]).map_err(anyhow::Error::msg)?;
        assert_eq!(url.path(), "/reports/a%23b");
        assert_eq!(url.fragment(), None);

        let url = api
            .endpoint(&["reports", "a/../../loginshop"])
            .map_err(anyhow::Error::msg)?;
        assert_eq!(url.path(), "/reports/a%2F..%2F..%2Floginshop");

        let url = api.endpoint(&["reports", "a?x=1"]).map_err(anyhow::Error::msg)?;
        assert!(url.path().starts_with("/reports/a%3F"));
        assert_eq!(url.query(), None);
        Ok(())
    }

    #[test]
    fn malformed_base_url_is_reported() {
        let api = HttpShopApi::new("not a url");
        assert!(api.endpoint(&["loginshop"]).is_err());
    }

    #[tokio::test]
    async fn unreachable_login_server_is_an_auth_error() {
        let api = HttpShopApi::new("http://127.0.0.1:9");
        let result = api.login(&login_request()).await;
        match result {
            Err(ConsoleError::Auth(message)) => assert!(message.starts_with(LOGIN_FAILED)),
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_report_server_is_a_fetch_error() {
        let api = HttpShopApi::new("http://127.0.0.1:9");
        let result = api.reports("lidu").await;
        assert!(matches!(result, Err(ConsoleError::Fetch(_))));
    }

    fn login_request() -> LoginRequest {
        LoginRequest {
            shop_id: "lidu".to_string(),
            username: "cashier".to_string(),
            password: "secret".to_string(),
        }
    }

    /// Accept a single connection, answer it with `status` and `body`, and
    /// hand back the raw request text.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> anyhow::Result<(String, JoinHandle<anyhow::Result<String>>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await?;
            let request = read_request(&mut socket).await?;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await?;
            socket.shutdown().await?;
            Ok::<_, anyhow::Error>(request)
        });
        Ok((format!("http://{addr}"), handle))
    }

    async fn read_request(socket: &mut TcpStream) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = socket.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buffer);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    break;
                }
            }
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[tokio::test]
    async fn rejected_login_reports_server_detail() -> anyhow::Result<()> {
        let (base, server) =
            serve_once("401 Unauthorized", r#"{"detail": "Invalid credentials"}"#).await?;
        let result = HttpShopApi::new(base).login(&login_request()).await;
        let request = server.await??;

        assert!(request.starts_with("POST /loginshop HTTP/1.1"));
        assert!(request.contains(r#""shopId":"lidu""#));
        match result {
            Err(ConsoleError::Auth(message)) => assert_eq!(message, "Invalid credentials"),
            other => panic!("expected auth error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejected_login_without_detail_is_generic() -> anyhow::Result<()> {
        let (base, server) = serve_once("500 Internal Server Error", "{}").await?;
        let result = HttpShopApi::new(base).login(&login_request()).await;
        server.await??;
        match result {
            Err(ConsoleError::Auth(message)) => assert_eq!(message, LOGIN_FAILED),
            other => panic!("expected auth error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn failed_save_is_a_game_start_error() -> anyhow::Result<()> {
        let (base, server) =
            serve_once("500 Internal Server Error", r#"{"detail": "db down"}"#).await?;
        let request = SaveGameRequest {
            shop_id: "lidu".to_string(),
            bet_per_card: 10.0,
            prize: 8.0,
            total_cards: 1,
            selected_cards: vec![7],
            interval: 4000,
            language: "Amharic".to_string(),
            commission_rate: Some(0.2),
            winning_pattern: WinningPattern::All,
        };
        let result = HttpShopApi::new(base).save_game(&request).await;
        let raw = server.await??;

        assert!(raw.starts_with("POST /savegame HTTP/1.1"));
        match result {
            Err(ConsoleError::GameStart(message)) => {
                assert!(message.contains("db down"));
                assert!(message.contains("500"));
            }
            other => panic!("expected game start error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn forbidden_commission_update_is_an_update_error() -> anyhow::Result<()> {
        let (base, server) = serve_once("403 Forbidden", "").await?;
        let result = HttpShopApi::new(base)
            .update_commission("lidu", Some("tok"), CommissionUpdate { commission_rate: 0.3 })
            .await;
        let raw = server.await??;

        assert!(raw.starts_with("PUT /shops/lidu/commission HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer tok"));
        assert!(raw.contains(r#""commission_rate":0.3"#));
        match result {
            Err(ConsoleError::Update(message)) => assert!(message.contains("403")),
            other => panic!("expected update error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn confirmed_commission_update_is_decoded() -> anyhow::Result<()> {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"shop_id": "lidu", "new_commission_rate": 0.25}"#,
        )
        .await?;
        let confirmed = HttpShopApi::new(base)
            .update_commission("lidu", Some("tok"), CommissionUpdate { commission_rate: 0.3 })
            .await?;
        server.await??;
        assert_eq!(confirmed.shop_id, "lidu");
        assert_eq!(confirmed.new_commission_rate, 0.25);
        Ok(())
    }

    #[tokio::test]
    async fn reserved_characters_are_escaped_on_the_wire() -> anyhow::Result<()> {
        let (base, server) = serve_once("404 Not Found", r#"{"detail": "no shop"}"#).await?;
        let result = HttpShopApi::new(base).reports("a#b").await;
        let raw = server.await??;

        assert!(raw.starts_with("GET /reports/a%23b HTTP/1.1"));
        match result {
            Err(ConsoleError::Fetch(message)) => assert!(message.contains("no shop")),
            other => panic!("expected fetch error, got {other:?}"),
        }
        Ok(())
    }
}
