//! Authentication: producing the headers the client attaches to every request.
//!
//! Two strategies implement [`HeaderProvider`]:
//!
//! - [`StaticHeaders`] wraps a bearer token or a header map supplied by the caller.
//! - [`BrowserLogin`] drives a real browser through the service's login page and harvests
//!   the authorization header and session cookies from the first authenticated request
//!   the page makes.  The browser itself sits behind [`BrowserDriver`]; see
//!   [`ChromeDriver`](crate::browser::ChromeDriver) for the DevTools implementation.
//!
//! The client only ever sees a [`HeaderMap`] and never knows which strategy produced it.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::observability::{LOGIN_ATTEMPTS, LOGIN_DURATION, LOGIN_FAILURES};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("inception-api/", env!("CARGO_PKG_VERSION"));

/// Default bound on interactive login.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Something that can produce the request headers for the client.
#[async_trait::async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Produce the headers: at least `authorization`, plus whatever else the strategy
    /// captured (`cookie`, `content-type`, `user-agent`, ...).
    async fn headers(&self) -> Result<HeaderMap>;
}

/// Headers supplied directly by the caller.  No network activity.
#[derive(Debug, Clone)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    /// Headers for an API key, sent as a bearer token.
    pub fn bearer(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::authentication("API key is empty"));
        }
        Self::from_pairs([("authorization", format!("Bearer {token}"))])
    }

    /// Headers from name/value pairs, e.g. a map captured by an earlier browser login.
    ///
    /// `content-type` and `user-agent` are filled in when absent.  The pairs must include a
    /// non-empty `authorization` header.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let name = header_name(name.as_ref())?;
            let value = header_value(name.as_str(), value.as_ref())?;
            headers.insert(name, value);
        }
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| !v.trim().is_empty());
        if !authorized {
            return Err(Error::authentication("headers carry no authorization"));
        }
        add_defaults(&mut headers);
        Ok(Self { headers })
    }

    /// The headers.
    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// The headers as plain strings, for persisting.
    pub fn to_pairs(&self) -> BTreeMap<String, String> {
        header_pairs(&self.headers)
    }
}

#[async_trait::async_trait]
impl HeaderProvider for StaticHeaders {
    async fn headers(&self) -> Result<HeaderMap> {
        Ok(self.headers.clone())
    }
}

/// Bearer-token headers for an API key.
pub fn static_headers(token: &str) -> Result<StaticHeaders> {
    StaticHeaders::bearer(token)
}

/// Interactive login through `driver`.
pub fn browser_login<D: BrowserDriver>(driver: D, options: LoginOptions) -> BrowserLogin<D> {
    BrowserLogin::new(driver, options)
}

/// Render a header map as plain strings.  Values that are not visible ASCII are skipped.
pub fn header_pairs(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| Error::validation(format!("invalid header name {name:?}"), Some(name.to_string())))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value.trim())
        .map_err(|_| Error::validation(format!("invalid value for header {name}"), Some(name.to_string())))
}

fn add_defaults(headers: &mut HeaderMap) {
    headers
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));
    headers
        .entry(header::USER_AGENT)
        .or_insert(HeaderValue::from_static(USER_AGENT));
}

/// A request the login browser made, as observed by a [`BrowserDriver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedRequest {
    /// Full request URL.
    pub url: String,
    /// Request headers, names lowercased.
    pub headers: BTreeMap<String, String>,
}

impl CapturedRequest {
    /// Look up a header by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A cookie held by the login browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
}

/// A controllable browser that can show a page and report the requests it makes.
#[async_trait::async_trait]
pub trait BrowserDriver: Send {
    /// Start the browser if needed and navigate to `url`.
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Wait for the next request the page makes.  `None` means the browser went away.
    async fn next_request(&mut self) -> Result<Option<CapturedRequest>>;

    /// Cookies the browser would send to `url`.
    async fn cookies(&mut self, url: &str) -> Result<Vec<BrowserCookie>>;

    /// Shut the browser down.
    async fn close(&mut self) -> Result<()>;
}

/// Where and how long to wait for an interactive login.
#[derive(Debug, Clone)]
pub struct LoginOptions {
    /// Service root, without a trailing slash.
    pub base_url: String,
    /// Path of the login page.
    pub login_path: String,
    /// Path prefix of authenticated API requests.
    pub api_prefix: String,
    /// Bound on the whole login.
    pub timeout: Duration,
}

impl LoginOptions {
    /// Options for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            login_path: "/auth".to_string(),
            api_prefix: "/api/".to_string(),
            timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    /// Set the login bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }

    fn api_url(&self) -> String {
        format!("{}{}", self.base_url, self.api_prefix)
    }
}

impl Default for LoginOptions {
    fn default() -> Self {
        Self::new(crate::client::DEFAULT_BASE_URL)
    }
}

struct LoginState<D> {
    driver: D,
    headers: Option<HeaderMap>,
}

/// Headers harvested from an interactive browser login.
///
/// The login runs on the first call to [`HeaderProvider::headers`]; later calls return
/// the same headers.  The browser is closed once the login succeeds or fails.
pub struct BrowserLogin<D> {
    state: Mutex<LoginState<D>>,
    options: LoginOptions,
}

impl<D: BrowserDriver> BrowserLogin<D> {
    /// Prepare a login; nothing happens until headers are requested.
    pub fn new(driver: D, options: LoginOptions) -> Self {
        Self {
            state: Mutex::new(LoginState {
                driver,
                headers: None,
            }),
            options,
        }
    }

    /// The options in effect.
    pub fn options(&self) -> &LoginOptions {
        &self.options
    }

    /// Run the login (if it has not run yet) and return the headers as [`StaticHeaders`].
    pub async fn login(&self) -> Result<StaticHeaders> {
        let headers = self.headers().await?;
        Ok(StaticHeaders { headers })
    }

    async fn capture(driver: &mut D, options: &LoginOptions) -> Result<HeaderMap> {
        driver.open(&options.login_url()).await?;
        let api_url = options.api_url();
        let authorization = loop {
            let Some(request) = driver.next_request().await? else {
                return Err(Error::authentication(
                    "the browser closed before the login completed",
                ));
            };
            if !request.url.starts_with(&api_url) {
                continue;
            }
            if let Some(value) = request.header("authorization")
                && !value.trim().is_empty()
            {
                break value.to_string();
            }
        };
        let cookies = driver.cookies(&options.base_url).await?;
        if cookies.is_empty() {
            return Err(Error::authentication(
                "login completed but no session cookies were captured",
            ));
        }
        let cookie = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        let pairs = [("authorization", authorization), ("cookie", cookie)];
        Ok(StaticHeaders::from_pairs(pairs)?.headers)
    }
}

#[async_trait::async_trait]
impl<D: BrowserDriver> HeaderProvider for BrowserLogin<D> {
    async fn headers(&self) -> Result<HeaderMap> {
        let mut state = self.state.lock().await;
        if let Some(headers) = &state.headers {
            return Ok(headers.clone());
        }
        LOGIN_ATTEMPTS.click();
        let started = Instant::now();
        let limit = self.options.timeout;
        let outcome = tokio::time::timeout(limit, Self::capture(&mut state.driver, &self.options))
            .await
            .unwrap_or_else(|_| {
                Err(Error::auth_timeout(
                    "no authenticated request was observed",
                    limit.as_secs_f64(),
                ))
            });
        // Teardown failures do not invalidate captured credentials.
        let _ = state.driver.close().await;
        LOGIN_DURATION.add(started.elapsed().as_secs_f64());
        match outcome {
            Ok(headers) => {
                state.headers = Some(headers.clone());
                Ok(headers)
            }
            Err(err) => {
                LOGIN_FAILURES.click();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedDriver {
        requests: VecDeque<CapturedRequest>,
        cookies: Vec<BrowserCookie>,
        hang: bool,
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
        visited: Vec<String>,
    }

    #[async_trait::async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn open(&mut self, url: &str) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.visited.push(url.to_string());
            Ok(())
        }

        async fn next_request(&mut self) -> Result<Option<CapturedRequest>> {
            if let Some(request) = self.requests.pop_front() {
                return Ok(Some(request));
            }
            if self.hang {
                futures::future::pending::<()>().await;
            }
            Ok(None)
        }

        async fn cookies(&mut self, _: &str) -> Result<Vec<BrowserCookie>> {
            Ok(self.cookies.clone())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request(url: &str, headers: &[(&str, &str)]) -> CapturedRequest {
        CapturedRequest {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn cookie(name: &str, value: &str) -> BrowserCookie {
        BrowserCookie {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn options() -> LoginOptions {
        LoginOptions::new("https://chat.example.com/").with_timeout(Duration::from_secs(30))
    }

    #[test]
    fn bearer_headers() {
        let headers = StaticHeaders::bearer("test-api-key").unwrap();
        let map = headers.header_map();
        assert_eq!(map[header::AUTHORIZATION], "Bearer test-api-key");
        assert_eq!(map[header::CONTENT_TYPE], "application/json");
        assert_eq!(map[header::USER_AGENT], USER_AGENT);
    }

    #[test]
    fn empty_key_is_an_auth_error() {
        assert!(StaticHeaders::bearer("  ").unwrap_err().is_authentication());
    }

    #[test]
    fn pairs_need_authorization() {
        let err = StaticHeaders::from_pairs([("cookie", "a=b")]).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn pairs_round_trip_through_strings() {
        let headers =
            StaticHeaders::from_pairs([("Authorization", "Bearer t"), ("Cookie", "a=b")]).unwrap();
        let pairs = headers.to_pairs();
        assert_eq!(pairs["authorization"], "Bearer t");
        assert_eq!(pairs["cookie"], "a=b");
        assert_eq!(pairs["content-type"], "application/json");
    }

    #[test]
    fn bad_header_values_are_rejected() {
        let err = StaticHeaders::from_pairs([("authorization", "Bearer \n x")]).unwrap_err();
        assert!(err.is_validation());
        let err = StaticHeaders::from_pairs([("bad header", "x")]).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn static_provider_returns_its_headers() {
        let provider = static_headers("k").unwrap();
        let headers = provider.headers().await.unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer k");
    }

    #[tokio::test]
    async fn browser_login_harvests_authorization_and_cookies() {
        let closed = Arc::new(AtomicUsize::new(0));
        let opened = Arc::new(AtomicUsize::new(0));
        let driver = ScriptedDriver {
            requests: VecDeque::from(vec![
                request("https://chat.example.com/static/app.js", &[]),
                request("https://chat.example.com/api/config", &[]),
                request(
                    "https://chat.example.com/api/v1/auths/",
                    &[("authorization", "Bearer from-browser")],
                ),
            ]),
            cookies: vec![cookie("token", "abc"), cookie("session", "xyz")],
            opened: opened.clone(),
            closed: closed.clone(),
            ..Default::default()
        };
        let login = browser_login(driver, options());
        let headers = login.headers().await.unwrap();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer from-browser");
        assert_eq!(headers[header::COOKIE], "token=abc; session=xyz");
        assert_eq!(headers[header::USER_AGENT], USER_AGENT);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        // The login is one-time.
        let again = login.login().await.unwrap();
        assert_eq!(again.header_map()[header::COOKIE], "token=abc; session=xyz");
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        let state = login.state.lock().await;
        assert_eq!(state.driver.visited, vec!["https://chat.example.com/auth"]);
    }

    #[tokio::test]
    async fn missing_cookies_are_an_auth_error() {
        let driver = ScriptedDriver {
            requests: VecDeque::from(vec![request(
                "https://chat.example.com/api/v1/chats/",
                &[("authorization", "Bearer x")],
            )]),
            ..Default::default()
        };
        let err = browser_login(driver, options()).headers().await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn closed_browser_is_an_auth_error() {
        let closed = Arc::new(AtomicUsize::new(0));
        let driver = ScriptedDriver {
            closed: closed.clone(),
            ..Default::default()
        };
        let err = browser_login(driver, options()).headers().await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_login_times_out() {
        let closed = Arc::new(AtomicUsize::new(0));
        let driver = ScriptedDriver {
            hang: true,
            closed: closed.clone(),
            ..Default::default()
        };
        let err = browser_login(driver, options()).headers().await.unwrap_err();
        assert!(err.is_auth_timeout());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
