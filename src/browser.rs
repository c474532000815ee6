//! A [`BrowserDriver`] backed by a locally installed Chrome or Chromium.
//!
//! The browser is launched with a throwaway profile and remote debugging enabled; the
//! driver then speaks the DevTools protocol over a websocket to navigate, watch network
//! requests, and read cookies.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::auth::{BrowserCookie, BrowserDriver, CapturedRequest};
use crate::error::{Error, Result};
use crate::utils::ids::new_session_id;

/// Environment variable naming the browser executable.
pub const CHROME_ENV: &str = "INCEPTION_CHROME";

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

const CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const MAC_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

type DevToolsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Locate a browser: `$INCEPTION_CHROME`, then the usual names on `PATH`.
pub fn find_chrome() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CHROME_ENV) {
        return Some(PathBuf::from(path));
    }
    let search = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&search) {
        for name in CANDIDATES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    let mac = Path::new(MAC_CHROME);
    mac.is_file().then(|| mac.to_path_buf())
}

fn ws_error(err: tungstenite::Error) -> Error {
    Error::browser(format!("DevTools connection failed: {err}"), Some(Box::new(err)))
}

fn not_open() -> Error {
    Error::browser("the browser has not been opened", None)
}

struct DevTools {
    socket: DevToolsSocket,
    next_id: u64,
    events: VecDeque<Value>,
}

impl DevTools {
    fn new(socket: DevToolsSocket) -> Self {
        Self {
            socket,
            next_id: 0,
            events: VecDeque::new(),
        }
    }

    /// Send a command and wait for its result.  Events that arrive meanwhile are queued.
    async fn call(&mut self, method: &str, params: Value, session: Option<&str>) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let mut command = json!({"id": id, "method": method, "params": params});
        if let Some(session) = session {
            command["sessionId"] = json!(session);
        }
        self.socket
            .send(Message::text(command.to_string()))
            .await
            .map_err(ws_error)?;
        loop {
            let Some(message) = self.read().await? else {
                return Err(Error::browser(
                    format!("browser went away while waiting for {method}"),
                    None,
                ));
            };
            if message.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(error) = message.get("error") {
                    return Err(Error::browser(format!("{method} failed: {error}"), None));
                }
                return Ok(message.get("result").cloned().unwrap_or(Value::Null));
            }
            if message.get("method").is_some() {
                self.events.push_back(message);
            }
        }
    }

    async fn next_event(&mut self) -> Result<Option<Value>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        loop {
            match self.read().await? {
                Some(message) if message.get("method").is_some() => return Ok(Some(message)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    async fn read(&mut self) -> Result<Option<Value>> {
        while let Some(frame) = self.socket.next().await {
            match frame.map_err(ws_error)? {
                Message::Text(text) => {
                    let value = serde_json::from_str(text.as_str()).map_err(|err| {
                        Error::browser(format!("unreadable DevTools message: {err}"), Some(Box::new(err)))
                    })?;
                    return Ok(Some(value));
                }
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }
}

/// Drives Chrome through the DevTools protocol.
///
/// Nothing is launched until [`BrowserDriver::open`].  The browser process is killed when
/// the driver is closed or dropped.
pub struct ChromeDriver {
    executable: Option<PathBuf>,
    child: Option<Child>,
    profile: Option<PathBuf>,
    devtools: Option<DevTools>,
    session: Option<String>,
}

impl ChromeDriver {
    /// A driver for the browser at `executable`, or whichever [`find_chrome`] locates.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable,
            child: None,
            profile: None,
            devtools: None,
            session: None,
        }
    }

    async fn launch(&mut self) -> Result<String> {
        let executable = self
            .executable
            .clone()
            .or_else(find_chrome)
            .ok_or_else(|| {
                Error::browser(
                    format!("could not find Chrome or Chromium; pass --chrome or set {CHROME_ENV}"),
                    None,
                )
            })?;
        let profile = std::env::temp_dir().join(format!("inception-login-{}", new_session_id()));
        tokio::fs::create_dir_all(&profile).await?;
        self.profile = Some(profile.clone());

        let mut child = Command::new(&executable)
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.display()))
            .args(["--no-first-run", "--no-default-browser-check", "about:blank"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                Error::browser(
                    format!("could not launch {}: {err}", executable.display()),
                    Some(Box::new(err)),
                )
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::browser("browser stderr was not captured", None))?;
        self.child = Some(child);

        let mut lines = BufReader::new(stderr).lines();
        let endpoint = loop {
            match lines.next_line().await? {
                Some(line) => {
                    if let Some(url) = line.strip_prefix(DEVTOOLS_BANNER) {
                        break url.trim().to_string();
                    }
                }
                None => {
                    return Err(Error::browser(
                        "the browser exited before opening DevTools",
                        None,
                    ));
                }
            }
        };
        // Keep draining so the browser never blocks on a full pipe.
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });
        Ok(endpoint)
    }
}

#[async_trait::async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open(&mut self, url: &str) -> Result<()> {
        let endpoint = self.launch().await?;
        let (socket, _) = tokio_tungstenite::connect_async(endpoint.as_str())
            .await
            .map_err(ws_error)?;
        let mut devtools = DevTools::new(socket);

        let target = devtools
            .call("Target.createTarget", json!({"url": "about:blank"}), None)
            .await?;
        let target_id = target["targetId"]
            .as_str()
            .ok_or_else(|| Error::browser("Target.createTarget returned no targetId", None))?
            .to_string();
        let attached = devtools
            .call(
                "Target.attachToTarget",
                json!({"targetId": target_id, "flatten": true}),
                None,
            )
            .await?;
        let session = attached["sessionId"]
            .as_str()
            .ok_or_else(|| Error::browser("Target.attachToTarget returned no sessionId", None))?
            .to_string();
        devtools
            .call("Network.enable", json!({}), Some(&session))
            .await?;
        devtools
            .call("Page.navigate", json!({"url": url}), Some(&session))
            .await?;

        self.devtools = Some(devtools);
        self.session = Some(session);
        Ok(())
    }

    async fn next_request(&mut self) -> Result<Option<CapturedRequest>> {
        let devtools = self.devtools.as_mut().ok_or_else(not_open)?;
        loop {
            let Some(event) = devtools.next_event().await? else {
                return Ok(None);
            };
            match event["method"].as_str() {
                Some("Network.requestWillBeSent") => {
                    let request = &event["params"]["request"];
                    let url = request["url"].as_str().unwrap_or_default().to_string();
                    let headers = request["headers"]
                        .as_object()
                        .map(|headers| {
                            headers
                                .iter()
                                .filter_map(|(name, value)| {
                                    Some((name.to_ascii_lowercase(), value.as_str()?.to_string()))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    return Ok(Some(CapturedRequest { url, headers }));
                }
                Some("Target.detachedFromTarget") | Some("Inspector.detached") => {
                    return Ok(None);
                }
                _ => continue,
            }
        }
    }

    async fn cookies(&mut self, url: &str) -> Result<Vec<BrowserCookie>> {
        let session = self.session.clone();
        let devtools = self.devtools.as_mut().ok_or_else(not_open)?;
        let result = devtools
            .call("Network.getCookies", json!({"urls": [url]}), session.as_deref())
            .await?;
        let cookies = result["cookies"]
            .as_array()
            .map(|cookies| {
                cookies
                    .iter()
                    .filter_map(|c| {
                        Some(BrowserCookie {
                            name: c["name"].as_str()?.to_string(),
                            value: c["value"].as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(cookies)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut devtools) = self.devtools.take() {
            let _ = devtools.call("Browser.close", json!({}), None).await;
        }
        self.session = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        if let Some(profile) = self.profile.take() {
            let _ = tokio::fs::remove_dir_all(profile).await;
        }
        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(profile) = self.profile.take() {
            let _ = std::fs::remove_dir_all(profile);
        }
    }
}
