//! Configuration for the command-line tool.
//!
//! Flags are parsed with `arrrg`; persisted state lives in a small config directory holding
//! `config.json` (credentials and preferences) and `default_chat` (the default chat id).

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::auth::{DEFAULT_LOGIN_TIMEOUT, StaticHeaders};
use crate::client::{API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL, Inception};
use crate::error::{Error, Result};
use crate::types::DEFAULT_MODEL;

/// Environment variable naming the config directory.
pub const CONFIG_DIR_ENV: &str = "INCEPTION_CONFIG_DIR";

const APP_DIR: &str = "inception-api";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_CHAT_FILE: &str = "default_chat";

/// Command-line arguments for the inception-api tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Model to use for new chats and completions.
    #[arrrg(optional, "Model to use (default: lambda.mercury-coder-small)", "MODEL")]
    pub model: Option<String>,

    /// Service root.
    #[arrrg(optional, "Service URL (default: https://chat.inceptionlabs.ai)", "URL")]
    pub base_url: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log in through a browser rather than with an API key.
    #[arrrg(flag, "auth login: log in through a browser instead of with an API key")]
    pub browser: bool,

    /// Browser executable for `--browser`.
    #[arrrg(optional, "Chrome/Chromium executable for --browser", "PATH")]
    pub chrome: Option<String>,

    /// Bound on a browser login, in seconds.
    #[arrrg(optional, "Seconds to wait for a browser login (default: 300)", "SECONDS")]
    pub login_timeout: Option<u64>,

    /// Bound on each streamed chunk, in seconds.
    #[arrrg(optional, "Seconds to wait for each streamed chunk (default: no limit)", "SECONDS")]
    pub chunk_timeout: Option<u64>,
}

/// What `config.json` holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// API key saved by `auth login`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Headers captured by `auth login --browser`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// Service root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Preferred model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl StoredConfig {
    /// True if credentials of either kind are stored.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() || self.headers.is_some()
    }

    /// Drop stored credentials, keeping preferences.  Returns true if anything was removed.
    pub fn clear_credentials(&mut self) -> bool {
        let had = self.has_credentials();
        self.api_key = None;
        self.headers = None;
        had
    }

    /// Request headers from the stored credentials, falling back to `$INCEPTION_API_KEY`.
    pub fn credentials(&self) -> Result<StaticHeaders> {
        if let Some(headers) = &self.headers {
            return StaticHeaders::from_pairs(headers);
        }
        if let Some(key) = &self.api_key {
            return StaticHeaders::bearer(key);
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) => StaticHeaders::bearer(&key),
            Err(_) => Err(Error::authentication(
                "not logged in; run `inception-api auth login`",
            )),
        }
    }
}

/// Resolve the config directory from an environment lookup.
///
/// `$INCEPTION_CONFIG_DIR`, else `$XDG_CONFIG_HOME/inception-api`, else
/// `$HOME/.config/inception-api`.
pub fn resolve_config_dir(env: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    let set = |name: &str| env(name).filter(|value| !value.is_empty());
    if let Some(dir) = set(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    if let Some(xdg) = set("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join(APP_DIR));
    }
    set("HOME").map(|home| PathBuf::from(home).join(".config").join(APP_DIR))
}

/// Files under the config directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// A store rooted at `dir`.  Nothing is created until something is saved.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// A store in the directory named by the environment.
    pub fn from_env() -> Result<Self> {
        resolve_config_dir(|name| std::env::var_os(name))
            .map(Self::new)
            .ok_or_else(|| {
                Error::validation(
                    format!("cannot locate a config directory; set {CONFIG_DIR_ENV}"),
                    Some(CONFIG_DIR_ENV.to_string()),
                )
            })
    }

    /// The directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    fn default_chat_path(&self) -> PathBuf {
        self.dir.join(DEFAULT_CHAT_FILE)
    }

    /// Load `config.json`; a missing file is an empty config.
    pub fn load(&self) -> Result<StoredConfig> {
        let path = self.config_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StoredConfig::default()),
            Err(err) => return Err(Error::io(format!("cannot read {}", path.display()), err)),
        };
        serde_json::from_str(&text).map_err(|err| {
            Error::protocol(
                format!("{} is not a valid config: {err}", path.display()),
                None,
                Some(Box::new(err)),
            )
        })
    }

    /// Write `config.json`, readable only by the owner where the platform allows.
    pub fn save(&self, config: &StoredConfig) -> Result<()> {
        let text = serde_json::to_string_pretty(config)?;
        self.write_private(&self.config_path(), &text)
    }

    /// The default chat id, if one is set.
    pub fn default_chat(&self) -> Result<Option<String>> {
        let path = self.default_chat_path();
        match fs::read_to_string(&path) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(format!("cannot read {}", path.display()), err)),
        }
    }

    /// Make `id` the default chat.
    pub fn set_default_chat(&self, id: &str) -> Result<()> {
        self.write_private(&self.default_chat_path(), id.trim())
    }

    /// Forget the default chat.  Returns true if one was set.
    pub fn clear_default_chat(&self) -> Result<bool> {
        let path = self.default_chat_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::io(format!("cannot remove {}", path.display()), err)),
        }
    }

    fn write_private(&self, path: &Path, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| Error::io(format!("cannot create {}", self.dir.display()), err))?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let write = || -> io::Result<()> {
            use std::io::Write;
            let mut file = options.open(path)?;
            file.write_all(contents.as_bytes())?;
            file.flush()
        };
        write().map_err(|err| Error::io(format!("cannot write {}", path.display()), err))
    }
}

/// Settings for one run of the tool, after combining flags, stored config and environment.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Model for new chats and completions.
    pub model: String,
    /// Service root.
    pub base_url: String,
    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
    /// Whether `auth login` drives a browser.
    pub browser: bool,
    /// Browser executable, if given.
    pub chrome: Option<PathBuf>,
    /// Bound on a browser login.
    pub login_timeout: Duration,
    /// Bound on each streamed chunk.
    pub chunk_timeout: Option<Duration>,
}

impl CliConfig {
    /// Combine `args` with `stored`.  Flags win, then the stored config, then the
    /// environment, then built-in defaults.
    pub fn resolve(args: CliArgs, stored: &StoredConfig) -> Self {
        let model = args
            .model
            .or_else(|| stored.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = args
            .base_url
            .or_else(|| stored.base_url.clone())
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        CliConfig {
            model,
            base_url,
            use_color: !args.no_color,
            browser: args.browser,
            chrome: args.chrome.map(PathBuf::from),
            login_timeout: args
                .login_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LOGIN_TIMEOUT),
            chunk_timeout: args.chunk_timeout.map(Duration::from_secs),
        }
    }

    /// A client for the stored credentials.
    pub fn client(&self, stored: &StoredConfig) -> Result<Inception> {
        let headers = stored.credentials()?;
        let client = Inception::with_options(
            headers.header_map().clone(),
            Some(self.base_url.clone()),
            None,
        )?;
        Ok(client.with_chunk_timeout(self.chunk_timeout))
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::resolve(CliArgs::default(), &StoredConfig::default())
    }
}
