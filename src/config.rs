use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::error::ConfigError;
use crate::models::DateWindow;
use crate::services::sync_planner::FailurePolicy;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Command line of the `nxget` binary
#[derive(Debug, Clone, Parser)]
#[command(name = "nxget")]
#[command(version, about = "Mirror a Nextcloud/WebDAV folder tree to a local directory")]
pub struct Cli {
    /// Write the list of files in the folder to this JSON file
    #[arg(short = 'l', long = "list", value_name = "OUTPUT_FILES")]
    pub list: Option<PathBuf>,

    /// Use this JSON file list (written by -l) as the files to download
    #[arg(short = 'f', long = "files", value_name = "INPUT_FILES")]
    pub files: Option<PathBuf>,

    /// Download the files to this local folder
    #[arg(short = 'g', long = "get", value_name = "LOCAL_FOLDER")]
    pub get: Option<PathBuf>,

    /// Username and password for the account
    #[arg(short = 'a', long = "auth", value_name = "USERNAME:PASS")]
    pub auth: Option<String>,

    /// Select files modified starting from and including this date (YYYY-MM-DD)
    #[arg(short = 's', long = "since", value_name = "SINCE_DATE")]
    pub since: Option<String>,

    /// Select files modified before and including this date (YYYY-MM-DD)
    #[arg(short = 'u', long = "until", value_name = "UNTIL_DATE")]
    pub until: Option<String>,

    /// Download a single remote file (requires -g)
    #[arg(short = 'o', long = "onefile", value_name = "FILE_URL")]
    pub onefile: Option<String>,

    /// Log every processed resource
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    pub timeout: u64,

    /// Maximum folder depth below the crawl root
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Keep downloading remaining files after a failed download
    #[arg(long)]
    pub keep_going: bool,

    /// The remote folder containing the data
    #[arg(value_name = "FOLDER_URL")]
    pub folder: Option<String>,
}

/// Account credentials for basic authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Parses `<username>:<password>`; the password may itself contain ':'
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (username, password) = value.split_once(':').ok_or(ConfigError::InvalidCredentials)?;
        let username = username.trim();
        if username.is_empty() {
            return Err(ConfigError::InvalidCredentials);
        }
        Ok(Self {
            username: username.to_string(),
            password: password.trim().to_string(),
        })
    }

    /// Reads `NXGET_USERNAME` and `NXGET_PASSWORD`
    pub fn from_env() -> Result<Self, ConfigError> {
        let username = env::var("NXGET_USERNAME").ok().filter(|u| !u.trim().is_empty());
        let password = env::var("NXGET_PASSWORD").ok();
        match (username, password) {
            (Some(username), Some(password)) => Ok(Self {
                username: username.trim().to_string(),
                password,
            }),
            _ => Err(ConfigError::MissingCredentials),
        }
    }
}

/// A remote URL split into the parts the crawler and planner need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Full URL as given
    pub url: String,
    /// `scheme://host[:port]`, prepended to every href in listings
    pub host_prefix: String,
    /// URL path, used to map remote files onto the local root
    pub root_path: String,
}

impl RemoteTarget {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            url: raw.to_string(),
            host_prefix: url.origin().ascii_serialization(),
            root_path: url.path().to_string(),
        })
    }

    /// Normalised form of `url` (lower-case scheme, default port dropped,
    /// dot segments resolved), matching the hrefs servers echo back
    pub fn crawl_url(&self) -> String {
        format!("{}{}", self.host_prefix, self.root_path)
    }
}

/// Where the list of files to mirror comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSource {
    /// Crawl the remote folder now
    Live(RemoteTarget),
    /// Replay a manifest written by an earlier list run
    Manifest(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    List { remote: RemoteTarget, output: PathBuf },
    Get { source: SyncSource, local_root: PathBuf },
    SingleFile { remote: RemoteTarget, local_root: PathBuf },
}

/// Immutable configuration of one run, validated before any network activity
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub credentials: Credentials,
    pub mode: RunMode,
    pub window: DateWindow,
    pub timeout: Duration,
    pub max_depth: usize,
    pub failure_policy: FailurePolicy,
    pub verbose: bool,
}

impl SyncConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        // Date problems take precedence over usage problems
        let window = DateWindow::parse(cli.since.as_deref(), cli.until.as_deref())?;
        let mode = Self::resolve_mode(&cli)?;

        let credentials = match cli.auth.as_deref() {
            Some(auth) => Credentials::parse(auth)?,
            None => Credentials::from_env()?,
        };

        Ok(Self {
            credentials,
            mode,
            window,
            timeout: Duration::from_secs(cli.timeout.max(1)),
            max_depth: cli.max_depth,
            failure_policy: if cli.keep_going {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            },
            verbose: cli.verbose,
        })
    }

    fn resolve_mode(cli: &Cli) -> Result<RunMode, ConfigError> {
        if let Some(file_url) = cli.onefile.as_deref() {
            if cli.list.is_some() || cli.files.is_some() || cli.folder.is_some() {
                return Err(ConfigError::ConflictingOptions(
                    "-o cannot be combined with -l, -f or a folder argument".to_string(),
                ));
            }
            let local_root = cli
                .get
                .clone()
                .ok_or_else(|| ConfigError::MissingArgument("-o requires -g <local folder>".to_string()))?;
            return Ok(RunMode::SingleFile {
                remote: RemoteTarget::parse(file_url)?,
                local_root,
            });
        }

        match (&cli.list, &cli.get) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingOptions("-l and -g are mutually exclusive".to_string())),
            (Some(_), None) if cli.files.is_some() => {
                Err(ConfigError::ConflictingOptions("-l and -f are mutually exclusive".to_string()))
            }
            (Some(output), None) => {
                let folder = cli
                    .folder
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingArgument("-l requires a folder URL".to_string()))?;
                Ok(RunMode::List {
                    remote: RemoteTarget::parse(folder)?,
                    output: output.clone(),
                })
            }
            (None, Some(local_root)) => {
                let source = match (&cli.files, cli.folder.as_deref()) {
                    (Some(_), Some(_)) => {
                        return Err(ConfigError::ConflictingOptions(
                            "-f cannot be combined with a folder argument".to_string(),
                        ))
                    }
                    (Some(manifest), None) => SyncSource::Manifest(manifest.clone()),
                    (None, Some(folder)) => SyncSource::Live(RemoteTarget::parse(folder)?),
                    (None, None) => {
                        return Err(ConfigError::MissingArgument(
                            "-g requires a folder URL or -f <input files>".to_string(),
                        ))
                    }
                };
                Ok(RunMode::Get {
                    source,
                    local_root: local_root.clone(),
                })
            }
            (None, None) if cli.files.is_some() => {
                Err(ConfigError::MissingArgument("-f requires -g <local folder>".to_string()))
            }
            (None, None) => Err(ConfigError::MissingArgument("one of -l, -g or -o is required".to_string())),
        }
    }
}
