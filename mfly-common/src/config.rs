//! Process configuration parsed once at startup.

/// Default RESP listener port.
pub const DEFAULT_PORT: u16 = 6379;

/// Address of the leader a follower node replicates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAddress {
    /// Leader hostname or IP.
    pub host: String,
    /// Leader RESP port.
    pub port: u16,
}

impl LeaderAddress {
    /// Parses a single `"host port"` flag value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(' ');
        let host = parts.next()?;
        let port = parts.next()?.parse::<u16>().ok()?;
        if parts.next().is_some() || host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl std::fmt::Display for LeaderAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable server configuration built from CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// RESP listener port.
    pub port: u16,
    /// Leader address when this node runs as a follower.
    pub replica_of: Option<LeaderAddress>,
    /// Directory holding the snapshot file.
    pub snapshot_dir: String,
    /// Snapshot file name inside `snapshot_dir`.
    pub snapshot_filename: String,
    /// Every recognized flag and its raw value, echoed by `CONFIG GET`.
    pub raw_flags: Vec<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            replica_of: None,
            snapshot_dir: String::new(),
            snapshot_filename: String::new(),
            raw_flags: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Builds the configuration from process arguments (without the program name).
    ///
    /// Each flag takes its value from the next positional argument. Unknown flags and malformed
    /// values are skipped; `--replicaof` expects one space-separated `"host port"` argument.
    #[must_use]
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Self::default();
        let mut index = 0_usize;
        while let Some(arg) = args.get(index) {
            let Some(flag) = arg.strip_prefix("--") else {
                index = index.saturating_add(1);
                continue;
            };
            let Some(value) = args.get(index.saturating_add(1)) else {
                break;
            };
            match flag {
                "port" => {
                    if let Ok(port) = value.parse::<u16>() {
                        config.port = port;
                    } else {
                        eprintln!("ignoring unparsable --port value: {value}");
                    }
                }
                "replicaof" => {
                    if let Some(address) = LeaderAddress::parse(value) {
                        config.replica_of = Some(address);
                    } else {
                        eprintln!("ignoring invalid --replicaof address: {value}");
                    }
                }
                "dir" => config.snapshot_dir = value.clone(),
                "dbfilename" => config.snapshot_filename = value.clone(),
                _ => {
                    index = index.saturating_add(1);
                    continue;
                }
            }
            config.raw_flags.push((flag.to_owned(), value.clone()));
            index = index.saturating_add(2);
        }
        config
    }

    /// Returns the full snapshot file path, or `None` when no location was configured.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<std::path::PathBuf> {
        if self.snapshot_filename.is_empty() {
            return None;
        }
        Some(std::path::Path::new(&self.snapshot_dir).join(&self.snapshot_filename))
    }

    /// Looks up one raw flag value by name.
    #[must_use]
    pub fn raw_flag(&self, name: &str) -> Option<&str> {
        self.raw_flags
            .iter()
            .find(|(flag, _)| flag == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this node runs as a follower.
    #[must_use]
    pub fn is_follower(&self) -> bool {
        self.replica_of.is_some()
    }
}
