use std::{
    net::{AddrParseError, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use bucket::{BucketClient, BucketError, Credentials};
use clap::Parser;
use structures::Dimensions;
use thiserror::Error;

use crate::publisher::SnapshotTargets;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The address and port the server listens at
    #[arg(long, env = "PLACE_PORT", default_value = ":8080")]
    pub port: String,

    /// The directory serving files
    #[arg(long, env = "PLACE_ROOT", default_value = "./root")]
    pub root: PathBuf,

    /// The png to load as the canvas
    #[arg(long, env = "PLACE_LOAD")]
    pub load: Option<PathBuf>,

    /// The path to save the canvas
    #[arg(long, env = "PLACE_SAVE", default_value = "./place.png")]
    pub save: PathBuf,

    /// The log file to append to
    #[arg(long, env = "PLACE_LOG")]
    pub log: Option<PathBuf>,

    /// The width to create the canvas
    #[arg(long, env = "PLACE_WIDTH", default_value_t = 1024)]
    pub width: u32,

    /// The height to create the canvas
    #[arg(long, env = "PLACE_HEIGHT", default_value_t = 1024)]
    pub height: u32,

    /// The maximum number of connections
    #[arg(long, env = "PLACE_COUNT", default_value_t = 64)]
    pub count: usize,

    /// Save interval in seconds
    #[arg(long = "sinterval", env = "PLACE_SINTERVAL", default_value_t = 180)]
    pub save_interval: u64,

    /// Enable whitelist
    #[arg(long = "wl", env = "PLACE_WL")]
    pub whitelist_enabled: bool,

    /// The path to a whitelist
    #[arg(long, env = "PLACE_WHITELIST", default_value = "./whitelist.csv")]
    pub whitelist: PathBuf,

    /// The png to load as the record
    #[arg(long, env = "PLACE_LOAD_RECORD")]
    pub load_record: Option<PathBuf>,

    /// The path to save the record
    #[arg(long, env = "PLACE_SAVE_RECORD", default_value = "./record.png")]
    pub save_record: PathBuf,

    /// Bucket url, objects are addressed as <bucket-url><path>
    #[arg(long, env = "PLACE_BUCKET_URL")]
    pub bucket_url: Option<String>,

    /// Identity provider password-grant url
    #[arg(long, env = "PLACE_API_URL")]
    pub api_url: Option<String>,

    /// Account email used for uploads
    #[arg(long, env = "PLACE_USER_EMAIL")]
    pub user_email: Option<String>,

    /// Account password used for uploads
    #[arg(long, env = "PLACE_USER_PASSWORD", hide_env_values = true)]
    pub user_password: Option<String>,

    /// Identity provider api key
    #[arg(long, env = "PLACE_ANON_KEY", hide_env_values = true)]
    pub anon_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {value:?}: {source}")]
    ListenAddress {
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("canvas dimensions must be non-zero, got {width} x {height}")]
    EmptyCanvas { width: u32, height: u32 },

    #[error("save interval must be at least one second")]
    ZeroInterval,

    #[error("maximum number of connections must be at least one")]
    ZeroConnections,

    #[error("--bucket-url is set but --{0} is missing")]
    MissingRemoteSetting(&'static str),
}

/// Where a raster is loaded from at startup and saved to afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub load: Option<PathBuf>,
    pub save: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    pub whitelist: PathBuf,
    pub record: SnapshotPaths,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub bucket_url: String,
    pub credentials: Credentials,
}

impl RemoteConfig {
    pub fn client(&self) -> Result<BucketClient, BucketError> {
        BucketClient::new(self.bucket_url.clone(), self.credentials.clone())
    }
}

/// Validated settings, built once at startup and passed down by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub root: PathBuf,
    pub log_path: Option<PathBuf>,
    pub dimensions: Dimensions,
    pub max_connections: usize,
    pub save_interval: Duration,
    pub canvas: SnapshotPaths,
    /// Present when the whitelist is enabled.
    pub access: Option<AccessConfig>,
    /// Absent in local-only mode.
    pub remote: Option<RemoteConfig>,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let listen = parse_listen_addr(&args.port)?;

        if args.width == 0 || args.height == 0 {
            return Err(ConfigError::EmptyCanvas {
                width: args.width,
                height: args.height,
            });
        }
        if args.save_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if args.count == 0 {
            return Err(ConfigError::ZeroConnections);
        }

        let access = args.whitelist_enabled.then(|| AccessConfig {
            whitelist: args.whitelist.clone(),
            record: SnapshotPaths {
                load: args.load_record.clone(),
                save: args.save_record.clone(),
            },
        });

        let remote = match args.bucket_url {
            Some(bucket_url) => {
                let credentials = Credentials {
                    api_url: args
                        .api_url
                        .ok_or(ConfigError::MissingRemoteSetting("api-url"))?,
                    email: args
                        .user_email
                        .ok_or(ConfigError::MissingRemoteSetting("user-email"))?,
                    password: args
                        .user_password
                        .ok_or(ConfigError::MissingRemoteSetting("user-password"))?,
                    anon_key: args
                        .anon_key
                        .ok_or(ConfigError::MissingRemoteSetting("anon-key"))?,
                };
                Some(RemoteConfig {
                    bucket_url: with_trailing_slash(bucket_url),
                    credentials,
                })
            }
            None => None,
        };

        Ok(Config {
            listen,
            root: args.root,
            log_path: args.log,
            dimensions: Dimensions::new(args.width, args.height),
            max_connections: args.count,
            save_interval: Duration::from_secs(args.save_interval),
            canvas: SnapshotPaths {
                load: args.load,
                save: args.save,
            },
            access,
            remote,
        })
    }

    pub fn targets(&self) -> SnapshotTargets {
        SnapshotTargets {
            canvas: self.canvas.save.clone(),
            record: self.access.as_ref().map(|access| access.record.save.clone()),
        }
    }
}

/// Accepts `host:port` as well as the bare `:port` form, which binds every interface.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    let full = match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => value.to_string(),
    };
    full.parse().map_err(|source| ConfigError::ListenAddress {
        value: value.to_string(),
        source,
    })
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["place"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn default_flags() {
        let config = config(&[]).unwrap();

        assert_eq!(config.listen, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.root, PathBuf::from("./root"));
        assert_eq!(config.dimensions, Dimensions::new(1024, 1024));
        assert_eq!(config.max_connections, 64);
        assert_eq!(config.save_interval, Duration::from_secs(180));
        assert_eq!(config.canvas.load, None);
        assert_eq!(config.canvas.save, PathBuf::from("./place.png"));
        assert!(config.access.is_none());
        assert!(config.remote.is_none());
        assert!(config.log_path.is_none());
    }

    #[test]
    fn whitelist_flag_enables_record_paths() {
        let config = config(&[
            "--wl",
            "--whitelist",
            "./wl.csv",
            "--load-record",
            "./old-record.png",
        ])
        .unwrap();

        let access = config.access.clone().unwrap();
        assert_eq!(access.whitelist, PathBuf::from("./wl.csv"));
        assert_eq!(access.record.load, Some(PathBuf::from("./old-record.png")));
        assert_eq!(access.record.save, PathBuf::from("./record.png"));

        let targets = config.targets();
        assert_eq!(targets.canvas, PathBuf::from("./place.png"));
        assert_eq!(targets.record, Some(PathBuf::from("./record.png")));
    }

    #[test]
    fn remote_settings_are_collected() {
        let config = config(&[
            "--bucket-url",
            "https://storage.example/object/canvas",
            "--api-url",
            "https://auth.example/token?grant_type=password",
            "--user-email",
            "bot@example.com",
            "--user-password",
            "pw",
            "--anon-key",
            "anon",
        ])
        .unwrap();

        let remote = config.remote.unwrap();
        assert_eq!(remote.bucket_url, "https://storage.example/object/canvas/");
        assert_eq!(remote.credentials.email, "bot@example.com");
        assert_eq!(remote.credentials.anon_key, "anon");
    }

    #[test]
    fn bucket_without_login_settings_is_rejected() {
        let err = config(&["--bucket-url", "https://storage.example/"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRemoteSetting("api-url")));
    }

    #[test]
    fn nonsense_values_are_rejected() {
        assert!(matches!(
            config(&["--width", "0"]).unwrap_err(),
            ConfigError::EmptyCanvas { width: 0, .. }
        ));
        assert!(matches!(
            config(&["--sinterval", "0"]).unwrap_err(),
            ConfigError::ZeroInterval
        ));
        assert!(matches!(
            config(&["--count", "0"]).unwrap_err(),
            ConfigError::ZeroConnections
        ));
        assert!(matches!(
            config(&["--port", "eighty"]).unwrap_err(),
            ConfigError::ListenAddress { .. }
        ));
    }

    #[test]
    fn listen_address_forms() {
        assert_eq!(
            parse_listen_addr(":9000").unwrap(),
            "0.0.0.0:9000".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:80").unwrap(),
            "127.0.0.1:80".parse().unwrap()
        );
        assert!(parse_listen_addr("localhost").is_err());
    }
}
