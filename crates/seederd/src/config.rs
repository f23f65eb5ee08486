//! Merges CLI flags with an optional TOML config file. CLI values always
//! win; the file only fills in what the command line left unset.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use seeder_chain::ServiceFlags;
use seeder_dns::Whitelist;

use crate::cli::Cli;
use crate::seeds;

/// Configuration-file errors: reported to stderr, process exits non-zero
/// — `main` does that by letting this propagate through
/// `color_eyre::Result`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

const DEFAULT_MAINNET_PORT: u16 = 9333;
const DEFAULT_TESTNET_PORT: u16 = 19335;
const DEFAULT_MAINNET_MAGIC: [u8; 4] = [0xfb, 0xc0, 0xb6, 0xdb];
const DEFAULT_TESTNET_MAGIC: [u8; 4] = [0xfd, 0xd2, 0xc8, 0xf1];

/// The file-based half of the configuration. Every field mirrors a CLI
/// flag one-for-one and is optional, since any of them may instead arrive
/// on the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub host: Option<String>,
    pub nameserver: Option<String>,
    pub mailbox: Option<String>,
    pub threads: Option<i64>,
    pub dns_threads: Option<i64>,
    pub listen_address: Option<String>,
    pub port: Option<i64>,
    pub tor_proxy: Option<String>,
    pub ipv4_proxy: Option<String>,
    pub ipv6_proxy: Option<String>,
    pub whitelist: Option<String>,
    pub p2port: Option<u16>,
    pub magic: Option<String>,
    pub minheight: Option<i32>,
    pub testnet: Option<bool>,
    pub seed: Option<String>,
}

/// Reads the config file at `path` if one was named on the command line;
/// otherwise looks for `seeder/seeder.toml` under the user's config
/// directory and silently does without one if that's absent too. An
/// explicitly-named path that can't be read is a configuration error
/// and is propagated rather than swallowed.
pub fn load_file_config(path: Option<&str>) -> Result<Option<FileConfig>, ConfigError> {
    let resolved = match path {
        Some(explicit) => Some(explicit.to_string()),
        None => dirs::config_dir()
            .map(|dir| dir.join("seeder").join("seeder.toml"))
            .filter(|p| p.exists())
            .map(|p| p.to_string_lossy().into_owned()),
    };

    let Some(resolved) = resolved else {
        return Ok(None);
    };
    if path.is_none() && !Path::new(&resolved).exists() {
        return Ok(None);
    }

    let text = fs::read_to_string(&resolved).map_err(|source| ConfigError::Read {
        path: resolved.clone(),
        source,
    })?;
    let parsed: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse { path: resolved, source })?;
    Ok(Some(parsed))
}

/// The fully-resolved runtime configuration: every CLI/file flag merged
/// down to a concrete value, with sensible defaults where neither source
/// set one.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: Option<String>,
    pub nameserver: Option<String>,
    pub mailbox: Option<String>,
    pub threads: u16,
    pub dns_threads: u16,
    pub listen_address: String,
    pub port: u16,
    pub tor_proxy: Option<String>,
    pub ipv4_proxy: Option<String>,
    pub ipv6_proxy: Option<String>,
    whitelist_spec: Option<String>,
    pub p2p_port: Option<u16>,
    pub magic: Option<String>,
    pub min_height: i32,
    pub testnet: bool,
    pub wipeban: bool,
    pub wipeignore: bool,
    pub seed: Option<String>,
}

impl Settings {
    pub fn merge(cli: Cli, file: Option<FileConfig>) -> Settings {
        let file = file.unwrap_or_default();
        Settings {
            host: cli.host.or(file.host),
            nameserver: cli.nameserver.or(file.nameserver),
            mailbox: cli.mailbox.or(file.mailbox),
            threads: crate::cli::clamp_threads(cli.threads.or(file.threads).unwrap_or(96)),
            dns_threads: crate::cli::clamp_threads(cli.dns_threads.or(file.dns_threads).unwrap_or(4)),
            listen_address: crate::cli::normalize_listen_address(
                &cli.listen_address.or(file.listen_address).unwrap_or_else(|| "::".to_string()),
            ),
            port: crate::cli::clamp_port(cli.port.or(file.port).unwrap_or(53)),
            tor_proxy: cli.tor_proxy.or(file.tor_proxy),
            ipv4_proxy: cli.ipv4_proxy.or(file.ipv4_proxy),
            ipv6_proxy: cli.ipv6_proxy.or(file.ipv6_proxy),
            whitelist_spec: cli.whitelist.or(file.whitelist),
            p2p_port: cli.p2port.or(file.p2port),
            magic: cli.magic.or(file.magic),
            min_height: cli.minheight.or(file.minheight).unwrap_or(0),
            testnet: cli.testnet || file.testnet.unwrap_or(false),
            wipeban: cli.wipeban,
            wipeignore: cli.wipeignore,
            seed: cli.seed.or(file.seed),
        }
    }

    /// The whitelist a DNS client may request via `x<HEX>.<host>`. Falls
    /// back to the default combinations when `-w` (or its file
    /// equivalent) is absent.
    pub fn whitelist(&self) -> Whitelist {
        match &self.whitelist_spec {
            Some(spec) => {
                let masks: Vec<ServiceFlags> = spec
                    .split(',')
                    .filter_map(|token| {
                        let token = token.trim();
                        match parse_service_mask(token) {
                            Some(mask) => Some(ServiceFlags::from_bits_truncate(mask)),
                            None => {
                                warn!(token, "ignoring malformed -w filter entry");
                                None
                            }
                        }
                    })
                    .collect();
                if masks.is_empty() {
                    Whitelist::default_masks()
                } else {
                    Whitelist::new(masks)
                }
            }
            None => Whitelist::default_masks(),
        }
    }

    pub fn magic_bytes(&self) -> [u8; 4] {
        let default = if self.testnet {
            DEFAULT_TESTNET_MAGIC
        } else {
            DEFAULT_MAINNET_MAGIC
        };
        match &self.magic {
            Some(digits) if digits.len() == 8 => match hex::decode(digits) {
                Ok(bytes) => bytes.try_into().unwrap_or(default),
                Err(_) => {
                    warn!(magic = %digits, "ignoring malformed --magic value");
                    default
                }
            },
            Some(digits) => {
                warn!(magic = %digits, "--magic must be exactly 8 hex digits, ignoring");
                default
            }
            None => default,
        }
    }

    pub fn resolved_p2p_port(&self) -> u16 {
        self.p2p_port.unwrap_or(if self.testnet {
            DEFAULT_TESTNET_PORT
        } else {
            DEFAULT_MAINNET_PORT
        })
    }

    /// The bootstrap hostnames the seed-lookup worker resolves every 30
    /// minutes. `-s`/file `seed` overrides the built-in list entirely.
    pub fn seed_list(&self) -> Vec<String> {
        match &self.seed {
            Some(raw) => raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
            None => seeds::default_seeds(self.testnet).to_vec(),
        }
    }
}

/// Parses a filter mask the way C's `strtoull(s, NULL, 0)` does: a
/// `0x`/`0X` prefix means hex, a bare leading `0` (with more digits)
/// means octal, anything else is decimal. Returns `None` on a malformed
/// token instead of panicking — bad entries are discarded, not fatal.
fn parse_service_mask(token: &str) -> Option<u64> {
    if token.is_empty() {
        return None;
    }
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if token.len() > 1 && token.starts_with('0') {
        return u64::from_str_radix(&token[1..], 8).ok();
    }
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_decimal_and_octal_masks_all_parse() {
        assert_eq!(parse_service_mask("0x409"), Some(0x409));
        assert_eq!(parse_service_mask("1033"), Some(1033));
        assert_eq!(parse_service_mask("011"), Some(9));
    }

    #[test]
    fn malformed_mask_is_discarded() {
        assert_eq!(parse_service_mask("0xzz"), None);
        assert_eq!(parse_service_mask(""), None);
    }

    #[test]
    fn cli_whitelist_overrides_default() {
        let cli = Cli {
            whitelist: Some("0x1".to_string()),
            ..Cli::default()
        };
        let settings = Settings::merge(cli, None);
        let whitelist = settings.whitelist();
        assert!(whitelist.allows(ServiceFlags::NODE_NETWORK));
        assert!(!whitelist.allows(ServiceFlags::NODE_NETWORK_LIMITED));
    }

    #[test]
    fn empty_seed_falls_back_to_mainnet_defaults() {
        let settings = Settings::merge(Cli::default(), None);
        assert_eq!(settings.seed_list(), seeds::default_seeds(false));
    }

    #[test]
    fn explicit_magic_overrides_the_mainnet_default() {
        let cli = Cli {
            magic: Some("f9beb4d9".to_string()),
            ..Cli::default()
        };
        let settings = Settings::merge(cli, None);
        assert_eq!(settings.magic_bytes(), [0xf9, 0xbe, 0xb4, 0xd9]);
    }

    #[test]
    fn malformed_magic_falls_back_to_the_network_default() {
        let cli = Cli {
            magic: Some("zzzzzzzz".to_string()),
            ..Cli::default()
        };
        let settings = Settings::merge(cli, None);
        assert_eq!(settings.magic_bytes(), DEFAULT_MAINNET_MAGIC);
    }
}
