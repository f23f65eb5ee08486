//! Command-line flags, in the traditional `getopt_long`-style layout
//! familiar from other DNS seeder implementations.

use gumdrop::Options;

#[derive(Debug, Default, Options)]
pub struct Cli {
    #[options(no_short, help = "print this help message")]
    pub help: bool,

    #[options(short = "h", help = "host name of the seed, e.g. seed.example.com")]
    pub host: Option<String>,

    #[options(short = "n", help = "hostname of the nameserver")]
    pub nameserver: Option<String>,

    #[options(short = "m", help = "e-mail address reported in the SOA record")]
    pub mailbox: Option<String>,

    #[options(short = "t", help = "number of probe threads (clamped to 0..1000)")]
    pub threads: Option<i64>,

    #[options(short = "d", help = "number of dns responder threads (clamped to 0..1000)")]
    pub dns_threads: Option<i64>,

    #[options(short = "a", help = "address to listen on for dns queries")]
    pub listen_address: Option<String>,

    #[options(short = "p", help = "udp port to listen on (clamped to 0..65536)")]
    pub port: Option<i64>,

    #[options(short = "o", help = "tor proxy address; accepted and logged, never dialed")]
    pub tor_proxy: Option<String>,

    #[options(short = "i", help = "ipv4 proxy address; accepted and logged, never dialed")]
    pub ipv4_proxy: Option<String>,

    #[options(short = "k", help = "ipv6 proxy address; accepted and logged, never dialed")]
    pub ipv6_proxy: Option<String>,

    #[options(short = "w", help = "comma-separated service-flag whitelist (decimal, 0x, or 0-prefixed)")]
    pub whitelist: Option<String>,

    #[options(help = "peer-to-peer port the prober connects on")]
    pub p2port: Option<u16>,

    #[options(help = "network magic, 8 hex digits")]
    pub magic: Option<String>,

    #[options(help = "minimum reported block height to be considered good")]
    pub minheight: Option<i32>,

    #[options(help = "use testnet defaults")]
    pub testnet: bool,

    #[options(help = "clear the ban list at startup")]
    pub wipeban: bool,

    #[options(help = "clear the ignore list at startup")]
    pub wipeignore: bool,

    #[options(short = "s", help = "bootstrap seed hostname, resolved every 30 minutes")]
    pub seed: Option<String>,

    #[options(help = "path to a toml configuration file merged under these flags")]
    pub config: Option<String>,
}

/// Normalizes the `-a` listen-address shorthand: a bare IPv4 literal is
/// promoted to its IPv4-mapped IPv6 form, so `-a 0.0.0.0` and
/// `-a ::FFFF:0.0.0.0` behave identically.
pub fn normalize_listen_address(raw: &str) -> String {
    if raw.parse::<std::net::Ipv4Addr>().is_ok() {
        format!("::FFFF:{raw}")
    } else {
        raw.to_string()
    }
}

/// Clamps a thread count to `(0, 1000)`, the allowed range for `-t`/`-d`.
pub fn clamp_threads(value: i64) -> u16 {
    value.clamp(1, 999) as u16
}

/// Clamps a UDP port to `(0, 65536)`, the allowed range for `-p`.
pub fn clamp_port(value: i64) -> u16 {
    value.clamp(1, 65535) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_literal_gets_the_mapped_shorthand() {
        assert_eq!(normalize_listen_address("0.0.0.0"), "::FFFF:0.0.0.0");
    }

    #[test]
    fn an_already_ipv6_address_passes_through() {
        assert_eq!(normalize_listen_address("::1"), "::1");
    }

    #[test]
    fn thread_counts_clamp_to_the_documented_bounds() {
        assert_eq!(clamp_threads(0), 1);
        assert_eq!(clamp_threads(5000), 999);
        assert_eq!(clamp_threads(8), 8);
    }

    #[test]
    fn ports_clamp_to_the_documented_bounds() {
        assert_eq!(clamp_port(0), 1);
        assert_eq!(clamp_port(100_000), 65535);
        assert_eq!(clamp_port(53), 53);
    }
}
