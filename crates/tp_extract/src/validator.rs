//! Pre-flight URL checks for SSRF protection.
//!
//! Every URL submitted by a user goes through [`UrlValidator::validate`]
//! before any socket is opened. The same validator is consulted again by the
//! HTTP fetcher for every resolved address and every redirect hop, so a host
//! name that resolves into private space is refused at connection time.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tp_core::INVALID_URL_TITLE;
use url::{Host, Url};

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Why a URL was refused. `Display` is the text stored as the excerpt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Blocked request to localhost: {0}")]
    Localhost(String),

    #[error("Blocked request to private network: {0}")]
    PrivateNetwork(String),

    #[error("Invalid URL: {0}")]
    Malformed(String),
}

/// Named address ranges that are never fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedRange {
    /// 127.0.0.0/8
    Loopback,
    /// 0.0.0.0/8
    Unspecified,
    /// 10.0.0.0/8
    PrivateClassA,
    /// 172.16.0.0/12
    PrivateClassB,
    /// 192.168.0.0/16
    PrivateClassC,
    /// 169.254.0.0/16, home of cloud metadata endpoints
    LinkLocal,
    /// ::1/128
    LoopbackV6,
    /// ::/128
    UnspecifiedV6,
    /// fc00::/7
    UniqueLocalV6,
    /// fe80::/10
    LinkLocalV6,
    Custom(IpNet),
}

impl BlockedRange {
    pub const DEFAULTS: [BlockedRange; 10] = [
        BlockedRange::Loopback,
        BlockedRange::Unspecified,
        BlockedRange::PrivateClassA,
        BlockedRange::PrivateClassB,
        BlockedRange::PrivateClassC,
        BlockedRange::LinkLocal,
        BlockedRange::LoopbackV6,
        BlockedRange::UnspecifiedV6,
        BlockedRange::UniqueLocalV6,
        BlockedRange::LinkLocalV6,
    ];

    pub fn network(&self) -> IpNet {
        match self {
            BlockedRange::Loopback => v4(Ipv4Addr::new(127, 0, 0, 0), 8),
            BlockedRange::Unspecified => v4(Ipv4Addr::UNSPECIFIED, 8),
            BlockedRange::PrivateClassA => v4(Ipv4Addr::new(10, 0, 0, 0), 8),
            BlockedRange::PrivateClassB => v4(Ipv4Addr::new(172, 16, 0, 0), 12),
            BlockedRange::PrivateClassC => v4(Ipv4Addr::new(192, 168, 0, 0), 16),
            BlockedRange::LinkLocal => v4(Ipv4Addr::new(169, 254, 0, 0), 16),
            BlockedRange::LoopbackV6 => v6(Ipv6Addr::LOCALHOST, 128),
            BlockedRange::UnspecifiedV6 => v6(Ipv6Addr::UNSPECIFIED, 128),
            BlockedRange::UniqueLocalV6 => v6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
            BlockedRange::LinkLocalV6 => v6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
            BlockedRange::Custom(net) => *net,
        }
    }

    /// Ranges reported with "localhost" wording rather than "private network".
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            BlockedRange::Loopback
                | BlockedRange::Unspecified
                | BlockedRange::LoopbackV6
                | BlockedRange::UnspecifiedV6
        )
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.network().contains(ip)
    }
}

fn v4(addr: Ipv4Addr, prefix: u8) -> IpNet {
    IpNet::V4(Ipv4Net::new_assert(addr, prefix))
}

fn v6(addr: Ipv6Addr, prefix: u8) -> IpNet {
    IpNet::V6(Ipv6Net::new_assert(addr, prefix))
}

/// Result of [`UrlValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(Url),
    Rejected {
        rejection: Rejection,
        /// Host name, or a fallback, used as the title of the placeholder article.
        label: String,
    },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    /// Empty exactly when the URL was accepted.
    pub fn rejection_reason(&self) -> String {
        match self {
            ValidationOutcome::Accepted(_) => String::new(),
            ValidationOutcome::Rejected { rejection, .. } => rejection.to_string(),
        }
    }

    pub fn into_result(self) -> Result<Url, Rejection> {
        match self {
            ValidationOutcome::Accepted(url) => Ok(url),
            ValidationOutcome::Rejected { rejection, .. } => Err(rejection),
        }
    }
}

/// Immutable block-list. Build once, share freely.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    blocked_ranges: Vec<BlockedRange>,
    blocked_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            blocked_ranges: BlockedRange::DEFAULTS.to_vec(),
            blocked_hosts: ["metadata.google.internal", "metadata.gke.internal"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// A validator that blocks nothing but non-http(s) schemes and `localhost` names.
    pub fn empty() -> Self {
        Self {
            blocked_ranges: Vec::new(),
            blocked_hosts: HashSet::new(),
        }
    }

    pub fn block_range(mut self, range: BlockedRange) -> Self {
        self.blocked_ranges.push(range);
        self
    }

    pub fn block_cidr(self, cidr: IpNet) -> Self {
        self.block_range(BlockedRange::Custom(cidr))
    }

    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    /// Classify an untrusted URL string. Never panics.
    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                return ValidationOutcome::Rejected {
                    rejection: unparseable(raw, e),
                    label: raw_host(raw).unwrap_or_else(|| INVALID_URL_TITLE.to_string()),
                }
            }
        };

        match self.check_url(&url) {
            Ok(()) => ValidationOutcome::Accepted(url),
            Err(rejection) => ValidationOutcome::Rejected {
                rejection,
                label: host_label(&url),
            },
        }
    }

    /// Scheme and host checks on an already parsed URL. Used for redirect hops too.
    pub fn check_url(&self, url: &Url) -> Result<(), Rejection> {
        let scheme = url.scheme();
        if !ALLOWED_SCHEMES.contains(&scheme) {
            return Err(Rejection::InvalidScheme(scheme.to_string()));
        }

        match url.host() {
            Some(Host::Domain(domain)) => self.check_domain(domain),
            Some(Host::Ipv4(ip)) => self.check_ip(&IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => self.check_ip(&IpAddr::V6(ip)),
            None => Err(Rejection::Malformed("missing host".to_string())),
        }
    }

    /// Range check for a single address, literal or resolved.
    pub fn check_ip(&self, ip: &IpAddr) -> Result<(), Rejection> {
        let ip = canonical_ip(ip);
        match self.blocked_ranges.iter().find(|range| range.contains(&ip)) {
            Some(range) if range.is_local() => Err(Rejection::Localhost(ip.to_string())),
            Some(_) => Err(Rejection::PrivateNetwork(ip.to_string())),
            None => Ok(()),
        }
    }

    fn check_domain(&self, domain: &str) -> Result<(), Rejection> {
        let name = domain.trim_end_matches('.').to_ascii_lowercase();
        if name == "localhost" || name.ends_with(".localhost") {
            return Err(Rejection::Localhost(name));
        }
        if self.blocked_hosts.contains(&name) {
            return Err(Rejection::PrivateNetwork(name));
        }
        // Non-special hosts are not canonicalized by the parser.
        match name.parse::<IpAddr>() {
            Ok(ip) => self.check_ip(&ip),
            Err(_) => Ok(()),
        }
    }
}

/// Host name for display, or [`INVALID_URL_TITLE`] when there is none.
pub fn host_label(url: &Url) -> String {
    url.host_str()
        .filter(|host| !host.is_empty())
        .unwrap_or(INVALID_URL_TITLE)
        .to_string()
}

/// Best-effort host out of `scheme://[userinfo@]host[:port]/...` for input
/// the parser refused, e.g. an out-of-range port.
fn raw_host(raw: &str) -> Option<String> {
    let (_, rest) = raw.trim().split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        bracketed.split_once(']')?.0
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let readable = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    readable.then_some(host)
}

/// `::ffff:a.b.c.d` is checked as the IPv4 address it carries.
fn canonical_ip(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(*ip),
        IpAddr::V4(_) => *ip,
    }
}

fn unparseable(raw: &str, error: url::ParseError) -> Rejection {
    let scheme = leading_scheme(raw).to_ascii_lowercase();
    if ALLOWED_SCHEMES.contains(&scheme.as_str()) {
        Rejection::Malformed(error.to_string())
    } else {
        Rejection::InvalidScheme(scheme)
    }
}

/// The `scheme` in `scheme:rest`, or "" if the input does not start with one.
fn leading_scheme(raw: &str) -> &str {
    let Some((candidate, _)) = raw.trim().split_once(':') else {
        return "";
    };
    let mut chars = candidate.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        candidate
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(url: &str) -> String {
        UrlValidator::new().validate(url).rejection_reason().to_lowercase()
    }

    #[test]
    fn test_blocks_localhost() {
        for url in [
            "http://localhost/secret",
            "http://localhost:8080/admin",
            "http://127.0.0.1/internal",
            "http://127.0.0.1:3000/api",
            "http://0.0.0.0/",
            "http://0.0.0.0:8000/health",
            "http://[::1]/ipv6-localhost",
        ] {
            assert!(reason(url).contains("localhost"), "{url} was not blocked");
        }
    }

    #[test]
    fn test_blocks_private_ranges() {
        for url in [
            "http://192.168.0.1/router",
            "http://192.168.255.255/",
            "http://10.0.0.1/internal",
            "http://10.255.255.255/",
            "http://169.254.169.254/latest/meta-data/",
        ] {
            assert!(reason(url).contains("private network"), "{url} was not blocked");
        }
        for octet in 16..=31 {
            let url = format!("http://172.{octet}.0.1/internal");
            assert!(reason(&url).contains("private network"), "{url} was not blocked");
        }
    }

    #[test]
    fn test_allows_outside_172_block() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://172.15.0.1/allowed").is_accepted());
        assert!(validator.validate("http://172.32.0.1/allowed").is_accepted());
        assert!(validator.validate("http://172.160.0.1/allowed").is_accepted());
    }

    #[test]
    fn test_blocks_non_http_schemes() {
        for url in [
            "ftp://example.com/file",
            "file:///etc/passwd",
            "gopher://example.com/",
            "data:text/html,<script>alert(1)</script>",
            "javascript:alert(1)",
        ] {
            assert!(reason(url).contains("invalid url scheme"), "{url} was accepted");
        }
    }

    #[test]
    fn test_accepts_public_urls() {
        let outcome = UrlValidator::new().validate("https://example.com/article");
        assert!(outcome.is_accepted());
        assert_eq!(outcome.rejection_reason(), "");
    }

    #[test]
    fn test_obfuscated_ip_literals() {
        assert!(reason("http://0x7f.0.0.1/").contains("localhost"));
        assert!(reason("http://2130706433/").contains("localhost"));
        assert!(reason("http://0300.0250.0.1/").contains("private network"));
        assert!(reason("http://[::ffff:10.0.0.1]/").contains("private network"));
        assert!(reason("http://LOCALHOST./").contains("localhost"));
        assert!(reason("http://api.localhost/").contains("localhost"));
    }

    #[test]
    fn test_garbage_input() {
        let validator = UrlValidator::new();
        for raw in ["", "not a url", ":::", "http://", "\u{0}"] {
            let outcome = validator.validate(raw);
            assert!(!outcome.is_accepted(), "{raw:?} was accepted");
            assert!(!outcome.rejection_reason().is_empty());
        }
        assert_eq!(
            validator.validate("garbage").rejection_reason(),
            "Invalid URL scheme: "
        );
        assert!(validator
            .validate("http://")
            .rejection_reason()
            .starts_with("Invalid URL: "));
    }

    #[test]
    fn test_rejection_label() {
        match UrlValidator::new().validate("ftp://example.com/file") {
            ValidationOutcome::Rejected { label, .. } => assert_eq!(label, "example.com"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match UrlValidator::new().validate("javascript:alert(1)") {
            ValidationOutcome::Rejected { label, .. } => assert_eq!(label, "Invalid URL"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_label_keeps_host() {
        let label = |raw: &str| match UrlValidator::new().validate(raw) {
            ValidationOutcome::Rejected { label, .. } => label,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(label("http://example.com:99999/"), "example.com");
        assert_eq!(label("https://reader@News.Example.com:70000/a?b"), "news.example.com");
        assert_eq!(label("http://[::1]:99999/"), "::1");
        assert_eq!(label("http://"), "Invalid URL");
        assert_eq!(label("http://exa mple.com/"), "Invalid URL");
        assert_eq!(label("garbage"), "Invalid URL");
        assert!(UrlValidator::new()
            .validate("http://example.com:99999/")
            .rejection_reason()
            .starts_with("Invalid URL: "));
    }

    #[test]
    fn test_custom_block_list() {
        let validator = UrlValidator::empty()
            .block_cidr("203.0.113.0/24".parse().unwrap())
            .block_host("intranet.example");
        assert!(validator.validate("http://10.0.0.1/").is_accepted());
        assert!(!validator.validate("http://203.0.113.7/").is_accepted());
        assert!(!validator.validate("http://INTRANET.example/").is_accepted());
        assert!(!validator.validate("http://localhost/").is_accepted());
    }

    #[test]
    fn test_check_ip_for_resolved_addresses() {
        let validator = UrlValidator::new();
        assert!(validator.check_ip(&"93.184.216.34".parse().unwrap()).is_ok());
        assert_eq!(
            validator.check_ip(&"fd12::1".parse().unwrap()),
            Err(Rejection::PrivateNetwork("fd12::1".to_string()))
        );
    }
}
