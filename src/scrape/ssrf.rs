//! SSRF guard for outbound fetches
//!
//! Two layers of defence: `preflight` runs before any work begins and is
//! DNS-aware (fail-closed: a lookup error counts as private), while
//! `should_block_request` is the synchronous per-URL check applied to every
//! sub-request the browser issues during a navigation. Both agree on all
//! checks that do not require a lookup.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use regex_lite::Regex;
use url::{Host, Url};

use crate::error::ScrapeError;

/// Hostname suffixes that always denote internal infrastructure
const PRIVATE_SUFFIXES: &[&str] = &[
    ".internal", ".intranet", ".home", ".lan", ".corp", ".test", ".example", ".invalid",
];

/// Hostnames that spell out an RFC-1918 address, optionally with an
/// IPv4-mapped IPv6 prefix. These never reach DNS.
fn private_host_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^(::ffff:)?10\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$",
            r"^(::ffff:)?192\.168\.(\d{1,3})\.(\d{1,3})$",
            r"^(::ffff:)?172\.(1[6-9]|2\d|3[01])\.(\d{1,3})\.(\d{1,3})$",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Classify an IP address as private/internal for SSRF purposes
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_broadcast()
        // 240.0.0.0/4 reserved block
        || addr.octets()[0] >= 240
}

fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    // IPv4-mapped addresses are classified by their embedded IPv4
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_private_ipv4(v4);
    }
    let segments = addr.segments();
    addr.is_loopback()
        || addr.is_unspecified()
        // fe80::/10 link-local
        || (segments[0] & 0xffc0) == 0xfe80
        // fc00::/7 unique-local
        || (segments[0] & 0xfe00) == 0xfc00
}

/// Synchronous checks shared by both guard layers, in declared order.
/// Returns the parsed URL so callers get canonical form for free.
fn classify(url: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(url).map_err(|_| ScrapeError::InvalidUrl)?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(ScrapeError::UnsupportedProtocol),
    }

    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    let host = host.trim_end_matches('.');

    if host.is_empty()
        || host == "localhost"
        || host == "ip6-localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
    {
        return Err(ScrapeError::BlockedLocalhost);
    }

    // Literal IPs are classified directly, without DNS
    match parsed.host() {
        Some(Host::Ipv4(v4)) => {
            if is_private_ipv4(v4) {
                return Err(ScrapeError::BlockedPrivateIp);
            }
        }
        Some(Host::Ipv6(v6)) => {
            if is_private_ipv6(v6) {
                return Err(ScrapeError::BlockedPrivateIp);
            }
        }
        _ => {}
    }

    if PRIVATE_SUFFIXES.iter().any(|s| host.ends_with(s))
        || private_host_patterns().iter().any(|re| re.is_match(host))
    {
        return Err(ScrapeError::BlockedPrivateHostname);
    }

    Ok(parsed)
}

/// Per-sub-request guard. Pure and synchronous; called for every request
/// the browser attempts, so malformed URLs are simply blocked.
pub fn should_block_request(url: &str) -> bool {
    classify(url).is_err()
}

/// Pre-navigation guard. Applies the synchronous checks, then resolves the
/// hostname and rejects if any returned address is private. Lookup errors
/// and empty answers are treated as private.
pub async fn preflight(url: &str) -> Result<Url, ScrapeError> {
    preflight_with_lookup(url, |host, port| async move {
        let addrs = tokio::net::lookup_host((host.as_str(), port)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    })
    .await
}

/// DNS-parameterised preflight so tests can stub resolution
pub async fn preflight_with_lookup<F, Fut>(url: &str, lookup: F) -> Result<Url, ScrapeError>
where
    F: FnOnce(String, u16) -> Fut,
    Fut: Future<Output = io::Result<Vec<IpAddr>>>,
{
    let parsed = classify(url)?;

    // Literal IPs were already classified; only hostnames need resolving
    if matches!(parsed.host(), Some(Host::Domain(_))) {
        let host = parsed.host_str().unwrap_or("").to_string();
        let port = parsed.port_or_known_default().unwrap_or(80);
        match lookup(host, port).await {
            Ok(addrs) if !addrs.is_empty() => {
                if addrs.into_iter().any(is_private_ip) {
                    return Err(ScrapeError::BlockedPrivateResolution);
                }
            }
            // Fail closed: resolution errors and empty answers are private
            _ => return Err(ScrapeError::BlockedPrivateResolution),
        }
    }

    Ok(parsed)
}
