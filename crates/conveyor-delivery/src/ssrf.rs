//! Outbound URL safety filter.
//!
//! Callback URLs are caller-controlled, so before any network activity the
//! destination is checked against local and private address space. The check
//! is purely syntactic: no DNS resolution is performed, so a public hostname
//! that resolves to a private address at delivery time is not caught. That is
//! a known, documented limitation of this guard.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::Url;

/// Path of the bundled demo receiver, exempted on loopback for self-testing.
pub const TEST_RECEIVER_PATH: &str = "/api/callbacks/receive";

const BLOCKED_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// Decides whether a callback URL may be contacted.
///
/// Evaluated in order:
/// 1. unparseable URL or missing hostname: unsafe
/// 2. loopback hostname whose path contains the demo receiver path: safe
/// 3. well-known local hostnames (`localhost`, `127.0.0.1`, `0.0.0.0`,
///    `::1`): unsafe
/// 4. literal IP in private, loopback, link-local, or reserved space: unsafe
/// 5. anything else: safe
pub fn is_safe_callback_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    // url keeps IPv6 hosts bracketed; strip so name and address checks see
    // the same form.
    let host = host.to_ascii_lowercase();
    let host = host.trim_start_matches('[').trim_end_matches(']');

    // Self-test exemption: the demo receiver runs on this host.
    if (host == "localhost" || host == "127.0.0.1") && url.path().contains(TEST_RECEIVER_PATH) {
        return true;
    }

    if BLOCKED_HOSTS.contains(&host) {
        return false;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return !is_blocked_ip(ip);
    }

    // A hostname. Could still resolve to private space; see module docs.
    true
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // carrier-grade NAT, 100.64.0.0/10
        || (octets[0] == 100 && (64..128).contains(&octets[1]))
        // reserved, 240.0.0.0/4
        || octets[0] >= 240
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();

    ip.is_loopback()
        || ip.is_unspecified()
        // unique local, fc00::/7
        || (segments[0] & 0xfe00) == 0xfc00
        // link local, fe80::/10
        || (segments[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_blocked_except_demo_receiver() {
        assert!(!is_safe_callback_url("http://127.0.0.1/other-path"));
        assert!(is_safe_callback_url("http://127.0.0.1/api/callbacks/receive"));
        assert!(is_safe_callback_url("http://localhost:8080/api/callbacks/receive"));
        assert!(!is_safe_callback_url("http://localhost:8080/webhook"));
    }

    #[test]
    fn local_hostnames_blocked() {
        assert!(!is_safe_callback_url("http://0.0.0.0/hook"));
        assert!(!is_safe_callback_url("http://[::1]/hook"));
        assert!(!is_safe_callback_url("http://LOCALHOST/hook"));
    }

    #[test]
    fn private_ranges_blocked() {
        assert!(!is_safe_callback_url("http://10.0.0.5/x"));
        assert!(!is_safe_callback_url("http://172.16.1.1/x"));
        assert!(!is_safe_callback_url("http://192.168.1.50/x"));
        assert!(!is_safe_callback_url("http://169.254.1.1/x"));
        assert!(!is_safe_callback_url("http://100.64.0.1/x"));
        assert!(!is_safe_callback_url("http://[fc00::1]/x"));
        assert!(!is_safe_callback_url("http://[fe80::1]/x"));
    }

    #[test]
    fn public_destinations_allowed() {
        assert!(is_safe_callback_url("https://example.com/hook"));
        assert!(is_safe_callback_url("https://hooks.example.com:8443/cb?id=1"));
        assert!(is_safe_callback_url("http://8.8.8.8/hook"));
    }

    #[test]
    fn garbage_urls_blocked() {
        assert!(!is_safe_callback_url(""));
        assert!(!is_safe_callback_url("not a url"));
        assert!(!is_safe_callback_url("file:///etc/passwd"));
        assert!(!is_safe_callback_url("mailto:user@example.com"));
    }

    #[test]
    fn hostname_resolution_is_not_attempted() {
        // Documented limitation: a hostname is allowed even though it could
        // resolve to private space at delivery time.
        assert!(is_safe_callback_url("http://internal-service.example/hook"));
    }
}
