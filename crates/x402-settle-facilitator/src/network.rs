//! Address classification for outbound requests the facilitator makes.
//!
//! Webhook targets come from configuration; anything that resolves inside the
//! host's own network is refused so a bad URL cannot turn settlement
//! notifications into requests against internal services.

use std::net::{Ipv4Addr, Ipv6Addr};

use url::Host;

/// Loopback, RFC 1918, link-local, broadcast, unspecified and CGNAT (100.64.0.0/10).
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64)
}

/// Loopback, unspecified, unique local (fc00::/7), link-local (fe80::/10),
/// and IPv4-mapped addresses in any of the IPv4 ranges above.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let first = ip.segments()[0];
    (first & 0xFE00) == 0xFC00
        || (first & 0xFFC0) == 0xFE80
        || ip.to_ipv4_mapped().is_some_and(|v4| is_private_ipv4(&v4))
}

/// Whether a URL host may receive outbound traffic. Literal private addresses
/// and `localhost` names are refused; other names are trusted to DNS.
pub fn is_public_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => !is_private_ipv4(ip),
        Host::Ipv6(ip) => !is_private_ipv6(ip),
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name != "localhost" && !name.ends_with(".localhost")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ipv4() {
        assert!(is_private_ipv4(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ipv4(&"10.0.0.1".parse().unwrap()));
        assert!(is_private_ipv4(&"172.16.0.1".parse().unwrap()));
        assert!(is_private_ipv4(&"169.254.169.254".parse().unwrap()));
        assert!(is_private_ipv4(&"100.64.0.1".parse().unwrap()));
        assert!(!is_private_ipv4(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_private_ipv6() {
        assert!(is_private_ipv6(&"::1".parse().unwrap()));
        assert!(is_private_ipv6(&"fd00::1".parse().unwrap()));
        assert!(is_private_ipv6(&"fe80::1".parse().unwrap()));
        assert!(is_private_ipv6(&"::ffff:192.168.1.1".parse().unwrap()));
        assert!(!is_private_ipv6(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_public_host() {
        let host = |s: &str| url::Url::parse(s).unwrap();
        for (raw, public) in [
            ("https://hooks.example.com/x", true),
            ("https://localhost/x", false),
            ("https://api.localhost./x", false),
            ("https://127.0.0.1/x", false),
            ("https://[::1]/x", false),
            ("https://93.184.216.34/x", true),
        ] {
            let url = host(raw);
            assert_eq!(is_public_host(&url.host().unwrap()), public, "{raw}");
        }
    }
}
