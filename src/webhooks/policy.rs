// Target-URL safety policy
//
// Enforced at endpoint registration and again at delivery so a target that
// later resolves somewhere private is still refused. Blocks the classic
// SSRF shapes: non-https schemes, odd ports, localhost and private ranges.

use std::net::IpAddr;

use crate::domain::{PenshortError, Result};

/// Validate a webhook target URL. `allow_insecure` permits http for local
/// development; production configuration rejects it at startup.
pub fn validate_target_url(raw: &str, allow_insecure: bool) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| PenshortError::validation(format!("invalid webhook URL: {}", e)))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_insecure => {}
        other => {
            return Err(PenshortError::validation(format!(
                "webhook URL scheme must be https, got '{}'",
                other
            )))
        }
    }

    match parsed.port() {
        None => {}
        Some(443) => {}
        // Dev receivers bind arbitrary ports
        Some(_) if allow_insecure => {}
        Some(port) => {
            return Err(PenshortError::validation(format!(
                "webhook URL port must be 443, got {}",
                port
            )))
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| PenshortError::validation("webhook URL must have a host"))?;

    if host.eq_ignore_ascii_case("localhost") || host.to_ascii_lowercase().ends_with(".local") {
        if !allow_insecure {
            return Err(PenshortError::validation(
                "webhook URL must not target localhost",
            ));
        }
        return Ok(());
    }

    // Literal addresses are checked here; resolved addresses are the
    // HTTP client's concern at connect time
    if let Ok(addr) = host.parse::<IpAddr>() {
        if is_blocked_addr(&addr) && !allow_insecure {
            return Err(PenshortError::validation(
                "webhook URL must not target a private or loopback address",
            ));
        }
    }

    Ok(())
}

/// Loopback, link-local, and RFC 1918 ranges
fn is_blocked_addr(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback() // 127/8
                || v4.is_link_local() // 169.254/16
                || v4.is_private() // 10/8, 172.16/12, 192.168/16
                || octets[0] == 0
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_https() {
        assert!(validate_target_url("https://hooks.example.com/penshort", false).is_ok());
        assert!(validate_target_url("https://hooks.example.com:443/x", false).is_ok());
    }

    #[test]
    fn test_rejects_http_unless_insecure_allowed() {
        assert!(validate_target_url("http://hooks.example.com/x", false).is_err());
        assert!(validate_target_url("http://hooks.example.com/x", true).is_ok());
    }

    #[test]
    fn test_rejects_odd_ports() {
        assert!(validate_target_url("https://hooks.example.com:8443/x", false).is_err());
        assert!(validate_target_url("https://hooks.example.com:8443/x", true).is_ok());
    }

    #[test]
    fn test_rejects_local_hosts() {
        assert!(validate_target_url("https://localhost/x", false).is_err());
        assert!(validate_target_url("https://printer.local/x", false).is_err());
        assert!(validate_target_url("https://LOCALHOST/x", false).is_err());
    }

    #[test]
    fn test_rejects_private_ranges() {
        for blocked in [
            "https://127.0.0.1/x",
            "https://10.1.2.3/x",
            "https://172.16.0.9/x",
            "https://192.168.1.1/x",
            "https://169.254.1.1/x",
            "https://[::1]/x",
        ] {
            assert!(validate_target_url(blocked, false).is_err(), "accepted {}", blocked);
        }
        // 172.32/16 is outside 172.16/12
        assert!(validate_target_url("https://172.32.0.1/x", false).is_ok());
    }

    #[test]
    fn test_dev_mode_allows_local_receiver() {
        assert!(validate_target_url("http://127.0.0.1:9999/hook", true).is_ok());
    }
}
