//! Identity-token comparison for leak detection
//!
//! Pulls organisation and location strings out of identity probe bodies and
//! decides whether a relay-path answer shares one with the direct-path answer.
//!
//! The rule is substring containment in either direction, case-insensitive.
//! It is a coarse signal: two paths that happen to use the same hosting
//! provider will match, and a leak through a differently named ISP entity
//! will not.

use serde::Serialize;

/// JSON fields treated as identity tokens
pub const IDENTITY_FIELDS: &[&str] = &["org", "isp", "as", "asname", "city"];

/// Outcome of the leak comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeakVerdict {
    /// Relay-path identity shares nothing with the direct path
    Passed,
    /// Relay-path identity matches the direct path
    Failed,
    /// No usable comparison point
    Inconclusive,
}

/// Lowercased, non-empty identity tokens from a probe body
///
/// `None` when the body is not a JSON object.
pub fn identity_tokens(body: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    Some(
        IDENTITY_FIELDS
            .iter()
            .filter_map(|field| object.get(*field))
            .filter_map(|value| value.as_str())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

/// Case-insensitive containment either way
pub fn tokens_match(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// Whether a token names an anonymising operator
pub fn has_safe_marker(token: &str) -> bool {
    token
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "tor" || word.contains("relay") || word.contains("proxy") || word.contains("vpn"))
}

/// First (relay token, direct token) pair that indicates a leak
///
/// A matching pair is ignored when either side carries a safe marker.
pub fn find_leak<'a>(relay_tokens: &'a [String], direct_tokens: &'a [String]) -> Option<(&'a str, &'a str)> {
    relay_tokens.iter().find_map(|relay| {
        direct_tokens
            .iter()
            .filter(|direct| tokens_match(relay, direct))
            .find(|direct| !has_safe_marker(relay) && !has_safe_marker(direct))
            .map(|direct| (relay.as_str(), direct.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_tokens_pick_known_fields() {
        let body = r#"{"query":"1.2.3.4","org":"AS16276 OVH SAS","isp":"OVH SAS","city":"Paris","country":"France","as":""}"#;
        let tokens = identity_tokens(body).unwrap();
        assert_eq!(tokens, vec!["as16276 ovh sas", "ovh sas", "paris"]);
    }

    #[test]
    fn test_non_object_body_has_no_tokens() {
        assert!(identity_tokens("1.2.3.4").is_none());
        assert!(identity_tokens("[1,2]").is_none());
    }

    #[test]
    fn test_containment_either_direction() {
        assert!(tokens_match("Comcast Cable", "comcast"));
        assert!(tokens_match("comcast", "COMCAST CABLE COMMUNICATIONS"));
        assert!(!tokens_match("OVH SAS", "Comcast"));
        assert!(!tokens_match("", "Comcast"));
    }

    #[test]
    fn test_safe_markers_are_word_based() {
        assert!(has_safe_marker("Tor Exit Node"));
        assert!(has_safe_marker("torservers.net relay"));
        assert!(has_safe_marker("Mullvad VPN"));
        assert!(has_safe_marker("Some-Proxy-Host"));
        assert!(!has_safe_marker("Victoria Networks"));
        assert!(!has_safe_marker("Comcast Cable"));
    }

    fn owned(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_marker_on_relay_side_suppresses_match() {
        let direct = owned(&["comcast"]);

        let unmarked = owned(&["comcast cable"]);
        assert_eq!(find_leak(&unmarked, &direct), Some(("comcast cable", "comcast")));

        let marked = owned(&["comcast vpn"]);
        assert!(tokens_match("comcast vpn", "comcast"));
        assert_eq!(find_leak(&marked, &direct), None);
    }

    #[test]
    fn test_marker_on_direct_side_suppresses_match() {
        let relay = owned(&["ovh sas"]);

        let unmarked = owned(&["ovh sas gateway"]);
        assert_eq!(find_leak(&relay, &unmarked), Some(("ovh sas", "ovh sas gateway")));

        let marked = owned(&["ovh sas vpn gateway"]);
        assert_eq!(find_leak(&relay, &marked), None);
    }

    #[test]
    fn test_marked_pair_does_not_hide_a_later_unmarked_match() {
        let relay = owned(&["hetzner"]);
        let direct = owned(&["hetzner tor exit", "hetzner online"]);
        assert_eq!(find_leak(&relay, &direct), Some(("hetzner", "hetzner online")));
    }
}
