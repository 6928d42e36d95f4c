use once_cell::sync::Lazy;
use regex::Regex;

/// Secret scrubber for sanitizing error messages and log output.
///
/// ### WARNING
/// This utility uses regex-based patterns which is a **best-effort** approach.
/// It is intended for defense-in-depth: the executor and credential providers
/// already avoid embedding secrets in errors, and this pass catches material
/// that arrives inside upstream messages (proxied warehouse errors, echoed
/// request fragments).
static BEARER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").unwrap());

static DOMAINKEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Matches query-string and JSON shapes: domainkey=..., "domainkey": "..."
    Regex::new(r#"(?i)(domainkey["']?\s*[:=]\s*["']?)[^\s&"',}]+"#).unwrap()
});

static AUTHORIZATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(authorization["']?\s*[:=]\s*["']?)[^\r\n"']+"#).unwrap());

pub fn scrub(input: &str) -> String {
    let mut scrubbed = input.to_string();

    scrubbed = AUTHORIZATION_REGEX
        .replace_all(&scrubbed, "${1}[REDACTED]")
        .to_string();

    scrubbed = BEARER_REGEX
        .replace_all(&scrubbed, "Bearer [REDACTED]")
        .to_string();

    scrubbed = DOMAINKEY_REGEX
        .replace_all(&scrubbed, "${1}[REDACTED]")
        .to_string();

    scrubbed
}
