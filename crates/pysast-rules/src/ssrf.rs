//! Rule to detect server-side request forgery.
//!
//! # Rationale
//!
//! Outbound requests to attacker-chosen URLs let an attacker reach services
//! behind the firewall: cloud metadata endpoints, admin ports on loopback,
//! or non-HTTP protocols such as `file://` and `gopher://`.
//!
//! # Detected Patterns
//!
//! For every URL reaching `requests.get`, `urlopen`, `httpx.post`, ...:
//!
//! - a scheme other than `http` or `https`
//! - a port outside the allow-list (`80, 443, 8000, 8080, 8443`), reported
//!   as an internal probe when the host is loopback or link-local
//! - a URL whose host part derives from user input
//!
//! # Configuration
//!
//! - `allowed_ports`: replaces the default port allow-list
//!
//! # Suppression
//!
//! - `# pysast: allow(ssrf)` comment

use crate::common::{self, Bindings};
use pysast_core::ast::{Call, Expr};
use pysast_core::{
    function_scopes, Finding, Program, Rule, RuleConfig, Severity, TaintConfig, TaintTracker,
};
use std::net::IpAddr;
use url::{Host, Url};

/// Rule code for ssrf.
pub const CODE: &str = "PS004";

/// Rule name for ssrf.
pub const NAME: &str = "ssrf";

/// Calls that fetch a URL.
const NETWORK_SINKS: &[&str] = &[
    "requests.get",
    "requests.post",
    "requests.put",
    "requests.patch",
    "requests.delete",
    "requests.head",
    "requests.options",
    "requests.request",
    "httpx.get",
    "httpx.post",
    "httpx.put",
    "httpx.patch",
    "httpx.delete",
    "httpx.request",
    "urlopen",
    "urllib.request.Request",
    "urllib.urlopen",
];

/// Ports an outbound request is expected to use.
pub const DEFAULT_ALLOWED_PORTS: &[u16] = &[80, 443, 8000, 8080, 8443];

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Detects outbound requests that may reach internal services.
#[derive(Debug, Clone)]
pub struct Ssrf {
    /// Ports outbound requests may use.
    pub allowed_ports: Vec<u16>,
    /// User input sources.
    pub taint: TaintConfig,
    /// Custom severity.
    pub severity: Severity,
}

impl Default for Ssrf {
    fn default() -> Self {
        Self::new()
    }
}

impl Ssrf {
    /// Creates a new rule with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_ports: DEFAULT_ALLOWED_PORTS.to_vec(),
            taint: TaintConfig::new(common::USER_INPUT_SOURCES.iter().copied(), ["quote", "urlencode"]),
            severity: Severity::Error,
        }
    }

    /// Creates the rule with options from a `[rules.ssrf]` table.
    #[must_use]
    pub fn from_config(config: &RuleConfig) -> Self {
        match config.get_int_array("allowed_ports") {
            Some(ports) => Self::new().allowed_ports(
                ports
                    .into_iter()
                    .filter_map(|p| u16::try_from(p).ok())
                    .collect(),
            ),
            None => Self::new(),
        }
    }

    /// Replaces the port allow-list.
    #[must_use]
    pub fn allowed_ports(mut self, ports: Vec<u16>) -> Self {
        self.allowed_ports = ports;
        self
    }

    /// Sets the severity level.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn check_url(&self, sink: &str, url: &TargetUrl) -> Option<String> {
        if !ALLOWED_SCHEMES.contains(&url.scheme.as_str()) {
            return Some(format!(
                "`{sink}` fetches a `{}://` URL; only http and https are expected",
                url.scheme
            ));
        }
        let host = url.host.as_deref()?;
        let port = url.port?;
        if self.allowed_ports.contains(&port) {
            return None;
        }
        if is_internal_host(host) {
            Some(format!("`{sink}` targets internal host `{host}` on port {port}"))
        } else {
            Some(format!("`{sink}` targets port {port}, outside the allowed ports"))
        }
    }
}

fn url_argument<'c>(call: &'c Call, sink: &str) -> Option<&'c Expr> {
    call.keyword("url").or_else(|| {
        let index = usize::from(common::last_segment(sink) == "request");
        call.positional(index)
    })
}

impl Rule for Ssrf {
    fn name(&self) -> &'static str {
        NAME
    }

    fn code(&self) -> &'static str {
        CODE
    }

    fn description(&self) -> &'static str {
        "Detects outbound requests to unexpected schemes, ports or user-chosen hosts"
    }

    fn default_severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, program: &Program) -> Vec<Finding> {
        let mut findings = Vec::new();
        for scope in function_scopes(program) {
            let mut bindings = Bindings::default();
            TaintTracker::scan(&self.taint, &scope, |node, tracker| {
                bindings.step(node);
                let Some(call) = node.as_call() else {
                    return;
                };
                let Some(sink) = common::matched_call(call, NETWORK_SINKS) else {
                    return;
                };
                let Some(arg) = url_argument(call, &sink) else {
                    return;
                };
                let url = bindings.resolve(arg);

                let known = if common::is_constant(&url) {
                    TargetUrl::parse(&url.literal_text())
                } else {
                    TargetUrl::parse_prefix(&common::static_prefix(&url))
                };
                let message = match known {
                    Some(target) if target.host.is_some() => self.check_url(&sink, &target),
                    _ if tracker.is_tainted(arg) => {
                        Some(format!("`{sink}` fetches a URL whose host comes from user input"))
                    }
                    Some(target) => self.check_url(&sink, &target),
                    None => None,
                };
                if let Some(message) = message {
                    findings.push(self.finding(&node.span(), message));
                }
            });
        }
        findings.sort_by_key(Finding::line);
        findings
    }
}

/// Stands in for a host that is only known at runtime.
const RUNTIME_HOST: &str = "runtime.invalid";

/// Scheme, host and effective port of a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetUrl {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
}

impl TargetUrl {
    /// Parses an absolute URL with an authority (`scheme://...`).
    fn parse(text: &str) -> Option<Self> {
        let url = Url::parse(text.trim()).ok()?;
        if !url.has_authority() {
            return None;
        }
        let host = url.host().and_then(|host| match host {
            Host::Domain("") => None,
            Host::Domain(name) => Some(name.to_ascii_lowercase()),
            Host::Ipv4(ip) => Some(ip.to_string()),
            Host::Ipv6(ip) => Some(ip.to_string()),
        });
        Some(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port_or_known_default(),
        })
    }

    /// Parses the known start of a URL built at runtime; the host is only
    /// known once the authority is terminated.
    fn parse_prefix(prefix: &str) -> Option<Self> {
        let prefix = prefix.trim_start();
        let (scheme, rest) = prefix.split_once("://")?;
        if rest.contains(['/', '?', '#']) {
            return Self::parse(prefix);
        }
        let target = Self::parse(&format!("{scheme}://{RUNTIME_HOST}/"))?;
        Some(Self {
            host: None,
            port: None,
            ..target
        })
    }
}

/// Loopback, link-local and unspecified addresses, and `localhost`.
fn is_internal_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_link_local() || ip.is_unspecified(),
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback() || ip.is_unspecified() || (ip.segments()[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pysast_core::lex_and_parse;

    fn check_code(code: &str) -> Vec<Finding> {
        let (program, errors) = lex_and_parse(code, "test.py");
        assert!(errors.is_empty(), "{errors:?}");
        Ssrf::new().check(&program)
    }

    #[test]
    fn test_parse_url() {
        let url = TargetUrl::parse("http://user:pw@LocalHost:6379/x?y").unwrap();
        assert_eq!(url.scheme, "http");
        assert_eq!(url.host.as_deref(), Some("localhost"));
        assert_eq!(url.port, Some(6379));

        let url = TargetUrl::parse("https://[::1]/admin").unwrap();
        assert_eq!(url.host.as_deref(), Some("::1"));
        assert_eq!(url.port, Some(443));

        assert!(TargetUrl::parse("/relative/path").is_none());
        assert!(TargetUrl::parse("localhost:8080/health").is_none());
        assert!(TargetUrl::parse("http://host:99999/").is_none());

        let url = TargetUrl::parse("file:///etc/passwd").unwrap();
        assert_eq!(url.scheme, "file");
        assert_eq!(url.host, None);
    }

    #[test]
    fn test_parse_prefix() {
        let url = TargetUrl::parse_prefix("GOPHER://").unwrap();
        assert_eq!(url.scheme, "gopher");
        assert_eq!(url.host, None);

        let url = TargetUrl::parse_prefix("https://api.example.com/users/").unwrap();
        assert_eq!(url.host.as_deref(), Some("api.example.com"));
        assert_eq!(url.port, Some(443));

        assert!(TargetUrl::parse_prefix("users/").is_none());
    }

    #[test]
    fn test_internal_hosts() {
        assert!(is_internal_host("127.0.0.1"));
        assert!(is_internal_host("169.254.169.254"));
        assert!(is_internal_host("fe80::1"));
        assert!(is_internal_host("localhost"));
        assert!(!is_internal_host("10.0.0.1"));
        assert!(!is_internal_host("example.com"));
    }

    #[test]
    fn test_detects_non_http_scheme() {
        let findings = check_code(r#"data = urlopen("file:///etc/passwd").read()"#);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("file://"));
    }

    #[test]
    fn test_detects_internal_probe() {
        let findings = check_code(
            r#"
def status():
    target = "http://127.0.0.1:6379/info"
    return requests.get(target)
"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 4);
        assert!(findings[0].message.contains("internal host `127.0.0.1` on port 6379"));
    }

    #[test]
    fn test_detects_disallowed_port() {
        let findings = check_code(r#"requests.post("https://api.example.com:9200/_search", json=q)"#);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("port 9200"));
    }

    #[test]
    fn test_allowed_urls() {
        let findings = check_code(
            r#"
requests.get("https://api.example.com/v1/users")
requests.get("http://localhost:8080/health")
requests.get("https://api.example.com/users/" + user_id)
"#,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_detects_tainted_host() {
        let findings = check_code(
            r#"
def proxy():
    target = request.args.get("url")
    return requests.get(target, timeout=5)

def webhook():
    host = request.form["host"]
    return httpx.post(f"http://{host}/notify")
"#,
        );
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.message.contains("user input")));
    }

    #[test]
    fn test_constructed_url_scheme() {
        let findings = check_code(r#"requests.request("GET", "gopher://" + host + "/_")"#);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("gopher://"));
    }

    #[test]
    fn test_allowed_ports_from_config() {
        let config: RuleConfig = toml::from_str("allowed_ports = [443, 9200]").unwrap();
        let (program, _) = lex_and_parse(
            "requests.get('https://search:9200/')\nrequests.get('http://example.com/')\n",
            "t.py",
        );
        let findings = Ssrf::from_config(&config).check(&program);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line(), 2);
    }
}
