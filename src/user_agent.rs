//! Coherent user-agent and client-hint synthesis.
//!
//! A page that sends a Chrome UA but Chromium-less client hints is an easy
//! bot tell, so the two are always derived together: the `sec-ch-ua*`
//! headers are parsed out of whatever UA string ends up in use.

use std::collections::HashMap;

use crate::config::UserAgentMode;

/// Fallback UA when nothing is configured and randomization is off.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Produces user agents plus matching client-hint headers.
#[derive(Debug, Clone, Default)]
pub struct UserAgentGenerator {
    mode: UserAgentMode,
    fixed: Option<String>,
}

impl UserAgentGenerator {
    #[must_use]
    pub fn new(mode: UserAgentMode, fixed: Option<String>) -> Self {
        Self { mode, fixed }
    }

    /// The UA string to use for a new context.
    #[must_use]
    pub fn generate(&self) -> String {
        match self.mode {
            UserAgentMode::Random => ua_generator::ua::spoof_ua().to_string(),
            UserAgentMode::Fixed => self
                .fixed
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }

    /// Client-hint headers consistent with `user_agent`.
    ///
    /// Non-Chromium agents get no `sec-ch-ua` brand list (matching real
    /// Firefox/Safari behavior, which do not send it).
    #[must_use]
    pub fn client_hints(user_agent: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        let Some(major) = chrome_major_version(user_agent) else {
            return headers;
        };
        headers.insert(
            "sec-ch-ua".to_string(),
            format!(
                "\"Chromium\";v=\"{major}\", \"Google Chrome\";v=\"{major}\", \
                 \"Not-A.Brand\";v=\"99\""
            ),
        );
        let mobile = if user_agent.contains("Mobile") { "?1" } else { "?0" };
        headers.insert("sec-ch-ua-mobile".to_string(), mobile.to_string());
        headers.insert(
            "sec-ch-ua-platform".to_string(),
            format!("\"{}\"", platform_token(user_agent)),
        );
        headers
    }
}

/// Parse the Chrome major version out of a UA string.
fn chrome_major_version(user_agent: &str) -> Option<u32> {
    let idx = user_agent.find("Chrome/")?;
    let rest = &user_agent[idx + "Chrome/".len()..];
    let major: String = rest.chars().take_while(char::is_ascii_digit).collect();
    major.parse().ok()
}

fn platform_token(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac OS X") || user_agent.contains("Macintosh") {
        "macOS"
    } else if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("Linux") || user_agent.contains("X11") {
        "Linux"
    } else {
        "Unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_mode_returns_configured_ua() {
        let generator =
            UserAgentGenerator::new(UserAgentMode::Fixed, Some("MyAgent/2.0".to_string()));
        assert_eq!(generator.generate(), "MyAgent/2.0");
    }

    #[test]
    fn fixed_mode_falls_back_to_default() {
        let generator = UserAgentGenerator::new(UserAgentMode::Fixed, None);
        assert_eq!(generator.generate(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn random_mode_produces_nonempty_ua() {
        let generator = UserAgentGenerator::new(UserAgentMode::Random, None);
        assert!(!generator.generate().is_empty());
    }

    #[test]
    fn client_hints_match_chrome_version_and_platform() {
        let hints = UserAgentGenerator::client_hints(DEFAULT_USER_AGENT);
        assert_eq!(
            hints.get("sec-ch-ua").map(|v| v.contains("v=\"131\"")),
            Some(true)
        );
        assert_eq!(hints.get("sec-ch-ua-mobile").map(String::as_str), Some("?0"));
        assert_eq!(
            hints.get("sec-ch-ua-platform").map(String::as_str),
            Some("\"macOS\"")
        );
    }

    #[test]
    fn non_chromium_agents_send_no_brand_list() {
        let hints = UserAgentGenerator::client_hints(
            "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/119.0",
        );
        assert!(hints.is_empty());
    }
}
