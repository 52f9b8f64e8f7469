use serde::Deserialize;

/// Parsed `kubectl version --client -ojson` output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientVersion {
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub minor: String,
}

#[derive(Debug, Deserialize)]
struct VersionOutput {
    #[serde(rename = "clientVersion")]
    client_version: Option<ClientVersion>,
}

impl ClientVersion {
    pub fn unknown() -> Self {
        Self {
            major: "unknown".to_string(),
            minor: "unknown".to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.minor_number().is_none()
    }

    /// Numeric minor version; tolerates the `+` suffix GKE builds carry
    /// (e.g. `"18+"`).
    pub fn minor_number(&self) -> Option<u32> {
        let digits: String = self
            .minor
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

impl std::fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parse the probe output, degrading to `unknown` rather than failing.
pub fn parse_version(output: &[u8]) -> ClientVersion {
    serde_json::from_slice::<VersionOutput>(output)
        .ok()
        .and_then(|v| v.client_version)
        .unwrap_or_else(ClientVersion::unknown)
}
