use serde::{Deserialize, Deserializer, Serialize};

/// Severity of a message produced while adopting a source model.
///
/// Parsing is case-insensitive. Severities other than the three known ones
/// become [`Severity::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Other,
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_ascii_lowercase().as_str() {
            "info" => Self::Info,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Other,
        })
    }
}

/// One entry of the adoption messages file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptionMessage {
    #[serde(alias = "Severity")]
    pub severity: Severity,
    #[serde(alias = "Text")]
    pub text: String,
}

/// Texts of the warnings among `messages`, in their original order.
pub fn warning_texts(messages: &[AdoptionMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.severity == Severity::Warning)
        .map(|m| m.text.clone())
        .collect()
}
