//! Marker extraction — maps leading `@marker` tokens to mail recipients.
//!
//! A message addresses recipients with a contiguous run of `@marker`
//! tokens at the start of its text (`"@user1, @user2 hello"`). Tokens are
//! separated by spaces or commas. The run ends at the first non-`@` text;
//! an `@` later in the message is ordinary content.

use crate::error::ConfigError;

/// Binding between a marker name and a mail recipient address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardMapping {
    /// Marker name, matched case-sensitively against `@<marker>` tokens.
    pub marker: String,
    /// Recipient mail address.
    pub mail_addr: String,
}

impl ForwardMapping {
    pub fn new(marker: impl Into<String>, mail_addr: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            mail_addr: mail_addr.into(),
        }
    }
}

/// Result of extracting markers from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDispatch {
    /// Matched mappings in first-occurrence order. Repeated markers (and
    /// duplicate table entries) yield repeated entries, one send each.
    pub mappings: Vec<ForwardMapping>,
    /// Message text with the leading marker run removed.
    pub content: String,
}

impl ParsedDispatch {
    /// True iff at least one configured marker matched.
    pub fn found(&self) -> bool {
        !self.mappings.is_empty()
    }
}

/// Parse the configured forward table: comma-separated `marker=address`
/// pairs. Any malformed entry is fatal.
pub fn parse_forward_mappings(s: &str) -> Result<Vec<ForwardMapping>, ConfigError> {
    if s.is_empty() {
        return Err(ConfigError::MissingForwardTable);
    }

    s.split(',')
        .map(|entry| {
            let parts: Vec<&str> = entry.split('=').collect();
            if parts.len() != 2 {
                return Err(ConfigError::InvalidForwardMapping {
                    entry: entry.to_string(),
                });
            }
            let mapping = ForwardMapping::new(parts[0].trim(), parts[1].trim());
            tracing::debug!(
                "forwarding messages with marker '@{}' to {}",
                mapping.marker, mapping.mail_addr
            );
            Ok(mapping)
        })
        .collect()
}

fn is_separator(c: char) -> bool {
    c == ' ' || c == ','
}

/// Extract all leading markers from `text`.
///
/// Consumes the leading run of `@`-prefixed tokens, matching each against
/// the mapping table. Unrecognized leading tokens are consumed and
/// discarded, not kept in the residual content.
pub fn extract_markers(text: &str, mappings: &[ForwardMapping]) -> ParsedDispatch {
    let mut found = Vec::new();

    let mut work = text.trim_start();
    while work.starts_with('@') {
        // token ends at the first separator, or at end of string
        let (token, rest) = match work.find(is_separator) {
            Some(idx) => work.split_at(idx),
            None => (work, ""),
        };
        work = rest.trim_start_matches(is_separator);

        let name = &token[1..];
        found.extend(mappings.iter().filter(|m| m.marker == name).cloned());
    }

    ParsedDispatch {
        mappings: found,
        content: work.to_string(),
    }
}
