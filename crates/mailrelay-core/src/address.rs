//! Address list parsing
//!
//! Gateways hand over raw header values such as
//! `"Doe, John" <john@example.com>, jane@example.com`. Display names may
//! contain commas when quoted, so a naive split on `,` is repaired before
//! each fragment is parsed.

use mailrelay_common::types::EmailAddress;

/// Parse a single `Name <email>`, `"Name" <email>` or bare `email`
pub fn parse_one(raw: &str) -> Option<EmailAddress> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Some(open) = raw.rfind('<') else {
        return Some(EmailAddress::bare(raw));
    };

    let inner = &raw[open + 1..];
    let email = match inner.find('>') {
        Some(close) => &inner[..close],
        None => inner,
    }
    .trim();
    if email.is_empty() {
        return None;
    }

    let name = raw[..open].trim().trim_matches('"').trim();
    Some(EmailAddress::new(name, email))
}

/// Parse a comma separated address list, keeping quoted names intact
pub fn parse_many(raw: &str) -> Vec<EmailAddress> {
    rejoin_quoted(raw.split(',').collect())
        .iter()
        .filter_map(|fragment| parse_one(fragment))
        .collect()
}

/// Rejoin fragments that were split inside a quoted display name.
///
/// A fragment with exactly one `"` opens a quote; the next such fragment
/// closes it. An unterminated quote leaves its fragments untouched.
fn rejoin_quoted(fragments: Vec<&str>) -> Vec<String> {
    let mut joined = Vec::with_capacity(fragments.len());
    let mut open: Option<usize> = None;

    for (index, fragment) in fragments.iter().enumerate() {
        let toggles = fragment.matches('"').count() == 1;
        match open {
            Some(start) if toggles => {
                joined.push(fragments[start..=index].join(","));
                open = None;
            }
            Some(_) => {}
            None if toggles => open = Some(index),
            None => joined.push(fragment.to_string()),
        }
    }

    if let Some(start) = open {
        joined.extend(fragments[start..].iter().map(|f| f.to_string()));
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_one_formats() {
        assert_eq!(
            parse_one("\"Doe, John\" <john@example.com>"),
            Some(EmailAddress::new("Doe, John", "john@example.com"))
        );
        assert_eq!(
            parse_one("John Doe <john@example.com>"),
            Some(EmailAddress::new("John Doe", "john@example.com"))
        );
        assert_eq!(
            parse_one("  john@example.com "),
            Some(EmailAddress::bare("john@example.com"))
        );
        assert_eq!(
            parse_one("<john@example.com>"),
            Some(EmailAddress::bare("john@example.com"))
        );
    }

    #[test]
    fn test_parse_one_empty() {
        assert_eq!(parse_one(""), None);
        assert_eq!(parse_one("   "), None);
        assert_eq!(parse_one("Nobody <>"), None);
    }

    #[test]
    fn test_parse_one_uses_last_bracket() {
        assert_eq!(
            parse_one("\"a <b>\" <real@example.com>"),
            Some(EmailAddress::new("a <b>", "real@example.com"))
        );
    }

    #[test]
    fn test_parse_many_simple() {
        let parsed = parse_many("a@x.com, B <b@x.com>,c@x.com");
        assert_eq!(
            parsed,
            vec![
                EmailAddress::bare("a@x.com"),
                EmailAddress::new("B", "b@x.com"),
                EmailAddress::bare("c@x.com"),
            ]
        );
    }

    #[test]
    fn test_parse_many_quoted_commas() {
        let parsed = parse_many(
            "\"Doe, John\" <john@example.com>, \"Last, First, Middle\" <lfm@example.com>, plain@example.com",
        );
        assert_eq!(
            parsed,
            vec![
                EmailAddress::new("Doe, John", "john@example.com"),
                EmailAddress::new("Last, First, Middle", "lfm@example.com"),
                EmailAddress::bare("plain@example.com"),
            ]
        );
    }

    #[test]
    fn test_parse_many_quoted_without_commas() {
        let parsed = parse_many("\"Doe\" <john@example.com>, \"Roe\" <jane@example.com>");
        assert_eq!(
            parsed,
            vec![
                EmailAddress::new("Doe", "john@example.com"),
                EmailAddress::new("Roe", "jane@example.com"),
            ]
        );
    }

    #[test]
    fn test_parse_many_drops_empty_fragments() {
        assert_eq!(
            parse_many("a@x.com,, ,b@x.com"),
            vec![EmailAddress::bare("a@x.com"), EmailAddress::bare("b@x.com")]
        );
        assert!(parse_many("").is_empty());
    }

    #[test]
    fn test_parse_many_unterminated_quote() {
        let parsed = parse_many("\"Broken <a@x.com>, b@x.com");
        assert_eq!(
            parsed,
            vec![
                EmailAddress::new("Broken", "a@x.com"),
                EmailAddress::bare("b@x.com"),
            ]
        );
    }
}
