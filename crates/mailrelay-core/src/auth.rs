//! Domain sender authorization
//!
//! SPF and DKIM are verified by the inbound gateway; only its verdict
//! strings are inspected here.

use serde::{Deserialize, Serialize};

/// Outcome of checking whether a sender may send as the domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthResult {
    Authorized,
    /// Sender is not the configured owner
    InvalidSender,
    /// SPF verdict is not `pass`
    SpfFail,
    /// DKIM verdict is not `{@<sender domain> : pass}`
    DkimFail,
}

impl AuthResult {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthResult::Authorized)
    }
}

impl std::fmt::Display for AuthResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthResult::Authorized => "Authorized",
            AuthResult::InvalidSender => "InvalidSender",
            AuthResult::SpfFail => "SpfFail",
            AuthResult::DkimFail => "DkimFail",
        };
        f.write_str(name)
    }
}

/// Check identity, SPF and DKIM in that order; the first failure wins
pub fn authorize(
    from_email: &str,
    relay_target_email: &str,
    spf: Option<&str>,
    dkim: Option<&str>,
) -> AuthResult {
    if !from_email.eq_ignore_ascii_case(relay_target_email) {
        return AuthResult::InvalidSender;
    }

    if !spf.is_some_and(|spf| spf.eq_ignore_ascii_case("pass")) {
        return AuthResult::SpfFail;
    }

    let Some(at) = from_email.find('@') else {
        return AuthResult::DkimFail;
    };
    let expected = format!("{{{} : pass}}", &from_email[at..]);
    if !dkim.is_some_and(|dkim| dkim.eq_ignore_ascii_case(&expected)) {
        return AuthResult::DkimFail;
    }

    AuthResult::Authorized
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "me@priv.example.com";
    const DKIM_PASS: &str = "{@priv.example.com : pass}";

    #[test]
    fn test_authorized() {
        assert_eq!(
            authorize(OWNER, OWNER, Some("pass"), Some(DKIM_PASS)),
            AuthResult::Authorized
        );
        assert!(authorize(OWNER, OWNER, Some("pass"), Some(DKIM_PASS)).is_authorized());
    }

    #[test]
    fn test_comparisons_ignore_case() {
        assert_eq!(
            authorize(
                "Me@Priv.Example.com",
                OWNER,
                Some("PASS"),
                Some("{@PRIV.example.COM : Pass}")
            ),
            AuthResult::Authorized
        );
    }

    #[test]
    fn test_invalid_sender() {
        assert_eq!(
            authorize("ext@user.foo", OWNER, Some("pass"), Some(DKIM_PASS)),
            AuthResult::InvalidSender
        );
    }

    #[test]
    fn test_spf_fail() {
        for spf in [Some("fail"), Some("softfail"), Some(""), None] {
            assert_eq!(authorize(OWNER, OWNER, spf, Some(DKIM_PASS)), AuthResult::SpfFail);
        }
    }

    #[test]
    fn test_dkim_fail() {
        for dkim in [
            Some("{@priv.example.com : fail}"),
            Some("{@other.com : pass}"),
            Some("{@priv.example.com : pass}, {@other.com : pass}"),
            Some("@priv.example.com : pass"),
            None,
        ] {
            assert_eq!(authorize(OWNER, OWNER, Some("pass"), dkim), AuthResult::DkimFail);
        }
    }

    #[test]
    fn test_sender_without_domain() {
        assert_eq!(
            authorize("owner", "owner", Some("pass"), Some("{owner : pass}")),
            AuthResult::DkimFail
        );
    }

    #[test]
    fn test_identity_checked_first() {
        assert_eq!(
            authorize("ext@user.foo", OWNER, None, None),
            AuthResult::InvalidSender
        );
        assert_eq!(authorize(OWNER, OWNER, None, None), AuthResult::SpfFail);
    }
}
