//! Minimal non-blocking LDAP DN syntax check (RFC 4514).
//!
//! `spec.md` §3's invariant: a malformed DN must not block dispatch (the
//! server is free to apply its own handling) but must not silently skip
//! earlier validations either. This module only classifies a DN string as
//! syntactically plausible or not, for a diagnostic `warn!` emitted by the
//! engine before dispatch; it is never a hard gate.

use nom::bytes::complete::take_while1;
use nom::character::complete::char;
use nom::combinator::{all_consuming, opt};
use nom::multi::separated_list1;
use nom::IResult;

fn is_attr_type_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn is_value_char(c: char) -> bool {
    !matches!(c, ',' | '+' | '=' | '<' | '>' | '#' | ';' | '\\' | '"')
}

fn attribute_type_and_value(input: &str) -> IResult<&str, ()> {
    let (input, _) = take_while1(is_attr_type_char)(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = opt(take_while1(is_value_char))(input)?;
    Ok((input, ()))
}

fn relative_dn(input: &str) -> IResult<&str, ()> {
    let (input, _) = separated_list1(char('+'), attribute_type_and_value)(input)?;
    Ok((input, ()))
}

fn distinguished_name(input: &str) -> IResult<&str, ()> {
    let (input, _) = separated_list1(char(','), relative_dn)(input)?;
    Ok((input, ()))
}

/// Whether `dn` is plausibly a syntactically valid DN. The empty string (the
/// root DSE) is valid. This deliberately doesn't handle backslash-escaped
/// separators inside a value — it's a diagnostic heuristic, not a validator
/// a dispatch decision should ever depend on.
pub fn is_syntactically_valid(dn: &str) -> bool {
    if dn.is_empty() {
        return true;
    }
    all_consuming(distinguished_name)(dn).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_dns() {
        assert!(is_syntactically_valid("uid=a,dc=example,dc=com"));
        assert!(is_syntactically_valid(""));
    }

    #[test]
    fn accepts_multivalued_rdn() {
        assert!(is_syntactically_valid("cn=a+uid=a,dc=example,dc=com"));
    }

    #[test]
    fn rejects_missing_equals() {
        assert!(!is_syntactically_valid("uid a,dc=example,dc=com"));
    }

    #[test]
    fn rejects_trailing_comma() {
        assert!(!is_syntactically_valid("uid=a,"));
    }
}
