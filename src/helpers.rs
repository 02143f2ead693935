//! Small guards for values that cannot go through a placeholder safely, such as sort
//! directions or column lists taken from user input.

use crate::types::SetPayload;

/// Return the allowed entry equal to `input`, or `default` when there is none.
///
/// The returned value is the caller's own literal, so it is safe to splice into SQL with `?p`.
///
/// ```rust
/// use sql_guard::helpers::whitelist;
///
/// assert_eq!(whitelist("DESC", &["ASC", "DESC"], Some("ASC")), Some("DESC"));
/// assert_eq!(whitelist("1; DROP", &["ASC", "DESC"], Some("ASC")), Some("ASC"));
/// assert_eq!(whitelist("up", &["ASC", "DESC"], None), None);
/// ```
#[must_use]
pub fn whitelist<'a>(input: &str, allowed: &[&'a str], default: Option<&'a str>) -> Option<&'a str> {
    allowed
        .iter()
        .copied()
        .find(|candidate| *candidate == input)
        .or(default)
}

/// Drop every column not named in `allowed`, keeping the payload's order.
#[must_use]
pub fn filter_payload(mut payload: SetPayload, allowed: &[&str]) -> SetPayload {
    payload.retain(|column| allowed.contains(&column));
    payload
}
