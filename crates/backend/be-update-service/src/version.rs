//! Version ordering used for eligibility checks and update classification.
//!
//! A version is split on `.` into parts. Each part is read as alternating runs
//! of digits and non-digits: digit runs compare numerically, non-digit runs
//! compare bytewise, and an empty non-digit run sorts after a non-empty one.
//! That last rule is what places `5.0a1` and `5.0-beta.1` before `5.0`.
//! Build metadata such as `+3a43a98f1` is just another non-digit run.

use std::cmp::Ordering;

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        let (l, r) = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => (l.unwrap_or("0"), r.unwrap_or("0")),
        };

        match compare_part(l, r) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
}

/// `true` when `version` sorts at or after `minimum`.
pub fn is_at_least(version: &str, minimum: &str) -> bool {
    compare(version, minimum) != Ordering::Less
}

/// The release line of a version: its first two numeric groups.
///
/// `"7.0.0-beta.3+abc"` is line `(7, 0)` and `"5"` is line `(5, 0)`. Returns
/// `None` when the version does not start with a number.
pub fn release_line(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.split('.');
    let major = leading_number(parts.next()?)?;
    let minor = match parts.next() {
        Some(part) => leading_number(part)?,
        None => 0,
    };
    Some((major, minor))
}

fn leading_number(part: &str) -> Option<u64> {
    let (digits, _) = split_run(part, true);
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn compare_part(mut a: &str, mut b: &str) -> Ordering {
    while !a.is_empty() || !b.is_empty() {
        let (num_a, rest_a) = split_run(a, true);
        let (num_b, rest_b) = split_run(b, true);
        match compare_numeric(num_a, num_b) {
            Ordering::Equal => {}
            ord => return ord,
        }

        let (text_a, rest_a) = split_run(rest_a, false);
        let (text_b, rest_b) = split_run(rest_b, false);
        match compare_text(text_a, text_b) {
            Ordering::Equal => {}
            ord => return ord,
        }

        a = rest_a;
        b = rest_b;
    }
    Ordering::Equal
}

/// Split off the leading run of digits (or non-digits) from `s`.
fn split_run(s: &str, digits: bool) -> (&str, &str) {
    let end = s
        .find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(s.len());
    s.split_at(end)
}

// Compared as decimal strings so arbitrarily long runs never overflow.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.as_bytes().cmp(b.as_bytes()),
    }
}
