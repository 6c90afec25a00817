//! Diagnostic text: resolution chains, short type names and
//! "did you mean" hints for unknown binding keys.

use std::collections::HashMap;

const ARROW: &str = " → ";

/// Joins the keys of a resolution chain with arrows.
///
/// ```
/// use wiring_support::rendering::render_chain;
///
/// assert_eq!(render_chain(&["Service", "Repository", "Service"]), "Service → Repository → Service");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut rendered = String::new();
    for (i, key) in chain.iter().enumerate() {
        if i > 0 {
            rendered.push_str(ARROW);
        }
        rendered.push_str(key.as_ref());
    }
    rendered
}

fn is_delimiter(ch: char) -> bool {
    matches!(
        ch,
        '<' | '>' | ',' | ' ' | '&' | '*' | '(' | ')' | '[' | ']' | ';'
    )
}

/// Drops module paths from every path inside a type name.
///
/// ```
/// use wiring_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::storage::Database"), "Database");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn app::log::Logger + Send>"),
///     "Arc<dyn Logger + Send>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut short = String::with_capacity(full_name.len());
    let mut rest = full_name;

    while !rest.is_empty() {
        let end = rest.find(is_delimiter).unwrap_or(rest.len());
        let (path, tail) = rest.split_at(end);
        short.push_str(path.rsplit("::").next().unwrap_or(path));

        let mut tail = tail.chars();
        if let Some(delimiter) = tail.next() {
            short.push(delimiter);
        }
        rest = tail.as_str();
    }
    short
}

/// How a registered name resembles the requested one. Later variants
/// rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Resemblance {
    /// Percentage of shared characters between the short names.
    Overlap(usize),
    /// One short name contains the other.
    ShortName,
    /// One full path contains the other.
    FullName,
}

/// Share of characters two names have in common, in percent of the longer
/// one. Names whose lengths differ by more than three score zero.
fn overlap_percent(a: &str, b: &str) -> usize {
    let (a_len, b_len) = (a.chars().count(), b.chars().count());
    let longest = a_len.max(b_len);
    if longest == 0 || a_len.abs_diff(b_len) > 3 {
        return 0;
    }

    let mut pool: HashMap<char, usize> = HashMap::new();
    for ch in a.chars() {
        *pool.entry(ch).or_default() += 1;
    }
    let shared = b
        .chars()
        .filter(|ch| match pool.get_mut(ch) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        })
        .count();

    shared * 100 / longest
}

fn resemblance(requested: &str, requested_short: &str, candidate: &str) -> Option<Resemblance> {
    let full = candidate.to_lowercase();
    if full.contains(requested) || requested.contains(full.as_str()) {
        return Some(Resemblance::FullName);
    }

    let short = shorten_type_name(&full);
    if short.contains(requested_short) || requested_short.contains(short.as_str()) {
        return Some(Resemblance::ShortName);
    }

    let overlap = overlap_percent(requested_short, &short);
    (overlap >= 60).then_some(Resemblance::Overlap(overlap))
}

/// Suggests registered names that look like `requested`, best first.
///
/// A name qualifies when one full path contains the other, when one short
/// name contains the other, or when the short names share at least 60% of
/// their characters. Ties keep the order of `available`.
pub fn suggest_similar(requested: &str, available: &[&str], max: usize) -> Vec<String> {
    if requested.is_empty() {
        return Vec::new();
    }
    let requested = requested.to_lowercase();
    let requested_short = shorten_type_name(&requested);

    let mut ranked: Vec<(Resemblance, &str)> = available
        .iter()
        .filter_map(|&name| Some((resemblance(&requested, &requested_short, name)?, name)))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked.into_iter().take(max).map(|(_, name)| name.to_owned()).collect()
}
