use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::patterns::PatternSet;

static PHONE_SEPARATORS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-.\s()]+").unwrap());

/// Insertion-ordered set of strings. Serializes as a plain array.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EntitySet {
    items: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.items.push(value);
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }
}

impl<S: Into<String>> FromIterator<S> for EntitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EntitySet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl<S: Into<String>> Extend<S> for EntitySet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

/// One `<a href>` element of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor {
    pub href: String,
    pub text: String,
}

impl Anchor {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Anchor {
            href: href.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Entities {
    pub emails: EntitySet,
    pub phones: EntitySet,
    pub addresses: EntitySet,
    pub donations: EntitySet,
}

impl Entities {
    pub fn total(&self) -> usize {
        self.emails.len() + self.phones.len() + self.addresses.len() + self.donations.len()
    }
}

/// Apply every pattern to `text`, then fold in `mailto:` anchors.
pub fn extract(text: &str, anchors: &[Anchor], patterns: &PatternSet) -> Entities {
    let mut emails: EntitySet = patterns.email.find_all(text).into_iter().collect();
    emails.extend(anchors.iter().filter_map(|a| mailto_address(&a.href)));

    Entities {
        emails,
        phones: patterns
            .phone
            .find_all(text)
            .into_iter()
            .map(normalize_phone)
            .collect(),
        addresses: patterns.address.find_all(text).into_iter().collect(),
        donations: patterns.donation.find_all(text).into_iter().collect(),
    }
}

/// Collapse separator and punctuation runs to single spaces: "(555) 123-4567" → "555 123 4567".
pub fn normalize_phone(raw: &str) -> String {
    PHONE_SEPARATORS_RE.replace_all(raw, " ").trim().to_string()
}

/// Address part of a `mailto:` href, or `None` for any other scheme.
pub fn mailto_address(href: &str) -> Option<String> {
    let href = href.trim();
    let scheme = href.get(..7)?;
    if !scheme.eq_ignore_ascii_case("mailto:") {
        return None;
    }
    let address = href[7..].trim();
    if address.is_empty() {
        None
    } else {
        Some(address.to_string())
    }
}
