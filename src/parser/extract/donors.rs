use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::entities::normalize_phone;
use super::patterns::PatternSet;

static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n|\r|\n").unwrap());

/// Lines searched on each side of a name line.
const WINDOW: usize = 2;
/// Names this short (in chars) never become profiles.
const MAX_REJECTED_NAME_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonorProfile {
    pub name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
}

impl DonorProfile {
    fn is_keepable(&self) -> bool {
        self.name.chars().count() > MAX_REJECTED_NAME_CHARS
            && (!self.emails.is_empty() || !self.phones.is_empty())
    }
}

/// Contacts already attributed to a profile during one page's scan.
#[derive(Debug, Default)]
struct UsedContacts {
    emails: HashSet<String>,
    phones: HashSet<String>,
}

/// Non-empty trimmed lines, in order.
pub fn split_lines(text: &str) -> Vec<&str> {
    LINE_BREAK_RE
        .split(text)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Associate each name-like line with unclaimed emails/phones within ±2 lines.
pub fn build_profiles(text: &str, patterns: &PatternSet) -> Vec<DonorProfile> {
    let lines = split_lines(text);
    let mut used = UsedContacts::default();
    let mut profiles = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(name) = patterns.name.first(line) else {
            continue;
        };

        let start = i.saturating_sub(WINDOW);
        let end = (i + WINDOW).min(lines.len() - 1);

        let mut profile = DonorProfile {
            name: name.to_string(),
            emails: Vec::new(),
            phones: Vec::new(),
        };

        for nearby in &lines[start..=end] {
            for email in patterns.email.find_all(nearby) {
                if used.emails.insert(email.to_string()) {
                    profile.emails.push(email.to_string());
                }
            }
            for phone in patterns.phone.find_all(nearby) {
                let phone = normalize_phone(phone);
                if used.phones.insert(phone.clone()) {
                    profile.phones.push(phone);
                }
            }
        }

        if profile.is_keepable() {
            profiles.push(profile);
        }
    }

    profiles
}
