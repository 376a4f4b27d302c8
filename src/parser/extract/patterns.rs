use regex::Regex;
use serde::Deserialize;
use tracing::warn;

pub const EMAIL: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,7}";
// Separators are horizontal only: page text keeps one block per line, and a
// match must not run across a line break.
pub const PHONE: &str = r"(?:\+?\d{1,2}[ \t.-]?)?\(?\d{3}\)?[ \t.-]?\d{3}[ \t.-]?\d{4}";
pub const ADDRESS: &str =
    r"\d{1,5}[^\S\r\n]\w+(?:[^\S\r\n]\w+)*,[^\S\r\n]\w+(?:[^\S\r\n]\w+)*,[^\S\r\n][A-Z]{2}[^\S\r\n]\d{5}";
/// Matches any currency-shaped number, labelled or not. Over-broad on purpose:
/// phone digit groups and years land here too.
pub const DONATION: &str = r"\$?\d+(?:,\d{3})*(?:\.\d{2})?";
/// Two consecutive capitalized words. Sentence starts and place names match as well.
pub const NAME: &str = r"[A-Z][a-z]+ [A-Z][a-z]+";

/// A compiled search pattern. A pattern whose source failed to compile (or was
/// left empty) is disabled and matches nothing.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    re: Option<Regex>,
}

impl Pattern {
    pub fn compile(source: &str) -> Self {
        let re = if source.trim().is_empty() {
            None
        } else {
            match Regex::new(source) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Disabling malformed pattern {:?}: {}", source, e);
                    None
                }
            }
        };
        Pattern {
            source: source.to_string(),
            re,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.re.is_some()
    }

    /// All non-overlapping matches, left to right.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        match &self.re {
            Some(re) => re.find_iter(text).map(|m| m.as_str()).collect(),
            None => Vec::new(),
        }
    }

    pub fn first<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.re.as_ref()?.find(text).map(|m| m.as_str())
    }
}

/// Replacement sources for the built-in patterns. `None` keeps the default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternOverrides {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub donation: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PatternSet {
    pub email: Pattern,
    pub phone: Pattern,
    pub address: Pattern,
    pub donation: Pattern,
    pub name: Pattern,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::with_overrides(&PatternOverrides::default())
    }
}

impl PatternSet {
    pub fn with_overrides(o: &PatternOverrides) -> Self {
        let pick = |custom: &Option<String>, default: &str| {
            Pattern::compile(custom.as_deref().unwrap_or(default))
        };
        PatternSet {
            email: pick(&o.email, EMAIL),
            phone: pick(&o.phone, PHONE),
            address: pick(&o.address, ADDRESS),
            donation: pick(&o.donation, DONATION),
            name: pick(&o.name, NAME),
        }
    }

    pub fn named(&self) -> [(&'static str, &Pattern); 5] {
        [
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("donation", &self.donation),
            ("name", &self.name),
        ]
    }

    /// Kinds whose pattern is disabled and will never match.
    pub fn disabled(&self) -> Vec<&'static str> {
        self.named()
            .into_iter()
            .filter(|(_, p)| !p.is_enabled())
            .map(|(kind, _)| kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_tld_bounds() {
        let p = PatternSet::default();
        assert_eq!(p.email.find_all("write jane.doe+gifts@mail.example.org now"), vec!["jane.doe+gifts@mail.example.org"]);
        assert!(p.email.find_all("nobody@localhost").is_empty());
    }

    #[test]
    fn phone_shapes() {
        let p = PatternSet::default();
        for s in ["(555) 123-4567", "555.123.4567", "555-123-4567", "+1 555 123 4567", "5551234567"] {
            assert_eq!(p.phone.first(s), Some(s), "{}", s);
        }
        assert!(p.phone.first("call 123-456").is_none());
        assert!(p.phone.first("Room 555\n123 4567").is_none());
    }

    #[test]
    fn address_shape() {
        let p = PatternSet::default();
        let text = "Mail checks to 1200 Oak Grove Rd, Spring Valley, NY 10977 by Friday.";
        assert_eq!(p.address.find_all(text), vec!["1200 Oak Grove Rd, Spring Valley, NY 10977"]);
    }

    #[test]
    fn donation_is_over_broad() {
        let p = PatternSet::default();
        let found = p.donation.find_all("Gave $1,250.00 in 2023");
        assert_eq!(found, vec!["$1,250.00", "2023"]);
    }

    #[test]
    fn name_first_match_only() {
        let p = PatternSet::default();
        assert_eq!(p.name.first("Board: Mary Jones and Tom Hill"), Some("Mary Jones"));
        assert!(p.name.first("ALL CAPS NAME").is_none());
    }

    #[test]
    fn malformed_override_matches_nothing() {
        let p = PatternSet::with_overrides(&PatternOverrides {
            donation: Some("(unclosed".into()),
            ..Default::default()
        });
        assert!(!p.donation.is_enabled());
        assert!(p.donation.find_all("$5.00").is_empty());
        assert!(p.email.is_enabled());
        assert_eq!(p.disabled(), vec!["donation"]);
        assert!(PatternSet::default().disabled().is_empty());
    }

    #[test]
    fn empty_override_disables() {
        let p = PatternSet::with_overrides(&PatternOverrides {
            address: Some(String::new()),
            ..Default::default()
        });
        assert!(p.address.first("1 Main St, Town, CA 90210").is_none());
    }

    #[test]
    fn override_replaces_default() {
        let p = PatternSet::with_overrides(&PatternOverrides {
            donation: Some(r"\$\d+".into()),
            ..Default::default()
        });
        assert_eq!(p.donation.source(), r"\$\d+");
        assert_eq!(p.donation.find_all("$40 in 2023"), vec!["$40"]);
    }
}
