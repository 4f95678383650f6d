use serde::{Deserialize, Serialize};

/// Locale tag stored on rows of non-localized fields, and the requested
/// locale meaning "every locale at once" on reads.
pub const ALL_LOCALES: &str = "all";

/// Content locales configured for the installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentLocales {
    default_locale: String,
    locales: Vec<String>,
}

impl ContentLocales {
    /// Build a locale set. The default is added to the list when missing.
    pub fn new(default_locale: impl Into<String>, locales: Vec<String>) -> Self {
        let default_locale = default_locale.into();
        let mut all = Vec::with_capacity(locales.len() + 1);
        for code in locales {
            if code != ALL_LOCALES && !all.contains(&code) {
                all.push(code);
            }
        }
        if !all.contains(&default_locale) {
            all.insert(0, default_locale.clone());
        }
        Self {
            default_locale,
            locales: all,
        }
    }

    /// A single-locale installation.
    pub fn single(code: impl Into<String>) -> Self {
        let code = code.into();
        Self::new(code.clone(), vec![code])
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn contains(&self, code: &str) -> bool {
        self.locales.iter().any(|l| l == code)
    }
}

impl Default for ContentLocales {
    fn default() -> Self {
        Self::single("en")
    }
}

/// Which shape localized leaves have in a document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleScope {
    /// Localized leaves are `{locale: value}` maps.
    All,
    /// Localized leaves are plain values belonging to one locale.
    Locale(String),
}

impl LocaleScope {
    pub fn parse(code: &str) -> Self {
        if code == ALL_LOCALES {
            LocaleScope::All
        } else {
            LocaleScope::Locale(code.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LocaleScope::All => ALL_LOCALES,
            LocaleScope::Locale(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_added_first() {
        let locales = ContentLocales::new("de", vec!["en".into(), "fr".into()]);
        assert_eq!(locales.locales(), &["de", "en", "fr"]);
        assert_eq!(locales.default_locale(), "de");
    }

    #[test]
    fn all_is_never_a_content_locale() {
        let locales = ContentLocales::new("en", vec!["all".into(), "en".into(), "en".into()]);
        assert_eq!(locales.locales(), &["en"]);
        assert!(!locales.contains(ALL_LOCALES));
    }

    #[test]
    fn scope_parse() {
        assert_eq!(LocaleScope::parse("all"), LocaleScope::All);
        assert_eq!(LocaleScope::parse("fr"), LocaleScope::Locale("fr".into()));
        assert_eq!(LocaleScope::parse("fr").as_str(), "fr");
    }
}
