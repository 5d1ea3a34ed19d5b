//! Language registry: display names for language codes.
//!
//! The engine only reports bare codes for most pairs, so the gateway keeps a
//! static table of English names. It is initialized once behind a `OnceLock`
//! and never mutated.

use crate::translator::LanguagePair;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// A language as shown to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    /// ISO 639 code (e.g., "en", "haw")
    pub code: String,

    /// English name, or the upper-cased code when unknown
    pub name: String,
}

/// Global language name table.
pub struct LanguageRegistry {
    names: Vec<(&'static str, &'static str)>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            names: default_names(),
        })
    }

    /// Look up the English name for a code.
    ///
    /// # Returns
    /// * `Some(name)` if the code is in the table
    /// * `None` otherwise
    pub fn get_by_code(&self, code: &str) -> Option<&'static str> {
        self.names
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
    }

    /// Display name for a code, falling back to the upper-cased code.
    pub fn name_for(&self, code: &str) -> String {
        self.get_by_code(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.to_uppercase())
    }

    /// Every language appearing on either side of a pair, sorted by code.
    pub fn languages_from_pairs(&self, pairs: &[LanguagePair]) -> Vec<LanguageInfo> {
        let codes: BTreeSet<&str> = pairs
            .iter()
            .flat_map(|p| [p.from.as_str(), p.to.as_str()])
            .collect();

        codes
            .into_iter()
            .map(|code| LanguageInfo {
                code: code.to_string(),
                name: self.name_for(code),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn default_names() -> Vec<(&'static str, &'static str)> {
    vec![
        // European languages
        ("en", "English"),
        ("es", "Spanish"),
        ("fr", "French"),
        ("de", "German"),
        ("it", "Italian"),
        ("pt", "Portuguese"),
        ("ru", "Russian"),
        ("pl", "Polish"),
        ("nl", "Dutch"),
        ("el", "Greek"),
        ("cs", "Czech"),
        ("ro", "Romanian"),
        ("hu", "Hungarian"),
        ("sv", "Swedish"),
        ("no", "Norwegian"),
        ("nb", "Norwegian Bokmål"),
        ("da", "Danish"),
        ("fi", "Finnish"),
        ("bg", "Bulgarian"),
        ("hr", "Croatian"),
        ("sr", "Serbian"),
        ("sk", "Slovak"),
        ("sl", "Slovenian"),
        ("lt", "Lithuanian"),
        ("lv", "Latvian"),
        ("et", "Estonian"),
        ("ga", "Irish"),
        ("ca", "Catalan"),
        ("uk", "Ukrainian"),
        ("be", "Belarusian"),
        ("is", "Icelandic"),
        ("mk", "Macedonian"),
        ("sq", "Albanian"),
        // Major world languages
        ("zh", "Chinese"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("ar", "Arabic"),
        ("hi", "Hindi"),
        ("tr", "Turkish"),
        ("he", "Hebrew"),
        ("th", "Thai"),
        ("vi", "Vietnamese"),
        ("id", "Indonesian"),
        ("ms", "Malay"),
        ("tl", "Tagalog"),
        ("sw", "Swahili"),
        ("af", "Afrikaans"),
        ("az", "Azerbaijani"),
        ("eu", "Basque"),
        ("bn", "Bengali"),
        ("bs", "Bosnian"),
        ("br", "Breton"),
        ("eo", "Esperanto"),
        ("fa", "Persian"),
        ("gl", "Galician"),
        ("gu", "Gujarati"),
        ("ha", "Hausa"),
        ("haw", "Hawaiian"),
        ("hy", "Armenian"),
        ("ig", "Igbo"),
        ("jw", "Javanese"),
        ("ka", "Georgian"),
        ("km", "Khmer"),
        ("kn", "Kannada"),
        ("kk", "Kazakh"),
        ("ky", "Kyrgyz"),
        ("lo", "Lao"),
        ("lb", "Luxembourgish"),
        ("ml", "Malayalam"),
        ("mr", "Marathi"),
        ("mn", "Mongolian"),
        ("my", "Myanmar"),
        ("ne", "Nepali"),
        ("ps", "Pashto"),
        ("pa", "Punjabi"),
        ("si", "Sinhala"),
        ("so", "Somali"),
        ("su", "Sundanese"),
        ("tg", "Tajik"),
        ("ta", "Tamil"),
        ("te", "Telugu"),
        ("ur", "Urdu"),
        ("uz", "Uzbek"),
        ("yi", "Yiddish"),
        ("yo", "Yoruba"),
        ("zu", "Zulu"),
    ]
}
