//! Fixed locale table behind `rt/Locale`.
//!
//! Lookups never consult the host, so every node answers the same way.

use std::fmt;

/// Language reported by `rt/Locale.getDefault`.
pub const DEFAULT_LANGUAGE: &str = "en";

/// ISO 639-1 language codes, sorted.
pub const ISO_LANGUAGES: &[&str] = &[
    "aa", "ab", "ae", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az",
    "ba", "be", "bg", "bh", "bi", "bm", "bn", "bo", "br", "bs",
    "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv", "cy",
    "da", "de", "dv", "dz",
    "ee", "el", "en", "eo", "es", "et", "eu",
    "fa", "ff", "fi", "fj", "fo", "fr", "fy",
    "ga", "gd", "gl", "gn", "gu", "gv",
    "ha", "he", "hi", "ho", "hr", "ht", "hu", "hy", "hz",
    "ia", "id", "ie", "ig", "ii", "ik", "io", "is", "it", "iu",
    "ja", "jv",
    "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw", "ky",
    "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv",
    "mg", "mh", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my",
    "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv", "ny",
    "oc", "oj", "om", "or", "os",
    "pa", "pi", "pl", "ps", "pt",
    "qu",
    "rm", "rn", "ro", "ru", "rw",
    "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr", "ss", "st", "su", "sv", "sw",
    "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr", "ts", "tt", "tw", "ty",
    "ug", "uk", "ur", "uz",
    "ve", "vi", "vo",
    "wa", "wo",
    "xh",
    "yi", "yo",
    "za", "zh", "zu",
];

/// ISO 3166-1 alpha-2 country codes, sorted.
pub const ISO_COUNTRIES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ",
    "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN", "CO", "CR", "CU", "CV", "CW",
    "CX", "CY", "CZ",
    "DE", "DJ", "DK", "DM", "DO", "DZ",
    "EC", "EE", "EG", "EH", "ER", "ES", "ET",
    "FI", "FJ", "FK", "FM", "FO", "FR",
    "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT",
    "GU", "GW", "GY",
    "HK", "HM", "HN", "HR", "HT", "HU",
    "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT",
    "JE", "JM", "JO", "JP",
    "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ",
    "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY",
    "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS",
    "MT", "MU", "MV", "MW", "MX", "MY", "MZ",
    "NA", "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ",
    "OM",
    "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY",
    "QA",
    "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ",
    "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR", "TT", "TV", "TW", "TZ",
    "UA", "UG", "UM", "US", "UY", "UZ",
    "VA", "VC", "VE", "VG", "VI", "VN", "VU",
    "WF", "WS",
    "YE", "YT",
    "ZA", "ZM", "ZW",
];

/// Language and region of a parsed language tag. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleTag {
    pub language: String,
    pub country: String,
}

impl LocaleTag {
    pub fn default_locale() -> Self {
        Self { language: DEFAULT_LANGUAGE.to_string(), country: String::new() }
    }

    /// Parse a BCP 47 tag such as `en-GB` or `zh-Hant-TW`.
    ///
    /// A malformed language subtag yields an empty language. Script and
    /// extension subtags are skipped.
    pub fn parse(tag: &str) -> Self {
        let mut subtags = tag.split(['-', '_']).filter(|s| !s.is_empty());
        let language = match subtags.next() {
            Some(first) if is_alpha(first, 2..=3) && !first.eq_ignore_ascii_case("und") => {
                first.to_ascii_lowercase()
            }
            _ => return Self::default(),
        };
        let mut country = String::new();
        for subtag in subtags {
            if is_alpha(subtag, 4..=4) {
                continue;
            }
            if is_alpha(subtag, 2..=2) {
                country = subtag.to_ascii_uppercase();
            } else if subtag.len() == 3 && subtag.bytes().all(|b| b.is_ascii_digit()) {
                country = subtag.to_string();
            }
            break;
        }
        Self { language, country }
    }
}

impl fmt::Display for LocaleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.country.is_empty() {
            write!(f, "{}", self.language)
        } else {
            write!(f, "{}_{}", self.language, self.country)
        }
    }
}

fn is_alpha(subtag: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&subtag.len()) && subtag.bytes().all(|b| b.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_and_region() {
        for (tag, language, country) in [
            ("en", "en", ""),
            ("en-GB", "en", "GB"),
            ("en-us", "en", "US"),
            ("EN_ca", "en", "CA"),
            ("zh-Hant-TW", "zh", "TW"),
            ("es-419", "es", "419"),
        ] {
            let parsed = LocaleTag::parse(tag);
            assert_eq!((parsed.language.as_str(), parsed.country.as_str()), (language, country), "{}", tag);
        }
    }

    #[test]
    fn test_malformed_tag_is_empty() {
        assert_eq!(LocaleTag::parse("x"), LocaleTag::default());
        assert_eq!(LocaleTag::parse("und-GB"), LocaleTag::default());
        assert_eq!(LocaleTag::parse(""), LocaleTag::default());
    }

    #[test]
    fn test_display() {
        assert_eq!(LocaleTag::parse("en-AU").to_string(), "en_AU");
        assert_eq!(LocaleTag::default_locale().to_string(), "en");
    }

    #[test]
    fn test_tables_sorted_and_unique() {
        assert!(ISO_LANGUAGES.windows(2).all(|w| w[0] < w[1]));
        assert!(ISO_COUNTRIES.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ISO_LANGUAGES.len(), 184);
        assert_eq!(ISO_COUNTRIES.len(), 249);
        for code in ["en", "fr", "hu", "it", "ru", "zh"] {
            assert!(ISO_LANGUAGES.contains(&code));
        }
        for code in ["AU", "DE", "FR", "GB", "MX", "US"] {
            assert!(ISO_COUNTRIES.contains(&code));
        }
    }
}
