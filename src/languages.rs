//! Static catalog of supported target languages.
//!
//! The model addresses languages by short codes (`eng`, `hin`, `cmn_Hant`), users by
//! display names (`English`, `Hindi`, `Traditional Chinese`). Lookups in both
//! directions are case-exact.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};

/// A supported target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageEntry {
    /// Code understood by the model
    pub code: &'static str,
    /// Human readable display name
    pub name: &'static str,
}

/// `(code, display name)` pairs supported by the model.
const LANGUAGES: &[(&str, &str)] = &[
    ("afr", "Afrikaans"),
    ("amh", "Amharic"),
    ("arb", "Modern Standard Arabic"),
    ("ary", "Moroccan Arabic"),
    ("arz", "Egyptian Arabic"),
    ("asm", "Assamese"),
    ("azj", "North Azerbaijani"),
    ("bel", "Belarusian"),
    ("ben", "Bengali"),
    ("bos", "Bosnian"),
    ("bul", "Bulgarian"),
    ("cat", "Catalan"),
    ("ceb", "Cebuano"),
    ("ces", "Czech"),
    ("ckb", "Central Kurdish"),
    ("cmn", "Mandarin Chinese"),
    ("cmn_Hant", "Traditional Chinese"),
    ("cym", "Welsh"),
    ("dan", "Danish"),
    ("deu", "German"),
    ("ell", "Greek"),
    ("eng", "English"),
    ("est", "Estonian"),
    ("eus", "Basque"),
    ("fin", "Finnish"),
    ("fra", "French"),
    ("fuv", "Nigerian Fulfulde"),
    ("gaz", "West Central Oromo"),
    ("gle", "Irish"),
    ("glg", "Galician"),
    ("guj", "Gujarati"),
    ("heb", "Hebrew"),
    ("hin", "Hindi"),
    ("hrv", "Croatian"),
    ("hun", "Hungarian"),
    ("hye", "Armenian"),
    ("ibo", "Igbo"),
    ("ind", "Indonesian"),
    ("isl", "Icelandic"),
    ("ita", "Italian"),
    ("jav", "Javanese"),
    ("jpn", "Japanese"),
    ("kan", "Kannada"),
    ("kat", "Georgian"),
    ("kaz", "Kazakh"),
    ("khk", "Halh Mongolian"),
    ("khm", "Khmer"),
    ("kir", "Kyrgyz"),
    ("kor", "Korean"),
    ("lao", "Lao"),
    ("lit", "Lithuanian"),
    ("lug", "Ganda"),
    ("luo", "Luo"),
    ("lvs", "Standard Latvian"),
    ("mai", "Maithili"),
    ("mal", "Malayalam"),
    ("mar", "Marathi"),
    ("mkd", "Macedonian"),
    ("mlt", "Maltese"),
    ("mni", "Manipuri"),
    ("mya", "Burmese"),
    ("nld", "Dutch"),
    ("nno", "Norwegian Nynorsk"),
    ("nob", "Norwegian Bokmål"),
    ("npi", "Nepali"),
    ("nya", "Nyanja"),
    ("ory", "Odia"),
    ("pan", "Punjabi"),
    ("pbt", "Southern Pashto"),
    ("pes", "Western Persian"),
    ("pol", "Polish"),
    ("por", "Portuguese"),
    ("ron", "Romanian"),
    ("rus", "Russian"),
    ("sat", "Santali"),
    ("slk", "Slovak"),
    ("slv", "Slovenian"),
    ("sna", "Shona"),
    ("snd", "Sindhi"),
    ("som", "Somali"),
    ("spa", "Spanish"),
    ("srp", "Serbian"),
    ("swe", "Swedish"),
    ("swh", "Swahili"),
    ("tam", "Tamil"),
    ("tel", "Telugu"),
    ("tgk", "Tajik"),
    ("tgl", "Tagalog"),
    ("tha", "Thai"),
    ("tur", "Turkish"),
    ("ukr", "Ukrainian"),
    ("urd", "Urdu"),
    ("uzn", "Northern Uzbek"),
    ("vie", "Vietnamese"),
    ("yor", "Yoruba"),
    ("yue", "Cantonese"),
    ("zlm", "Colloquial Malay"),
    ("zul", "Zulu"),
];

static CODE_TO_NAME: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| LANGUAGES.iter().copied().collect());

static NAME_TO_CODE: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| LANGUAGES.iter().map(|&(code, name)| (name, code)).collect());

/// Look up the display name for a language code.
pub fn code_to_name(code: &str) -> Option<&'static str> {
    CODE_TO_NAME.get(code).copied()
}

/// Look up the model code for a display name.
pub fn name_to_code(name: &str) -> Option<&'static str> {
    NAME_TO_CODE.get(name).copied()
}

/// All catalog entries in table order.
pub fn entries() -> impl Iterator<Item = LanguageEntry> {
    LANGUAGES
        .iter()
        .map(|&(code, name)| LanguageEntry { code, name })
}

/// Code to display name map, ordered by code.
pub fn supported_languages() -> BTreeMap<&'static str, &'static str> {
    LANGUAGES.iter().copied().collect()
}

/// Number of supported languages.
pub fn len() -> usize {
    LANGUAGES.len()
}
