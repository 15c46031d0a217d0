//! Free-text location parsing, e.g. `"João Pessoa, Paraíba, Brasil"`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// State names, without accents and lowercase, with their UF.
pub const STATE_TO_UF: &[(&str, &str)] = &[
    ("acre", "AC"),
    ("alagoas", "AL"),
    ("amapa", "AP"),
    ("amazonas", "AM"),
    ("bahia", "BA"),
    ("ceara", "CE"),
    ("distrito federal", "DF"),
    ("espirito santo", "ES"),
    ("goias", "GO"),
    ("maranhao", "MA"),
    ("mato grosso", "MT"),
    ("mato grosso do sul", "MS"),
    ("minas gerais", "MG"),
    ("para", "PA"),
    ("paraiba", "PB"),
    ("parana", "PR"),
    ("pernambuco", "PE"),
    ("piaui", "PI"),
    ("rio de janeiro", "RJ"),
    ("rio grande do norte", "RN"),
    ("rio grande do sul", "RS"),
    ("rondonia", "RO"),
    ("roraima", "RR"),
    ("santa catarina", "SC"),
    ("sao paulo", "SP"),
    ("sergipe", "SE"),
    ("tocantins", "TO"),
];

/// UF and city found in a location string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLocation {
    /// Two-letter state code.
    pub uf: Option<String>,
    /// City name in Title Case, suitable for an `ILIKE` match.
    pub city: Option<String>,
}

impl ParsedLocation {
    /// Whether nothing was recognized.
    pub fn is_empty(&self) -> bool {
        self.uf.is_none() && self.city.is_none()
    }
}

/// Whether `code` is one of the 27 UFs. Case insensitive.
pub fn is_valid_uf(code: &str) -> bool {
    STATE_TO_UF
        .iter()
        .any(|(_, uf)| uf.eq_ignore_ascii_case(code))
}

/// UF for a state name written without accents, in lowercase.
pub fn uf_for_state(name: &str) -> Option<&'static str> {
    STATE_TO_UF
        .iter()
        .find(|(state, _)| *state == name)
        .map(|(_, uf)| *uf)
}

/// Strip accents, lowercase and drop the `"state of "` prefix geocoders add.
fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .replace("state of ", "")
        .trim()
        .to_string()
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the UF and city in a comma separated location.
///
/// Parts are read from last to first. Every UF code or state name seen
/// replaces the UF, so the leftmost one wins; the first other part longer
/// than two characters is the city.
/// `Brasil` and `Brazil` are ignored.
pub fn parse_location(text: &str) -> ParsedLocation {
    let normalized = normalize(text);
    let mut parsed = ParsedLocation::default();

    let parts = normalized
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "brasil" && *part != "brazil");

    for part in parts.rev() {
        if part.len() == 2 && is_valid_uf(part) {
            parsed.uf = Some(part.to_uppercase());
            continue;
        }

        if let Some(uf) = uf_for_state(part) {
            parsed.uf = Some(uf.to_string());
            continue;
        }

        if parsed.city.is_none() && part.chars().count() > 2 {
            parsed.city = Some(title_case(part));
        }
    }

    parsed
}
