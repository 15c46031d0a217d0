//! Kanban board logic that does not touch the network: lead mapping, lead
//! filters, column synchronization and funnel statistics.

pub mod columns;
pub mod filters;
pub mod mapper;
pub mod stats;

/// Columns every new funnel starts with, by position.
pub const DEFAULT_COLUMNS: [&str; 5] = [
    "Novo Lead",
    "Contato Inicial",
    "Proposta",
    "Negociação",
    "Fechado",
];

/// Stored in place of a missing client name.
pub const UNNAMED_CLIENT: &str = "Sem nome";

/// Priority counted in the high priority statistics.
pub const HIGH_PRIORITY: &str = "high";

/// Whether `text` is a hyphenated UUID, any version, any case.
pub fn is_uuid(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 36
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            8 | 13 | 18 | 23 => *byte == b'-',
            _ => byte.is_ascii_hexdigit(),
        })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d", true; "lowercase")]
    #[test_case("9B1DEB4D-3B7D-4BAD-9BDD-2B0D7B3DCB6D", true; "uppercase")]
    #[test_case("9b1deb4d3b7d4bad9bdd2b0d7b3dcb6d", false; "no hyphens")]
    #[test_case("9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6z", false; "not hex")]
    #[test_case("", false; "empty")]
    fn uuid_format(text: &str, expected: bool) {
        assert_eq!(is_uuid(text), expected);
    }
}
