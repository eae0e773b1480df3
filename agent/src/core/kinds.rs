//! Block-kind vocabulary used by rule derivation.
//!
//! Kinds are lowercase strings. Textual tokens carry a `text_` prefix; the
//! remainder names either a noun (an object kind) or a property.

/// Prefix carried by every textual token.
pub const TEXT_PREFIX: &str = "text_";

/// The copy-rule token that joins a noun to a property.
pub const COPY_TOKEN: &str = "text_is";

/// Property every textual token has implicitly.
pub const TEXT_PROPERTY: &str = "push";

/// Object kinds a noun token can refer to.
pub const NOUNS: &[&str] = &[
    "algae", "baba", "belt", "bog", "box", "brick", "cog", "crab", "door", "fence", "flag",
    "grass", "hedge", "ice", "jelly", "keke", "key", "lava", "love", "pillar", "rock", "skull",
    "star", "text", "tile", "tree", "wall", "water",
];

/// Properties a property token can grant.
pub const PROPERTIES: &[&str] = &[
    "blue", "defeat", "float", "hot", "melt", "move", "open", "pull", "push", "red", "shut",
    "sink", "stop", "tele", "weak", "win", "you",
];

pub fn is_text(kind: &str) -> bool {
    kind.starts_with(TEXT_PREFIX)
}

/// Returns `true` when `kind` is a textual token naming a noun (`text_baba`).
pub fn is_noun_token(kind: &str) -> bool {
    kind.strip_prefix(TEXT_PREFIX)
        .is_some_and(|word| NOUNS.contains(&word))
}

/// Returns `true` when `kind` is a textual token naming a property (`text_you`).
pub fn is_property_token(kind: &str) -> bool {
    kind.strip_prefix(TEXT_PREFIX)
        .is_some_and(|word| PROPERTIES.contains(&word))
}

/// Object kind that a noun token refers to: `text_baba` -> `baba`.
///
/// Kinds without the textual prefix are returned unchanged.
pub fn noun_references_to(kind: &str) -> &str {
    kind.strip_prefix(TEXT_PREFIX).unwrap_or(kind)
}

/// Returns `true` when `word` is a noun of the vocabulary (untagged form).
pub fn is_noun(word: &str) -> bool {
    NOUNS.contains(&word)
}

/// Display form used when rendering rules: any textual kind prints as `text`.
pub fn display_kind(kind: &str) -> &str {
    if is_text(kind) { "text" } else { kind }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_tokens() {
        assert!(is_noun_token("text_baba"));
        assert!(!is_noun_token("baba"));
        assert!(is_property_token("text_you"));
        assert!(!is_property_token("text_baba"));
        assert!(!is_noun_token(COPY_TOKEN));
        assert!(!is_property_token(COPY_TOKEN));
    }

    #[test]
    fn noun_reference_strips_prefix() {
        assert_eq!(noun_references_to("text_flag"), "flag");
        assert_eq!(noun_references_to("flag"), "flag");
        assert_eq!(noun_references_to("text_text"), "text");
    }

    #[test]
    fn vocabularies_are_sorted() {
        let mut nouns = NOUNS.to_vec();
        nouns.sort_unstable();
        assert_eq!(nouns, NOUNS);
        let mut props = PROPERTIES.to_vec();
        props.sort_unstable();
        assert_eq!(props, PROPERTIES);
    }
}
