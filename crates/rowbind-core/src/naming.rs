//! Identifier case transcoding and field naming policies.
//!
//! A [`NamingPolicy`] decides which source column a record field claims.
//! Policies are pure: the same [`FieldDef`] always yields the same answer,
//! which is what makes the per-type column map cacheable.

use crate::record::FieldDef;

/// Split an identifier into words.
///
/// Runs of non-alphanumeric characters form a single boundary, and a new word
/// starts when an uppercase letter follows a lowercase letter or digit. A run
/// of uppercase letters stays inside one word, so `HEllo` is one word.
fn split_words(s: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    let mut prev_lower_or_digit = false;

    for (idx, ch) in s.char_indices() {
        if !ch.is_alphanumeric() {
            if let Some(begin) = start.take() {
                words.push(&s[begin..idx]);
            }
            prev_lower_or_digit = false;
            continue;
        }
        match start {
            None => start = Some(idx),
            Some(begin) if ch.is_uppercase() && prev_lower_or_digit => {
                words.push(&s[begin..idx]);
                start = Some(idx);
            }
            Some(_) => {}
        }
        prev_lower_or_digit = ch.is_lowercase() || ch.is_numeric();
    }
    if let Some(begin) = start {
        words.push(&s[begin..]);
    }
    words
}

/// Convert an identifier in any mixed style to `snake_case`.
pub fn to_snake(s: &str) -> String {
    let words = split_words(s);
    let mut out = String::with_capacity(s.len() + words.len());
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push('_');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Convert an identifier in any mixed style to `HumpCase` (Pascal case).
pub fn to_hump(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in split_words(s) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Naming policies
// ---------------------------------------------------------------------------

/// Decides which column a record field claims.
///
/// Returning `None` or an empty string means the field is skipped.
pub trait NamingPolicy: Send + Sync {
    fn column_name(&self, field: &FieldDef) -> Option<String>;
}

impl<F> NamingPolicy for F
where
    F: Fn(&FieldDef) -> Option<String> + Send + Sync,
{
    fn column_name(&self, field: &FieldDef) -> Option<String> {
        self(field)
    }
}

/// How [`TagNaming`] names a field that carries no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Lowercase the field name as declared.
    #[default]
    Lowercase,
    /// Convert the field name with [`to_snake`].
    Snake,
}

/// Tag-driven naming.
///
/// The tag value is read up to the first `,`. A value of `-` skips the field.
/// An absent or empty value falls back to the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNaming {
    key: &'static str,
    fallback: Fallback,
}

impl TagNaming {
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            fallback: Fallback::Lowercase,
        }
    }

    #[must_use]
    pub const fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl Default for TagNaming {
    fn default() -> Self {
        Self::new(DEFAULT_TAG_KEY)
    }
}

/// Tag key read by [`TagNaming::default`].
pub const DEFAULT_TAG_KEY: &str = "sql";

impl NamingPolicy for TagNaming {
    fn column_name(&self, field: &FieldDef) -> Option<String> {
        let value = field
            .tag(self.key)
            .map(|tag| tag.split(',').next().unwrap_or_default())
            .unwrap_or_default();
        match value {
            "-" => None,
            "" => Some(match self.fallback {
                Fallback::Lowercase => field.name.to_lowercase(),
                Fallback::Snake => to_snake(field.name),
            }),
            name => Some(name.to_owned()),
        }
    }
}

/// Plain case conversion: every field claims the snake form of its name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnakeCaseNaming;

impl NamingPolicy for SnakeCaseNaming {
    fn column_name(&self, field: &FieldDef) -> Option<String> {
        Some(to_snake(field.name))
    }
}
