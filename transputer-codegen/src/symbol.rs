//! Cased symbol names and symbol-table entries.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// Case handling for symbol names.
///
/// MASM folds names to upper case; that is the default here. The policy is
/// applied once, when a name is constructed — comparisons always work on the
/// stored form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Casing {
    /// Fold to upper case at construction (MASM-compatible).
    #[default]
    Insensitive,
    /// Keep names exactly as written.
    Sensitive,
}

/// Constructs [`SymbolName`]s under a fixed casing policy.
///
/// One normalizer belongs to each assembler instance, so assemblers with
/// different policies can coexist in a process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolNameNormalizer {
    casing: Casing,
}

impl SymbolNameNormalizer {
    /// A normalizer applying the given policy.
    pub const fn new(casing: Casing) -> Self {
        Self { casing }
    }

    /// The policy this normalizer applies.
    pub const fn casing(&self) -> Casing {
        self.casing
    }

    /// Wrap a raw identifier into a cased name.
    pub fn name(&self, raw: &str) -> SymbolName {
        SymbolName::new(raw, self.casing)
    }
}

/// A symbol name, normalized at construction.
///
/// Equality, ordering and hashing use the normalized key; the spelling as
/// written in the source is retained for diagnostics only and never changes.
#[derive(Debug, Clone)]
pub struct SymbolName {
    key: String,
    spelling: String,
}

impl SymbolName {
    /// Construct from a raw identifier, applying the casing policy once.
    pub fn new(raw: &str, casing: Casing) -> Self {
        let key = match casing {
            Casing::Insensitive => raw.to_uppercase(),
            Casing::Sensitive => raw.to_owned(),
        };
        Self {
            key,
            spelling: raw.to_owned(),
        }
    }

    /// The normalized form used as the symbol-table key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The identifier as written in the source.
    pub fn spelling(&self) -> &str {
        &self.spelling
    }
}

impl PartialEq for SymbolName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SymbolName {}

impl PartialOrd for SymbolName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SymbolName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Hash for SymbolName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spelling)
    }
}

/// What a symbol-table entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// Reassignable; no change tracking.
    Variable,
    /// Fixed outside convergence mode; change-tracked during it.
    Constant,
    /// An address, assigned from `$`; rewritable only during convergence.
    Label,
}

impl SymbolKind {
    /// Sentence-initial form for diagnostics.
    pub const fn capitalized(self) -> &'static str {
        match self {
            SymbolKind::Variable => "Variable",
            SymbolKind::Constant => "Constant",
            SymbolKind::Label => "Label",
        }
    }

    /// Mid-sentence form for diagnostics.
    pub const fn lowercase(self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Label => "label",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lowercase())
    }
}

/// A symbol-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// The symbol's current value.
    pub value: i32,
    /// The kind it was defined as.
    pub kind: SymbolKind,
    /// The source line of the (most recent) definition.
    pub line: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insensitive_names_fold_but_keep_spelling() {
        let normalizer = SymbolNameNormalizer::new(Casing::Insensitive);
        let lower = normalizer.name("fnord");
        let upper = normalizer.name("FNORD");
        assert_eq!(lower, upper);
        assert_eq!(lower.key(), "FNORD");
        assert_eq!(lower.spelling(), "fnord");
        assert_eq!(lower.to_string(), "fnord");
    }

    #[test]
    fn sensitive_names_stay_distinct() {
        let normalizer = SymbolNameNormalizer::new(Casing::Sensitive);
        assert_ne!(normalizer.name("fnord"), normalizer.name("FNORD"));
    }

    #[test]
    fn policy_applies_at_construction_only() {
        let insensitive = SymbolNameNormalizer::new(Casing::Insensitive).name("mixed");
        let sensitive = SymbolNameNormalizer::new(Casing::Sensitive).name("MIXED");
        assert_eq!(insensitive.key(), sensitive.key());
    }
}
