// ==============================================================================
// Structured Diagnostics
// ==============================================================================
//
// The solver never formats or suppresses diagnostics; it appends structured
// values to whichever sink is active (the innermost speculation frame, or the
// top-level sink). Types are rendered eagerly so a diagnostic stays
// meaningful after the variable graph is discarded.

use std::fmt;

use smol_str::SmolStr;

use crate::blame::Blame;
use crate::constraints::ConstraintKind;

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Rendering of the lower side.
    pub lower: SmolStr,
    /// Rendering of the upper side.
    pub upper: SmolStr,
    pub constraint: ConstraintKind,
    pub blame: Blame,
}

#[derive(Debug, Clone)]
pub enum DiagnosticKind {
    Incompatibility,
    MissingProperty {
        name: SmolStr,
        suggestion: Option<SmolStr>,
    },
    NotCallable,
    NotConstructable,
    ArityMismatch {
        expected: usize,
        found: usize,
    },
    RecursionLimitExceeded {
        limit: u32,
    },
    /// A structural pair the solver deliberately leaves undispatched.
    UnsupportedConstruct {
        what: SmolStr,
    },
    /// Every candidate of an ambiguous derivation failed. Each entry holds
    /// the diagnostics of one candidate, in declaration order.
    SpeculationExhausted {
        branches: Vec<Vec<Diagnostic>>,
    },
    Cancelled,
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::Incompatibility => "Incompatibility",
            DiagnosticKind::MissingProperty { .. } => "MissingProperty",
            DiagnosticKind::NotCallable => "NotCallable",
            DiagnosticKind::NotConstructable => "NotConstructable",
            DiagnosticKind::ArityMismatch { .. } => "ArityMismatch",
            DiagnosticKind::RecursionLimitExceeded { .. } => "RecursionLimitExceeded",
            DiagnosticKind::UnsupportedConstruct { .. } => "UnsupportedConstruct",
            DiagnosticKind::SpeculationExhausted { .. } => "SpeculationExhausted",
            DiagnosticKind::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostic {
            kind, lower, upper, ..
        } = self;
        match kind {
            DiagnosticKind::Incompatibility => {
                write!(f, "`{lower}` is incompatible with `{upper}`")
            }
            DiagnosticKind::MissingProperty { name, suggestion } => {
                write!(f, "property `{name}` is missing in `{lower}`")?;
                if let Some(suggestion) = suggestion {
                    write!(f, ", did you mean `{suggestion}`?")?;
                }
                Ok(())
            }
            DiagnosticKind::NotCallable => write!(f, "`{lower}` is not callable"),
            DiagnosticKind::NotConstructable => write!(f, "`{lower}` cannot be constructed"),
            DiagnosticKind::ArityMismatch { expected, found } => write!(
                f,
                "`{lower}` expects {expected} argument(s) but `{upper}` supplies {found}"
            ),
            DiagnosticKind::RecursionLimitExceeded { limit } => write!(
                f,
                "recursion limit of {limit} exceeded while checking `{lower}` against `{upper}`"
            ),
            DiagnosticKind::UnsupportedConstruct { what } => {
                write!(f, "unsupported {what}: `{lower}` against `{upper}`")
            }
            DiagnosticKind::SpeculationExhausted { branches } => write!(
                f,
                "no candidate of `{lower}` matches `{upper}` ({} tried)",
                branches.len()
            ),
            DiagnosticKind::Cancelled => f.write_str("checking was cancelled"),
        }
    }
}

/// Append-only collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Sink {
    diagnostics: Vec<Diagnostic>,
}

impl Sink {
    pub fn append(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

// ==============================================================================
// Edit Distance (Levenshtein)
// ==============================================================================

/// Standard Levenshtein edit distance between two strings.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    let mut curr_row = vec![0; b.len() + 1];

    for (i, a_char) in a.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j] + cost)
                .min(prev_row[j + 1] + 1)
                .min(curr_row[j] + 1);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b.len()]
}

/// Find the closest property name to `needle`, if one is close enough to be
/// a plausible typo. The threshold is half the needle's length rounded up,
/// clamped to 1..=3; exact matches are never suggested.
pub fn suggest_similar<'a>(
    needle: &str,
    candidates: impl IntoIterator<Item = &'a SmolStr>,
) -> Option<SmolStr> {
    let max_dist = needle.len().div_ceil(2).clamp(1, 3);

    let mut best: Option<(SmolStr, usize)> = None;

    for candidate in candidates {
        let dist = edit_distance(needle, candidate);
        if dist == 0 || dist > max_dist {
            continue;
        }
        if best.as_ref().is_none_or(|(_, best_dist)| dist < *best_dist) {
            best = Some((candidate.clone(), dist));
        }
    }

    best.map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::{BlameOp, SiteId};

    fn diag(kind: DiagnosticKind) -> Diagnostic {
        Diagnostic {
            kind,
            lower: "number".into(),
            upper: "string".into(),
            constraint: ConstraintKind::Subtype,
            blame: Blame::new(BlameOp::Assignment, SiteId(1)),
        }
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("foo", "foo"), 0);
        assert_eq!(edit_distance("foo", "fop"), 1);
        assert_eq!(edit_distance("bar", "bra"), 2);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
    }

    #[test]
    fn suggest_similar_finds_close_match() {
        let candidates: Vec<SmolStr> = vec!["foo".into(), "bar".into(), "baz".into()];
        assert_eq!(
            suggest_similar("bra", candidates.iter()),
            Some(SmolStr::from("bar"))
        );
        assert_eq!(suggest_similar("xyz", candidates.iter()), None);
        assert_eq!(suggest_similar("foo", candidates.iter()), None);
    }

    #[test]
    fn incompatibility_display() {
        assert_eq!(
            diag(DiagnosticKind::Incompatibility).to_string(),
            "`number` is incompatible with `string`"
        );
    }

    #[test]
    fn missing_property_display_with_suggestion() {
        let msg = diag(DiagnosticKind::MissingProperty {
            name: "lenght".into(),
            suggestion: Some("length".into()),
        })
        .to_string();
        assert!(msg.contains("property `lenght` is missing"));
        assert!(msg.contains("did you mean `length`?"));
    }

    #[test]
    fn sink_appends_in_order() {
        let mut sink = Sink::default();
        sink.append(diag(DiagnosticKind::NotCallable));
        sink.append(diag(DiagnosticKind::Cancelled));
        assert_eq!(sink.len(), 2);
        let names: Vec<_> = sink.take().iter().map(|d| d.kind.name()).collect();
        assert_eq!(names, vec!["NotCallable", "Cancelled"]);
        assert!(sink.is_empty());
    }
}
