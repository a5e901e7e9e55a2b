//! Formula matching: find the fragments of a document worth rasterising.
//!
//! Three kinds of fragment are recognised:
//!
//! | Kind           | Delimiters                                   | Selected when            |
//! |----------------|----------------------------------------------|--------------------------|
//! | `Equation`     | `\begin{equation}` … `\end{equation}`        | always                   |
//! | `EquationStar` | `\begin{equation*}` … `\end{equation*}`      | always                   |
//! | `Inline`       | `$` … `$` (single line)                      | contains a trigger keyword |
//!
//! Block environments span lines and are matched non-greedily, so two
//! consecutive equations never merge into one fragment. Matching is purely
//! lexical: nothing here understands TeX grouping or escaping.

use crate::error::RasterError;
use crate::templates::RASTERISED_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

static RE_EQUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{equation\}.*?\\end\{equation\}").unwrap());

static RE_EQUATION_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{equation\*\}.*?\\end\{equation\*\}").unwrap());

static RE_INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$.*?\$").unwrap());

/// Kind of a formula fragment; selects the rewrite template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentKind {
    /// Numbered `equation` environment.
    Equation,
    /// Unnumbered `equation*` environment.
    EquationStar,
    /// Inline `$…$` math.
    Inline,
}

/// Opening and closing delimiters per kind, in classification order.
const DELIMITERS: [(FragmentKind, &str, &str); 3] = [
    (FragmentKind::Equation, "\\begin{equation}", "\\end{equation}"),
    (FragmentKind::EquationStar, "\\begin{equation*}", "\\end{equation*}"),
    (FragmentKind::Inline, "$", "$"),
];

impl FragmentKind {
    /// Determine the kind of a matched fragment from its delimiters.
    ///
    /// Returns `None` when the text is not wrapped in any known pair.
    pub fn classify(text: &str) -> Option<Self> {
        DELIMITERS
            .iter()
            .find(|(_, open, close)| {
                text.len() >= open.len() + close.len()
                    && text.starts_with(open)
                    && text.ends_with(close)
            })
            .map(|(kind, _, _)| *kind)
    }

    /// The `(open, close)` delimiter pair of this kind.
    pub fn delimiters(self) -> (&'static str, &'static str) {
        DELIMITERS
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|(_, open, close)| (*open, *close))
            .unwrap_or(("", ""))
    }

    /// Block kinds are rewritten inside an equation environment and keep labels.
    pub fn is_block(self) -> bool {
        !matches!(self, FragmentKind::Inline)
    }
}

/// A formula fragment: the exact matched text plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment {
    text: String,
    kind: FragmentKind,
}

impl Fragment {
    /// Classify a matched text, failing hard on anything unrecognised.
    ///
    /// `document` only serves the error message.
    pub fn classify(text: impl Into<String>, document: &Path) -> Result<Self, RasterError> {
        let text = text.into();
        match FragmentKind::classify(&text) {
            Some(kind) => Ok(Self { text, kind }),
            None => Err(RasterError::UnclassifiedFragment {
                document: document.to_path_buf(),
                fragment: text,
            }),
        }
    }

    /// The exact text as it occurs in the document.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    /// The math content with the outer delimiters removed.
    pub fn body(&self) -> &str {
        let (open, close) = self.kind.delimiters();
        &self.text[open.len()..self.text.len() - close.len()]
    }
}

/// Extract the distinct fragment texts of `text` that should be rasterised.
///
/// Block environments are always selected, inline formulas only when they
/// contain one of `keywords`. Blocks produced by a previous run are skipped,
/// which keeps repeated runs from rewriting their own output.
pub fn find_fragments(text: &str, keywords: &[String]) -> BTreeSet<String> {
    let blocks = RE_EQUATION
        .find_iter(text)
        .chain(RE_EQUATION_STAR.find_iter(text))
        .map(|m| m.as_str())
        .filter(|block| !block.contains(RASTERISED_MARKER));

    let inline = RE_INLINE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|formula| keywords.iter().any(|k| formula.contains(k.as_str())));

    blocks.chain(inline).map(str::to_string).collect()
}

/// Classify every fragment text of one document.
///
/// Stops at the first unclassifiable text; the document must not be
/// rewritten when that happens.
pub fn classify_all<I>(texts: I, document: &Path) -> Result<Vec<Fragment>, RasterError>
where
    I: IntoIterator<Item = String>,
{
    texts
        .into_iter()
        .map(|t| Fragment::classify(t, document))
        .collect()
}
