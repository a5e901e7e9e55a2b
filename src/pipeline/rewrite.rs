//! Document rewriting: swap each fragment for its image template.
//!
//! Substitution is by exact text over the whole document, not by match
//! position, so every occurrence of a repeated formula receives the same
//! image. Fragments are substituted longest first; a fragment nested inside
//! another one is consumed together with its parent instead of leaving the
//! parent unmatched.

use crate::pipeline::identify::RasterTarget;
use crate::pipeline::matcher::{Fragment, FragmentKind};
use crate::templates::{
    EQUATION_STAR_TEMPLATE, EQUATION_TEMPLATE, FILEPATH_PLACEHOLDER, INLINE_TEMPLATE,
    LABEL_PLACEHOLDER,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static RE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\label\{(.+?)\}").unwrap());

/// Name of the first `\label{…}` inside a fragment.
pub fn extract_label(fragment: &str) -> Option<&str> {
    RE_LABEL
        .captures(fragment)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Path with `/` separators, as embedded in `\includegraphics`.
///
/// TeX treats `\` as an escape character, so Windows separators would break
/// the generated source. Target paths are already absolute (see
/// [`crate::pipeline::identify::resolve_download_dir`]).
pub fn normalise_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Instantiate the template of `fragment`'s kind for `image_path`.
pub fn render_template(fragment: &Fragment, image_path: &Path) -> String {
    let template = match fragment.kind() {
        FragmentKind::Equation => EQUATION_TEMPLATE,
        FragmentKind::EquationStar => EQUATION_STAR_TEMPLATE,
        FragmentKind::Inline => INLINE_TEMPLATE,
    };

    let label = if fragment.kind().is_block() {
        extract_label(fragment.text())
            .map(|name| format!(" \\label{{{name}}}"))
            .unwrap_or_default()
    } else {
        String::new()
    };

    template
        .replace(LABEL_PLACEHOLDER, &label)
        .replace(FILEPATH_PLACEHOLDER, &normalise_path(image_path))
}

/// Replace every occurrence of every target fragment in `text`.
pub fn rewrite_document(text: &str, targets: &[RasterTarget]) -> String {
    let mut ordered: Vec<&RasterTarget> = targets.iter().collect();
    ordered.sort_by(|a, b| {
        let (a, b) = (a.fragment.text(), b.fragment.text());
        b.len().cmp(&a.len()).then_with(|| a.cmp(b))
    });

    let mut rewritten = text.to_string();
    for target in ordered {
        let replacement = render_template(&target.fragment, &target.path);
        rewritten = rewritten.replace(target.fragment.text(), &replacement);
    }
    rewritten
}
