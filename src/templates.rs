//! LaTeX emitted by the rewriter and the preamble fixup.
//!
//! Every snippet the pipeline writes into a document lives here, so the
//! matcher can recognise its own output (see [`RASTERISED_MARKER`]) and the
//! tests can assert against the same constants the rewriter uses.
//!
//! Placeholders: `#FILEPATH#` is the absolute, `/`-separated image path;
//! `#LABEL#` is either empty or ` \label{…}` (leading space included).

/// Placeholder replaced by the image path.
pub const FILEPATH_PLACEHOLDER: &str = "#FILEPATH#";

/// Placeholder replaced by the preserved label (block kinds only).
pub const LABEL_PLACEHOLDER: &str = "#LABEL#";

/// Replacement for a numbered `equation` environment.
pub const EQUATION_TEMPLATE: &str = "\\begin{equation}
    \\includegraphics[valign=c,scale=0.18]{#FILEPATH#}#LABEL#
\\end{equation}";

/// Replacement for an unnumbered `equation*` environment.
pub const EQUATION_STAR_TEMPLATE: &str = "\\begin{equation*}
    \\includegraphics[valign=c,scale=0.18]{#FILEPATH#}#LABEL#
\\end{equation*}";

/// Replacement for an inline `$…$` formula. Lowered by .15 baselines so the
/// image's centre sits on the text's math axis.
pub const INLINE_TEMPLATE: &str =
    "\\,\\raisebox{-.15\\baselineskip}{\\includegraphics[scale=0.18]{#FILEPATH#}}\\,";

/// Substring present in every block the rewriter produced.
///
/// A block environment whose body contains it was rasterised by an earlier
/// run and must not be matched again.
pub const RASTERISED_MARKER: &str = "\\includegraphics[valign=c,scale=0.18]{";

/// Package that provides the `valign` key used by the block templates.
pub const ALIGNMENT_PACKAGE: &str = "\\usepackage[export]{adjustbox}";

/// Marker before which the package declaration is injected.
pub const DOCUMENT_START: &str = "\\begin{document}";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_templates_carry_both_placeholders() {
        for t in [EQUATION_TEMPLATE, EQUATION_STAR_TEMPLATE] {
            assert!(t.contains(FILEPATH_PLACEHOLDER));
            assert!(t.contains(LABEL_PLACEHOLDER));
            assert!(t.contains(RASTERISED_MARKER));
        }
    }

    #[test]
    fn inline_template_has_no_label_or_environment() {
        assert!(INLINE_TEMPLATE.contains(FILEPATH_PLACEHOLDER));
        assert!(!INLINE_TEMPLATE.contains(LABEL_PLACEHOLDER));
        assert!(!INLINE_TEMPLATE.contains("\\begin{"));
        assert!(!INLINE_TEMPLATE.contains('$'));
    }
}
