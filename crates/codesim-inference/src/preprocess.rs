//! Source normalization applied to both snippets before tokenization.
//!
//! Python sources from the same solution often differ only in comments,
//! blank lines and indentation style. Normalizing these keeps the token
//! budget for code that matters.

/// Indent unit folded into a tab.
const INDENT: &str = "    ";

/// Line-level code normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    enabled: bool,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Preprocessor {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Drop comment-only and blank lines, strip trailing whitespace, and
    /// turn each leading four-space indent into a tab. Returns the input
    /// unchanged when disabled.
    pub fn apply(&self, code: &str) -> String {
        if !self.enabled {
            return code.to_string();
        }

        code.lines()
            .map(str::trim_end)
            .filter(|line| {
                let content = line.trim_start();
                !content.is_empty() && !content.starts_with('#')
            })
            .map(fold_indent)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn fold_indent(line: &str) -> String {
    let mut rest = line;
    let mut tabs = 0;
    loop {
        if let Some(stripped) = rest.strip_prefix(INDENT) {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('\t') {
            rest = stripped;
        } else {
            break;
        }
        tabs += 1;
    }
    format!("{}{}", "\t".repeat(tabs), rest)
}
