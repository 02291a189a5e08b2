//! Source-location-aware diagnostics (spec component B, §7): renders a
//! failure as `path (line:col): Failure: <message>` followed by the
//! offending source line and a caret under the column, the shape every
//! front-end error (and, via `wisp-vm`, every runtime error) is printed in.

use wisp_core::Loc;

/// One module's source text, kept around so diagnostics can render a
/// snippet. The front-end pipeline holds one of these per module it has
/// read; `wisp-vm`'s module registry owns the long-lived copies.
#[derive(Debug, Clone)]
pub struct SourceMap {
    pub path: String,
    pub text: String,
}

impl SourceMap {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self { path: path.into(), text: text.into() }
    }

    /// 1-based (line, col) for a byte offset into `text`.
    fn line_col(&self, offset: u32) -> (u32, u32, &str) {
        let offset = offset as usize;
        let mut line = 1u32;
        let mut line_start = 0usize;
        for (i, b) in self.text.bytes().enumerate() {
            if i >= offset {
                break;
            }
            if b == b'\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        let line_end = self.text[line_start..].find('\n').map(|n| line_start + n).unwrap_or(self.text.len());
        let col = (offset.saturating_sub(line_start) + 1) as u32;
        (line, col, &self.text[line_start..line_end])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Failure,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Failure => write!(f, "Failure"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// Renders a single diagnostic the way spec §7 describes:
/// ```text
/// path (line:col): Failure: message
/// <source line>
///       ^
/// ```
/// Falls back to a location-less one-liner for synthetic `Loc`s (no source
/// text to point into — simplifier/codegen-injected nodes).
pub fn render(source: &SourceMap, loc: Loc, severity: Severity, message: &str) -> String {
    if loc.is_synthetic() {
        return format!("{} (?:?): {severity}: {message}", source.path);
    }
    let (line, col, src_line) = source.line_col(loc.offset_begin);
    let caret_pad = " ".repeat(col.saturating_sub(1) as usize);
    format!("{} ({line}:{col}): {severity}: {message}\n{src_line}\n{caret_pad}^", source.path)
}

/// A stack of `Loc`s accumulated while unwinding, rendered leaf-most first
/// (spec §7: "errors... print a trace (list of Loc frames)... with the
/// leaf-most message").
#[derive(Debug, Clone, Default)]
pub struct Trace(pub Vec<Loc>);

impl Trace {
    pub fn push(&mut self, loc: Loc) {
        self.0.push(loc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_line_and_caret() {
        let sm = SourceMap::new("t.wisp", "let x = 1;\nprint(y);\n");
        let loc = Loc::new(0, 17, 18); // the 'y' on line 2
        let out = render(&sm, loc, Severity::Failure, "unknown variable y");
        assert!(out.contains("t.wisp (2:7): Failure: unknown variable y"));
        assert!(out.contains("print(y);"));
        assert!(out.ends_with('^'));
    }

    #[test]
    fn synthetic_loc_has_no_snippet() {
        let sm = SourceMap::new("t.wisp", "x");
        let out = render(&sm, Loc::synthetic(), Severity::Warning, "m");
        assert!(out.contains("Warning: m"));
        assert!(!out.contains('\n'));
    }
}
