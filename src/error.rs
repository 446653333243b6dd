//! Recolección y presentación de diagnósticos.
//!
//! Cada fase reporta sus propios tipos de error. Este módulo los
//! uniformiza en una lista ordenada de [`Diagnostic`], la cual es
//! la única salida de error que observa quien invoca al compilador.
//! La presencia de al menos un diagnóstico de severidad
//! [`Severity::Error`] determina el fracaso de la compilación.

use crate::source::{Located, Origin, Span};
use serde::Serialize;
use std::{
    error::Error,
    fmt::{self, Display},
};

/// Severidad de un diagnóstico.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => fmt.write_str("error"),
            Severity::Warning => fmt.write_str("warning"),
        }
    }
}

/// Un error de cualquier fase que puede clasificarse.
///
/// `kind()` corresponde al nombre estable de la variante, el cual
/// se expone en los diagnósticos serializados.
pub trait Classify: Error {
    fn kind(&self) -> &'static str;
}

/// Un hallazgo individual.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: &'static str,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    /// Construye un error a partir de cualquier error clasificable.
    pub fn error<E: Classify>(error: &E, span: Option<Span>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            kind: error.kind(),
            message: error.to_string(),
            span,
        }
    }

    /// Construye una advertencia.
    pub fn warning<E: Classify>(warning: &E, span: Option<Span>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind: warning.kind(),
            message: warning.to_string(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Lista ordenada de diagnósticos de una compilación.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    origin: Option<Origin>,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Asocia un origen, lo cual habilita fragmentos de código fuente
    /// al presentar los diagnósticos.
    pub fn with_origin(self, origin: Origin) -> Self {
        Diagnostics {
            origin: Some(origin),
            ..self
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Agrega errores ubicados de las fases delanteras.
    pub fn extend_located<E: Classify>(&mut self, errors: Vec<Located<E>>) {
        for error in errors {
            if self.origin.is_none() {
                self.origin = Some(error.location().origin());
            }

            let span = error.location().to_span();
            self.entries.push(Diagnostic::error(error.val(), Some(span)));
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries.len() - self.error_count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializa la lista completa como JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.entries.extend(iter)
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { origin, entries } = self;

        if entries.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for diagnostic in entries {
            writeln!(
                fmt,
                "{}[{}]: {}",
                diagnostic.severity, diagnostic.kind, diagnostic.message
            )?;

            let (origin, span) = match (origin, diagnostic.span) {
                (Some(origin), Some(span)) => (origin, span),
                (None, Some(span)) => {
                    writeln!(fmt, " --> {}", span)?;
                    writeln!(fmt)?;
                    continue;
                }

                _ => {
                    writeln!(fmt)?;
                    continue;
                }
            };

            writeln!(fmt, " --> {}:{}", origin.name(), span)?;

            let digits = span.end.line().to_string().chars().count();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            for line_number in span.start.line()..=span.end.line() {
                origin.with_line(line_number, |line| {
                    writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
                })?
            }

            // Un rango multilínea solo se subraya desde su inicio
            let from = span.start.column();
            let to = if span.end.line() == span.start.line() {
                span.end.column().saturating_sub(1).max(from)
            } else {
                from
            };

            let skip = (from - 1) as usize;
            let highlight = (to - from + 1) as usize;

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        let errors = self.error_count();
        let warnings = self.warning_count();
        let plural = |count: usize, word: &'static str| {
            if count == 1 {
                format!("{} {}", count, word)
            } else {
                format!("{} {}s", count, word)
            }
        };

        if errors > 0 {
            writeln!(
                fmt,
                "Build failed with {} and {}",
                plural(errors, "error"),
                plural(warnings, "warning")
            )
        } else {
            writeln!(fmt, "Build succeeded with {}", plural(warnings, "warning"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Position;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("something odd")]
    struct Odd;

    impl Classify for Odd {
        fn kind(&self) -> &'static str {
            "Odd"
        }
    }

    #[test]
    fn counts_by_severity() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Diagnostic::warning(&Odd, None));
        assert!(!diagnostics.has_errors());

        diagnostics.push(Diagnostic::error(&Odd, None));
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn json_keeps_order_and_kind() {
        let mut diagnostics = Diagnostics::default();
        let span = Span {
            start: Position::new(2, 1),
            end: Position::new(2, 4),
        };

        diagnostics.push(Diagnostic::error(&Odd, Some(span)));
        diagnostics.push(Diagnostic::warning(&Odd, None));

        let json = diagnostics.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["severity"], "error");
        assert_eq!(value[0]["kind"], "Odd");
        assert_eq!(value[0]["span"]["start"]["line"], 2);
        assert_eq!(value[1]["severity"], "warning");
    }

    #[test]
    fn renders_source_excerpt() {
        let (start, stream) = crate::source::consume("STATE_LIST:\nIDLE ?".as_bytes(), "lock.fsm");
        let _: Vec<_> = stream.collect();

        let span = Span {
            start: Position::new(2, 6),
            end: Position::new(2, 7),
        };

        let mut diagnostics = Diagnostics::default().with_origin(start.origin());
        diagnostics.push(Diagnostic::error(&Odd, Some(span)));

        let rendered = diagnostics.to_string();
        assert!(rendered.contains("error[Odd]: something odd"));
        assert!(rendered.contains(" --> lock.fsm:2:6"));
        assert!(rendered.contains("2 | IDLE ?"));
        assert!(rendered.contains("Build failed with 1 error and 0 warnings"));
    }
}
