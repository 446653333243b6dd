//! Anotaciones consultivas.
//!
//! Una anotación ([`Hint`]) es una sugerencia sobre una entidad de la
//! IR que nunca altera la tabla de transiciones. El generador de código
//! las consume únicamente como comentarios y como preferencia de
//! codificación cuando esta se deja en automático.
//!
//! El productor de anotaciones se abstrae tras [`Annotator`]. La
//! implementación incluida, [`CommentAnnotator`], es un escaneo
//! determinista de palabras clave en los comentarios de la fuente.

use crate::{
    codegen::Encoding,
    ir::{Machine, StateId},
};

use serde::Serialize;
use std::fmt::{self, Display};

/// Productor de anotaciones.
pub trait Annotator {
    fn annotate(&self, machine: &Machine) -> Vec<Hint>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Hint {
    pub subject: Subject,
    pub kind: HintKind,
}

/// Entidad a la que se refiere una anotación.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Machine,
    State(StateId),

    /// Índice en `Machine::globals`.
    Global(usize),

    /// Índice de transición local y de rama.
    Transition(usize, usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HintKind {
    Critical,
    FutureWork,
    LowPower,
    PreferEncoding(Encoding),
}

impl Display for HintKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HintKind::Critical => fmt.write_str("critical path"),
            HintKind::FutureWork => fmt.write_str("planned for a future revision"),
            HintKind::LowPower => fmt.write_str("low-power candidate"),
            HintKind::PreferEncoding(encoding) => write!(fmt, "prefers {} encoding", encoding),
        }
    }
}

/// Escaneo de palabras clave en comentarios.
#[derive(Copy, Clone, Debug, Default)]
pub struct CommentAnnotator;

impl Annotator for CommentAnnotator {
    fn annotate(&self, machine: &Machine) -> Vec<Hint> {
        let mut hints = Vec::new();

        for line in &machine.header.hints {
            if let Some(encoding) = preferred_encoding(line) {
                hints.push(Hint {
                    subject: Subject::Machine,
                    kind: HintKind::PreferEncoding(encoding),
                });
            }
        }

        let mut scan = |subject, comment: &Option<String>| {
            if let Some(comment) = comment {
                hints.extend(keywords(comment).map(|kind| Hint { subject, kind }));
            }
        };

        for (state, id) in machine.states.iter().zip(machine.state_ids()) {
            scan(Subject::State(id), &state.comment);
        }

        for (index, global) in machine.globals.iter().enumerate() {
            scan(Subject::Global(index), &global.comment);
        }

        for (index, transition) in machine.transitions.iter().enumerate() {
            for (arm, branch) in transition.branches.iter().enumerate() {
                scan(Subject::Transition(index, arm), &branch.comment);
            }
        }

        hints
    }
}

/// Lee `encoding=<nombre>` de una línea `HINT:` del encabezado.
fn preferred_encoding(line: &str) -> Option<Encoding> {
    let (key, value) = line.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("encoding") {
        return None;
    }

    match value.trim().parse() {
        Ok(Encoding::Auto) | Err(_) => None,
        Ok(encoding) => Some(encoding),
    }
}

fn keywords(comment: &str) -> impl Iterator<Item = HintKind> {
    let words: Vec<String> = comment
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .map(str::to_ascii_lowercase)
        .collect();

    let has = |candidates: &[&str]| words.iter().any(|word| candidates.contains(&word.as_str()));

    let found = [
        (has(&["critical"]), HintKind::Critical),
        (has(&["v2", "future"]), HintKind::FutureWork),
        (has(&["low-power"]), HintKind::LowPower),
    ];

    found
        .into_iter()
        .filter_map(|(present, kind)| present.then(|| kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Header, State};

    fn state(name: &str, comment: Option<&str>) -> State {
        State {
            name: name.to_owned(),
            declared: true,
            initial: false,
            outputs: Vec::new(),
            comment: comment.map(str::to_owned),
            span: Default::default(),
        }
    }

    #[test]
    fn comment_keywords() {
        let machine = Machine {
            states: vec![
                state("IDLE", None),
                state("ALARM", Some("Critical: siren must be loud")),
                state("SLEEP", Some("low-power mode, v2")),
            ],
            ..Default::default()
        };

        let hints = CommentAnnotator.annotate(&machine);
        assert_eq!(
            hints,
            vec![
                Hint {
                    subject: Subject::State(StateId(1)),
                    kind: HintKind::Critical,
                },
                Hint {
                    subject: Subject::State(StateId(2)),
                    kind: HintKind::FutureWork,
                },
                Hint {
                    subject: Subject::State(StateId(2)),
                    kind: HintKind::LowPower,
                },
            ]
        );
    }

    #[test]
    fn header_encoding_hint() {
        let machine = Machine {
            header: Header {
                hints: vec!["encoding = One-Hot".to_owned(), "encoding=auto".to_owned()],
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(
            CommentAnnotator.annotate(&machine),
            vec![Hint {
                subject: Subject::Machine,
                kind: HintKind::PreferEncoding(Encoding::OneHot),
            }]
        );
    }

    #[test]
    fn keywords_need_whole_words() {
        assert_eq!(keywords("uncritical futurey").count(), 0);
    }
}
