//! Compilador de máquinas de estados a Verilog.
//!
//! # Front end
//! Cada máquina deriva de un único archivo de especificación. Este
//! archivo se somete primero a análisis léxico en [`lex`], de lo cual
//! se obtiene un flujo de tokens. El flujo de tokens se dispone en un
//! AST por medio de análisis sintáctico en [`parse`]. El árbol
//! sintáctico es procesado por [`semantic`], de lo cual se genera la
//! representación intermedia descrita en [`ir`]. La IR también puede
//! leerse directamente desde JSON.
//!
//! # Middle end
//! [`validate`] aplica la batería de verificaciones semánticas y, si
//! no hay errores, emite una prueba de validez. [`resolve`] combina
//! transiciones globales y locales en una tabla con prioridades
//! explícitas. [`annotate`] extrae sugerencias consultivas que nunca
//! afectan la tabla.
//!
//! # Back end
//! [`codegen`] traduce la tabla a un módulo Verilog síncrono de tipo
//! Moore junto con un reporte de contadores. Todo hallazgo de cualquier
//! fase se recolecta en [`error::Diagnostics`].

#[macro_use]
mod macros;

pub mod annotate;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod resolve;
pub mod semantic;
pub mod source;
pub mod validate;

use crate::{
    annotate::{Annotator, CommentAnnotator, Hint},
    codegen::{Options, Report},
    error::Diagnostics,
    ir::Machine,
    resolve::Table,
};

use std::io;

/// Artefactos de una compilación.
///
/// Cada artefacto existe solo si la fase que lo produce llegó a
/// ejecutarse. `verilog` y `report` existen si y solo si no hubo
/// errores.
#[derive(Debug, Default)]
pub struct Compilation {
    pub diagnostics: Diagnostics,
    pub machine: Option<Machine>,
    pub table: Option<Table>,
    pub hints: Vec<Hint>,
    pub verilog: Option<String>,
    pub report: Option<Report>,
}

impl Compilation {
    pub fn succeeded(&self) -> bool {
        !self.diagnostics.has_errors() && self.verilog.is_some()
    }
}

/// Compila el texto de una especificación.
pub fn compile(text: &str, name: &str, options: &Options) -> io::Result<Compilation> {
    let (machine, diagnostics) = front_end(text, name);
    match machine {
        Some(machine) => back_end(machine, diagnostics, options),
        None => Ok(Compilation {
            diagnostics,
            ..Default::default()
        }),
    }
}

/// Compila una IR ya construida, por ejemplo una leída desde JSON.
pub fn compile_ir(machine: Machine, options: &Options) -> io::Result<Compilation> {
    back_end(machine, Diagnostics::default(), options)
}

/// Análisis léxico, sintáctico y construcción de IR.
///
/// La primera fase que falla detiene el proceso.
pub fn front_end(text: &str, name: &str) -> (Option<Machine>, Diagnostics) {
    let (start, tokens) = lex::tokenize(text, name);
    let diagnostics = Diagnostics::default().with_origin(start.origin());

    let tokens = match tokens {
        Ok(tokens) => tokens,
        Err(errors) => return (None, with_errors(diagnostics, errors)),
    };

    log::debug!("Lexed {} token(s) from {}", tokens.len(), name);

    let ast = match parse::parse(&start, &tokens) {
        Ok(ast) => ast,
        Err(errors) => return (None, with_errors(diagnostics, errors)),
    };

    log::debug!(
        "Parsed {} global(s), {} state(s) and {} FROM block(s)",
        ast.globals.len(),
        ast.states.len(),
        ast.blocks.len()
    );

    match ast.lower() {
        Ok(machine) => {
            log::debug!(
                "Built IR with {} state(s), {} event(s) and {} timer(s)",
                machine.states.len(),
                machine.events.len(),
                machine.timers.len()
            );

            (Some(machine), diagnostics)
        }

        Err(errors) => (None, with_errors(diagnostics, errors)),
    }
}

fn with_errors<E: error::Classify>(
    mut diagnostics: Diagnostics,
    errors: Vec<source::Located<E>>,
) -> Diagnostics {
    diagnostics.extend_located(errors);
    diagnostics
}

fn back_end(
    machine: Machine,
    mut diagnostics: Diagnostics,
    options: &Options,
) -> io::Result<Compilation> {
    let verdict = validate::validate(&machine);
    let validated = verdict.validated();
    diagnostics.extend(verdict.into_diagnostics());

    let validated = match validated {
        Some(validated) => validated,
        None => {
            return Ok(Compilation {
                diagnostics,
                machine: Some(machine),
                ..Default::default()
            })
        }
    };

    let table = resolve::resolve(validated);
    let hints = CommentAnnotator.annotate(&machine);

    let mut buffer = Vec::new();
    let report = codegen::emit(validated, &table, &hints, options, &mut buffer)?;
    let verilog = String::from_utf8_lossy(&buffer).into_owned();

    log::debug!("Emitted {} byte(s) of Verilog", verilog.len());

    Ok(Compilation {
        diagnostics,
        machine: Some(machine),
        table: Some(table),
        hints,
        verilog: Some(verilog),
        report: Some(report),
    })
}
