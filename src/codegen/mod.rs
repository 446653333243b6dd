//! Generación de código Verilog.
//!
//! El generador recibe únicamente una IR validada junto con su tabla
//! resuelta, por lo cual no reporta errores semánticos: todo fallo
//! posible en esta fase es de E/S.

use crate::{
    annotate::{Hint, HintKind},
    resolve::Table,
    validate::Validated,
};

use bitflags::bitflags;
use serde::Serialize;
use std::io::{self, Write};

pub use encoding::{Encoding, StateCodes, UnknownEncoding};

mod encoding;
mod verilog;

bitflags! {
    /// Interruptores de generación.
    pub struct GenFlags: u32 {
        /// Reinicio asíncrono en vez de síncrono.
        const ASYNC_RESET = 0x01;

        /// Emite comentarios con encabezado, anotaciones y duraciones.
        const COMMENTS = 0x02;
    }
}

impl Default for GenFlags {
    fn default() -> Self {
        GenFlags::COMMENTS
    }
}

/// Configuración del generador.
#[derive(Clone, Debug)]
pub struct Options {
    pub encoding: Encoding,

    /// Frecuencia de reloj con la que se convierten duraciones a ciclos.
    pub clock_hz: u64,

    /// Ancho mínimo de entradas numéricas.
    pub numeric_width: u32,

    /// Nombre del módulo emitido.
    pub module: String,
    pub flags: GenFlags,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            encoding: Encoding::Auto,
            clock_hz: 50_000_000,
            numeric_width: 8,
            module: String::from("fsm"),
            flags: GenFlags::default(),
        }
    }
}

/// Resumen de las decisiones del generador.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub module: String,
    pub encoding: Encoding,
    pub state_width: u32,
    pub counters: Vec<CounterReport>,
    pub hints: Vec<Hint>,
}

/// Contador de un temporizador.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterReport {
    pub state: String,
    pub duration: String,
    pub cycles: u64,
    pub width: u32,
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Emite el módulo Verilog de una máquina validada.
pub fn emit<W: Write>(
    machine: Validated<'_>,
    table: &Table,
    hints: &[Hint],
    options: &Options,
    output: &mut W,
) -> io::Result<Report> {
    let encoding = choose_encoding(options.encoding, hints);
    let codes = StateCodes::assign(encoding, machine.states.len());

    log::info!(
        "Using {} state encoding with a {}-bit state register",
        codes.encoding(),
        codes.width()
    );

    let counters = verilog::Module::new(machine, table, hints, options, codes, output).write()?;
    for counter in &counters {
        log::info!(
            "Timer of `{}` counts {} cycle(s) in {} bit(s)",
            counter.state,
            counter.cycles,
            counter.width
        );
    }

    Ok(Report {
        module: options.module.clone(),
        encoding: codes.encoding(),
        state_width: codes.width(),
        counters,
        hints: hints.to_vec(),
    })
}

fn choose_encoding(requested: Encoding, hints: &[Hint]) -> Encoding {
    let preferred = hints.iter().find_map(|hint| match hint.kind {
        HintKind::PreferEncoding(encoding) => Some(encoding),
        _ => None,
    });

    match (requested, preferred) {
        (Encoding::Auto, Some(encoding)) => encoding,
        (Encoding::Auto, None) => Encoding::Binary,
        (requested, _) => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Subject;

    #[test]
    fn auto_encoding_follows_hints() {
        let hints = [Hint {
            subject: Subject::Machine,
            kind: HintKind::PreferEncoding(Encoding::OneHot),
        }];

        assert_eq!(choose_encoding(Encoding::Auto, &hints), Encoding::OneHot);
        assert_eq!(choose_encoding(Encoding::Auto, &[]), Encoding::Binary);
        assert_eq!(choose_encoding(Encoding::Binary, &hints), Encoding::Binary);
    }
}
