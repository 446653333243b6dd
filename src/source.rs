//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el código fuente original, lo cual permite determinar un punto
//! exacto o aproximado en donde ocurre un error.
//!
//! Existen dos niveles de rastreo. [`Location`] se utiliza durante
//! análisis léxico y sintáctico y mantiene una referencia al origen.
//! [`Span`] es un rango plano y serializable que acompaña a los nodos
//! de la representación intermedia, la cual debe poder escribirse y
//! leerse sin depender del texto original.

use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    iter,
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un flujo de entrada, carácter por carácter.
pub trait InputStream: Iterator<Item = Result<(char, Location), io::Error>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Location), io::Error>> {}

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen de esta ubicación.
    pub fn origin(&self) -> Origin {
        Origin(Rc::clone(&self.from))
    }

    /// Descarta el origen y conserva únicamente el rango.
    pub fn to_span(&self) -> Span {
        Span {
            start: self.position.start,
            end: self.position.end,
        }
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.from.name, self.to_span())
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Rango de posiciones sin origen asociado.
///
/// El fin es exclusivo, al igual que en [`Location`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Default for Span {
    fn default() -> Self {
        let start = Position::default();
        Span {
            start,
            end: start.advance(),
        }
    }
}

impl Display for Span {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let Span { start, end } = *self;
        if end == start.advance() || end == start {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición arbitraria.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Referencia compartida a un archivo de origen.
///
/// Permite recuperar líneas del texto original para mostrar
/// fragmentos en los diagnósticos.
#[derive(Clone)]
pub struct Origin(Rc<Source>);

impl Origin {
    /// Nombre del origen, usualmente una ruta.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Invoca a `callback` con el contenido de una línea, si esta ya
    /// fue leída. Las líneas se numeran a partir de 1.
    pub fn with_line<F>(&self, line_number: u32, callback: F) -> fmt::Result
    where
        F: FnOnce(&str) -> fmt::Result,
    {
        let lines = self.0.lines.borrow();
        let line = (line_number as usize)
            .checked_sub(1)
            .and_then(|index| lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        callback(line)
    }
}

impl Debug for Origin {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "Origin({:?})", self.0.name)
    }
}

/// Transforma un flujo de entrada estándar en uno que itera por carácter.
///
/// Esta función existe debido a que `std` no ofrece algún mecanismo
/// no trivial para realizar la misma operación. La ubicación que se
/// encuentra en la tupla de retorno es la posición que le corresponderá
/// al primer caracter en la salida. Cada carácter emitido incluye a la
/// ubicación del siguiente.
pub fn consume<R, S>(reader: R, name: S) -> (Location, impl InputStream)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let start = Location {
        from: Rc::clone(&source),
        position: Position::default()..Position::default().advance(),
    };

    let chars = reader
        .lines()
        .enumerate()
        .flat_map(move |(line_index, line)| {
            let source = Rc::clone(&source);

            Fallible::new(line.map(move |line| {
                let line_chars: Vec<_> = line.chars().collect();
                source.lines.borrow_mut().push(line);

                let mut column = 1;
                line_chars
                    .into_iter()
                    .chain(iter::once('\n'))
                    .map(move |c| {
                        let here = Position {
                            line: line_index as u32 + 1,
                            column,
                        };

                        let next = match c {
                            '\n' => here.newline(),
                            '\t' => here.tab(),
                            _ => here.advance(),
                        };

                        column = next.column;
                        let location = Location {
                            from: Rc::clone(&source),
                            position: next..next.advance(),
                        };

                        (c, location)
                    })
            }))
        })
        .fuse();

    (start, chars)
}

/// Nombre de origen e histórico interior de líneas.
struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

/// Un iterador que emite un solo error o encapsula las salidas de
/// otro iterador en `Ok`, pero nunca ambas.
struct Fallible<I, E>(Result<I, iter::Once<E>>);

impl<I, E> Fallible<I, E> {
    /// Crea un iterador a partir de un `Result`.
    pub fn new(result: Result<I, E>) -> Self {
        Fallible(result.map_err(iter::once))
    }
}

impl<I: Iterator, E> Iterator for Fallible<I, E> {
    type Item = Result<I::Item, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Ok(ok) => ok.next().map(Ok),
            Err(error) => error.next().map(Err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_carry_next_position() {
        let (start, stream) = consume("ab\n\tc".as_bytes(), "test");
        assert_eq!(start.start(), Position::new(1, 1));

        let positions: Vec<_> = stream
            .map(|item| {
                let (c, location) = item.unwrap();
                (c, location.start())
            })
            .collect();

        assert_eq!(positions[0], ('a', Position::new(1, 2)));
        assert_eq!(positions[2], ('\n', Position::new(2, 1)));
        assert_eq!(positions[3], ('\t', Position::new(2, 5)));
    }

    #[test]
    fn origin_remembers_lines() {
        let (start, stream) = consume("first\nsecond".as_bytes(), "test");
        let _: Vec<_> = stream.collect();

        let origin = start.origin();
        let mut seen = String::new();
        origin
            .with_line(2, |line| {
                seen.push_str(line);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, "second");
        assert_eq!(origin.name(), "test");
    }

    #[test]
    fn span_display() {
        let single = Span {
            start: Position::new(3, 4),
            end: Position::new(3, 5),
        };
        assert_eq!(single.to_string(), "3:4");

        let range = Span {
            start: Position::new(3, 4),
            end: Position::new(3, 9),
        };
        assert_eq!(range.to_string(), "[3:4-3:8]");
    }
}
