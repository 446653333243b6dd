//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco se descartan durante esta operación, no así los saltos de línea,
//! ya que el lenguaje de especificación es orientado a líneas. Los
//! comentarios se preservan como tokens debido a que el encabezado de una
//! especificación y las anotaciones de cada entrada viajan en ellos. Cada
//! token emitido esta asociado a una ubicación en el código fuente original.
//!
//! # Reglas importantes del lenguaje
//! - Las palabras clave son case-insensitive, por lo cual tanto `ON_EVENT`
//!   como `on_event` resultan en [`Keyword::OnEvent`].
//! - Los identificadores son case-sensitive y nunca se normalizan.
//! - Una constante entera seguida inmediatamente de letras es una
//!   duración, como `30s` o `5min`.
//!
//! # Errores
//! El lexer se recupera de toda condición de error: el carácter o literal
//! problemático se reporta y se descarta, y el análisis continúa
//! inmediatamente después. De esta forma se reportan todos los errores
//! léxicos en una misma ejecución, aunque ninguno permite avanzar a las
//! demás fases de la compilación.

use crate::{
    ir::{Duration, TimeUnit},
    source::{InputStream, Located, Location},
};

use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Unknown symbol {0:?} in input stream")]
    UnknownSymbol(char),

    /// Un literal de cadena no se cerró antes del fin de línea.
    #[error("Unterminated string literal")]
    UnterminatedLiteral,

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", u64::MAX)]
    IntOverflow,

    /// Sufijo de duración desconocido.
    #[error("Unknown time unit `{0}`, expected one of `ms`, `s`, `sec`, `m`, `min`")]
    BadUnit(String),
}

impl crate::error::Classify for LexerError {
    fn kind(&self) -> &'static str {
        match self {
            LexerError::Input(_) => "Input",
            LexerError::UnknownSymbol(_) => "UnknownSymbol",
            LexerError::UnterminatedLiteral => "UnterminatedLiteral",
            LexerError::Expected(_) => "Expected",
            LexerError::IntOverflow => "IntOverflow",
            LexerError::BadUnit(_) => "BadUnit",
        }
    }
}

/// Un identificador.
///
/// A diferencia de las palabras clave, la comparación entre
/// identificadores es exacta.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    pub fn new(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(u64),

    /// Literal de duración, como `30s`.
    Duration(Duration),

    /// Literal de cadena, sin comillas.
    StrLiteral(Rc<str>),

    /// Comentario de línea, sin `#` ni espacios circundantes.
    Comment(Rc<str>),

    /// Fin de línea.
    Newline,

    /// `=`
    Assign,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `->`
    Arrow,

    /// `,`
    Comma,

    /// `:`
    Colon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            Duration(duration) => write!(fmt, "duration `{}`", duration),
            StrLiteral(string) => write!(fmt, "string {:?}", string),
            Comment(_) => fmt.write_str("comment"),
            Newline => fmt.write_str("end of line"),
            Assign => fmt.write_str("`=`"),
            Equal => fmt.write_str("`==`"),
            NotEqual => fmt.write_str("`!=`"),
            Less => fmt.write_str("`<`"),
            LessOrEqual => fmt.write_str("`<=`"),
            Greater => fmt.write_str("`>`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
            Arrow => fmt.write_str("`->`"),
            Comma => fmt.write_str("`,`"),
            Colon => fmt.write_str("`:`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    GlobalTransitions,
    StateList,
    Transitions,
    From,
    OnEvent,
    OnTimeout,
    TimerExpired,
    If,
    Else,
    Do,
    To,
    Stay,
    And,
    Or,
    Not,
    Output,
    Initial,
    StartTimer,
    StopTimer,
    StopAllTimers,
    ClearAlarm,
}

impl Keyword {
    /// Determina si la palabra clave inicia una sección.
    pub fn is_section(self) -> bool {
        matches!(
            self,
            Keyword::GlobalTransitions | Keyword::StateList | Keyword::Transitions
        )
    }
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            GlobalTransitions => "GLOBAL_TRANSITIONS",
            StateList         => "STATE_LIST",
            Transitions       => "TRANSITIONS",
            From              => "FROM",
            OnEvent           => "ON_EVENT",
            OnTimeout         => "ON_TIMEOUT",
            TimerExpired      => "TIMER_EXPIRED",
            If                => "IF",
            Else              => "ELSE",
            Do                => "DO",
            To                => "TO",
            Stay              => "STAY",
            And               => "AND",
            Or                => "OR",
            Not               => "NOT",
            Output            => "OUTPUT",
            Initial           => "INITIAL",
            StartTimer        => "START_TIMER",
            StopTimer         => "STOP_TIMER",
            StopAllTimers     => "STOP_ALL_TIMERS",
            ClearAlarm        => "CLEAR_ALARM",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    #[rustfmt::skip]
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(NoCase<&str>, Keyword)] = &[
            (NoCase::new("GLOBAL_TRANSITIONS"), GlobalTransitions),
            (NoCase::new("STATE_LIST"),         StateList),
            (NoCase::new("TRANSITIONS"),        Transitions),
            (NoCase::new("FROM"),               From),
            (NoCase::new("ON_EVENT"),           OnEvent),
            (NoCase::new("ON_TIMEOUT"),         OnTimeout),
            (NoCase::new("TIMER_EXPIRED"),      TimerExpired),
            (NoCase::new("IF"),                 If),
            (NoCase::new("ELSE"),               Else),
            (NoCase::new("DO"),                 Do),
            (NoCase::new("TO"),                 To),
            (NoCase::new("STAY"),               Stay),
            (NoCase::new("AND"),                And),
            (NoCase::new("OR"),                 Or),
            (NoCase::new("NOT"),                Not),
            (NoCase::new("OUTPUT"),             Output),
            (NoCase::new("INITIAL"),            Initial),
            (NoCase::new("START_TIMER"),        StartTimer),
            (NoCase::new("STOP_TIMER"),         StopTimer),
            (NoCase::new("STOP_ALL_TIMERS"),    StopAllTimers),
            (NoCase::new("CLEAR_ALARM"),        ClearAlarm),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    next: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Análogo a [`State::Complete`], pero para un error cuyo
    /// carácter causante ya fue consumido.
    Reject(LexerError),

    /// Comentario de línea.
    ///
    /// Este estado termina al encontrar `'\n'`, sin consumirlo.
    Comment(String),

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(u64),

    /// Constante entera seguida de un sufijo de unidad de tiempo.
    Duration(u64, String),

    /// Literal de cadena abierto.
    Str(String),

    /// Se encontró `-`, debe seguir `>`.
    Dash,

    /// Se encontró `!`, debe seguir `=`.
    Bang,

    /// Se encontró `=`, puede seguir otro `=`.
    Equals,

    /// Se encontró `<`, puede seguir `=`.
    Less,

    /// Se encontró `>`, puede seguir `=`.
    Greater,

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de acumular tokens exitosos y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma ejecución
    /// del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    ///
    /// En caso de éxito se retorna también la ubicación del último
    /// carácter aceptado, si es que se aceptó alguno.
    fn lex(&mut self) -> (Result<Option<Token>, LexerError>, Option<Location>) {
        use {State::*, Token::*};

        let mut last_accepted = None;
        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => None,
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Emisión retardada de tokens y errores cualesquiera
                (Complete(value), _) => break Ok(Some(std::mem::replace(value, Comma))),
                (Reject(error), _) => {
                    break Err(std::mem::replace(error, LexerError::UnterminatedLiteral))
                }

                // Tokens triviales
                (Start, None) => break Ok(None),
                (Start, Some('\n')) => self.state = Complete(Newline),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(':')) => self.state = Complete(Colon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),

                // Operadores de uno o dos caracteres
                (Start, Some('-')) => self.state = Dash,
                (Start, Some('!')) => self.state = Bang,
                (Start, Some('=')) => self.state = Equals,
                (Start, Some('<')) => self.state = State::Less,
                (Start, Some('>')) => self.state = State::Greater,

                (Start, Some('#')) => self.state = State::Comment(String::new()),
                (Start, Some('"')) => self.state = Str(String::new()),

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el entero, ya que esta lógica ya está implementada
                // en el respectivo caso para un estado de constante
                // entera para el cual el siguiente carácter es un
                // dígito. Por tanto, la constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados. Estos
                // últimos se consumen para que el análisis continúe.
                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => self.state = Reject(LexerError::UnknownSymbol(c)),

                (Dash, Some('>')) => self.state = Complete(Arrow),
                (Dash, _) => break Err(LexerError::Expected('>')),

                (Bang, Some('=')) => self.state = Complete(NotEqual),
                (Bang, _) => break Err(LexerError::Expected('=')),

                (Equals, Some('=')) => self.state = Complete(Equal),
                (Equals, _) => break Ok(Some(Assign)),

                (State::Less, Some('=')) => self.state = Complete(LessOrEqual),
                (State::Less, _) => break Ok(Some(Token::Less)),

                (State::Greater, Some('=')) => self.state = Complete(GreaterOrEqual),
                (State::Greater, _) => break Ok(Some(Token::Greater)),

                // Los comentarios terminan con la línea donde ocurren
                (State::Comment(text), Some('\n')) | (State::Comment(text), None) => {
                    break Ok(Some(Token::Comment(Rc::from(text.trim()))))
                }

                (State::Comment(text), Some(c)) => text.push(c),

                // Las cadenas no pueden extenderse a la siguiente línea
                (Str(text), Some('"')) => {
                    let text = std::mem::take(text);
                    self.state = Complete(StrLiteral(Rc::from(text)));
                }

                (Str(_), Some('\n')) | (Str(_), None) => break Err(LexerError::UnterminatedLiteral),
                (Str(text), Some(c)) => text.push(c),

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = u64::from(digit as u8 - b'0');

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => self.state = Reject(LexerError::IntOverflow),
                    }
                }

                // Un sufijo alfabético convierte a la constante en duración
                (Integer(value), Some(c)) if c.is_ascii_alphabetic() => {
                    self.state = State::Duration(*value, c.to_string());
                }

                // Si sigue algo que no es un dígito, la constante a terminado
                (Integer(integer), _) => break Ok(Some(IntLiteral(*integer))),

                (State::Duration(_, unit), Some(c)) if c.is_ascii_alphabetic() => unit.push(c),
                (State::Duration(value, unit), _) => {
                    break match unit_from_suffix(unit) {
                        Some(unit) => Ok(Some(Token::Duration(crate::ir::Duration {
                            value: *value,
                            unit,
                        }))),

                        None => Err(LexerError::BadUnit(std::mem::take(unit))),
                    };
                }

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word) {
                        break Ok(Some(Keyword(keyword)));
                    } else {
                        break Ok(Some(Id(Identifier::new(word))));
                    }
                }
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((_, next_position))) = self.source.next() {
                last_accepted = Some(std::mem::replace(&mut self.next, next_position));
            }
        };

        (token, last_accepted)
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (result, last_accepted) = self.lex();
        self.state = State::Start;

        let location = match last_accepted {
            Some(last_accepted) => Location::span(self.start.clone(), &last_accepted),
            None => self.start.clone(),
        };

        match result {
            Ok(None) => None,
            Ok(Some(token)) => Some(Ok(Located::at(token, location))),
            Err(error) => Some(Err(Located::at(error, location))),
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Interpreta el sufijo de una duración.
fn unit_from_suffix(suffix: &str) -> Option<TimeUnit> {
    let suffix = NoCase::new(suffix);
    if suffix == NoCase::new("ms") {
        Some(TimeUnit::Milliseconds)
    } else if suffix == NoCase::new("s") || suffix == NoCase::new("sec") {
        Some(TimeUnit::Seconds)
    } else if suffix == NoCase::new("m") || suffix == NoCase::new("min") {
        Some(TimeUnit::Minutes)
    } else {
        None
    }
}

/// Realiza análisis léxico completo sobre un texto en memoria.
pub fn tokenize(
    text: &str,
    name: &str,
) -> (Location, Result<Vec<Located<Token>>, Vec<Located<LexerError>>>) {
    let (start, stream) = crate::source::consume(text.as_bytes(), name);
    let tokens = Lexer::new(start.clone(), stream).try_exhaustive();

    (start, tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        let (_, result) = tokenize(text, "test");
        result
            .unwrap()
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    fn errors(text: &str) -> Vec<(String, u32, u32)> {
        let (_, result) = tokenize(text, "test");
        result
            .unwrap_err()
            .into_iter()
            .map(|error| {
                let start = error.location().start();
                (error.val().to_string(), start.line(), start.column())
            })
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            tokens("on_event Global_Transitions"),
            vec![
                Token::Keyword(Keyword::OnEvent),
                Token::Keyword(Keyword::GlobalTransitions),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn identifiers_keep_case() {
        assert_eq!(
            tokens("Attempt_Count"),
            vec![Token::Id(Identifier::new("Attempt_Count")), Token::Newline]
        );
    }

    #[test]
    fn transition_line() {
        let found = tokens("ON_TIMEOUT(30s): DO(STOP_TIMER) -> TO(IDLE) # critical");
        assert_eq!(
            found,
            vec![
                Token::Keyword(Keyword::OnTimeout),
                Token::OpenParen,
                Token::Duration(Duration {
                    value: 30,
                    unit: TimeUnit::Seconds
                }),
                Token::CloseParen,
                Token::Colon,
                Token::Keyword(Keyword::Do),
                Token::OpenParen,
                Token::Keyword(Keyword::StopTimer),
                Token::CloseParen,
                Token::Arrow,
                Token::Keyword(Keyword::To),
                Token::OpenParen,
                Token::Id(Identifier::new("IDLE")),
                Token::CloseParen,
                Token::Comment(Rc::from("critical")),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            tokens("a == b != c < d <= e > f >= g = h"),
            vec![
                Token::Id(Identifier::new("a")),
                Token::Equal,
                Token::Id(Identifier::new("b")),
                Token::NotEqual,
                Token::Id(Identifier::new("c")),
                Token::Less,
                Token::Id(Identifier::new("d")),
                Token::LessOrEqual,
                Token::Id(Identifier::new("e")),
                Token::Greater,
                Token::Id(Identifier::new("f")),
                Token::GreaterOrEqual,
                Token::Id(Identifier::new("g")),
                Token::Assign,
                Token::Id(Identifier::new("h")),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn duration_units() {
        assert_eq!(
            tokens("250ms 2min 7"),
            vec![
                Token::Duration(Duration {
                    value: 250,
                    unit: TimeUnit::Milliseconds
                }),
                Token::Duration(Duration {
                    value: 2,
                    unit: TimeUnit::Minutes
                }),
                Token::IntLiteral(7),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn unknown_symbols_are_skipped_and_all_reported() {
        let found = errors("FROM(A) $ TO(B)\nSTAY @");
        assert_eq!(
            found,
            vec![
                ("Unknown symbol '$' in input stream".to_string(), 1, 9),
                ("Unknown symbol '@' in input stream".to_string(), 2, 6),
            ]
        );
    }

    #[test]
    fn unterminated_literal_does_not_swallow_next_line() {
        let found = errors("DO(LOG(\"oops)\nSTAY $");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "Unterminated string literal");
        assert_eq!(found[1], ("Unknown symbol '$' in input stream".to_string(), 2, 6));
    }

    #[test]
    fn bad_unit_and_lonely_dash() {
        let found = errors("30h - x");
        assert_eq!(found.len(), 2);
        assert!(found[0].0.starts_with("Unknown time unit `h`"));
        assert_eq!(found[1].0, "Expected '>'");
    }
}
