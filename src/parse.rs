//! Análisis sintáctico.
//!
//! El parser consume la secuencia de tokens del lexer y construye un
//! [`Ast`] que refleja las tres secciones de una especificación:
//! `GLOBAL_TRANSITIONS`, `STATE_LIST` y `TRANSITIONS`, en ese orden.
//! Únicamente se realiza validación sintáctica; las referencias
//! cruzadas se resuelven hasta [`crate::semantic`].
//!
//! El lenguaje es orientado a líneas: cada entrada ocupa exactamente
//! una línea. Un error dentro de una entrada se registra y el análisis
//! continúa en la siguiente línea que comience una entrada válida para
//! la sección en curso, de forma que una misma ejecución reporte tantos
//! errores como sea posible.

use std::{iter::Peekable, rc::Rc, slice};
use thiserror::Error;

use crate::{
    error::Classify,
    ir::{CmpOp, Duration},
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

/// Secciones obligatorias, en orden.
const SECTIONS: [Keyword; 3] = [
    Keyword::GlobalTransitions,
    Keyword::StateList,
    Keyword::Transitions,
];

#[derive(Debug, Default)]
pub struct Ast {
    /// Comentarios previos a la primera sección.
    pub header: Vec<Located<Rc<str>>>,
    pub globals: Vec<Global>,
    pub states: Vec<StateDecl>,
    pub blocks: Vec<FromBlock>,
}

#[derive(Debug)]
pub struct Global {
    pub event: Located<Identifier>,
    pub actions: Vec<Located<Action>>,
    pub target: Located<Identifier>,
    pub comment: Option<Rc<str>>,
    pub location: Location,
}

#[derive(Debug)]
pub struct StateDecl {
    pub initial: bool,
    pub name: Located<Identifier>,
    pub outputs: Vec<OutputDecl>,
    pub comment: Option<Rc<str>>,
    pub location: Location,
}

#[derive(Debug)]
pub struct OutputDecl {
    pub signal: Located<Identifier>,
    pub level: Located<Identifier>,
}

/// Bloque `FROM(estado):` y las reglas que le siguen.
#[derive(Debug)]
pub struct FromBlock {
    pub state: Located<Identifier>,
    pub comment: Option<Rc<str>>,
    pub rules: Vec<Rule>,
}

#[derive(Debug)]
pub struct Rule {
    pub trigger: Located<Trigger>,
    pub guard: Option<Located<Guard>>,
    pub actions: Vec<Located<Action>>,
    pub destination: Located<Destination>,
    pub comment: Option<Rc<str>>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Event(Identifier),
    Timeout(Duration),
    Expired,
}

#[derive(Debug)]
pub enum Guard {
    If(Located<Expr>),
    Else,
}

#[derive(Debug)]
pub enum Expr {
    Var(Located<Identifier>),
    Compare {
        var: Located<Identifier>,
        op: CmpOp,
        operand: Located<Operand>,
    },
    Not(Box<Located<Expr>>),
    And(Vec<Located<Expr>>),
    Or(Vec<Located<Expr>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Id(Identifier),
    Int(u64),
}

#[derive(Debug)]
pub enum Action {
    StartTimer(Duration),
    StopTimer,
    StopAllTimers,
    ClearAlarm,
    Custom {
        name: Identifier,
        args: Vec<Located<Arg>>,
    },
}

/// Argumento opaco de una acción de dominio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Id(Identifier),
    Int(u64),
    Duration(Duration),
    Str(Rc<str>),
}

impl std::fmt::Display for Arg {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Id(id) => write!(fmt, "{}", id),
            Arg::Int(integer) => write!(fmt, "{}", integer),
            Arg::Duration(duration) => write!(fmt, "{}", duration),
            Arg::Str(string) => write!(fmt, "{:?}", string),
        }
    }
}

#[derive(Debug)]
pub enum Destination {
    Stay,
    To(Located<Identifier>),
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {expected}, found {found} instead")]
    UnexpectedToken { expected: Token, found: Token },

    #[error("Expected {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected any of `FROM`, `ON_EVENT`, `ON_TIMEOUT` or `TIMER_EXPIRED`")]
    ExpectedTrigger,

    #[error("Expected `TO(<state>)` or `STAY`")]
    ExpectedDestination,

    #[error("Expected an action")]
    ExpectedAction,

    #[error("Expected an identifier, integer, duration or string as action argument")]
    ExpectedArgument,

    #[error("Expected a condition")]
    ExpectedExpr,

    #[error("Expected a duration, such as `30s` or `5min`")]
    ExpectedDuration,

    #[error("Missing section `{0}`")]
    MissingSection(Keyword),

    #[error("Section `{0}` is repeated or out of order, expected GLOBAL_TRANSITIONS, STATE_LIST, TRANSITIONS")]
    MisplacedSection(Keyword),

    #[error("Transition rule outside of any `FROM(<state>):` block")]
    RuleOutsideFrom,

    #[error("Abrupt end of specification")]
    UnexpectedEof,
}

impl Classify for ParserError {
    fn kind(&self) -> &'static str {
        use ParserError::*;

        match self {
            UnexpectedToken { .. } => "UnexpectedToken",
            MissingToken(_) => "MissingToken",
            ExpectedId => "ExpectedId",
            ExpectedTrigger => "ExpectedTrigger",
            ExpectedDestination => "ExpectedDestination",
            ExpectedAction => "ExpectedAction",
            ExpectedArgument => "ExpectedArgument",
            ExpectedExpr => "ExpectedExpr",
            ExpectedDuration => "ExpectedDuration",
            MissingSection(_) => "MissingSection",
            MisplacedSection(_) => "MisplacedSection",
            RuleOutsideFrom => "RuleOutsideFrom",
            UnexpectedEof => "UnexpectedEof",
        }
    }
}

/// Construye un AST a partir de una secuencia de tokens.
///
/// `start` es la ubicación inicial del origen, utilizada para
/// reportar errores en entradas vacías.
pub fn parse(start: &Location, tokens: &[Located<Token>]) -> Result<Ast, Vec<Located<ParserError>>> {
    let mut parser = Parser {
        tokens: tokens.iter().peekable(),
        last_known: start.clone(),
        line_start: true,
    };

    let mut errors = Vec::new();
    let ast = parser.specification(&mut errors);

    if errors.is_empty() {
        Ok(ast)
    } else {
        Err(errors)
    }
}

#[derive(Clone)]
struct Parser<'a> {
    tokens: Peekable<slice::Iter<'a, Located<Token>>>,
    last_known: Location,
    line_start: bool,
}

enum Failure {
    Weak(Located<ParserError>),
    Strict(Located<ParserError>),
}

impl Failure {
    fn weak(self) -> Self {
        Failure::Weak(self.coerce())
    }

    fn strict(self) -> Self {
        Failure::Strict(self.coerce())
    }

    fn coerce(self) -> Located<ParserError> {
        match self {
            Failure::Weak(error) => error,
            Failure::Strict(error) => error,
        }
    }
}

type Parse<T> = Result<T, Failure>;

impl<'a> Parser<'a> {
    fn specification(&mut self, errors: &mut Vec<Located<ParserError>>) -> Ast {
        let mut ast = Ast::default();
        let mut section: Option<Keyword> = None;
        let mut seen = Vec::new();

        while let Some(token) = self.tokens.peek().copied() {
            let result = match token.val() {
                Token::Newline => {
                    self.tokens.next();
                    self.line_start = true;
                    continue;
                }

                // Los comentarios de línea completa solo son relevantes
                // como parte del encabezado
                Token::Comment(text) => {
                    self.tokens.next();
                    if section.is_none() {
                        ast.header
                            .push(Located::at(Rc::clone(text), token.location().clone()));
                    }

                    continue;
                }

                Token::Keyword(keyword) if keyword.is_section() => {
                    let keyword = *keyword;
                    let out_of_order = seen.contains(&keyword)
                        || section.map_or(false, |current| rank(current) > rank(keyword));

                    if out_of_order {
                        errors.push(Located::at(
                            ParserError::MisplacedSection(keyword),
                            token.location().clone(),
                        ));
                    }

                    seen.push(keyword);
                    section = Some(keyword);
                    self.section_header(keyword)
                }

                _ => match section {
                    None => {
                        let found = token.val().clone();
                        self.next().and_then(|_| {
                            self.fail(ParserError::UnexpectedToken {
                                expected: Token::Keyword(Keyword::GlobalTransitions),
                                found,
                            })
                        })
                    }

                    Some(Keyword::GlobalTransitions) => {
                        self.global().map(|global| ast.globals.push(global))
                    }

                    Some(Keyword::StateList) => self.state().map(|state| ast.states.push(state)),

                    Some(_) => match token.val() {
                        Token::Keyword(Keyword::From) => self.from_block().map(|block| ast.blocks.push(block)),
                        _ => self.rule().and_then(|rule| match ast.blocks.last_mut() {
                            Some(block) => {
                                block.rules.push(rule);
                                Ok(())
                            }

                            None => Err(Failure::Strict(Located::at(
                                ParserError::RuleOutsideFrom,
                                rule.location,
                            ))),
                        }),
                    },
                },
            };

            if let Err(failure) = result {
                errors.push(failure.coerce());
                self.recover(section);
            }
        }

        for missing in SECTIONS.iter().filter(|keyword| !seen.contains(keyword)) {
            errors.push(Located::at(
                ParserError::MissingSection(*missing),
                self.last_known.clone(),
            ));
        }

        ast
    }

    fn section_header(&mut self, keyword: Keyword) -> Parse<()> {
        self.keyword(keyword)?;
        self.expect(Token::Colon)?;
        self.end_of_line()?;

        Ok(())
    }

    fn global(&mut self) -> Parse<Global> {
        let start = self.keyword(Keyword::OnEvent)?;
        self.expect(Token::OpenParen)?;
        let event = self.id()?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::Colon)?;

        let actions = self.optional(Parser::actions)?.unwrap_or_default();

        self.expect(Token::Arrow)?;
        self.keyword(Keyword::To)?;
        self.expect(Token::OpenParen)?;
        let target = self.id()?;
        self.expect(Token::CloseParen)?;

        let location = Location::span(start, &self.last_known);
        let comment = self.end_of_line()?;

        Ok(Global {
            event,
            actions,
            target,
            comment,
            location,
        })
    }

    fn state(&mut self) -> Parse<StateDecl> {
        let marker = self.optional(|s| s.keyword(Keyword::Initial).map_err(Failure::weak))?;
        let name = self.id()?;

        let outputs = match self.optional(|s| s.expect(Token::OpenSquare).map_err(Failure::weak))? {
            None => Vec::new(),
            Some(_) => {
                self.keyword(Keyword::Output)?;
                self.expect(Token::Colon)?;
                let outputs = self.comma_separated(Parser::output, false)?;
                self.expect(Token::CloseSquare)?;

                outputs
            }
        };

        let start = marker.clone().unwrap_or_else(|| name.location().clone());
        let location = Location::span(start, &self.last_known);
        let comment = self.end_of_line()?;

        Ok(StateDecl {
            initial: marker.is_some(),
            name,
            outputs,
            comment,
            location,
        })
    }

    fn output(&mut self) -> Parse<OutputDecl> {
        let signal = self.id()?;
        self.expect(Token::Assign)?;
        let level = self.id()?;

        Ok(OutputDecl { signal, level })
    }

    fn from_block(&mut self) -> Parse<FromBlock> {
        self.keyword(Keyword::From)?;
        self.expect(Token::OpenParen)?;
        let state = self.id()?;
        self.expect(Token::CloseParen)?;
        self.expect(Token::Colon)?;
        let comment = self.end_of_line()?;

        Ok(FromBlock {
            state,
            comment,
            rules: Vec::new(),
        })
    }

    fn rule(&mut self) -> Parse<Rule> {
        let trigger = self.trigger()?;
        self.expect(Token::Colon)?;

        let guard = self.optional(Parser::guard)?;
        let actions = self.optional(Parser::actions)?.unwrap_or_default();

        self.expect(Token::Arrow)?;
        let destination = self.destination()?;

        let location = Location::span(trigger.location().clone(), &self.last_known);
        let comment = self.end_of_line()?;

        Ok(Rule {
            trigger,
            guard,
            actions,
            destination,
            comment,
            location,
        })
    }

    fn trigger(&mut self) -> Parse<Located<Trigger>> {
        let token = self.next()?;
        let trigger = match token.val() {
            Token::Keyword(Keyword::OnEvent) => {
                self.expect(Token::OpenParen)?;
                let event = self.id()?.into_inner();
                self.expect(Token::CloseParen)?;

                Trigger::Event(event)
            }

            Token::Keyword(Keyword::OnTimeout) => {
                self.expect(Token::OpenParen)?;
                let duration = self.duration()?;
                self.expect(Token::CloseParen)?;

                Trigger::Timeout(duration)
            }

            Token::Keyword(Keyword::TimerExpired) => Trigger::Expired,
            _ => return self.fail(ParserError::ExpectedTrigger),
        };

        let location = Location::span(token.location().clone(), &self.last_known);
        Ok(Located::at(trigger, location))
    }

    fn guard(&mut self) -> Parse<Located<Guard>> {
        let token = self.next()?;
        match token.val() {
            Token::Keyword(Keyword::If) => {
                let condition = self.expr().map_err(Failure::strict)?;
                let location = Location::span(token.location().clone(), condition.location());

                Ok(Located::at(Guard::If(condition), location))
            }

            Token::Keyword(Keyword::Else) => Ok(Located::at(Guard::Else, token.location().clone())),
            _ => self.fail(ParserError::ExpectedExpr).map_err(Failure::weak),
        }
    }

    fn actions(&mut self) -> Parse<Vec<Located<Action>>> {
        self.keyword(Keyword::Do).map_err(Failure::weak)?;
        self.expect(Token::OpenParen)?;
        let actions = self.comma_separated(Parser::action, false)?;
        self.expect(Token::CloseParen)?;

        Ok(actions)
    }

    fn action(&mut self) -> Parse<Located<Action>> {
        let token = self.next()?;
        let action = match token.val() {
            Token::Keyword(Keyword::StartTimer) => {
                self.expect(Token::OpenParen)?;
                let duration = self.duration()?;
                self.expect(Token::CloseParen)?;

                Action::StartTimer(duration)
            }

            Token::Keyword(Keyword::StopTimer) => Action::StopTimer,
            Token::Keyword(Keyword::StopAllTimers) => Action::StopAllTimers,
            Token::Keyword(Keyword::ClearAlarm) => Action::ClearAlarm,

            Token::Id(name) => {
                let open = self.optional(|s| s.expect(Token::OpenParen).map_err(Failure::weak))?;
                let args = match open {
                    None => Vec::new(),
                    Some(_) => {
                        let args = self.comma_separated(Parser::arg, true)?;
                        self.expect(Token::CloseParen)?;
                        args
                    }
                };

                Action::Custom {
                    name: name.clone(),
                    args,
                }
            }

            _ => return self.fail(ParserError::ExpectedAction).map_err(Failure::weak),
        };

        let location = Location::span(token.location().clone(), &self.last_known);
        Ok(Located::at(action, location))
    }

    fn arg(&mut self) -> Parse<Located<Arg>> {
        let token = self.next()?;
        let arg = match token.val() {
            Token::Id(id) => Arg::Id(id.clone()),
            Token::IntLiteral(integer) => Arg::Int(*integer),
            Token::Duration(duration) => Arg::Duration(*duration),
            Token::StrLiteral(string) => Arg::Str(Rc::clone(string)),
            _ => return self.fail(ParserError::ExpectedArgument).map_err(Failure::weak),
        };

        Ok(Located::at(arg, token.location().clone()))
    }

    fn destination(&mut self) -> Parse<Located<Destination>> {
        let token = self.next()?;
        match token.val() {
            Token::Keyword(Keyword::Stay) => {
                Ok(Located::at(Destination::Stay, token.location().clone()))
            }

            Token::Keyword(Keyword::To) => {
                self.expect(Token::OpenParen)?;
                let state = self.id()?;
                self.expect(Token::CloseParen)?;

                let location = Location::span(token.location().clone(), &self.last_known);
                Ok(Located::at(Destination::To(state), location))
            }

            _ => self.fail(ParserError::ExpectedDestination),
        }
    }

    fn expr(&mut self) -> Parse<Located<Expr>> {
        let mut terms = vec![self.conjunction()?];
        while self
            .optional(|s| s.keyword(Keyword::Or).map_err(Failure::weak))?
            .is_some()
        {
            terms.push(self.conjunction().map_err(Failure::strict)?);
        }

        Ok(join(terms, Expr::Or))
    }

    fn conjunction(&mut self) -> Parse<Located<Expr>> {
        let mut terms = vec![self.unary()?];
        while self
            .optional(|s| s.keyword(Keyword::And).map_err(Failure::weak))?
            .is_some()
        {
            terms.push(self.unary().map_err(Failure::strict)?);
        }

        Ok(join(terms, Expr::And))
    }

    fn unary(&mut self) -> Parse<Located<Expr>> {
        let token = self.next()?;
        let start = token.location().clone();

        match token.val() {
            Token::Keyword(Keyword::Not) => {
                let inner = self.unary().map_err(Failure::strict)?;
                let location = Location::span(start, inner.location());

                Ok(Located::at(Expr::Not(Box::new(inner)), location))
            }

            Token::OpenParen => {
                let inner = self.expr().map_err(Failure::strict)?;
                self.expect(Token::CloseParen)?;

                let location = Location::span(start, &self.last_known);
                Ok(Located::at(inner.into_inner(), location))
            }

            Token::Id(id) => {
                let var = Located::at(id.clone(), start.clone());
                match self.optional(Parser::comparison)? {
                    None => Ok(Located::at(Expr::Var(var), start)),
                    Some(op) => {
                        let operand = self.operand()?;
                        let location = Location::span(start, operand.location());

                        Ok(Located::at(Expr::Compare { var, op, operand }, location))
                    }
                }
            }

            _ => self.fail(ParserError::ExpectedExpr).map_err(Failure::weak),
        }
    }

    fn comparison(&mut self) -> Parse<CmpOp> {
        // `=` se admite como sinónimo de `==` dentro de condiciones
        let op = match self.next()?.val() {
            Token::Equal | Token::Assign => CmpOp::Eq,
            Token::NotEqual => CmpOp::Ne,
            Token::Less => CmpOp::Lt,
            Token::LessOrEqual => CmpOp::Le,
            Token::Greater => CmpOp::Gt,
            Token::GreaterOrEqual => CmpOp::Ge,
            _ => return self.fail(ParserError::ExpectedExpr).map_err(Failure::weak),
        };

        Ok(op)
    }

    fn operand(&mut self) -> Parse<Located<Operand>> {
        let token = self.next()?;
        let operand = match token.val() {
            Token::Id(id) => Operand::Id(id.clone()),
            Token::IntLiteral(integer) => Operand::Int(*integer),
            _ => return self.fail(ParserError::ExpectedExpr),
        };

        Ok(Located::at(operand, token.location().clone()))
    }

    fn duration(&mut self) -> Parse<Duration> {
        match self.next()?.val() {
            Token::Duration(duration) => Ok(*duration),
            _ => self.fail(ParserError::ExpectedDuration),
        }
    }

    /// Acepta un comentario opcional seguido de un fin de línea.
    fn end_of_line(&mut self) -> Parse<Option<Rc<str>>> {
        let comment = match self.peek() {
            Some(Token::Comment(text)) => {
                self.next()?;
                Some(Rc::clone(text))
            }

            _ => None,
        };

        if self.peek().is_some() {
            self.expect(Token::Newline)?;
        }

        Ok(comment)
    }

    /// Descarta entrada hasta la siguiente línea que pueda iniciar
    /// una entrada de la sección actual.
    fn recover(&mut self, section: Option<Keyword>) {
        let mut skip_line = !self.line_start;

        while let Some(token) = self.peek() {
            if !skip_line && starts_statement(section, token) {
                break;
            }

            self.tokens.next();
            self.line_start = *token == Token::Newline;
            skip_line = !self.line_start;
        }
    }

    fn optional<T, F>(&mut self, rule: F) -> Parse<Option<T>>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        match self.attempt(rule) {
            Err(Failure::Weak(_)) => Ok(None),
            result => Ok(Some(result?)),
        }
    }

    fn attempt<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        let mut fork = self.clone();

        let result = rule(&mut fork);
        if result.is_ok() {
            *self = fork;
        }

        result
    }

    fn comma_separated<T, F>(&mut self, mut rule: F, allow_empty: bool) -> Parse<Vec<T>>
    where
        F: FnMut(&mut Self) -> Parse<T>,
    {
        let mut items = match self.attempt(|s| rule(s)) {
            Err(Failure::Weak(_)) if allow_empty => return Ok(Vec::new()),
            item => vec![item.map_err(Failure::strict)?],
        };

        loop {
            match self.attempt(|s| s.expect(Token::Comma).map_err(Failure::weak)) {
                Err(Failure::Weak(_)) => break Ok(items),
                result => {
                    result?;
                    items.push(rule(self).map_err(Failure::strict)?);
                }
            }
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let token = self.next()?;
        match token.val() {
            Token::Id(id) => Ok(Located::at(id.clone(), token.location().clone())),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<Location> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<Location> {
        match self.next() {
            Ok(found) if *found.val() == token => Ok(found.location().clone()),
            Ok(found) => self.fail(ParserError::UnexpectedToken {
                expected: token,
                found: found.val().clone(),
            }),

            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn peek(&mut self) -> Option<&'a Token> {
        self.tokens.peek().copied().map(Located::val)
    }

    fn next(&mut self) -> Parse<&'a Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                self.line_start = *token.val() == Token::Newline;
                Ok(token)
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Failure::Strict(Located::at(error, self.last_known.clone())))
    }
}

fn rank(section: Keyword) -> usize {
    SECTIONS
        .iter()
        .position(|candidate| *candidate == section)
        .unwrap_or(SECTIONS.len())
}

/// Agrupa términos de una expresión n-aria, evitando nodos de un
/// único operando.
fn join(mut terms: Vec<Located<Expr>>, node: fn(Vec<Located<Expr>>) -> Expr) -> Located<Expr> {
    if terms.len() == 1 {
        return terms.remove(0);
    }

    let first = terms[0].location().clone();
    let location = Location::span(first, terms[terms.len() - 1].location());

    Located::at(node(terms), location)
}

/// Determina si un token puede iniciar una línea válida en una sección.
fn starts_statement(section: Option<Keyword>, token: &Token) -> bool {
    match (section, token) {
        (_, Token::Newline) | (_, Token::Comment(_)) => true,
        (_, Token::Keyword(keyword)) if keyword.is_section() => true,

        (Some(Keyword::GlobalTransitions), Token::Keyword(Keyword::OnEvent)) => true,
        (Some(Keyword::StateList), Token::Keyword(Keyword::Initial) | Token::Id(_)) => true,
        (
            Some(Keyword::Transitions),
            Token::Keyword(
                Keyword::From | Keyword::OnEvent | Keyword::OnTimeout | Keyword::TimerExpired,
            ),
        ) => true,

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;

    fn parse_text(text: &str) -> Result<Ast, Vec<Located<ParserError>>> {
        let (start, tokens) = tokenize(text, "test");
        parse(&start, &tokens.unwrap())
    }

    fn error_lines(text: &str) -> Vec<(&'static str, u32)> {
        parse_text(text)
            .unwrap_err()
            .iter()
            .map(|error| (error.val().kind(), error.location().start().line()))
            .collect()
    }

    const DOOR: &str = "\
# FEATURE: Door
GLOBAL_TRANSITIONS:
ON_EVENT(RESET): DO(STOP_ALL_TIMERS) -> TO(CLOSED)

STATE_LIST:
INITIAL CLOSED [OUTPUT: Motor=LOW]
OPEN [OUTPUT: Motor=HIGH] # critical
TRANSITIONS:
FROM(CLOSED):
ON_EVENT(PUSH): IF Armed AND Count < 3 DO(START_TIMER(5s), BEEP(2)) -> TO(OPEN)
ON_EVENT(PUSH): ELSE -> STAY
FROM(OPEN):
ON_TIMEOUT(5s): -> TO(CLOSED)
";

    #[test]
    fn parses_all_sections() {
        let ast = parse_text(DOOR).unwrap();

        assert_eq!(ast.header.len(), 1);
        assert_eq!(&**ast.header[0].val(), "FEATURE: Door");
        assert_eq!(ast.globals.len(), 1);
        assert_eq!(ast.globals[0].target.val().to_string(), "CLOSED");
        assert_eq!(ast.globals[0].actions.len(), 1);

        assert_eq!(ast.states.len(), 2);
        assert!(ast.states[0].initial);
        assert!(!ast.states[1].initial);
        assert_eq!(ast.states[1].comment.as_deref(), Some("critical"));

        assert_eq!(ast.blocks.len(), 2);
        let rules = &ast.blocks[0].rules;
        assert_eq!(rules.len(), 2);
        assert!(matches!(rules[0].guard.as_ref().map(Located::val), Some(Guard::If(_))));
        assert!(matches!(rules[1].guard.as_ref().map(Located::val), Some(Guard::Else)));
        assert_eq!(rules[0].actions.len(), 2);
        assert!(matches!(
            ast.blocks[1].rules[0].trigger.val(),
            Trigger::Timeout(Duration { value: 5, .. })
        ));
    }

    #[test]
    fn expression_precedence() {
        let ast = parse_text(
            "GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA\nTRANSITIONS:\nFROM(A):\n\
             ON_EVENT(E): IF NOT x AND y == 3 OR z -> STAY\n",
        )
        .unwrap();

        let condition = match ast.blocks[0].rules[0].guard.as_ref().map(Located::val) {
            Some(Guard::If(condition)) => condition,
            _ => panic!("missing guard"),
        };

        match condition.val() {
            Expr::Or(terms) => {
                assert_eq!(terms.len(), 2);
                match terms[0].val() {
                    Expr::And(factors) => {
                        assert!(matches!(factors[0].val(), Expr::Not(_)));
                        assert!(matches!(
                            factors[1].val(),
                            Expr::Compare {
                                op: CmpOp::Eq,
                                ..
                            }
                        ));
                    }

                    other => panic!("unexpected {:?}", other),
                }

                assert!(matches!(terms[1].val(), Expr::Var(_)));
            }

            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn recovers_at_next_line() {
        let found = error_lines(
            "GLOBAL_TRANSITIONS:\n\
             ON_EVENT(RESET): -> IDLE\n\
             STATE_LIST:\n\
             IDLE [OUTPUT: Led=OFF]\n\
             BUSY [OUTPUT Led=ON]\n\
             TRANSITIONS:\n\
             FROM(IDLE):\n\
             ON_EVENT(GO): -> TO(BUSY)\n\
             ON_EVENT(GO) -> TO(BUSY)\n",
        );

        assert_eq!(
            found,
            vec![
                ("UnexpectedToken", 2),
                ("UnexpectedToken", 5),
                ("UnexpectedToken", 9),
            ]
        );
    }

    #[test]
    fn missing_and_misplaced_sections() {
        let found = error_lines("STATE_LIST:\nA\nGLOBAL_TRANSITIONS:\n");
        assert_eq!(
            found,
            vec![("MisplacedSection", 3), ("MissingSection", 3)]
        );
    }

    #[test]
    fn rule_needs_a_from_block() {
        let found = error_lines("GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA\nTRANSITIONS:\nON_EVENT(E): -> STAY\n");
        assert_eq!(found, vec![("RuleOutsideFrom", 5)]);
    }

    #[test]
    fn timeout_needs_a_duration() {
        let found = error_lines(
            "GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA\nTRANSITIONS:\nFROM(A):\nON_TIMEOUT(30): -> STAY\n",
        );

        assert_eq!(found, vec![("ExpectedDuration", 6)]);
    }
}
