//! Construcción de la representación intermedia.
//!
//! Esta fase recorre el AST y produce la IR canónica de [`crate::ir`]:
//! asigna identificadores estables a estados, eventos, señales y
//! variables, agrupa las transiciones locales por (estado, disparador)
//! y fusiona bloques `FROM` repetidos concatenando sus ramas en orden
//! de aparición. Todo error se acumula; la fase nunca se detiene en
//! el primero.
//!
//! Las referencias a estados no declarados no son errores en este
//! punto. Estos estados se registran con `declared = false` y es el
//! validador quien los reporta.

use thiserror::Error;

use std::collections::HashMap;

use crate::{
    error::Classify,
    ir::{self, CmpOp, Domain, EventId, SignalId, StateId, VarId, VariableKind},
    lex::Identifier,
    parse,
    source::{Located, Location},
};

pub type Semantic<T> = Result<T, Vec<Located<IrError>>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum IrError {
    #[error("State `{0}` is declared more than once")]
    DuplicateStateName(String),

    #[error("Level `{level}` is not admissible for output `{signal}`, whose levels are {domain}")]
    UnknownOutputDomain {
        signal: String,
        level: String,
        domain: Domain,
    },

    #[error("Output `{signal}` is assigned more than once in state `{state}`")]
    DuplicateOutput { signal: String, state: String },

    #[error("Variable `{name}` is used both as {first} and as {second}")]
    IncompatibleVariable {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("Symbolic variable `{0}` does not support the ordering operator `{1}`")]
    OrderedSymbol(String, CmpOp),
}

impl Classify for IrError {
    fn kind(&self) -> &'static str {
        match self {
            IrError::DuplicateStateName(_) => "DuplicateStateName",
            IrError::UnknownOutputDomain { .. } => "UnknownOutputDomain",
            IrError::DuplicateOutput { .. } => "DuplicateOutput",
            IrError::IncompatibleVariable { .. } => "IncompatibleVariable",
            IrError::OrderedSymbol(..) => "OrderedSymbol",
        }
    }
}

impl parse::Ast {
    /// Reduce el AST a IR.
    pub fn lower(&self) -> Semantic<ir::Machine> {
        let mut context = Context::default();

        for line in &self.header {
            context.header_line(line.val());
        }

        // Los estados se registran primero, ya que las transiciones
        // globales preceden a `STATE_LIST` en el texto fuente
        for state in &self.states {
            context.declare_state(state);
        }

        if !self.states.iter().any(|state| state.initial) {
            if let Some(first) = context.machine.states.first_mut() {
                log::debug!("No INITIAL marker, `{}` is the power-on state", first.name);
                first.initial = true;
            }
        }

        for global in &self.globals {
            context.global(global);
        }

        for block in &self.blocks {
            let source = context.state_ref(&block.state);
            if let Some(comment) = &block.comment {
                context.annotate_state(source, comment);
            }

            for rule in &block.rules {
                context.rule(source, rule);
            }
        }

        let Context { machine, errors, .. } = context;
        if errors.is_empty() {
            Ok(machine)
        } else {
            Err(errors)
        }
    }
}

#[derive(Default)]
struct Context {
    machine: ir::Machine,
    symbols: SymbolTable,
    errors: Vec<Located<IrError>>,
}

/// Espacios de nombres independientes.
#[derive(Default)]
struct SymbolTable {
    states: HashMap<Identifier, StateId>,
    events: HashMap<Identifier, EventId>,
    signals: HashMap<Identifier, SignalId>,
    variables: HashMap<Identifier, VarId>,
}

impl Context {
    fn header_line(&mut self, line: &str) {
        let header = &mut self.machine.header;
        let (prefix, rest) = match line.split_once(':') {
            Some((prefix, rest)) => (prefix.trim(), rest.trim().to_owned()),
            None => {
                header.notes.push(line.to_owned());
                return;
            }
        };

        if unicase::eq_ascii(prefix, "FEATURE") {
            header.feature = Some(rest);
        } else if unicase::eq_ascii(prefix, "INTENT") {
            header.intent = Some(rest);
        } else if unicase::eq_ascii(prefix, "ASSUME") || unicase::eq_ascii(prefix, "ASSUMPTION") {
            header.assumptions.push(rest);
        } else if unicase::eq_ascii(prefix, "HINT") {
            header.hints.push(rest);
        } else {
            header.notes.push(line.to_owned());
        }
    }

    fn declare_state(&mut self, declaration: &parse::StateDecl) {
        let name = declaration.name.val();
        if self.symbols.states.contains_key(name) {
            self.fail(
                IrError::DuplicateStateName(name.to_string()),
                declaration.name.location(),
            );

            return;
        }

        let id = StateId(self.machine.states.len() as u32);
        self.symbols.states.insert(name.clone(), id);

        let mut outputs: Vec<ir::Assignment> = Vec::new();
        for output in &declaration.outputs {
            let (signal, level) = match self.assign(output) {
                Some(assignment) => assignment,
                None => continue,
            };

            if outputs.iter().any(|assignment| assignment.signal == signal) {
                self.fail(
                    IrError::DuplicateOutput {
                        signal: output.signal.val().to_string(),
                        state: name.to_string(),
                    },
                    output.signal.location(),
                );

                continue;
            }

            outputs.push(ir::Assignment {
                signal,
                level,
                span: Location::span(output.signal.location().clone(), output.level.location())
                    .to_span(),
            });
        }

        self.machine.states.push(ir::State {
            name: name.to_string(),
            declared: true,
            initial: declaration.initial,
            outputs,
            comment: declaration.comment.as_deref().map(str::to_owned),
            span: declaration.location.to_span(),
        });
    }

    /// Resuelve una asignación de salida contra el dominio de su señal.
    ///
    /// El dominio de una señal queda fijo en su primera asignación.
    fn assign(&mut self, output: &parse::OutputDecl) -> Option<(SignalId, String)> {
        let written = output.level.val().as_ref();
        let builtin = Domain::of_level(written);

        let id = match self.symbols.signals.get(output.signal.val()) {
            Some(id) => *id,
            None => {
                let id = SignalId(self.machine.signals.len() as u32);
                let (domain, levels) = match builtin {
                    Some((domain, _)) => {
                        let levels = domain.builtin_levels().unwrap_or_default();
                        (domain, levels.iter().map(|&level| level.to_owned()).collect())
                    }

                    None => (Domain::Enumerated, vec![written.to_owned()]),
                };

                self.symbols.signals.insert(output.signal.val().clone(), id);
                self.machine.signals.push(ir::Signal {
                    name: output.signal.val().to_string(),
                    domain,
                    levels,
                });

                id
            }
        };

        let signal = &mut self.machine.signals[id.0 as usize];
        let level = match (signal.domain, builtin) {
            (domain, Some((found, canonical))) if domain == found => canonical.to_owned(),
            (Domain::Enumerated, None) => {
                if !signal.levels.iter().any(|level| level == written) {
                    signal.levels.push(written.to_owned());
                }

                written.to_owned()
            }

            (domain, _) => {
                let error = IrError::UnknownOutputDomain {
                    signal: signal.name.clone(),
                    level: written.to_owned(),
                    domain,
                };

                self.fail(error, output.level.location());
                return None;
            }
        };

        Some((id, level))
    }

    /// Obtiene el identificador de un estado, registrándolo como no
    /// declarado si es necesario.
    fn state_ref(&mut self, name: &Located<Identifier>) -> StateId {
        if let Some(id) = self.symbols.states.get(name.val()) {
            return *id;
        }

        let id = StateId(self.machine.states.len() as u32);
        self.symbols.states.insert(name.val().clone(), id);
        self.machine.states.push(ir::State {
            name: name.val().to_string(),
            declared: false,
            initial: false,
            outputs: Vec::new(),
            comment: None,
            span: name.location().to_span(),
        });

        id
    }

    /// Un comentario en `FROM(...)` se suma al del estado.
    fn annotate_state(&mut self, state: StateId, comment: &str) {
        let existing = &mut self.machine.states[state.0 as usize].comment;
        *existing = Some(match existing.take() {
            Some(previous) => format!("{}; {}", previous, comment),
            None => comment.to_owned(),
        });
    }

    fn event(&mut self, name: &Identifier, location: &Location) -> EventId {
        if let Some(id) = self.symbols.events.get(name) {
            return *id;
        }

        let id = EventId(self.machine.events.len() as u32);
        self.symbols.events.insert(name.clone(), id);
        self.machine.events.push(ir::Event {
            name: name.to_string(),
            span: location.to_span(),
        });

        id
    }

    fn global(&mut self, global: &parse::Global) {
        let event = self.event(global.event.val(), global.event.location());
        let target = self.state_ref(&global.target);
        let actions = self.actions(&global.actions);

        self.machine.globals.push(ir::GlobalTransition {
            event,
            actions,
            target,
            comment: global.comment.as_deref().map(str::to_owned),
            span: global.location.to_span(),
        });
    }

    fn rule(&mut self, source: StateId, rule: &parse::Rule) {
        let trigger = match rule.trigger.val() {
            parse::Trigger::Event(name) => ir::Trigger::Event(self.event(name, rule.trigger.location())),
            parse::Trigger::Timeout(duration) => {
                self.timer(source, Some(*duration), rule.trigger.location());
                ir::Trigger::Timeout
            }

            parse::Trigger::Expired => {
                self.timer(source, None, rule.trigger.location());
                ir::Trigger::Timeout
            }
        };

        let guard = match rule.guard.as_ref().map(Located::val) {
            None => ir::Guard::Always,
            Some(parse::Guard::Else) => ir::Guard::Otherwise,
            Some(parse::Guard::If(condition)) => ir::Guard::When(self.condition(condition)),
        };

        let destination = match rule.destination.val() {
            parse::Destination::Stay => ir::Destination::Stay,
            parse::Destination::To(state) => ir::Destination::To(self.state_ref(state)),
        };

        let branch = ir::Branch {
            guard,
            destination,
            actions: self.actions(&rule.actions),
            comment: rule.comment.as_deref().map(str::to_owned),
            span: rule.location.to_span(),
        };

        // Bloques `FROM` repetidos extienden la misma lista ordenada
        let transitions = &mut self.machine.transitions;
        match transitions
            .iter_mut()
            .find(|transition| transition.source == source && transition.trigger == trigger)
        {
            Some(transition) => transition.branches.push(branch),
            None => transitions.push(ir::LocalTransition {
                source,
                trigger,
                branches: vec![branch],
                span: rule.location.to_span(),
            }),
        }
    }

    fn timer(&mut self, owner: StateId, duration: Option<ir::Duration>, location: &Location) {
        let timers = &mut self.machine.timers;
        let timer = match timers.iter_mut().position(|timer| timer.owner == owner) {
            Some(index) => &mut timers[index],
            None => {
                timers.push(ir::Timer {
                    owner,
                    durations: Vec::new(),
                    span: location.to_span(),
                });

                let last = timers.len() - 1;
                &mut timers[last]
            }
        };

        if let Some(duration) = duration {
            if !timer.durations.contains(&duration) {
                timer.durations.push(duration);
            }
        }
    }

    fn actions(&mut self, actions: &[Located<parse::Action>]) -> Vec<ir::Action> {
        actions
            .iter()
            .map(|action| match action.val() {
                parse::Action::StartTimer(duration) => ir::Action::StartTimer(*duration),
                parse::Action::StopTimer => ir::Action::StopTimer,
                parse::Action::StopAllTimers => ir::Action::StopAllTimers,
                parse::Action::ClearAlarm => ir::Action::ClearAlarm,
                parse::Action::Custom { name, args } => ir::Action::Custom {
                    name: name.to_string(),
                    args: args.iter().map(|arg| arg.val().to_string()).collect(),
                },
            })
            .collect()
    }

    fn condition(&mut self, expr: &Located<parse::Expr>) -> ir::Condition {
        use parse::Expr::*;

        match expr.val() {
            Var(var) => ir::Condition::Flag(self.variable(var, None, None)),
            Not(inner) => ir::Condition::Not(Box::new(self.condition(inner))),
            And(terms) => ir::Condition::All(terms.iter().map(|term| self.condition(term)).collect()),
            Or(terms) => ir::Condition::Any(terms.iter().map(|term| self.condition(term)).collect()),

            Compare { var, op, operand } => {
                let value = match operand.val() {
                    parse::Operand::Int(integer) => ir::Literal::Int(*integer),
                    parse::Operand::Id(symbol) => ir::Literal::Symbol(symbol.to_string()),
                };

                let var = self.variable(var, Some(&value), Some(*op));
                ir::Condition::Compare { var, op: *op, value }
            }
        }
    }

    /// Registra un uso de variable e infiere o verifica su tipo.
    fn variable(
        &mut self,
        name: &Located<Identifier>,
        compared: Option<&ir::Literal>,
        op: Option<CmpOp>,
    ) -> VarId {
        let usage = match compared {
            None => VariableKind::Flag,
            Some(ir::Literal::Int(integer)) => VariableKind::Numeric { max: *integer },
            Some(ir::Literal::Symbol(symbol)) => VariableKind::Symbolic {
                symbols: vec![symbol.clone()],
            },
        };

        if let (VariableKind::Symbolic { .. }, Some(op)) = (&usage, op) {
            if op.is_ordering() {
                self.fail(
                    IrError::OrderedSymbol(name.val().to_string(), op),
                    name.location(),
                );
            }
        }

        let id = match self.symbols.variables.get(name.val()) {
            Some(id) => *id,
            None => {
                let id = VarId(self.machine.variables.len() as u32);
                self.symbols.variables.insert(name.val().clone(), id);
                self.machine.variables.push(ir::Variable {
                    name: name.val().to_string(),
                    kind: usage,
                    span: name.location().to_span(),
                });

                return id;
            }
        };

        let variable = &mut self.machine.variables[id.0 as usize];
        let conflict = match (&mut variable.kind, usage) {
            (VariableKind::Flag, VariableKind::Flag) => None,
            (VariableKind::Numeric { max }, VariableKind::Numeric { max: found }) => {
                *max = (*max).max(found);
                None
            }

            (VariableKind::Symbolic { symbols }, VariableKind::Symbolic { symbols: found }) => {
                for symbol in found {
                    if !symbols.contains(&symbol) {
                        symbols.push(symbol);
                    }
                }

                None
            }

            (first, second) => Some((kind_name(first), kind_name(&second))),
        };

        if let Some((first, second)) = conflict {
            let error = IrError::IncompatibleVariable {
                name: name.val().to_string(),
                first,
                second,
            };

            self.fail(error, name.location());
        }

        id
    }

    fn fail(&mut self, error: IrError, location: &Location) {
        self.errors.push(Located::at(error, location.clone()));
    }
}

fn kind_name(kind: &VariableKind) -> &'static str {
    match kind {
        VariableKind::Flag => "a flag",
        VariableKind::Numeric { .. } => "a number",
        VariableKind::Symbolic { .. } => "a symbol",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::tokenize, parse::parse};

    fn lower(text: &str) -> Semantic<ir::Machine> {
        let (start, tokens) = tokenize(text, "test");
        parse(&start, &tokens.unwrap()).unwrap().lower()
    }

    fn kinds(text: &str) -> Vec<&'static str> {
        lower(text)
            .unwrap_err()
            .iter()
            .map(|error| error.val().kind())
            .collect()
    }

    #[test]
    fn from_block_comments_reach_the_state() {
        let machine = lower(
            "GLOBAL_TRANSITIONS:\n\
             STATE_LIST:\n\
             A [OUTPUT: Led=OFF] # low-power\n\
             B [OUTPUT: Led=ON]\n\
             TRANSITIONS:\n\
             FROM(A): # critical\n\
             ON_EVENT(GO): -> TO(B)\n\
             FROM(B): # future\n\
             ON_EVENT(GO): -> TO(A)\n",
        )
        .unwrap();

        assert_eq!(machine.states[0].comment.as_deref(), Some("low-power; critical"));
        assert_eq!(machine.states[1].comment.as_deref(), Some("future"));
    }

    #[test]
    fn merges_repeated_from_blocks_in_order() {
        let machine = lower(
            "GLOBAL_TRANSITIONS:\n\
             STATE_LIST:\n\
             A [OUTPUT: Led=OFF]\n\
             B [OUTPUT: Led=ON]\n\
             TRANSITIONS:\n\
             FROM(A):\n\
             ON_EVENT(GO): IF Ready -> TO(B)\n\
             FROM(B):\n\
             ON_EVENT(GO): -> TO(A)\n\
             FROM(A):\n\
             ON_EVENT(GO): ELSE -> STAY\n",
        )
        .unwrap();

        assert_eq!(machine.transitions.len(), 2);
        let from_a = &machine.transitions[0];
        assert_eq!(from_a.source, StateId(0));
        assert_eq!(from_a.branches.len(), 2);
        assert_eq!(from_a.branches[0].destination, ir::Destination::To(StateId(1)));
        assert_eq!(from_a.branches[1].guard, ir::Guard::Otherwise);
    }

    #[test]
    fn header_and_initial_state() {
        let machine = lower(
            "# FEATURE: Lock\n# assume: single keypad\n# HINT: encoding=one-hot\n# free text\n\
             GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA\nB\nTRANSITIONS:\n",
        )
        .unwrap();

        assert_eq!(machine.header.feature.as_deref(), Some("Lock"));
        assert_eq!(machine.header.assumptions, vec!["single keypad".to_owned()]);
        assert_eq!(machine.header.hints, vec!["encoding=one-hot".to_owned()]);
        assert_eq!(machine.header.notes, vec!["free text".to_owned()]);
        assert_eq!(machine.initial(), Some(StateId(0)));
    }

    #[test]
    fn undeclared_states_are_recorded() {
        let machine = lower(
            "GLOBAL_TRANSITIONS:\nON_EVENT(PANIC): -> TO(NOWHERE)\nSTATE_LIST:\nA\nTRANSITIONS:\n",
        )
        .unwrap();

        let id = machine.state_named("NOWHERE").unwrap();
        assert!(!machine.state(id).declared);
        assert!(machine.state(StateId(0)).declared);
    }

    #[test]
    fn levels_are_canonical_and_domains_fixed() {
        let machine = lower(
            "GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA [OUTPUT: Led=on, Door=AJAR]\nB [OUTPUT: Led=BLINK, Door=SHUT]\nTRANSITIONS:\n",
        )
        .unwrap();

        assert_eq!(machine.signals[0].domain, Domain::Indicator);
        assert_eq!(machine.state(StateId(0)).outputs[0].level, "ON");
        assert_eq!(machine.signals[1].domain, Domain::Enumerated);
        assert_eq!(machine.signals[1].levels, vec!["AJAR".to_owned(), "SHUT".to_owned()]);

        let found = kinds(
            "GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA [OUTPUT: Led=ON]\nB [OUTPUT: Led=HIGH, Led=OFF]\nTRANSITIONS:\n",
        );

        assert_eq!(found, vec!["UnknownOutputDomain"]);
    }

    #[test]
    fn collisions_are_accumulated() {
        let found = kinds(
            "GLOBAL_TRANSITIONS:\n\
             STATE_LIST:\n\
             A [OUTPUT: Led=ON, Led=OFF]\n\
             A\n\
             TRANSITIONS:\n\
             FROM(A):\n\
             ON_EVENT(E): IF Code == VALID AND Code > 2 -> STAY\n\
             ON_EVENT(F): IF Mode < FAST -> STAY\n",
        );

        assert_eq!(
            found,
            vec![
                "DuplicateOutput",
                "DuplicateStateName",
                "IncompatibleVariable",
                "OrderedSymbol",
            ]
        );
    }

    #[test]
    fn variables_are_inferred_from_use() {
        let machine = lower(
            "GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA\nTRANSITIONS:\nFROM(A):\n\
             ON_EVENT(E): IF Armed AND Count >= 3 AND Code == VALID -> STAY\n\
             ON_EVENT(E): IF Count < 7 OR Code != INVALID -> STAY\n",
        )
        .unwrap();

        let kinds: Vec<_> = machine.variables.iter().map(|var| var.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                VariableKind::Flag,
                VariableKind::Numeric { max: 7 },
                VariableKind::Symbolic {
                    symbols: vec!["VALID".to_owned(), "INVALID".to_owned()]
                },
            ]
        );
    }
}
