//! Resolución de prioridades.
//!
//! Combina las transiciones globales con las locales de cada estado y
//! establece la función efectiva de siguiente estado. El orden total es
//! global > condiciones locales en orden de declaración > `STAY`
//! implícito. Este último no se almacena por estado: es el único caso
//! de respaldo de [`Table::resolution`].
//!
//! [`Table::step`] es un modelo de referencia de un paso de la máquina
//! sobre valores concretos de entrada. El generador de código produce
//! hardware equivalente a este modelo.

use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use crate::{
    ir::{Action, CmpOp, Condition, EventId, Guard, Literal, StateId, Trigger, VarId},
    validate::Validated,
};

/// Tabla de transiciones resuelta.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    states: Vec<String>,
    events: Vec<String>,
    variables: Vec<String>,
    overrides: Vec<Override>,
    resolutions: Vec<Resolution>,
}

/// Transición global efectiva para un evento.
#[derive(Clone, Debug, PartialEq)]
pub struct Override {
    pub event: EventId,
    pub target: StateId,
    pub actions: Vec<Action>,
}

/// Cadena ordenada de ramas para un par (estado, disparador).
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub state: StateId,
    pub trigger: Trigger,
    pub arms: Vec<Arm>,
}

impl Resolution {
    /// Determina si la cadena termina en una rama incondicional.
    pub fn is_total(&self) -> bool {
        self.arms.iter().any(|arm| arm.guard.is_catch_all())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arm {
    pub guard: Guard,
    pub target: StateId,
    pub actions: Vec<Action>,
}

/// Regla aplicable a un par (estado, disparador).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Effective<'a> {
    Global(&'a Override),
    Local(&'a Resolution),
    Stay,
}

/// Resultado de un paso.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub target: StateId,
    pub actions: Vec<Action>,
}

impl Step {
    fn stay(state: StateId) -> Self {
        Step {
            target: state,
            actions: Vec::new(),
        }
    }
}

/// Valores concretos de las variables de entrada.
///
/// Una guarda que compara una variable ausente no se cumple, tampoco
/// bajo `NOT`. Un indicador ausente vale falso.
#[derive(Clone, Debug, Default)]
pub struct Inputs(HashMap<String, Value>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Flag(bool),
    Int(u64),
    Symbol(String),
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Flag(flag)
    }
}

impl From<u64> for Value {
    fn from(integer: u64) -> Self {
        Value::Int(integer)
    }
}

impl From<&str> for Value {
    fn from(symbol: &str) -> Self {
        Value::Symbol(symbol.to_owned())
    }
}

impl Inputs {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.0.insert(name.to_owned(), value.into());
        self
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Construye la tabla efectiva de una IR validada.
pub fn resolve(machine: Validated<'_>) -> Table {
    let mut overrides: Vec<Override> = Vec::new();
    for global in &machine.globals {
        if overrides.iter().all(|other| other.event != global.event) {
            overrides.push(Override {
                event: global.event,
                target: global.target,
                actions: global.actions.clone(),
            });
        }
    }

    let overridden = |trigger: Trigger| match trigger {
        Trigger::Event(event) => overrides.iter().any(|other| other.event == event),
        Trigger::Timeout => false,
    };

    let mut resolutions: Vec<_> = machine
        .transitions
        .iter()
        .filter(|transition| !overridden(transition.trigger))
        .map(|transition| Resolution {
            state: transition.source,
            trigger: transition.trigger,
            arms: transition
                .branches
                .iter()
                .map(|branch| Arm {
                    guard: branch.guard.clone(),
                    target: branch.destination.resolve(transition.source),
                    actions: branch.actions.clone(),
                })
                .collect(),
        })
        .collect();

    resolutions.sort_by_key(|resolution| (resolution.state, resolution.trigger));

    log::debug!(
        "Resolved {} global override(s) and {} local chain(s)",
        overrides.len(),
        resolutions.len()
    );

    Table {
        states: machine.states.iter().map(|state| state.name.clone()).collect(),
        events: machine.events.iter().map(|event| event.name.clone()).collect(),
        variables: machine.variables.iter().map(|var| var.name.clone()).collect(),
        overrides,
        resolutions,
    }
}

impl Table {
    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    /// Cadenas locales de un estado: primero la de expiración del
    /// temporizador, luego eventos en orden de identificador.
    pub fn resolutions_of(&self, state: StateId) -> impl Iterator<Item = &Resolution> {
        self.resolutions
            .iter()
            .filter(move |resolution| resolution.state == state)
    }

    /// Regla efectiva de un par (estado, disparador).
    pub fn resolution(&self, state: StateId, trigger: Trigger) -> Effective<'_> {
        if let Trigger::Event(event) = trigger {
            if let Some(global) = self.overrides.iter().find(|global| global.event == event) {
                return Effective::Global(global);
            }
        }

        match self
            .resolutions
            .binary_search_by_key(&(state, trigger), |resolution| {
                (resolution.state, resolution.trigger)
            }) {
            Ok(index) => Effective::Local(&self.resolutions[index]),
            Err(_) => Effective::Stay,
        }
    }

    /// Evalúa un paso de la máquina para un único disparador activo.
    pub fn step(&self, state: StateId, trigger: Trigger, inputs: &Inputs) -> Step {
        match self.resolution(state, trigger) {
            Effective::Global(global) => Step {
                target: global.target,
                actions: global.actions.clone(),
            },

            Effective::Local(resolution) => resolution
                .arms
                .iter()
                .find(|arm| self.admits(&arm.guard, inputs))
                .map(|arm| Step {
                    target: arm.target,
                    actions: arm.actions.clone(),
                })
                .unwrap_or_else(|| Step::stay(state)),

            Effective::Stay => Step::stay(state),
        }
    }

    /// Elige un disparador entre varios simultáneos.
    ///
    /// La prioridad es fija: eventos con transición global en orden de
    /// declaración, luego la expiración del temporizador y por último
    /// eventos en orden de primera aparición.
    pub fn arbitrate(&self, active: &[Trigger]) -> Option<Trigger> {
        let global = self.overrides.iter().find_map(|global| {
            let trigger = Trigger::Event(global.event);
            active.contains(&trigger).then(|| trigger)
        });

        global.or_else(|| active.iter().min().copied())
    }

    pub fn state_name(&self, StateId(id): StateId) -> &str {
        &self.states[id as usize]
    }

    pub fn state_named(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state == name)
            .map(|index| StateId(index as u32))
    }

    pub fn event_named(&self, name: &str) -> Option<EventId> {
        self.events
            .iter()
            .position(|event| event == name)
            .map(|index| EventId(index as u32))
    }

    fn admits(&self, guard: &Guard, inputs: &Inputs) -> bool {
        match guard {
            Guard::Always | Guard::Otherwise => true,
            Guard::When(condition) => self.holds(condition, inputs).unwrap_or(false),
        }
    }

    /// `None` si la condición compara una variable sin valor.
    fn holds(&self, condition: &Condition, inputs: &Inputs) -> Option<bool> {
        match condition {
            Condition::Not(inner) => self.holds(inner, inputs).map(|held| !held),

            Condition::All(terms) => terms.iter().try_fold(true, |all, term| {
                self.holds(term, inputs).map(|held| all && held)
            }),

            Condition::Any(terms) => terms.iter().try_fold(false, |any, term| {
                self.holds(term, inputs).map(|held| any || held)
            }),

            Condition::Flag(var) => match inputs.get(self.variable_name(*var)) {
                Some(Value::Flag(flag)) => Some(*flag),
                Some(Value::Int(integer)) => Some(*integer != 0),
                Some(Value::Symbol(_)) => None,
                None => Some(false),
            },

            Condition::Compare { var, op, value } => {
                match (inputs.get(self.variable_name(*var)), value) {
                    (Some(Value::Int(lhs)), Literal::Int(rhs)) => Some(op.holds(*lhs, *rhs)),
                    (Some(Value::Symbol(lhs)), Literal::Symbol(rhs)) => match op {
                        CmpOp::Eq => Some(lhs == rhs),
                        CmpOp::Ne => Some(lhs != rhs),
                        _ => None,
                    },

                    _ => None,
                }
            }
        }
    }

    fn variable_name(&self, VarId(id): VarId) -> &str {
        &self.variables[id as usize]
    }

    fn trigger_name(&self, trigger: Trigger) -> String {
        match trigger {
            Trigger::Timeout => String::from("TIMER_EXPIRED"),
            Trigger::Event(EventId(id)) => format!("ON_EVENT({})", self.events[id as usize]),
        }
    }
}

impl Display for Table {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "GLOBAL:")?;
        for global in &self.overrides {
            write!(fmt, "    {}", self.trigger_name(Trigger::Event(global.event)))?;
            write_actions(fmt, &global.actions)?;
            writeln!(fmt, " -> TO({})", self.state_name(global.target))?;
        }

        for resolution in &self.resolutions {
            writeln!(
                fmt,
                "{} {}:",
                self.state_name(resolution.state),
                self.trigger_name(resolution.trigger)
            )?;

            for arm in &resolution.arms {
                fmt.write_str("    ")?;
                match &arm.guard {
                    Guard::Always => (),
                    Guard::Otherwise => fmt.write_str("ELSE")?,
                    Guard::When(condition) => {
                        fmt.write_str("IF ")?;
                        self.write_condition(fmt, condition)?;
                    }
                }

                write_actions(fmt, &arm.actions)?;

                if arm.target == resolution.state {
                    writeln!(fmt, " -> STAY")?;
                } else {
                    writeln!(fmt, " -> TO({})", self.state_name(arm.target))?;
                }
            }

            if !resolution.is_total() {
                writeln!(fmt, "    (otherwise) -> STAY")?;
            }
        }

        Ok(())
    }
}

impl Table {
    fn write_condition(&self, fmt: &mut fmt::Formatter<'_>, condition: &Condition) -> fmt::Result {
        let join = |fmt: &mut fmt::Formatter<'_>, terms: &[Condition], separator: &str| {
            fmt.write_str("(")?;
            for (index, term) in terms.iter().enumerate() {
                if index > 0 {
                    fmt.write_str(separator)?;
                }

                self.write_condition(fmt, term)?;
            }

            fmt.write_str(")")
        };

        match condition {
            Condition::Flag(var) => fmt.write_str(self.variable_name(*var)),
            Condition::Compare { var, op, value } => {
                write!(fmt, "{} {} {}", self.variable_name(*var), op, value)
            }

            Condition::Not(inner) => {
                fmt.write_str("NOT ")?;
                self.write_condition(fmt, inner)
            }

            Condition::All(terms) => join(fmt, terms, " AND "),
            Condition::Any(terms) => join(fmt, terms, " OR "),
        }
    }
}

fn write_actions(fmt: &mut fmt::Formatter<'_>, actions: &[Action]) -> fmt::Result {
    if actions.is_empty() {
        return Ok(());
    }

    let listed: Vec<_> = actions.iter().map(Action::to_string).collect();
    write!(fmt, " DO({})", listed.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::Machine, validate::validate};

    fn machine(text: &str) -> Machine {
        let (start, tokens) = crate::lex::tokenize(text, "test");
        crate::parse::parse(&start, &tokens.unwrap())
            .unwrap()
            .lower()
            .unwrap()
    }

    fn table(machine: &Machine) -> Table {
        resolve(validate(machine).validated().unwrap())
    }

    const FAN: &str = "\
GLOBAL_TRANSITIONS:
ON_EVENT(POWER_CUT): DO(STOP_ALL_TIMERS) -> TO(OFF)
STATE_LIST:
OFF [OUTPUT: Fan=LOW]
LOW_SPEED [OUTPUT: Fan=HIGH]
TRANSITIONS:
FROM(OFF):
ON_EVENT(PRESS): IF Temp > 30 -> TO(LOW_SPEED)
ON_EVENT(POWER_CUT): -> TO(LOW_SPEED)
FROM(LOW_SPEED):
ON_EVENT(PRESS): IF Mode == ECO DO(BEEP) -> TO(OFF)
ON_EVENT(PRESS): ELSE -> STAY
";

    #[test]
    fn global_wins_over_local() {
        let machine = machine(FAN);
        let table = table(&machine);
        let off = table.state_named("OFF").unwrap();
        let cut = table.event_named("POWER_CUT").unwrap();

        let step = table.step(off, Trigger::Event(cut), &Inputs::new());
        assert_eq!(step.target, off);
        assert_eq!(step.actions, vec![Action::StopAllTimers]);
        assert!(matches!(table.resolution(off, Trigger::Event(cut)), Effective::Global(_)));
    }

    #[test]
    fn unmatched_chain_stays_without_actions() {
        let machine = machine(FAN);
        let table = table(&machine);
        let off = table.state_named("OFF").unwrap();
        let press = Trigger::Event(table.event_named("PRESS").unwrap());

        let cold = table.step(off, press, &Inputs::new().with("Temp", 20u64));
        assert_eq!(cold, Step { target: off, actions: vec![] });

        let hot = table.step(off, press, &Inputs::new().with("Temp", 31u64));
        assert_eq!(hot.target, table.state_named("LOW_SPEED").unwrap());
    }

    #[test]
    fn missing_entry_falls_back_to_stay() {
        let machine = machine(FAN);
        let table = table(&machine);
        let low = table.state_named("LOW_SPEED").unwrap();

        assert_eq!(table.resolution(low, Trigger::Timeout), Effective::Stay);
        assert_eq!(table.step(low, Trigger::Timeout, &Inputs::new()).target, low);
    }

    #[test]
    fn first_declared_branch_wins() {
        let machine = machine(FAN);
        let table = table(&machine);
        let low = table.state_named("LOW_SPEED").unwrap();
        let press = Trigger::Event(table.event_named("PRESS").unwrap());

        let eco = table.step(low, press, &Inputs::new().with("Mode", "ECO"));
        assert_eq!(eco.target, table.state_named("OFF").unwrap());
        assert_eq!(eco.actions.len(), 1);

        let turbo = table.step(low, press, &Inputs::new().with("Mode", "TURBO"));
        assert_eq!(turbo, Step { target: low, actions: vec![] });
    }

    #[test]
    fn missing_inputs_never_satisfy_a_guard() {
        let machine = machine(
            "GLOBAL_TRANSITIONS:\nSTATE_LIST:\nA\nB\nTRANSITIONS:\nFROM(A):\n\
             ON_EVENT(GO): IF NOT Mode == ECO -> TO(B)\n\
             ON_EVENT(HOP): IF NOT Armed -> TO(B)\n",
        );

        let table = table(&machine);
        let a = table.state_named("A").unwrap();
        let b = table.state_named("B").unwrap();
        let go = Trigger::Event(table.event_named("GO").unwrap());
        let hop = Trigger::Event(table.event_named("HOP").unwrap());

        assert_eq!(table.step(a, go, &Inputs::new()).target, a);
        assert_eq!(table.step(a, go, &Inputs::new().with("Mode", "TURBO")).target, b);
        assert_eq!(table.step(a, hop, &Inputs::new()).target, b);
    }

    #[test]
    fn simultaneous_triggers_follow_fixed_priority() {
        let machine = machine(FAN);
        let table = table(&machine);
        let press = Trigger::Event(table.event_named("PRESS").unwrap());
        let cut = Trigger::Event(table.event_named("POWER_CUT").unwrap());

        assert_eq!(table.arbitrate(&[press, cut]), Some(cut));
        assert_eq!(table.arbitrate(&[press, Trigger::Timeout]), Some(Trigger::Timeout));
        assert_eq!(table.arbitrate(&[]), None);
    }

    #[test]
    fn display_lists_fallbacks() {
        let machine = machine(FAN);
        let rendered = table(&machine).to_string();

        assert!(rendered.contains("ON_EVENT(POWER_CUT) DO(STOP_ALL_TIMERS) -> TO(OFF)"));
        assert!(rendered.contains("IF Temp > 30 -> TO(LOW_SPEED)"));
        assert!(rendered.contains("(otherwise) -> STAY"));
        assert!(rendered.contains("IF Mode == ECO DO(BEEP) -> TO(OFF)"));
    }
}
