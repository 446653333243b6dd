//! Análisis semántico estático.
//!
//! El validador ejecuta una batería fija de verificaciones sobre la IR
//! y produce un [`Verdict`]. Ninguna verificación se detiene en el
//! primer hallazgo. Los errores bloquean la generación de código; las
//! advertencias se reportan sin filtrar pero no la impiden.
//!
//! La única forma de obtener un [`Validated`], y por tanto de invocar
//! al generador, es a partir de un veredicto sin errores.

use std::{
    collections::{HashSet, VecDeque},
    ops::Deref,
};

use thiserror::Error;

use crate::{
    error::{Classify, Diagnostic},
    ir::{Action, Condition, Destination, Duration, Guard, Machine, StateId, Trigger},
    source::Span,
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("State `{state}` does not declare a level for output `{signal}`")]
    MissingOutputInState { state: String, signal: String },

    #[error("State `{0}` consumes a timer, but no transition into it issues `START_TIMER`")]
    OrphanedTimeout(String),

    #[error("Timer conflict in state `{state}`: {reason}")]
    TimerConflict { state: String, reason: String },

    #[error("State `{0}` is declared more than once")]
    DuplicateStateName(String),

    #[error("No initial state, declare at least one state in `STATE_LIST`")]
    MissingInitialState,

    #[error("More than one state is marked as `INITIAL`: {}", .0.join(", "))]
    MultipleInitialStates(Vec<String>),

    #[error("Reference to undefined {what} `{name}`")]
    UnresolvedReference { what: &'static str, name: String },

    #[error("State `{state}` holds more than one rule group for `{trigger}`")]
    DuplicateTransitionGroup { state: String, trigger: String },
}

impl Classify for ValidationError {
    fn kind(&self) -> &'static str {
        use ValidationError::*;

        match self {
            MissingOutputInState { .. } => "MissingOutputInState",
            OrphanedTimeout(_) => "OrphanedTimeout",
            TimerConflict { .. } => "TimerConflict",
            DuplicateStateName(_) => "DuplicateStateName",
            MissingInitialState => "MissingInitialState",
            MultipleInitialStates(_) => "MultipleInitialStates",
            UnresolvedReference { .. } => "UnresolvedReference",
            DuplicateTransitionGroup { .. } => "DuplicateTransitionGroup",
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Warning {
    #[error("Event `{found}` looks like a misspelling of `{first}`")]
    InconsistentEventSpelling { first: String, found: String },

    #[error("State `{state}` does not handle `{trigger}`, it will implicitly STAY")]
    ImplicitStay { state: String, trigger: String },

    #[error("Repeated condition for `{trigger}` in state `{state}`, this branch is dead code")]
    DuplicateCondition { state: String, trigger: String },

    #[error("Branch for `{trigger}` in state `{state}` follows an unconditional branch and is unreachable")]
    UnreachableBranch { state: String, trigger: String },

    #[error("Transition for `{event}` in state `{state}` is always overridden by a global transition")]
    OverriddenByGlobal { state: String, event: String },

    #[error("Global transition for `{0}` is shadowed by an earlier one")]
    ShadowedGlobal(String),

    #[error("Entry into `{state}` from {from} does not start its timer, while other entries do")]
    UnstartedEntry { state: String, from: String },

    #[error("Timer of `{state}` is started with {started} but times out after {timeout}")]
    TimerDurationMismatch {
        state: String,
        started: Duration,
        timeout: Duration,
    },

    #[error("Timer started on entry to `{0}`, which never consumes a timeout")]
    UnusedTimer(String),

    #[error("State `{0}` has no way out")]
    PotentialDeadlock(String),

    #[error("State `{0}` is unreachable from the initial state")]
    UnreachableState(String),
}

impl Classify for Warning {
    fn kind(&self) -> &'static str {
        use Warning::*;

        match self {
            InconsistentEventSpelling { .. } => "InconsistentEventSpelling",
            ImplicitStay { .. } => "ImplicitStay",
            DuplicateCondition { .. } => "DuplicateCondition",
            UnreachableBranch { .. } => "UnreachableBranch",
            OverriddenByGlobal { .. } => "OverriddenByGlobal",
            ShadowedGlobal(_) => "ShadowedGlobal",
            UnstartedEntry { .. } => "UnstartedEntry",
            TimerDurationMismatch { .. } => "TimerDurationMismatch",
            UnusedTimer(_) => "UnusedTimer",
            PotentialDeadlock(_) => "PotentialDeadlock",
            UnreachableState(_) => "UnreachableState",
        }
    }
}

/// Resultado de la validación.
#[derive(Debug)]
pub struct Verdict<'a> {
    machine: &'a Machine,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Verdict<'a> {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Obtiene la prueba de validez, si no hubo errores.
    pub fn validated(&self) -> Option<Validated<'a>> {
        (!self.has_errors()).then(|| Validated {
            machine: self.machine,
        })
    }
}

/// Una IR sin errores de validación.
#[derive(Copy, Clone, Debug)]
pub struct Validated<'a> {
    machine: &'a Machine,
}

impl<'a> Validated<'a> {
    pub fn machine(&self) -> &'a Machine {
        self.machine
    }
}

impl Deref for Validated<'_> {
    type Target = Machine;

    fn deref(&self) -> &Machine {
        self.machine
    }
}

/// Ejecuta todas las verificaciones.
pub fn validate(machine: &Machine) -> Verdict<'_> {
    let mut checker = Checker {
        machine,
        diagnostics: Vec::new(),
    };

    // Una IR arbitraria, como la que proviene de JSON, puede contener
    // identificadores fuera de rango; nada más puede verificarse así
    if checker.structure() {
        checker.duplicate_states();
        checker.initial_state();
        checker.undeclared_states();
        checker.event_spelling();
        checker.moore_outputs();
        checker.completeness();
        checker.determinism();
        checker.globals();
        checker.timers();
        checker.reachability();
    }

    log::debug!(
        "Validation produced {} diagnostic(s) over {} state(s)",
        checker.diagnostics.len(),
        machine.states.len()
    );

    Verdict {
        machine,
        diagnostics: checker.diagnostics,
    }
}

struct Checker<'a> {
    machine: &'a Machine,
    diagnostics: Vec<Diagnostic>,
}

impl Checker<'_> {
    fn structure(&mut self) -> bool {
        let machine = self.machine;
        let states = machine.states.len() as u32;
        let before = self.diagnostics.len();

        for global in &machine.globals {
            if global.event.0 as usize >= machine.events.len() {
                self.unresolved("event", format!("#{}", global.event.0), global.span);
            }

            if global.target.0 >= states {
                self.unresolved("state", format!("#{}", global.target.0), global.span);
            }
        }

        for transition in &machine.transitions {
            if transition.source.0 >= states {
                self.unresolved("state", format!("#{}", transition.source.0), transition.span);
            }

            if let Trigger::Event(event) = transition.trigger {
                if event.0 as usize >= machine.events.len() {
                    self.unresolved("event", format!("#{}", event.0), transition.span);
                }
            }

            for branch in &transition.branches {
                if let Destination::To(target) = branch.destination {
                    if target.0 >= states {
                        self.unresolved("state", format!("#{}", target.0), branch.span);
                    }
                }

                if let Guard::When(condition) = &branch.guard {
                    let mut bad = Vec::new();
                    condition.for_each_var(&mut |var| {
                        if var.0 as usize >= machine.variables.len() {
                            bad.push(var.0);
                        }
                    });

                    for var in bad {
                        self.unresolved("variable", format!("#{}", var), branch.span);
                    }
                }
            }
        }

        for timer in &machine.timers {
            if timer.owner.0 >= states {
                self.unresolved("state", format!("#{}", timer.owner.0), timer.span);
            }
        }

        for state in &machine.states {
            for assignment in &state.outputs {
                match machine.signals.get(assignment.signal.0 as usize) {
                    None => self.unresolved("output", format!("#{}", assignment.signal.0), assignment.span),
                    Some(signal) if !signal.levels.contains(&assignment.level) => self.unresolved(
                        "level",
                        format!("{}={}", signal.name, assignment.level),
                        assignment.span,
                    ),

                    Some(_) => (),
                }
            }
        }

        if self.diagnostics.len() == before {
            self.transition_groups();
        }

        self.diagnostics.len() == before
    }

    /// Cada par (estado, disparador) agrupa sus reglas en una sola
    /// transición local. Solo una IR editada a mano puede repetirlo.
    fn transition_groups(&mut self) {
        let machine = self.machine;
        let mut seen = HashSet::new();

        for transition in &machine.transitions {
            if !seen.insert((transition.source, transition.trigger)) {
                let error = ValidationError::DuplicateTransitionGroup {
                    state: machine.state(transition.source).name.clone(),
                    trigger: trigger_name(machine, transition.trigger),
                };

                self.error(error, transition.span);
            }
        }
    }

    fn duplicate_states(&mut self) {
        let machine = self.machine;
        let mut seen = HashSet::new();
        for state in &machine.states {
            if !seen.insert(state.name.as_str()) {
                self.error(ValidationError::DuplicateStateName(state.name.clone()), state.span);
            }
        }
    }

    fn initial_state(&mut self) {
        let machine = self.machine;
        let initial: Vec<_> = machine.states.iter().filter(|state| state.initial).collect();

        match initial.as_slice() {
            [] => self.error_unlocated(ValidationError::MissingInitialState),
            [_] => (),
            [_, second, ..] => {
                let names = initial.iter().map(|state| state.name.clone()).collect();
                self.error(ValidationError::MultipleInitialStates(names), second.span);
            }
        }
    }

    fn undeclared_states(&mut self) {
        let machine = self.machine;
        for state in machine.states.iter().filter(|state| !state.declared) {
            let error = ValidationError::UnresolvedReference {
                what: "state",
                name: state.name.clone(),
            };

            self.error(error, state.span);
        }
    }

    fn event_spelling(&mut self) {
        let normalize = |name: &str| name.to_ascii_uppercase().replace('_', "");
        let machine = self.machine;
        let events = &machine.events;

        for (index, event) in events.iter().enumerate() {
            let key = normalize(&event.name);
            if let Some(first) = events[..index].iter().find(|other| normalize(&other.name) == key) {
                let warning = Warning::InconsistentEventSpelling {
                    first: first.name.clone(),
                    found: event.name.clone(),
                };

                self.warn(warning, event.span);
            }
        }
    }

    fn moore_outputs(&mut self) {
        let machine = self.machine;
        for state in machine.states.iter().filter(|state| state.declared) {
            for (index, signal) in machine.signals.iter().enumerate() {
                let assigned = state
                    .outputs
                    .iter()
                    .any(|assignment| assignment.signal.0 as usize == index);

                if !assigned {
                    let error = ValidationError::MissingOutputInState {
                        state: state.name.clone(),
                        signal: signal.name.clone(),
                    };

                    self.error(error, state.span);
                }
            }
        }
    }

    fn completeness(&mut self) {
        let machine = self.machine;
        for state in machine.state_ids().filter(|id| machine.state(*id).declared) {
            for event in machine.event_ids() {
                let global = machine.globals.iter().any(|global| global.event == event);
                let local = machine
                    .transitions_from(state)
                    .any(|transition| transition.trigger == Trigger::Event(event));

                if !global && !local {
                    let warning = Warning::ImplicitStay {
                        state: machine.state(state).name.clone(),
                        trigger: machine.event(event).name.clone(),
                    };

                    self.warn(warning, machine.state(state).span);
                }
            }
        }
    }

    fn determinism(&mut self) {
        let machine = self.machine;
        for transition in &machine.transitions {
            let state = &machine.state(transition.source).name;
            let trigger = trigger_name(machine, transition.trigger);

            let mut conditions: Vec<&Condition> = Vec::new();
            let mut catch_all = false;

            for branch in &transition.branches {
                if catch_all {
                    let warning = Warning::UnreachableBranch {
                        state: state.clone(),
                        trigger: trigger.clone(),
                    };

                    self.warn(warning, branch.span);
                    continue;
                }

                match &branch.guard {
                    Guard::When(condition) if conditions.contains(&condition) => {
                        let warning = Warning::DuplicateCondition {
                            state: state.clone(),
                            trigger: trigger.clone(),
                        };

                        self.warn(warning, branch.span);
                    }

                    Guard::When(condition) => conditions.push(condition),
                    Guard::Always | Guard::Otherwise => catch_all = true,
                }
            }

            if !catch_all {
                log::debug!(
                    "`{}` on `{}` has no ELSE, unmatched conditions STAY",
                    state,
                    trigger
                );
            }
        }
    }

    fn globals(&mut self) {
        let machine = self.machine;
        for (index, global) in machine.globals.iter().enumerate() {
            let shadowed = machine.globals[..index]
                .iter()
                .any(|earlier| earlier.event == global.event);

            if shadowed {
                let warning = Warning::ShadowedGlobal(machine.event(global.event).name.clone());
                self.warn(warning, global.span);
            }
        }

        for transition in &machine.transitions {
            if let Trigger::Event(event) = transition.trigger {
                if machine.globals.iter().any(|global| global.event == event) {
                    let warning = Warning::OverriddenByGlobal {
                        state: machine.state(transition.source).name.clone(),
                        event: machine.event(event).name.clone(),
                    };

                    self.warn(warning, transition.span);
                }
            }
        }
    }

    fn timers(&mut self) {
        let machine = self.machine;

        // Dos arranques en una misma lista de acciones
        let action_lists = machine
            .globals
            .iter()
            .map(|global| (global.target, global.actions.as_slice(), global.span))
            .chain(machine.transitions.iter().flat_map(|transition| {
                transition.branches.iter().map(move |branch| {
                    (
                        branch.destination.resolve(transition.source),
                        branch.actions.as_slice(),
                        branch.span,
                    )
                })
            }));

        for (target, actions, span) in action_lists {
            let starts = actions.iter().filter(|action| is_start(action)).count();
            if starts > 1 {
                self.conflict(target, "more than one `START_TIMER` in a single transition", span);
            }

            let timed = machine.timer_of(target).is_some() || machine.declares_running_timer(target);
            if starts > 0 && !timed {
                self.warn(Warning::UnusedTimer(machine.state(target).name.clone()), span);
            }
        }

        for timer in &machine.timers {
            if timer.durations.len() > 1 {
                let listed: Vec<_> = timer.durations.iter().map(Duration::to_string).collect();
                let reason = format!("distinct timeouts {}", listed.join(", "));
                self.conflict(timer.owner, &reason, timer.span);
            }
        }

        for state in machine.state_ids() {
            let timer = machine.timer_of(state);
            if timer.is_none() && !machine.declares_running_timer(state) {
                continue;
            }

            self.self_loops(state);

            let incoming = machine.incoming(state);
            let duration = timer.and_then(|timer| machine.timer_duration(timer));
            let started: Vec<_> = incoming.iter().filter(|edge| edge.starts_timer()).collect();

            if started.is_empty() {
                // El encendido solo cuenta si nadie vuelve a entrar al estado
                let reentered = incoming.iter().any(|edge| edge.source != Some(state));
                let powered_on = machine.state(state).initial && duration.is_some() && !reentered;
                if !powered_on {
                    let span = timer.map_or(machine.state(state).span, |timer| timer.span);
                    let error = ValidationError::OrphanedTimeout(machine.state(state).name.clone());

                    self.error(error, span);
                }

                continue;
            }

            for edge in &incoming {
                if edge.source == Some(state) || edge.starts_timer() {
                    continue;
                }

                let from = match edge.source {
                    Some(source) => format!("`{}`", machine.state(source).name),
                    None => String::from("a global transition"),
                };

                let warning = Warning::UnstartedEntry {
                    state: machine.state(state).name.clone(),
                    from,
                };

                self.warn(warning, edge.span);
            }

            let timeout = match timer.and_then(|timer| timer.durations.first()) {
                Some(timeout) => *timeout,
                None => continue,
            };

            for edge in started {
                for action in edge.actions {
                    if let Action::StartTimer(started) = action {
                        if started.as_millis() != timeout.as_millis() {
                            let warning = Warning::TimerDurationMismatch {
                                state: machine.state(state).name.clone(),
                                started: *started,
                                timeout,
                            };

                            self.warn(warning, edge.span);
                        }
                    }
                }
            }
        }
    }

    /// Un lazo sobre un estado temporizado no puede reiniciar su
    /// temporizador sin detenerlo primero.
    fn self_loops(&mut self, state: StateId) {
        let machine = self.machine;
        for transition in machine.transitions_from(state) {
            for branch in &transition.branches {
                if branch.destination.resolve(state) != state {
                    continue;
                }

                let mut stopped = false;
                for action in &branch.actions {
                    match action {
                        Action::StopTimer | Action::StopAllTimers => stopped = true,
                        Action::StartTimer(_) if !stopped => {
                            let reason = "timer restarted on a self-loop without `STOP_TIMER`";
                            self.conflict(state, reason, branch.span);
                        }

                        _ => (),
                    }
                }
            }
        }
    }

    fn reachability(&mut self) {
        let machine = self.machine;
        let initial = match machine.initial() {
            Some(initial) => initial,
            None => return,
        };

        let mut reached = vec![false; machine.states.len()];
        let mut queue = VecDeque::from([initial]);
        reached[initial.0 as usize] = true;

        while let Some(state) = queue.pop_front() {
            for next in successors(machine, state) {
                if !reached[next.0 as usize] {
                    reached[next.0 as usize] = true;
                    queue.push_back(next);
                }
            }
        }

        for state in machine.state_ids() {
            let declared = machine.state(state);
            if !declared.declared {
                continue;
            }

            if !reached[state.0 as usize] {
                self.warn(Warning::UnreachableState(declared.name.clone()), declared.span);
            } else if successors(machine, state).all(|next| next == state) {
                self.warn(Warning::PotentialDeadlock(declared.name.clone()), declared.span);
            }
        }
    }

    fn unresolved(&mut self, what: &'static str, name: String, span: Span) {
        self.error(ValidationError::UnresolvedReference { what, name }, span);
    }

    fn conflict(&mut self, state: StateId, reason: &str, span: Span) {
        let error = ValidationError::TimerConflict {
            state: self.machine.state(state).name.clone(),
            reason: reason.to_owned(),
        };

        self.error(error, span);
    }

    fn error(&mut self, error: ValidationError, span: Span) {
        self.diagnostics.push(Diagnostic::error(&error, Some(span)));
    }

    fn error_unlocated(&mut self, error: ValidationError) {
        self.diagnostics.push(Diagnostic::error(&error, None));
    }

    fn warn(&mut self, warning: Warning, span: Span) {
        self.diagnostics.push(Diagnostic::warning(&warning, Some(span)));
    }
}

/// Estados a los que puede transitarse desde `state`.
fn successors(machine: &Machine, state: StateId) -> impl Iterator<Item = StateId> + '_ {
    let globals = machine.globals.iter().map(|global| global.target);
    let locals = machine.transitions_from(state).flat_map(move |transition| {
        transition
            .branches
            .iter()
            .map(move |branch| branch.destination.resolve(state))
    });

    globals.chain(locals)
}

fn trigger_name(machine: &Machine, trigger: Trigger) -> String {
    match trigger {
        Trigger::Timeout => String::from("ON_TIMEOUT"),
        Trigger::Event(event) => machine.event(event).name.clone(),
    }
}

fn is_start(action: &Action) -> bool {
    matches!(action, Action::StartTimer(_))
}
