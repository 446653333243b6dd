//! Representación intermedia.
//!
//! La IR es la forma canónica de una especificación entre el análisis
//! sintáctico y la generación de código. Todas las referencias entre
//! entidades se resuelven a identificadores numéricos estables, los
//! cuales son índices en las respectivas tablas de [`Machine`].
//!
//! Este es también el formato de intercambio documentado entre el
//! front end y el back end: toda la estructura es serializable y
//! deserializable sin pérdida por medio de `serde`.

use crate::source::Span;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Señal de salida cuyo nivel `RUNNING` indica un temporizador activo.
pub const TIMER_SIGNAL: &str = "Timer";

/// Nivel que indica un temporizador activo.
pub const TIMER_RUNNING: &str = "RUNNING";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Especificación completa.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub header: Header,
    pub states: Vec<State>,
    pub signals: Vec<Signal>,
    pub events: Vec<Event>,
    pub variables: Vec<Variable>,
    pub timers: Vec<Timer>,
    pub globals: Vec<GlobalTransition>,
    pub transitions: Vec<LocalTransition>,
}

/// Metadatos opacos del encabezado.
///
/// Nada aquí tiene efecto semántico.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub feature: Option<String>,
    pub intent: Option<String>,
    pub assumptions: Vec<String>,
    pub hints: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,

    /// Falso para estados referenciados pero nunca declarados en
    /// `STATE_LIST`.
    pub declared: bool,
    pub initial: bool,
    pub outputs: Vec<Assignment>,
    pub comment: Option<String>,
    #[serde(default)]
    pub span: Span,
}

impl State {
    /// Busca el nivel asignado a una señal.
    pub fn level(&self, signal: SignalId) -> Option<&str> {
        self.outputs
            .iter()
            .find(|assignment| assignment.signal == signal)
            .map(|assignment| assignment.level.as_str())
    }
}

/// Par señal-nivel de la función de salida de un estado.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub signal: SignalId,
    pub level: String,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub domain: Domain,

    /// Niveles admisibles en orden de codificación.
    pub levels: Vec<String>,
}

/// Vocabulario de niveles de una señal de salida.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Digital,
    Indicator,
    Timer,
    Boolean,
    Enumerated,
}

impl Domain {
    /// Vocabularios predefinidos. El orden de cada lista es el de
    /// su codificación en hardware.
    pub const BUILTIN: &'static [(Domain, &'static [&'static str])] = &[
        (Domain::Digital, &["LOW", "HIGH"]),
        (Domain::Indicator, &["OFF", "ON", "BLINK"]),
        (Domain::Timer, &["STOPPED", "RUNNING"]),
        (Domain::Boolean, &["FALSE", "TRUE"]),
    ];

    /// Encuentra el vocabulario predefinido al que pertenece un nivel.
    pub fn of_level(level: &str) -> Option<(Domain, &'static str)> {
        Self::BUILTIN.iter().find_map(|&(domain, levels)| {
            levels
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(level))
                .map(|&canonical| (domain, canonical))
        })
    }

    /// Niveles de un vocabulario predefinido.
    pub fn builtin_levels(self) -> Option<&'static [&'static str]> {
        Self::BUILTIN
            .iter()
            .find(|(domain, _)| *domain == self)
            .map(|(_, levels)| *levels)
    }
}

impl Display for Domain {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.builtin_levels() {
            Some(levels) => write!(fmt, "{{{}}}", levels.join(", ")),
            None => fmt.write_str("custom enumeration"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub span: Span,
}

/// Variable de entrada referenciada por alguna condición.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Booleana, usada sin comparación.
    Flag,

    /// Comparada contra constantes enteras.
    Numeric { max: u64 },

    /// Comparada contra símbolos, en orden de aparición.
    Symbolic { symbols: Vec<String> },
}

/// Temporizador implícito de un estado.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub owner: StateId,

    /// Duraciones distintas declaradas por `ON_TIMEOUT`, en orden.
    pub durations: Vec<Duration>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub value: u64,
    pub unit: TimeUnit,
}

impl Duration {
    pub fn as_millis(&self) -> u128 {
        let scale = match self.unit {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
        };

        u128::from(self.value) * scale
    }
}

impl Display for Duration {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
        };

        write!(fmt, "{}{}", self.value, unit)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

/// Disparador de una transición.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Expiración del temporizador del estado actual.
    Timeout,
    Event(EventId),
}

/// Transición con prioridad absoluta, válida desde cualquier estado.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalTransition {
    pub event: EventId,
    pub actions: Vec<Action>,
    pub target: StateId,
    pub comment: Option<String>,
    #[serde(default)]
    pub span: Span,
}

/// Todas las ramas de un par (estado, disparador), en orden de
/// declaración. La primera rama cuya guarda se cumple gana.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTransition {
    pub source: StateId,
    pub trigger: Trigger,
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub guard: Guard,
    pub destination: Destination,
    pub actions: Vec<Action>,
    pub comment: Option<String>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Sin `IF`.
    Always,
    When(Condition),

    /// `ELSE`.
    Otherwise,
}

impl Guard {
    /// Una guarda que siempre se cumple.
    pub fn is_catch_all(&self) -> bool {
        !matches!(self, Guard::When(_))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Stay,
    To(StateId),
}

impl Destination {
    /// Estado efectivo al tomar la transición desde `source`.
    pub fn resolve(self, source: StateId) -> StateId {
        match self {
            Destination::Stay => source,
            Destination::To(target) => target,
        }
    }
}

/// Expresión booleana sobre variables de entrada.
///
/// La igualdad es estructural, lo cual permite detectar condiciones
/// sintácticamente idénticas.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Flag(VarId),
    Compare {
        var: VarId,
        op: CmpOp,
        value: Literal,
    },
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    /// Visita todas las variables referenciadas.
    pub fn for_each_var<F: FnMut(VarId)>(&self, callback: &mut F) {
        match self {
            Condition::Flag(var) | Condition::Compare { var, .. } => callback(*var),
            Condition::Not(inner) => inner.for_each_var(callback),
            Condition::All(terms) | Condition::Any(terms) => {
                terms.iter().for_each(|term| term.for_each_var(callback))
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn is_ordering(self) -> bool {
        !matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    pub fn holds(self, lhs: u64, rhs: u64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

impl Display for CmpOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(u64),
    Symbol(String),
}

impl Display for Literal {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(value) => write!(fmt, "{}", value),
            Literal::Symbol(symbol) => fmt.write_str(symbol),
        }
    }
}

/// Acción que se dispara una única vez en el flanco de una transición.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StartTimer(Duration),
    StopTimer,
    StopAllTimers,
    ClearAlarm,
    Custom { name: String, args: Vec<String> },
}

impl Action {
    /// Nombre del pulso de salida asociado, si la acción produce uno.
    pub fn strobe(&self) -> Option<&str> {
        match self {
            Action::ClearAlarm => Some("CLEAR_ALARM"),
            Action::Custom { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl Display for Action {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::StartTimer(duration) => write!(fmt, "START_TIMER({})", duration),
            Action::StopTimer => fmt.write_str("STOP_TIMER"),
            Action::StopAllTimers => fmt.write_str("STOP_ALL_TIMERS"),
            Action::ClearAlarm => fmt.write_str("CLEAR_ALARM"),
            Action::Custom { name, args } if args.is_empty() => fmt.write_str(name),
            Action::Custom { name, args } => write!(fmt, "{}({})", name, args.join(", ")),
        }
    }
}

impl Machine {
    pub fn state(&self, StateId(id): StateId) -> &State {
        &self.states[id as usize]
    }

    pub fn event(&self, EventId(id): EventId) -> &Event {
        &self.events[id as usize]
    }

    pub fn signal(&self, SignalId(id): SignalId) -> &Signal {
        &self.signals[id as usize]
    }

    pub fn variable(&self, VarId(id): VarId) -> &Variable {
        &self.variables[id as usize]
    }

    pub fn state_ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len() as u32).map(StateId)
    }

    pub fn event_ids(&self) -> impl Iterator<Item = EventId> {
        (0..self.events.len() as u32).map(EventId)
    }

    pub fn state_named(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state.name == name)
            .map(|index| StateId(index as u32))
    }

    pub fn event_named(&self, name: &str) -> Option<EventId> {
        self.events
            .iter()
            .position(|event| event.name == name)
            .map(|index| EventId(index as u32))
    }

    /// Estado de encendido. Solo es confiable tras validación.
    pub fn initial(&self) -> Option<StateId> {
        self.states
            .iter()
            .position(|state| state.initial)
            .map(|index| StateId(index as u32))
    }

    /// Temporizador propiedad de un estado.
    pub fn timer_of(&self, state: StateId) -> Option<&Timer> {
        self.timers.iter().find(|timer| timer.owner == state)
    }

    /// Transiciones locales con origen en un estado.
    pub fn transitions_from(&self, state: StateId) -> impl Iterator<Item = &LocalTransition> {
        self.transitions
            .iter()
            .filter(move |transition| transition.source == state)
    }

    /// Determina si un estado declara `Timer=RUNNING`.
    pub fn declares_running_timer(&self, state: StateId) -> bool {
        self.state(state).outputs.iter().any(|assignment| {
            self.signal(assignment.signal).name == TIMER_SIGNAL
                && assignment.level == TIMER_RUNNING
        })
    }

    /// Todas las aristas entrantes de un estado: globales primero, luego
    /// locales en orden de declaración. `STAY` no cuenta como entrada.
    pub fn incoming(&self, state: StateId) -> Vec<Edge<'_>> {
        let globals = self
            .globals
            .iter()
            .filter(move |global| global.target == state)
            .map(|global| Edge {
                source: None,
                actions: &global.actions,
                span: global.span,
            });

        let locals = self.transitions.iter().flat_map(move |transition| {
            transition
                .branches
                .iter()
                .filter(move |branch| branch.destination == Destination::To(state))
                .map(move |branch| Edge {
                    source: Some(transition.source),
                    actions: &branch.actions,
                    span: branch.span,
                })
        });

        globals.chain(locals).collect()
    }

    /// Duración efectiva de un temporizador.
    ///
    /// Es la duración de `ON_TIMEOUT` o, en su defecto, la del primer
    /// `START_TIMER` que ingresa al estado dueño.
    pub fn timer_duration(&self, timer: &Timer) -> Option<Duration> {
        timer.durations.first().copied().or_else(|| {
            self.incoming(timer.owner)
                .iter()
                .flat_map(|edge| edge.actions.iter())
                .find_map(|action| match action {
                    Action::StartTimer(duration) => Some(*duration),
                    _ => None,
                })
        })
    }

    /// Serializa la IR como JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Reconstruye una IR a partir de JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Machine> {
        serde_json::from_str(json)
    }
}

/// Arista entrante a un estado.
///
/// `source` es `None` para transiciones globales, cuyo origen es
/// cualquier estado.
#[derive(Copy, Clone, Debug)]
pub struct Edge<'a> {
    pub source: Option<StateId>,
    pub actions: &'a [Action],
    pub span: Span,
}

impl Edge<'_> {
    pub fn starts_timer(&self) -> bool {
        self.actions
            .iter()
            .any(|action| matches!(action, Action::StartTimer(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_domains_are_case_insensitive() {
        assert_eq!(Domain::of_level("high"), Some((Domain::Digital, "HIGH")));
        assert_eq!(Domain::of_level("Blink"), Some((Domain::Indicator, "BLINK")));
        assert_eq!(Domain::of_level("AJAR"), None);
    }

    #[test]
    fn durations_scale_to_millis() {
        let minutes = Duration {
            value: 2,
            unit: TimeUnit::Minutes,
        };

        assert_eq!(minutes.as_millis(), 120_000);
        assert_eq!(minutes.to_string(), "2min");
    }

    #[test]
    fn destination_stay_resolves_to_source() {
        assert_eq!(Destination::Stay.resolve(StateId(3)), StateId(3));
        assert_eq!(Destination::To(StateId(1)).resolve(StateId(3)), StateId(1));
    }
}
