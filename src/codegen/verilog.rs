use super::{
    encoding::{index_width, value_width, StateCodes},
    CounterReport, GenFlags, Options,
};

use crate::{
    annotate::{Hint, Subject},
    ir::{
        Action, Condition, Duration, Guard, Literal, Machine, SignalId, StateId, Trigger, VarId,
        VariableKind,
    },
    resolve::{Arm, Resolution, Table},
    validate::Validated,
};

use std::io::{self, Write};

/// Escritor de un módulo Verilog-2001.
pub struct Module<'a, W> {
    output: &'a mut W,
    machine: &'a Machine,
    table: &'a Table,
    hints: &'a [Hint],
    options: &'a Options,
    codes: StateCodes,
    counters: Vec<Counter>,
    strobes: Vec<String>,
    depth: usize,
}

/// Contador de un temporizador con duración conocida.
struct Counter {
    owner: StateId,
    name: String,
    duration: Duration,
    cycles: u64,
    limit: u64,
    width: u32,
}

impl<'a, W: Write> Module<'a, W> {
    pub fn new(
        machine: Validated<'a>,
        table: &'a Table,
        hints: &'a [Hint],
        options: &'a Options,
        codes: StateCodes,
        output: &'a mut W,
    ) -> Self {
        let machine = machine.machine();

        let mut counters = Vec::new();
        for timer in &machine.timers {
            let name = machine.state(timer.owner).name.clone();
            let duration = match machine.timer_duration(timer) {
                Some(duration) => duration,
                None => {
                    log::warn!("Timer of `{}` has no known duration, it will never expire", name);
                    continue;
                }
            };

            let cycles = cycles(&duration, options.clock_hz);
            let limit = cycles.saturating_sub(1);

            counters.push(Counter {
                owner: timer.owner,
                name,
                duration,
                cycles,
                limit,
                width: value_width(u128::from(limit)),
            });
        }

        let mut strobes: Vec<String> = Vec::new();
        let global_actions = machine.globals.iter().flat_map(|global| &global.actions);
        let local_actions = machine
            .transitions
            .iter()
            .flat_map(|transition| &transition.branches)
            .flat_map(|branch| &branch.actions);

        for action in global_actions.chain(local_actions) {
            if let Some(strobe) = action.strobe() {
                if !strobes.iter().any(|known| known == strobe) {
                    strobes.push(strobe.to_owned());
                }
            }
        }

        Module {
            output,
            machine,
            table,
            hints,
            options,
            codes,
            counters,
            strobes,
            depth: 0,
        }
    }

    pub fn write(mut self) -> io::Result<Vec<CounterReport>> {
        self.preamble()?;
        self.ports()?;
        self.parameters()?;
        self.registers()?;
        self.next_state()?;
        self.sequential()?;
        self.timers()?;
        self.outputs()?;
        emit!(self, "endmodule")?;

        Ok(self
            .counters
            .iter()
            .map(|counter| CounterReport {
                state: counter.name.clone(),
                duration: counter.duration.to_string(),
                cycles: counter.cycles,
                width: counter.width,
            })
            .collect())
    }

    fn comments(&self) -> bool {
        self.options.flags.contains(GenFlags::COMMENTS)
    }

    fn preamble(&mut self) -> io::Result<()> {
        if self.comments() {
            let machine = self.machine;
            let header = &machine.header;
            let hints = self.hints_for(Subject::Machine);

            emit!(self, "// Generated by fsmc, do not edit")?;
            if let Some(feature) = &header.feature {
                emit!(self, "// FEATURE: {}", feature)?;
            }

            if let Some(intent) = &header.intent {
                emit!(self, "// INTENT: {}", intent)?;
            }

            for assumption in &header.assumptions {
                emit!(self, "// ASSUME: {}", assumption)?;
            }

            for hint in hints {
                emit!(self, "// hint: {}", hint)?;
            }

            emit!(self)?;
        }

        Ok(())
    }

    fn ports(&mut self) -> io::Result<()> {
        let machine = self.machine;

        let mut ports = vec![
            port("input", "wire", 1, "clk"),
            port("input", "wire", 1, "rst"),
        ];

        for event in &machine.events {
            ports.push(port("input", "wire", 1, &format!("ev_{}", event.name)));
        }

        for (variable, id) in machine.variables.iter().zip(0..) {
            let width = self.variable_width(VarId(id));
            ports.push(port("input", "wire", width, &format!("in_{}", variable.name)));
        }

        for signal in &machine.signals {
            let width = index_width(signal.levels.len() as u128);
            ports.push(port("output", "reg", width, &format!("out_{}", signal.name)));
        }

        for strobe in &self.strobes {
            ports.push(port("output", "reg", 1, &format!("act_{}", strobe)));
        }

        emit!(self, "module {} (", self.options.module)?;
        self.depth += 1;

        let last = ports.len() - 1;
        for (index, port) in ports.iter().enumerate() {
            let separator = if index == last { "" } else { "," };
            emit!(self, "{}{}", port, separator)?;
        }

        self.depth -= 1;
        emit!(self, ");")?;
        emit!(self)
    }

    fn parameters(&mut self) -> io::Result<()> {
        let machine = self.machine;
        self.depth += 1;

        let state_range = range(self.codes.width());
        for (index, state) in machine.states.iter().enumerate() {
            let code = self.codes.literal(index);
            emit!(self, "localparam {}S_{} = {};", state_range, state.name, code)?;
        }

        for signal in &machine.signals {
            let width = index_width(signal.levels.len() as u128);
            for (index, level) in signal.levels.iter().enumerate() {
                emit!(
                    self,
                    "localparam {}L_{}__{} = {}'d{};",
                    range(width),
                    signal.name,
                    level,
                    width,
                    index
                )?;
            }
        }

        for variable in &machine.variables {
            if let VariableKind::Symbolic { symbols } = &variable.kind {
                let width = index_width(symbols.len() as u128);
                for (index, symbol) in symbols.iter().enumerate() {
                    emit!(
                        self,
                        "localparam {}C_{}__{} = {}'d{};",
                        range(width),
                        variable.name,
                        symbol,
                        width,
                        index
                    )?;
                }
            }
        }

        self.depth -= 1;
        emit!(self)
    }

    fn registers(&mut self) -> io::Result<()> {
        self.depth += 1;

        let state_range = range(self.codes.width());
        emit!(self, "reg {}state_q;", state_range)?;
        emit!(self, "reg {}state_d;", state_range)?;

        for strobe in &self.strobes {
            emit!(self, "reg act_{}_d;", strobe)?;
        }

        for counter in &self.counters {
            let name = &counter.name;

            emit!(self)?;
            if self.options.flags.contains(GenFlags::COMMENTS) {
                emit!(
                    self,
                    "// Timer of {}: {} at {} Hz is {} cycle(s)",
                    name,
                    counter.duration,
                    self.options.clock_hz,
                    counter.cycles
                )?;
            }

            emit!(self, "reg {}tmr_{}_count;", range(counter.width), name)?;
            emit!(self, "reg tmr_{}_run;", name)?;
            emit!(self, "reg tmr_{}_start;", name)?;
            emit!(self, "reg tmr_{}_stop;", name)?;
            emit!(
                self,
                "wire tmr_{0}_expired = tmr_{0}_run && tmr_{0}_count == {1}'d{2};",
                name,
                counter.width,
                counter.limit
            )?;
        }

        self.depth -= 1;
        emit!(self)
    }

    fn next_state(&mut self) -> io::Result<()> {
        let machine = self.machine;
        let table = self.table;

        self.depth += 1;
        emit!(self, "always @(*) begin")?;
        self.depth += 1;

        emit!(self, "state_d = state_q;")?;
        for strobe in &self.strobes {
            emit!(self, "act_{}_d = 1'b0;", strobe)?;
        }

        for counter in &self.counters {
            emit!(self, "tmr_{}_start = 1'b0;", counter.name)?;
            emit!(self, "tmr_{}_stop = 1'b0;", counter.name)?;
        }

        emit!(self)?;

        let overrides = table.overrides();
        for (index, global) in overrides.iter().enumerate() {
            let keyword = if index == 0 { "if" } else { "end else if" };
            emit!(self, "{} (ev_{}) begin", keyword, machine.event(global.event).name)?;

            self.depth += 1;
            if let Some(position) = machine
                .globals
                .iter()
                .position(|declared| declared.event == global.event)
            {
                self.annotations(Subject::Global(position))?;
            }

            self.transition(None, global.target, &global.actions)?;
            self.depth -= 1;
        }

        if !overrides.is_empty() {
            emit!(self, "end else begin")?;
            self.depth += 1;
        }

        emit!(self, "case (state_q)")?;
        self.depth += 1;

        for state in machine.state_ids() {
            self.state_arm(state)?;
        }

        let initial = self.initial_param();
        emit!(self, "default: state_d = {};", initial)?;

        self.depth -= 1;
        emit!(self, "endcase")?;

        if !overrides.is_empty() {
            self.depth -= 1;
            emit!(self, "end")?;
        }

        self.depth -= 1;
        emit!(self, "end")?;
        self.depth -= 1;
        emit!(self)
    }

    fn state_arm(&mut self, state: StateId) -> io::Result<()> {
        let machine = self.machine;
        let table = self.table;
        let name = &machine.state(state).name;

        let resolutions: Vec<&Resolution> = table.resolutions_of(state).collect();
        if resolutions.is_empty() {
            return emit!(self, "S_{}: state_d = state_q;", name);
        }

        emit!(self, "S_{}: begin", name)?;
        self.depth += 1;

        if self.comments() {
            if let Some(comment) = &machine.state(state).comment {
                emit!(self, "// {}", comment)?;
            }
        }

        self.annotations(Subject::State(state))?;

        for (index, resolution) in resolutions.iter().enumerate() {
            let strobe = match resolution.trigger {
                Trigger::Timeout => self.expired(state),
                Trigger::Event(event) => format!("ev_{}", machine.event(event).name),
            };

            let keyword = if index == 0 { "if" } else { "end else if" };
            emit!(self, "{} ({}) begin", keyword, strobe)?;

            self.depth += 1;
            self.chain(resolution)?;
            self.depth -= 1;
        }

        emit!(self, "end")?;
        self.depth -= 1;
        emit!(self, "end")
    }

    /// Ramas de un par (estado, disparador) en orden de prioridad.
    fn chain(&mut self, resolution: &Resolution) -> io::Result<()> {
        let machine = self.machine;
        let declared = machine.transitions.iter().position(|transition| {
            transition.source == resolution.state && transition.trigger == resolution.trigger
        });

        let mut open = false;
        for (index, arm) in resolution.arms.iter().enumerate() {
            let subject = declared.map(|declared| Subject::Transition(declared, index));

            match &arm.guard {
                Guard::When(condition) => {
                    let keyword = if open { "end else if" } else { "if" };
                    let condition = self.condition(condition);
                    emit!(self, "{} ({}) begin", keyword, condition)?;

                    self.depth += 1;
                    self.arm(resolution.state, arm, subject)?;
                    self.depth -= 1;
                    open = true;
                }

                Guard::Always | Guard::Otherwise => {
                    if open {
                        emit!(self, "end else begin")?;
                        self.depth += 1;
                        self.arm(resolution.state, arm, subject)?;
                        self.depth -= 1;
                    } else {
                        self.arm(resolution.state, arm, subject)?;
                    }

                    break;
                }
            }
        }

        if open {
            emit!(self, "end")?;
        }

        Ok(())
    }

    fn arm(&mut self, source: StateId, arm: &Arm, subject: Option<Subject>) -> io::Result<()> {
        if let Some(subject) = subject {
            self.annotations(subject)?;
        }

        self.transition(Some(source), arm.target, &arm.actions)
    }

    /// Cambio de estado y acciones de una transición.
    ///
    /// `source` es `None` para transiciones globales.
    fn transition(
        &mut self,
        source: Option<StateId>,
        target: StateId,
        actions: &[Action],
    ) -> io::Result<()> {
        let machine = self.machine;
        emit!(self, "state_d = S_{};", machine.state(target).name)?;

        for action in actions {
            let stopped: Vec<String> = match (action, source) {
                (Action::StopTimer, Some(source)) => self
                    .counter_of(source)
                    .map(|counter| counter.name.clone())
                    .into_iter()
                    .collect(),

                // Desde cualquier estado se detiene el temporizador activo
                (Action::StopTimer, None) | (Action::StopAllTimers, _) => self
                    .counters
                    .iter()
                    .map(|counter| counter.name.clone())
                    .collect(),

                _ => Vec::new(),
            };

            for name in stopped {
                emit!(self, "tmr_{}_stop = 1'b1;", name)?;
            }

            match action {
                Action::StartTimer(_) => {
                    let started = self.counter_of(target).map(|counter| counter.name.clone());
                    if let Some(name) = started {
                        emit!(self, "tmr_{}_start = 1'b1;", name)?;
                    }
                }

                _ => {
                    if let Some(strobe) = action.strobe() {
                        emit!(self, "act_{}_d = 1'b1;", strobe)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn sequential(&mut self) -> io::Result<()> {
        let initial = self.initial_param();
        let sensitivity = self.sensitivity();

        self.depth += 1;
        emit!(self, "{} begin", sensitivity)?;
        self.depth += 1;

        emit!(self, "if (rst) begin")?;
        self.depth += 1;
        emit!(self, "state_q <= {};", initial)?;
        for strobe in &self.strobes {
            emit!(self, "act_{} <= 1'b0;", strobe)?;
        }

        self.depth -= 1;
        emit!(self, "end else begin")?;
        self.depth += 1;
        emit!(self, "state_q <= state_d;")?;
        for strobe in &self.strobes {
            emit!(self, "act_{0} <= act_{0}_d;", strobe)?;
        }

        self.depth -= 1;
        emit!(self, "end")?;
        self.depth -= 1;
        emit!(self, "end")?;
        self.depth -= 1;
        emit!(self)
    }

    fn timers(&mut self) -> io::Result<()> {
        let sensitivity = self.sensitivity();
        let initial = self.machine.initial();

        self.depth += 1;
        for counter in &self.counters {
            let name = &counter.name;
            let width = counter.width;

            // El estado inicial arranca su temporizador al encender
            let powered = u8::from(initial == Some(counter.owner));

            emit!(self, "{} begin", sensitivity)?;
            self.depth += 1;

            emit!(self, "if (rst) begin")?;
            self.depth += 1;
            emit!(self, "tmr_{}_count <= {}'d0;", name, width)?;
            emit!(self, "tmr_{}_run <= 1'b{};", name, powered)?;
            self.depth -= 1;

            emit!(self, "end else if (tmr_{}_start) begin", name)?;
            self.depth += 1;
            emit!(self, "tmr_{}_count <= {}'d0;", name, width)?;
            emit!(self, "tmr_{}_run <= 1'b1;", name)?;
            self.depth -= 1;

            emit!(self, "end else if (tmr_{0}_stop || tmr_{0}_expired) begin", name)?;
            self.depth += 1;
            emit!(self, "tmr_{}_run <= 1'b0;", name)?;
            self.depth -= 1;

            emit!(self, "end else if (tmr_{}_run) begin", name)?;
            self.depth += 1;
            emit!(self, "tmr_{0}_count <= tmr_{0}_count + 1'b1;", name)?;
            self.depth -= 1;

            emit!(self, "end")?;
            self.depth -= 1;
            emit!(self, "end")?;
            emit!(self)?;
        }

        self.depth -= 1;
        Ok(())
    }

    fn outputs(&mut self) -> io::Result<()> {
        let machine = self.machine;
        if machine.signals.is_empty() {
            return Ok(());
        }

        self.depth += 1;
        emit!(self, "always @(*) begin")?;
        self.depth += 1;
        emit!(self, "case (state_q)")?;
        self.depth += 1;

        for (state, id) in machine.states.iter().zip(machine.state_ids()) {
            emit!(self, "S_{}: begin", state.name)?;
            self.depth += 1;
            self.decode(id)?;
            self.depth -= 1;
            emit!(self, "end")?;
        }

        emit!(self, "default: begin")?;
        self.depth += 1;
        self.decode(machine.initial().unwrap_or(StateId(0)))?;
        self.depth -= 1;
        emit!(self, "end")?;

        self.depth -= 1;
        emit!(self, "endcase")?;
        self.depth -= 1;
        emit!(self, "end")?;
        self.depth -= 1;
        emit!(self)
    }

    /// Asignación de todas las salidas para un estado.
    fn decode(&mut self, state: StateId) -> io::Result<()> {
        let machine = self.machine;

        for (signal, id) in machine.signals.iter().zip(0..) {
            let value = match machine.state(state).level(SignalId(id)) {
                Some(level) => format!("L_{}__{}", signal.name, level),
                None => format!("{}'d0", index_width(signal.levels.len() as u128)),
            };

            emit!(self, "out_{} = {};", signal.name, value)?;
        }

        Ok(())
    }

    fn annotations(&mut self, subject: Subject) -> io::Result<()> {
        if !self.comments() {
            return Ok(());
        }

        for hint in self.hints_for(subject) {
            emit!(self, "// hint: {}", hint)?;
        }

        Ok(())
    }

    fn hints_for(&self, subject: Subject) -> Vec<String> {
        self.hints
            .iter()
            .filter(|hint| hint.subject == subject)
            .map(|hint| hint.kind.to_string())
            .collect()
    }

    fn condition(&self, condition: &Condition) -> String {
        match condition {
            Condition::All(terms) => self.join(terms, " && "),
            Condition::Any(terms) => self.join(terms, " || "),
            _ => self.term(condition),
        }
    }

    fn term(&self, condition: &Condition) -> String {
        let machine = self.machine;

        match condition {
            Condition::Flag(var) => format!("in_{}", machine.variable(*var).name),
            Condition::Not(inner) => format!("!({})", self.condition(inner)),
            Condition::All(_) | Condition::Any(_) => format!("({})", self.condition(condition)),

            Condition::Compare { var, op, value } => {
                let name = &machine.variable(*var).name;
                match value {
                    Literal::Int(value) => {
                        format!("in_{} {} {}'d{}", name, op, self.variable_width(*var), value)
                    }

                    Literal::Symbol(symbol) => format!("in_{0} {1} C_{0}__{2}", name, op, symbol),
                }
            }
        }
    }

    fn join(&self, terms: &[Condition], operator: &str) -> String {
        terms
            .iter()
            .map(|term| self.term(term))
            .collect::<Vec<_>>()
            .join(operator)
    }

    fn variable_width(&self, var: VarId) -> u32 {
        match &self.machine.variable(var).kind {
            VariableKind::Flag => 1,
            VariableKind::Numeric { max } => {
                value_width(u128::from(*max)).max(self.options.numeric_width)
            }

            VariableKind::Symbolic { symbols } => index_width(symbols.len() as u128),
        }
    }

    fn counter_of(&self, state: StateId) -> Option<&Counter> {
        self.counters.iter().find(|counter| counter.owner == state)
    }

    fn expired(&self, state: StateId) -> String {
        match self.counter_of(state) {
            Some(counter) => format!("tmr_{}_expired", counter.name),
            None => String::from("1'b0"),
        }
    }

    fn initial_param(&self) -> String {
        let initial = self.machine.initial().unwrap_or(StateId(0));
        format!("S_{}", self.machine.state(initial).name)
    }

    fn sensitivity(&self) -> &'static str {
        if self.options.flags.contains(GenFlags::ASYNC_RESET) {
            "always @(posedge clk or posedge rst)"
        } else {
            "always @(posedge clk)"
        }
    }
}

/// Ciclos de reloj de una duración, saturados a `u64::MAX`.
fn cycles(duration: &Duration, clock_hz: u64) -> u64 {
    duration
        .as_millis()
        .checked_mul(u128::from(clock_hz))
        .map_or(u64::MAX, |product| u64::try_from(product / 1000).unwrap_or(u64::MAX))
}

fn range(width: u32) -> String {
    if width > 1 {
        format!("[{}:0] ", width - 1)
    } else {
        String::new()
    }
}

fn port(direction: &str, kind: &str, width: u32, name: &str) -> String {
    format!("{:<6} {:<4} {:<7}{}", direction, kind, range(width), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        annotate::{Annotator, CommentAnnotator},
        codegen::{emit, Encoding, Report},
        ir::TimeUnit,
        lex, resolve, validate,
    };

    const DOOR: &str = "\
# FEATURE: Door controller
# HINT: encoding=one-hot
GLOBAL_TRANSITIONS:
    ON_EVENT(RESET): DO(CLEAR_ALARM) -> TO(CLOSED)
STATE_LIST:
    INITIAL CLOSED [OUTPUT: Lock=HIGH, Timer=STOPPED]
    OPEN [OUTPUT: Lock=LOW, Timer=RUNNING] # critical
TRANSITIONS:
    FROM(CLOSED):
        ON_EVENT(PUSH): IF Badge == VALID DO(START_TIMER(2s)) -> TO(OPEN)
        ON_EVENT(PUSH): ELSE -> STAY
    FROM(OPEN):
        ON_TIMEOUT(2s): -> TO(CLOSED)
        ON_EVENT(PUSH): DO(STOP_TIMER, START_TIMER(2s)) -> STAY
";

    fn generate(options: &Options) -> (String, Report) {
        let (start, tokens) = lex::tokenize(DOOR, "door.fsm");
        let tokens = tokens.expect("lexer errors");
        let ast = crate::parse::parse(&start, &tokens).expect("parser errors");
        let machine = ast.lower().expect("builder errors");

        let verdict = validate::validate(&machine);
        let validated = verdict.validated().expect("validation errors");
        let table = resolve::resolve(validated);
        let hints = CommentAnnotator.annotate(&machine);

        let mut output = Vec::new();
        let report = emit(validated, &table, &hints, options, &mut output).expect("I/O error");

        (String::from_utf8(output).expect("UTF-8"), report)
    }

    #[test]
    fn module_interface() {
        let options = Options {
            module: "door".to_owned(),
            ..Default::default()
        };

        let (verilog, report) = generate(&options);

        assert!(verilog.contains("module door ("));
        assert!(verilog.contains("ev_RESET"));
        assert!(verilog.contains("ev_PUSH"));
        assert!(verilog.contains("in_Badge"));
        assert!(verilog.contains("out_Lock"));
        assert!(verilog.contains("act_CLEAR_ALARM"));
        assert!(verilog.trim_end().ends_with("endmodule"));

        assert_eq!(report.encoding, Encoding::OneHot);
        assert_eq!(report.state_width, 2);
        assert!(verilog.contains("localparam [1:0] S_OPEN = 2'b10;"));
    }

    #[test]
    fn globals_come_before_local_cases() {
        let (verilog, _) = generate(&Options::default());

        let global = verilog.find("if (ev_RESET) begin").expect("global override");
        let case = verilog.find("case (state_q)").expect("next state case");
        assert!(global < case);
        assert!(verilog.contains("if (in_Badge == C_Badge__VALID) begin"));
    }

    #[test]
    fn timer_counter_uses_clock() {
        let options = Options {
            clock_hz: 1_000,
            encoding: Encoding::Binary,
            ..Default::default()
        };

        let (verilog, report) = generate(&options);

        assert_eq!(report.counters.len(), 1);
        let counter = &report.counters[0];
        assert_eq!(counter.state, "OPEN");
        assert_eq!(counter.cycles, 2_000);
        assert_eq!(counter.width, 11);

        assert!(verilog.contains("wire tmr_OPEN_expired = tmr_OPEN_run && tmr_OPEN_count == 11'd1999;"));
        assert!(verilog.contains("tmr_OPEN_start = 1'b1;"));
        assert!(verilog.contains("tmr_OPEN_stop = 1'b1;"));
    }

    #[test]
    fn huge_timeouts_saturate() {
        let forever = Duration {
            value: u64::MAX,
            unit: TimeUnit::Minutes,
        };

        assert_eq!(cycles(&forever, u64::MAX), u64::MAX);
        assert_eq!(cycles(&forever, 1_000), u64::MAX);

        let second = Duration {
            value: 1,
            unit: TimeUnit::Seconds,
        };

        assert_eq!(cycles(&second, 50_000_000), 50_000_000);
        assert_eq!(cycles(&second, u64::MAX), u64::MAX);
    }

    #[test]
    fn outputs_depend_only_on_state() {
        let (verilog, _) = generate(&Options::default());

        let decode = verilog.rfind("always @(*) begin").expect("output decode");
        let block = &verilog[decode..];
        assert!(block.contains("out_Lock = L_Lock__LOW;"));
        assert!(!block.contains("ev_"));
        assert!(!block.contains("in_"));
    }

    #[test]
    fn comments_and_reset_follow_flags() {
        let options = Options {
            flags: GenFlags::ASYNC_RESET,
            ..Default::default()
        };

        let (verilog, _) = generate(&options);
        assert!(!verilog.contains("//"));
        assert!(verilog.contains("always @(posedge clk or posedge rst) begin"));

        let (verilog, _) = generate(&Options::default());
        assert!(verilog.contains("// FEATURE: Door controller"));
        assert!(verilog.contains("// hint: critical path"));
        assert!(verilog.contains("always @(posedge clk) begin"));
    }
}
