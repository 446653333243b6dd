use fsmc::{
    codegen::Options,
    error::Severity,
    ir::{Action, Trigger},
    resolve::{Effective, Inputs, Table},
    Compilation,
};

const SMART_LOCK: &str = include_str!("../demos/smart_lock.fsm");

fn compile(text: &str) -> Compilation {
    fsmc::compile(text, "smart_lock.fsm", &Options::default()).expect("I/O error")
}

fn table(compilation: &Compilation) -> &Table {
    compilation.table.as_ref().expect("no table")
}

fn keypad(table: &Table) -> Trigger {
    Trigger::Event(table.event_named("KEYPAD_INPUT").unwrap())
}

#[test]
fn compiles_with_warnings_only() {
    let compilation = compile(SMART_LOCK);

    assert!(compilation.succeeded(), "{}", compilation.diagnostics);
    assert!(compilation
        .diagnostics
        .entries()
        .iter()
        .all(|diagnostic| diagnostic.severity == Severity::Warning));

    let verilog = compilation.verilog.as_ref().unwrap();
    assert!(verilog.contains("ev_USER_ENTERS_MASTER_CODE"));
    assert!(verilog.contains("act_NOTIFY_OWNER"));
}

#[test]
fn valid_code_allows_entry() {
    let compilation = compile(SMART_LOCK);
    let table = table(&compilation);
    let idle = table.state_named("IDLE_LOCKED").unwrap();

    let step = table.step(idle, keypad(table), &Inputs::new().with("Code", "VALID"));
    assert_eq!(table.state_name(step.target), "ENTRY_ALLOWED");
}

#[test]
fn invalid_code_below_limit_stays() {
    let compilation = compile(SMART_LOCK);
    let table = table(&compilation);
    let idle = table.state_named("IDLE_LOCKED").unwrap();

    let inputs = Inputs::new()
        .with("Code", "INVALID")
        .with("Attempt_Count", 1u64);

    let step = table.step(idle, keypad(table), &inputs);
    assert_eq!(step.target, idle);
    assert!(step.actions.is_empty());
}

#[test]
fn invalid_code_at_limit_raises_alarm() {
    let compilation = compile(SMART_LOCK);
    let table = table(&compilation);
    let idle = table.state_named("IDLE_LOCKED").unwrap();

    let inputs = Inputs::new()
        .with("Code", "INVALID")
        .with("Attempt_Count", 3u64);

    let step = table.step(idle, keypad(table), &inputs);
    assert_eq!(table.state_name(step.target), "ALARM_STATE");
    assert!(step
        .actions
        .iter()
        .any(|action| matches!(action, Action::StartTimer(_))));
}

#[test]
fn master_code_overrides_every_state() {
    let compilation = compile(SMART_LOCK);
    let table = table(&compilation);
    let idle = table.state_named("IDLE_LOCKED").unwrap();
    let master = Trigger::Event(table.event_named("USER_ENTERS_MASTER_CODE").unwrap());

    for name in ["IDLE_LOCKED", "ENTRY_ALLOWED", "DOOR_OPEN", "ALARM_STATE"] {
        let state = table.state_named(name).unwrap();

        assert!(matches!(table.resolution(state, master), Effective::Global(_)));

        let step = table.step(state, master, &Inputs::new().with("Code", "VALID"));
        assert_eq!(step.target, idle, "from {}", name);
        assert!(step.actions.contains(&Action::ClearAlarm));
    }

    let overridden = compilation
        .diagnostics
        .entries()
        .iter()
        .filter(|diagnostic| diagnostic.kind == "OverriddenByGlobal")
        .count();

    assert_eq!(overridden, 1);
}

#[test]
fn running_timer_without_start_is_orphaned() {
    let text = SMART_LOCK.replace("START_TIMER(5min), ", "");
    let compilation = compile(&text);

    let errors: Vec<_> = compilation
        .diagnostics
        .entries()
        .iter()
        .filter(|diagnostic| diagnostic.is_error())
        .collect();

    assert_eq!(errors.len(), 1, "{}", compilation.diagnostics);
    assert_eq!(errors[0].kind, "OrphanedTimeout");
    assert!(errors[0].message.contains("ALARM_STATE"));

    assert!(!compilation.succeeded());
    assert!(compilation.verilog.is_none());
    assert!(compilation.report.is_none());
}

#[test]
fn report_lists_both_timers() {
    let compilation = compile(SMART_LOCK);
    let report = compilation.report.as_ref().unwrap();

    let states: Vec<_> = report.counters.iter().map(|counter| counter.state.as_str()).collect();
    assert_eq!(states, ["ENTRY_ALLOWED", "ALARM_STATE"]);

    // 5 min a 50 MHz
    let alarm = &report.counters[1];
    assert_eq!(alarm.cycles, 15_000_000_000);
    assert_eq!(alarm.width, 34);
}
