use fsmc::{
    codegen::{Encoding, Options},
    ir::{Machine, SignalId, Trigger},
    resolve::{self, Effective, Inputs, Table},
    validate, Compilation,
};

const SMART_LOCK: &str = include_str!("../demos/smart_lock.fsm");

const TOGGLE: &str = "\
GLOBAL_TRANSITIONS:
STATE_LIST:
    INITIAL A [OUTPUT: Led=OFF]
    B [OUTPUT: Led=ON]
TRANSITIONS:
    FROM(A):
        ON_EVENT(GO): -> TO(B)
    FROM(B):
        ON_EVENT(BACK): -> TO(A)
";

fn compile(text: &str, options: &Options) -> Compilation {
    fsmc::compile(text, "toggle.fsm", options).expect("I/O error")
}

fn table_of(machine: &Machine) -> Table {
    let verdict = validate::validate(machine);
    resolve::resolve(verdict.validated().expect("validation errors"))
}

#[test]
fn output_decode_follows_declared_levels() {
    let compilation = compile(SMART_LOCK, &Options::default());
    let machine = compilation.machine.as_ref().unwrap();
    let verilog = compilation.verilog.as_ref().unwrap();

    let decode = &verilog[verilog.rfind("always @(*) begin").unwrap()..];
    for state in &machine.states {
        let mut expected = format!("            S_{}: begin\n", state.name);
        for (signal, id) in machine.signals.iter().zip(0..) {
            let level = state.level(SignalId(id)).unwrap();
            expected += &format!(
                "                out_{0} = L_{0}__{1};\n",
                signal.name, level
            );
        }

        assert!(decode.contains(&expected), "decode of {}", state.name);
    }
}

#[test]
fn globals_beat_local_rules() {
    let compilation = compile(SMART_LOCK, &Options::default());
    let table = compilation.table.as_ref().unwrap();
    let machine = compilation.machine.as_ref().unwrap();

    for global in &machine.globals {
        for state in machine.state_ids() {
            let step = table.step(state, Trigger::Event(global.event), &Inputs::new());
            assert_eq!(step.target, global.target);
        }
    }
}

#[test]
fn missing_rules_stay_without_actions() {
    let compilation = compile(TOGGLE, &Options::default());
    assert!(compilation.succeeded(), "{}", compilation.diagnostics);

    let stays = compilation
        .diagnostics
        .entries()
        .iter()
        .filter(|diagnostic| diagnostic.kind == "ImplicitStay")
        .count();

    assert_eq!(stays, 2);

    let table = compilation.table.as_ref().unwrap();
    let b = table.state_named("B").unwrap();
    let go = Trigger::Event(table.event_named("GO").unwrap());

    assert_eq!(table.resolution(b, go), Effective::Stay);

    let step = table.step(b, go, &Inputs::new());
    assert_eq!(step.target, b);
    assert!(step.actions.is_empty());
}

#[test]
fn ir_json_round_trip_resolves_identically() {
    let compilation = compile(SMART_LOCK, &Options::default());
    let machine = compilation.machine.unwrap();

    let json = machine.to_json().unwrap();
    let restored = Machine::from_json(&json).unwrap();

    assert_eq!(restored, machine);
    assert_eq!(table_of(&restored), table_of(&machine));

    let options = Options::default();
    let from_ir = fsmc::compile_ir(restored, &options).unwrap();
    assert_eq!(from_ir.verilog, compilation.verilog);
}

#[test]
fn compilation_is_idempotent() {
    let options = Options {
        encoding: Encoding::OneHot,
        ..Default::default()
    };

    let first = compile(SMART_LOCK, &options);
    let second = compile(SMART_LOCK, &options);

    assert!(first.verilog.is_some());
    assert_eq!(first.verilog, second.verilog);
    assert_eq!(first.diagnostics.entries(), second.diagnostics.entries());
    assert_eq!(first.report, second.report);
}

#[test]
fn simultaneous_triggers_prefer_globals() {
    let compilation = compile(SMART_LOCK, &Options::default());
    let table = compilation.table.as_ref().unwrap();

    let master = Trigger::Event(table.event_named("USER_ENTERS_MASTER_CODE").unwrap());
    let keypad = Trigger::Event(table.event_named("KEYPAD_INPUT").unwrap());

    assert_eq!(table.arbitrate(&[keypad, master]), Some(master));
    assert_eq!(table.arbitrate(&[keypad, Trigger::Timeout]), Some(Trigger::Timeout));
    assert_eq!(table.arbitrate(&[]), None);
}
