//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{self, crate_version, Arg, ArgMatches, Command};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use fsmc::{
    codegen::{Encoding, GenFlags, Options},
    ir::Machine,
    Compilation,
};

use std::{
    fs::{self, File},
    io::{self, Read, Write},
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("fsmc")
        .version(crate_version!())
        .about("State machine specification to Verilog compiler")
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("INPUT")
                .help("Specification file ('-' for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("emit")
                .long("emit")
                .takes_value(true)
                .value_name("KIND")
                .default_value("verilog")
                .possible_values(["verilog", "ir", "table"])
                .help("Artifact to write"),
        )
        .arg(
            Arg::new("from-ir")
                .long("from-ir")
                .help("Read the input as IR JSON instead of specification text"),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .takes_value(true)
                .value_name("ENCODING")
                .default_value("auto")
                .possible_values(["auto", "binary", "one-hot"])
                .help("State register encoding"),
        )
        .arg(
            Arg::new("clock-hz")
                .long("clock-hz")
                .takes_value(true)
                .value_name("HZ")
                .default_value("50000000")
                .help("Clock frequency used to size timer counters"),
        )
        .arg(
            Arg::new("numeric-width")
                .long("numeric-width")
                .takes_value(true)
                .value_name("BITS")
                .default_value("8")
                .help("Minimum width of numeric inputs"),
        )
        .arg(
            Arg::new("module")
                .long("module")
                .takes_value(true)
                .value_name("NAME")
                .help("Verilog module name (defaults to the input file stem)"),
        )
        .arg(
            Arg::new("async-reset")
                .long("async-reset")
                .help("Use an asynchronous reset"),
        )
        .arg(
            Arg::new("no-comments")
                .long("no-comments")
                .help("Omit comments from generated Verilog"),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .takes_value(true)
                .value_name("FILE")
                .help("Write a JSON report of encoding and timer counters"),
        )
        .arg(
            Arg::new("diagnostics")
                .long("diagnostics")
                .takes_value(true)
                .value_name("FORMAT")
                .default_value("human")
                .possible_values(["human", "json"])
                .help("Diagnostics format on stderr"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Increase log verbosity"),
        )
        .get_matches();

    let level = match args.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .context("Failed to install logger")?;

    let input = args.value_of("input").unwrap_or("-");
    let options = options(&args, input)?;
    let text = read_input(input)?;

    let result = if args.is_present("from-ir") {
        let machine = Machine::from_json(&text)
            .with_context(|| format!("Failed to read IR from {}", input))?;

        fsmc::compile_ir(machine, &options)
    } else {
        fsmc::compile(&text, input, &options)
    };

    let compilation = result.context("Failed to generate code")?;

    report_diagnostics(&args, &compilation)?;
    if !compilation.succeeded() {
        bail!(
            "Compilation of {} failed with {} error(s)",
            input,
            compilation.diagnostics.error_count()
        );
    }

    let artifact = match args.value_of("emit").unwrap_or("verilog") {
        "ir" => match &compilation.machine {
            Some(machine) => machine.to_json().context("Failed to serialize IR")?,
            None => bail!("No IR was built"),
        },

        "table" => match &compilation.table {
            Some(table) => table.to_string(),
            None => bail!("No transition table was resolved"),
        },

        _ => compilation.verilog.clone().unwrap_or_default(),
    };

    let output = args.value_of("output").unwrap_or("-");
    write_output(output, &artifact)?;

    if let (Some(path), Some(report)) = (args.value_of("report"), &compilation.report) {
        let json = report.to_json().context("Failed to serialize report")?;
        write_output(path, &json)?;
    }

    Ok(())
}

fn options(args: &ArgMatches, input: &str) -> anyhow::Result<Options> {
    let encoding: Encoding = args.value_of("encoding").unwrap_or("auto").parse()?;

    let clock_hz: u64 = args
        .value_of("clock-hz")
        .unwrap_or("50000000")
        .parse()
        .context("Bad clock frequency")?;

    let numeric_width: u32 = args
        .value_of("numeric-width")
        .unwrap_or("8")
        .parse()
        .context("Bad numeric width")?;

    let module = match args.value_of("module") {
        Some(module) => module.to_owned(),
        None => module_name(input),
    };

    let mut flags = GenFlags::COMMENTS;
    if args.is_present("no-comments") {
        flags.remove(GenFlags::COMMENTS);
    }

    if args.is_present("async-reset") {
        flags |= GenFlags::ASYNC_RESET;
    }

    Ok(Options {
        encoding,
        clock_hz,
        numeric_width,
        module,
        flags,
    })
}

/// Deriva un identificador de Verilog a partir de la ruta de entrada.
fn module_name(input: &str) -> String {
    let stem = std::path::Path::new(input)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("fsm");

    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    match name.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => name,
        _ => format!("fsm_{}", name),
    }
}

fn read_input(path: &str) -> anyhow::Result<String> {
    let mut text = String::new();
    if path == "-" {
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read from stdin")?;
    } else {
        text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    }

    Ok(text)
}

fn write_output(path: &str, contents: &str) -> anyhow::Result<()> {
    if path == "-" {
        io::stdout()
            .write_all(contents.as_bytes())
            .context("Failed to write to stdout")?;
    } else {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to open for writing: {}", path))?;

        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write to file: {}", path))?;
    }

    Ok(())
}

fn report_diagnostics(args: &ArgMatches, compilation: &Compilation) -> anyhow::Result<()> {
    let diagnostics = &compilation.diagnostics;

    match args.value_of("diagnostics") {
        Some("json") => {
            let json = diagnostics
                .to_json()
                .context("Failed to serialize diagnostics")?;

            eprintln!("{}", json);
        }

        _ if !diagnostics.is_empty() => eprint!("{}", diagnostics),
        _ => (),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::module_name;

    #[test]
    fn module_names_are_identifiers() {
        assert_eq!(module_name("specs/smart-lock.fsm"), "smart_lock");
        assert_eq!(module_name("2fa.fsm"), "fsm_2fa");
        assert_eq!(module_name("-"), "fsm__");
    }
}
