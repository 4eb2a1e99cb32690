use std::env;
use std::fs;
use std::io::{self, BufWriter};
use std::process;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use awk_ai::external;
use awk_ai::lexer::unescape;
use awk_ai::{Interpreter, parse_program};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();

    match run(&args[1..]) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("awk-ai: {}", e);
            process::exit(2);
        }
    }
}

/// Log to stderr, filtered by `AWK_AI_LOG` (default `warn`)
fn init_logging() {
    let filter = EnvFilter::try_from_env("AWK_AI_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn run(args: &[String]) -> Result<i32, Box<dyn std::error::Error>> {
    let mut field_separator: Option<String> = None;
    let mut program_source: Option<String> = None;
    let mut operands: Vec<String> = Vec::new();
    let mut assignments: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];

        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(0);
        }

        if arg == "--version" {
            println!("awk-ai {}", env!("CARGO_PKG_VERSION"));
            return Ok(0);
        }

        if arg == "-F" {
            i += 1;
            let fs = args.get(i).ok_or("option -F requires an argument")?;
            field_separator = Some(fs.clone());
        } else if let Some(fs) = arg.strip_prefix("-F") {
            field_separator = Some(fs.to_string());
        } else if arg == "-v" {
            i += 1;
            let assignment = args.get(i).ok_or("option -v requires an argument")?;
            assignments.push(assignment.clone());
        } else if let Some(assignment) = arg.strip_prefix("-v") {
            assignments.push(assignment.to_string());
        } else if arg == "-f" {
            i += 1;
            let script = args.get(i).ok_or("option -f requires an argument")?;
            let source = fs::read_to_string(script).map_err(|e| format!("{}: {}", script, e))?;
            program_source = Some(source);
        } else if arg == "--" {
            i += 1;
            if program_source.is_none() {
                program_source = args.get(i).cloned();
                i += 1;
            }
            operands.extend(args.iter().skip(i).cloned());
            break;
        } else if arg.starts_with('-') && arg != "-" {
            return Err(format!("unknown option: {}", arg).into());
        } else if program_source.is_none() {
            program_source = Some(arg.clone());
        } else {
            operands.push(arg.clone());
        }

        i += 1;
    }

    let program_source = program_source.ok_or("no program provided")?;
    let program = parse_program(&program_source)?;

    let mut interpreter = Interpreter::new(&program);
    interpreter.set_external_functions(external::simulated());

    if let Some(fs) = field_separator {
        let fs = if fs == "t" { "\t".to_string() } else { unescape(&fs) };
        interpreter.set_fs(&fs)?;
    }

    let mut argv = vec!["awk-ai".to_string()];
    argv.extend(operands.iter().cloned());
    interpreter.set_args(argv);

    for assignment in &assignments {
        interpreter.assign(assignment)?;
    }

    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());
    let code = interpreter.run_files(&operands, &mut output)?;
    Ok(code)
}

fn print_help() {
    println!(
        r#"Usage: awk-ai [OPTIONS] 'program' [file ...]
       awk-ai [OPTIONS] -f progfile [file ...]

An AWK-style interpreter with built-in ai_* text functions.

Options:
  -F fs          Set the field separator to fs (t means tab)
  -v var=val     Assign value to variable before execution
  -f progfile    Read the program from file
  --version      Print version information
  --help         Print this help message

Operands of the form var=val are assignments made when reached.
Set AWK_AI_LOG (e.g. AWK_AI_LOG=debug) to control diagnostics on stderr.

Examples:
  awk-ai '{{ print $1 }}' file.txt
  awk-ai -F: '{{ print $1 }}' /etc/passwd
  awk-ai '{{ print ai_sentiment($0) }}' reviews.txt
"#
    );
}
