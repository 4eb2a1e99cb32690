#![no_main]

use arbitrary::Arbitrary;
use awk_ai::external;
use awk_ai::{ErrorPolicy, InputSource, Interpreter, parse_program};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Case<'a> {
    program: &'a str,
    first: &'a str,
    second: &'a str,
    skip_failing_rules: bool,
}

fuzz_target!(|case: Case| {
    if case.program.len() > 4096 || case.first.len() + case.second.len() > 65536 {
        return;
    }
    let Ok(ast) = parse_program(case.program) else {
        return;
    };

    let mut interpreter = Interpreter::new(&ast);
    interpreter.set_external_functions(external::simulated());
    if case.skip_failing_rules {
        interpreter.set_error_policy(ErrorPolicy::SkipRule);
    }

    let inputs = vec![
        InputSource::new("first", case.first.as_bytes()),
        InputSource::new("second", case.second.as_bytes()),
    ];
    let mut output = Vec::new();
    let _ = interpreter.run(inputs, &mut output);
});
