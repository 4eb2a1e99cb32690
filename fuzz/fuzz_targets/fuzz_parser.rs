#![no_main]

use awk_ai::{ErrorKind, parse_program};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|source: &str| {
    if let Err(e) = parse_program(source) {
        assert_eq!(e.kind(), ErrorKind::Syntax, "unexpected parse failure: {e}");
    }
});
