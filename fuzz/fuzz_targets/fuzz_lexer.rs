#![no_main]

use awk_ai::Lexer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|source: &str| {
    let _ = Lexer::new(source).tokenize();
});
