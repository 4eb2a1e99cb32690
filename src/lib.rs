//! awk-ai - an AWK-style pattern-action interpreter with pluggable external
//! text functions
//!
//! Programs are parsed into an AST and run by a tree-walking interpreter
//! over any number of named input streams. Calls to names that are neither
//! built-ins nor user functions are looked up in an [`ExternalFunctions`]
//! table, which is how the `ai_*` functions are provided.
//!
//! # Example
//!
//! ```
//! use awk_ai::{InputSource, Interpreter, parse_program};
//!
//! let program = parse_program(r#"BEGIN { print "Hello, World!" }"#).unwrap();
//!
//! let mut interpreter = Interpreter::new(&program);
//! let mut output = Vec::new();
//! let inputs: Vec<InputSource<&[u8]>> = vec![];
//! interpreter.run(inputs, &mut output).unwrap();
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "Hello, World!\n");
//! ```
//!
//! # Field Processing Example
//!
//! ```
//! use awk_ai::{InputSource, Interpreter, parse_program};
//!
//! let program = parse_program(r#"{ print $1, $2 }"#).unwrap();
//!
//! let mut interpreter = Interpreter::new(&program);
//! interpreter.set_fs(",").unwrap();
//!
//! let input = "hello,world\nfoo,bar\n";
//! let mut output = Vec::new();
//! interpreter
//!     .run(vec![InputSource::new("data.csv", input.as_bytes())], &mut output)
//!     .unwrap();
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "hello world\nfoo bar\n");
//! ```
//!
//! # External Functions Example
//!
//! ```
//! use awk_ai::{ExternalFunctions, InputSource, Interpreter, parse_program};
//!
//! let program = parse_program(r#"{ print $1 ": " ai_sentiment($0) }"#).unwrap();
//!
//! let mut interpreter = Interpreter::new(&program);
//! interpreter.set_external_functions(
//!     ExternalFunctions::new().with("ai_sentiment", |args: &[String]| {
//!         if args[0].contains("love") { "positive" } else { "neutral" }.to_string()
//!     }),
//! );
//!
//! let input = "A: I love it\nB: it is a chair\n";
//! let mut output = Vec::new();
//! interpreter
//!     .run(vec![InputSource::new("-", input.as_bytes())], &mut output)
//!     .unwrap();
//!
//! assert_eq!(String::from_utf8(output).unwrap(), "A:: positive\nB:: neutral\n");
//! ```

pub mod ast;
pub mod environment;
pub mod error;
pub mod external;
pub mod format;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod record;
pub mod value;

pub use error::{Error, ErrorKind, Result, SourceLocation};
pub use external::{ExternalFunction, ExternalFunctions};
pub use interpreter::{ErrorPolicy, InputSource, Interpreter};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{Parser, parse_program};
pub use value::Value;
