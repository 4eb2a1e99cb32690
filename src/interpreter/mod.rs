mod builtins;
mod expr;
mod records;
pub mod stmt;

pub use records::RecordReader;
pub use stmt::StmtResult;

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use regex::{Regex, RegexBuilder};
use tracing::{debug, trace, warn};

use crate::ast::*;
use crate::environment::{self, Environment};
use crate::error::{Error, Result};
use crate::external::ExternalFunctions;
use crate::lexer::unescape;
use crate::value::Value;

/// Deepest allowed nesting of user function calls
const MAX_CALL_DEPTH: usize = 512;

/// A named input stream
pub struct InputSource<R> {
    pub name: String,
    pub reader: R,
}

impl<R: BufRead> InputSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

/// What to do when a rule fails at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop reading input, run END, then report the first error
    #[default]
    Abort,
    /// Record the error, abandon the rest of the rule and carry on
    SkipRule,
}

enum Source<'a> {
    Reader(String, Box<dyn BufRead + 'a>),
    /// Opened when reached; `-` is standard input
    Path(String),
}

/// The AWK interpreter runtime
pub struct Interpreter<'a> {
    program: &'a Program,

    pub(crate) functions: HashMap<&'a str, &'a FunctionDef>,

    /// Variables, arrays, call frames and the current record
    pub(crate) env: Environment,

    pub(crate) externals: ExternalFunctions,

    /// Compiled regexes keyed by (pattern, IGNORECASE)
    pub(crate) regex_cache: HashMap<(String, bool), Regex>,

    /// Per-rule state for `start, end` range patterns
    range_active: Vec<bool>,

    pub(crate) rng: StdRng,
    pub(crate) rand_seed: f64,

    pub(crate) exit_code: i32,

    /// `next`, `nextfile` or `exit` raised inside a function body, waiting
    /// for the caller's next statement boundary
    pub(crate) pending: Option<StmtResult>,

    pub(crate) call_depth: usize,

    sources: VecDeque<Source<'a>>,
    current: Option<RecordReader<Box<dyn BufRead + 'a>>>,

    /// Files opened by `getline < file`
    pub(crate) getline_files: HashMap<String, RecordReader<Box<dyn BufRead>>>,

    error_policy: ErrorPolicy,
    diagnostics: Vec<Error>,
    cancel: Arc<AtomicBool>,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program) -> Self {
        let functions = program
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();

        Self {
            program,
            functions,
            env: Environment::new(),
            externals: ExternalFunctions::new(),
            regex_cache: HashMap::new(),
            range_active: vec![false; program.rules.len()],
            rng: StdRng::seed_from_u64(0),
            rand_seed: 0.0,
            exit_code: 0,
            pending: None,
            call_depth: 0,
            sources: VecDeque::new(),
            current: None,
            getline_files: HashMap::new(),
            error_policy: ErrorPolicy::default(),
            diagnostics: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set command line arguments (ARGC and ARGV)
    pub fn set_args(&mut self, args: Vec<String>) {
        self.env.set_args(args);
    }

    /// Set the field separator
    pub fn set_fs(&mut self, fs: &str) -> Result<()> {
        self.env.set_var("FS", Value::from_string(fs.to_string()))
    }

    /// Set a variable before execution. The value is typed by its look:
    /// integer, then float, then string.
    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<()> {
        if !environment::is_valid_name(name) {
            return Err(Error::runtime(format!("invalid variable name `{}`", name)));
        }
        self.env.set_var(name, Value::infer(value))
    }

    /// Apply a command-line style `name=value` assignment. Escape
    /// sequences in the value are processed.
    pub fn assign(&mut self, assignment: &str) -> Result<()> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::runtime(format!("invalid assignment `{}`", assignment)))?;
        self.set_variable(name, &unescape(value))
    }

    pub fn set_error_policy(&mut self, policy: ErrorPolicy) {
        self.error_policy = policy;
    }

    pub fn set_external_functions(&mut self, externals: ExternalFunctions) {
        self.externals = externals;
    }

    /// Seed `rand()` as if `srand(seed)` had been called
    pub fn set_srand_seed(&mut self, seed: f64) {
        self.seed_rng(seed);
    }

    /// Setting the returned flag ends the run before the next record, with
    /// exit status 2. END rules still run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Errors that were skipped under [`ErrorPolicy::SkipRule`]
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub(crate) fn seed_rng(&mut self, seed: f64) {
        self.rand_seed = seed;
        self.rng = StdRng::seed_from_u64(seed.to_bits());
    }

    /// Run the program over the given inputs, in order
    pub fn run<R, W>(&mut self, inputs: Vec<InputSource<R>>, output: &mut W) -> Result<i32>
    where
        R: BufRead + 'a,
        W: Write,
    {
        let sources = inputs
            .into_iter()
            .map(|input| {
                let reader: Box<dyn BufRead + 'a> = Box::new(input.reader);
                Source::Reader(input.name, reader)
            })
            .collect();
        self.execute(sources, output)
    }

    /// Run the program over files opened as they are reached. `-` is
    /// standard input, and so is an empty list. Operands of the form
    /// `name=value` are assignments performed when reached.
    pub fn run_files<W: Write>(&mut self, paths: &[String], output: &mut W) -> Result<i32> {
        let sources = if paths.is_empty() {
            VecDeque::from([Source::Path("-".to_string())])
        } else {
            paths.iter().cloned().map(Source::Path).collect()
        };
        self.execute(sources, output)
    }

    fn execute<W: Write>(&mut self, sources: VecDeque<Source<'a>>, output: &mut W) -> Result<i32> {
        self.sources = sources;
        let mut first_error = None;

        debug!("BEGIN phase");
        let exited = match self.run_begin(output) {
            Ok(exited) => exited,
            Err(e) => {
                first_error = Some(e);
                true
            }
        };

        if !exited && !self.program.only_begin() {
            debug!("main phase");
            if let Err(e) = self.run_main(output) {
                first_error = Some(e);
            }
        }

        debug!(nr = self.env.nr, "END phase");
        let end = self.run_end(output);
        self.current = None;
        self.getline_files.clear();
        let flushed = output.flush();

        if let Some(e) = first_error {
            return Err(e);
        }
        end?;
        flushed?;
        Ok(self.exit_code)
    }

    /// Returns true when an `exit` ended the phase
    fn run_begin<W: Write>(&mut self, output: &mut W) -> Result<bool> {
        let program = self.program;
        for rule in &program.rules {
            if !matches!(rule.pattern, Some(Pattern::Begin)) {
                continue;
            }
            trace!(line = rule.location.line, "BEGIN rule");
            match self.execute_rule(rule, output) {
                Ok(StmtResult::Exit(code)) => {
                    self.exit_code = code;
                    return Ok(true);
                }
                Ok(_) => {}
                Err(e) => self.handle_rule_error(e)?,
            }
        }
        Ok(false)
    }

    fn run_main<W: Write>(&mut self, output: &mut W) -> Result<()> {
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("run cancelled");
                self.exit_code = 2;
                return Ok(());
            }

            let Some(record) = self.next_record()? else {
                return Ok(());
            };
            self.env.nr += 1;
            self.env.fnr += 1;
            self.env.set_record(record);

            match self.process_record(output)? {
                StmtResult::Exit(code) => {
                    self.exit_code = code;
                    return Ok(());
                }
                StmtResult::NextFile => {
                    debug!(file = %self.env.filename, "skipping rest of input source");
                    self.current = None;
                }
                _ => {}
            }
        }
    }

    /// Run every main rule against the current record. Returns `NextFile`
    /// or `Exit` when one of them ends processing early.
    fn process_record<W: Write>(&mut self, output: &mut W) -> Result<StmtResult> {
        let program = self.program;
        for (idx, rule) in program.rules.iter().enumerate() {
            if matches!(rule.pattern, Some(Pattern::Begin) | Some(Pattern::End)) {
                continue;
            }

            let result = match self.dispatch_rule(idx, rule, output) {
                Ok(result) => result,
                Err(e) => {
                    self.handle_rule_error(e)?;
                    continue;
                }
            };

            match result {
                StmtResult::Next => return Ok(StmtResult::Normal),
                StmtResult::NextFile | StmtResult::Exit(_) => return Ok(result),
                _ => {}
            }
        }
        Ok(StmtResult::Normal)
    }

    fn dispatch_rule<W: Write>(&mut self, idx: usize, rule: &'a Rule, output: &mut W) -> Result<StmtResult> {
        let matched = self.pattern_matches(rule.pattern.as_ref(), idx, output)?;
        if let Some(signal) = self.pending.take() {
            return Ok(signal);
        }
        if !matched {
            return Ok(StmtResult::Normal);
        }
        trace!(line = rule.location.line, nr = self.env.nr, "rule matched");
        self.execute_rule(rule, output)
    }

    fn run_end<W: Write>(&mut self, output: &mut W) -> Result<()> {
        let program = self.program;
        for rule in &program.rules {
            if !matches!(rule.pattern, Some(Pattern::End)) {
                continue;
            }
            trace!(line = rule.location.line, "END rule");
            match self.execute_rule(rule, output) {
                Ok(StmtResult::Exit(code)) => {
                    self.exit_code = code;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.reset_after_error();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn execute_rule<W: Write>(&mut self, rule: &'a Rule, output: &mut W) -> Result<StmtResult> {
        match &rule.action {
            Some(action) => self.execute_block(action, output),
            None => {
                self.print_record(output)?;
                Ok(StmtResult::Normal)
            }
        }
    }

    /// Apply the error policy. Returns the error when the phase must stop.
    fn handle_rule_error(&mut self, error: Error) -> Result<()> {
        self.reset_after_error();
        match self.error_policy {
            ErrorPolicy::Abort => Err(error),
            ErrorPolicy::SkipRule => {
                warn!(%error, nr = self.env.nr, "skipping rest of rule");
                self.diagnostics.push(error);
                Ok(())
            }
        }
    }

    fn reset_after_error(&mut self) {
        self.pending = None;
        while self.env.depth() > 0 {
            self.env.pop_scope();
        }
        self.call_depth = 0;
    }

    pub(crate) fn print_record<W: Write>(&mut self, output: &mut W) -> Result<()> {
        output.write_all(self.env.record().text().as_bytes())?;
        output.write_all(self.env.ors().as_bytes())?;
        Ok(())
    }

    /// Next record from the main input, moving on to the next source when
    /// the current one is exhausted
    pub(crate) fn next_record(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(record) = reader.read_record(self.env.separator())? {
                    return Ok(Some(record));
                }
                self.current = None;
            }
            match self.sources.pop_front() {
                Some(source) => self.open_source(source)?,
                None => return Ok(None),
            }
        }
    }

    fn open_source(&mut self, source: Source<'a>) -> Result<()> {
        let (name, reader): (String, Box<dyn BufRead + 'a>) = match source {
            Source::Reader(name, reader) => (name, reader),
            Source::Path(path) if is_assignment_operand(&path) => {
                debug!(assignment = %path, "command-line assignment");
                return self.assign(&path);
            }
            Source::Path(path) if path == "-" => (path, Box::new(BufReader::new(io::stdin()))),
            Source::Path(path) => {
                let file = File::open(&path).map_err(|e| Error::io_with_path(&path, e))?;
                (path, Box::new(BufReader::new(file)))
            }
        };
        debug!(source = %name, "opening input source");
        self.env.filename = name;
        self.env.fnr = 0;
        self.current = Some(RecordReader::new(reader));
        Ok(())
    }

    /// Next record from a `getline < name` file; the file is opened on
    /// first use
    pub(crate) fn read_from_file(&mut self, name: &str) -> Result<Option<String>> {
        if !self.getline_files.contains_key(name) {
            let reader: Box<dyn BufRead> = if name == "-" || name == "/dev/stdin" {
                Box::new(BufReader::new(io::stdin()))
            } else {
                let file = File::open(name).map_err(|e| Error::io_with_path(name, e))?;
                Box::new(BufReader::new(file))
            };
            debug!(file = %name, "opening file for getline");
            self.getline_files
                .insert(name.to_string(), RecordReader::new(reader));
        }
        match self.getline_files.get_mut(name) {
            Some(reader) => Ok(reader.read_record(self.env.separator())?),
            None => Ok(None),
        }
    }

    fn pattern_matches<W: Write>(
        &mut self,
        pattern: Option<&'a Pattern>,
        idx: usize,
        output: &mut W,
    ) -> Result<bool> {
        match pattern {
            None => Ok(true),
            Some(Pattern::Range { start, end }) => {
                if self.range_active[idx] {
                    if self.test_pattern(end, output)? {
                        self.range_active[idx] = false;
                    }
                    Ok(true)
                } else if self.test_pattern(start, output)? {
                    // A record can open and close the range at once
                    self.range_active[idx] = !self.test_pattern(end, output)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Some(other) => self.test_pattern(other, output),
        }
    }

    fn test_pattern<W: Write>(&mut self, pattern: &'a Pattern, output: &mut W) -> Result<bool> {
        match pattern {
            Pattern::Regex(re) => {
                let ignore_case = self.env.ignore_case();
                let regex = cached_regex(&mut self.regex_cache, re, ignore_case)?;
                Ok(regex.is_match(self.env.record().text()))
            }
            Pattern::Expr(expr) => Ok(self.eval_expr(expr, output)?.is_truthy()),
            Pattern::Begin | Pattern::End | Pattern::Range { .. } => Ok(false),
        }
    }

    /// Compile (or fetch) a dynamic or literal regex
    pub(crate) fn get_regex(&mut self, pattern: &str) -> Result<&Regex> {
        let ignore_case = self.env.ignore_case();
        cached_regex(&mut self.regex_cache, pattern, ignore_case)
    }

    pub(crate) fn make_array_key(&self, indices: &[Value]) -> String {
        let convfmt = self.env.convfmt();
        match indices {
            [single] => single.to_str(convfmt).into_owned(),
            _ => indices
                .iter()
                .map(|v| v.to_str(convfmt).into_owned())
                .collect::<Vec<_>>()
                .join(self.env.subsep()),
        }
    }
}

pub(crate) fn cached_regex<'c>(
    cache: &'c mut HashMap<(String, bool), Regex>,
    pattern: &str,
    ignore_case: bool,
) -> Result<&'c Regex> {
    match cache.entry((pattern.to_string(), ignore_case)) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let regex = RegexBuilder::new(&translate_regex(pattern))
                .case_insensitive(ignore_case)
                .build()?;
            Ok(entry.insert(regex))
        }
    }
}

/// Braces that do not form an interval expression (`a{2,3}`) are literal in
/// AWK regexes but not in the regex crate
fn translate_regex(pattern: &str) -> Cow<'_, str> {
    if !pattern.contains(['{', '}']) {
        return Cow::Borrowed(pattern);
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut in_bracket = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            }
            '[' if !in_bracket => {
                in_bracket = true;
                out.push(c);
                // `]` right after `[` or `[^` is a literal member
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                if chars.get(i + 1) == Some(&']') {
                    out.push(']');
                    i += 1;
                }
            }
            ']' if in_bracket => {
                in_bracket = false;
                out.push(c);
            }
            '{' if !in_bracket => match interval_len(&chars[i..]) {
                Some(len) => {
                    out.extend(&chars[i..i + len]);
                    i += len - 1;
                }
                None => out.push_str("\\{"),
            },
            '}' if !in_bracket => out.push_str("\\}"),
            _ => out.push(c),
        }
        i += 1;
    }
    Cow::Owned(out)
}

/// Length of `{n}`, `{n,}` or `{n,m}` at the start of `chars`
fn interval_len(chars: &[char]) -> Option<usize> {
    let mut i = 1;
    let digits_start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if chars.get(i) == Some(&',') {
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }
    (chars.get(i) == Some(&'}')).then_some(i + 1)
}

fn is_assignment_operand(operand: &str) -> bool {
    operand
        .split_once('=')
        .is_some_and(|(name, _)| environment::is_valid_name(name))
}
