use std::cmp::Ordering;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use regex::Regex;

use crate::ast::{Builtin, Expr};
use crate::error::{Error, Result, SourceLocation};
use crate::format::sprintf;
use crate::record::FieldSplitter;
use crate::value::Value;

use super::Interpreter;
use super::expr::LValue;

impl<'a> Interpreter<'a> {
    pub(crate) fn call_builtin<W: Write>(
        &mut self,
        func: Builtin,
        args: &[Expr],
        location: SourceLocation,
        output: &mut W,
    ) -> Result<Value> {
        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            return Err(arity_error(func, args.len(), location));
        }

        match func {
            Builtin::Length => match args.first() {
                None => Ok(char_count(self.env.record().text())),
                Some(Expr::Var(name, _)) if self.env.is_array(name) => {
                    Ok(Value::Number(self.env.array_len(name)? as f64))
                }
                Some(arg) => {
                    let s = self.eval_string(arg, output)?;
                    Ok(char_count(&s))
                }
            },

            Builtin::Substr => {
                let s = self.eval_string(&args[0], output)?;
                let start = self.eval_number(&args[1], output)?;
                let length = match args.get(2) {
                    Some(arg) => Some(self.eval_number(arg, output)?),
                    None => None,
                };
                Ok(Value::from_string(substr(&s, start, length)))
            }

            Builtin::Index => {
                let s = self.eval_string(&args[0], output)?;
                let t = self.eval_string(&args[1], output)?;
                let position = match s.find(&t) {
                    Some(byte_pos) => s[..byte_pos].chars().count() + 1,
                    None => 0,
                };
                Ok(Value::Number(position as f64))
            }

            Builtin::Split => {
                let s = self.eval_string(&args[0], output)?;
                let array = array_name(func, &args[1])?;
                let splitter = match args.get(2) {
                    Some(Expr::Regex(pattern, _)) => FieldSplitter::Regex(self.get_regex(pattern)?.clone()),
                    Some(arg) => {
                        let fs = self.eval_string(arg, output)?;
                        FieldSplitter::new(&fs, self.env.ignore_case())?
                    }
                    None => self.env.splitter().clone(),
                };
                let pieces = splitter.split(&s);
                let count = pieces.len();
                self.env.clear_array(array)?;
                for (i, piece) in pieces.into_iter().enumerate() {
                    self.env
                        .set_array_element(array, (i + 1).to_string(), Value::from_string(piece))?;
                }
                Ok(Value::Number(count as f64))
            }

            Builtin::Sub | Builtin::Gsub => {
                let pattern = self.pattern_source(&args[0], output)?;
                let replacement = self.eval_string(&args[1], output)?;
                let target = match args.get(2) {
                    Some(arg) if arg.is_lvalue() => self.resolve_lvalue(arg, output)?,
                    Some(arg) => {
                        return Err(Error::runtime_at(
                            format!("{}: third argument must be a variable, array element or field", func.name()),
                            arg.location(),
                        ));
                    }
                    None => LValue::Field(0),
                };
                let text = self.read_lvalue(&target)?;
                let text = text.to_str(self.env.convfmt()).into_owned();
                let regex = self.get_regex(&pattern)?;
                let (result, count) = substitute(regex, &text, &replacement, func == Builtin::Gsub);
                if count > 0 {
                    self.write_lvalue(&target, Value::from_string(result))?;
                }
                Ok(Value::Number(count as f64))
            }

            Builtin::Match => {
                let s = self.eval_string(&args[0], output)?;
                let pattern = self.pattern_source(&args[1], output)?;
                let found = self
                    .get_regex(&pattern)?
                    .find(&s)
                    .map(|m| (m.start(), m.end()));
                let (rstart, rlength) = match found {
                    Some((start, end)) => (
                        s[..start].chars().count() as f64 + 1.0,
                        s[start..end].chars().count() as f64,
                    ),
                    None => (0.0, -1.0),
                };
                self.env.rstart = rstart;
                self.env.rlength = rlength;
                Ok(Value::Number(rstart))
            }

            Builtin::Sprintf => {
                let format = self.eval_string(&args[0], output)?;
                let mut values = Vec::with_capacity(args.len() - 1);
                for arg in &args[1..] {
                    values.push(self.eval_expr(arg, output)?);
                }
                Ok(Value::from_string(sprintf(&format, &values, self.env.convfmt())))
            }

            Builtin::Tolower => Ok(Value::from_string(self.eval_string(&args[0], output)?.to_lowercase())),
            Builtin::Toupper => Ok(Value::from_string(self.eval_string(&args[0], output)?.to_uppercase())),

            Builtin::Sin => Ok(Value::Number(self.eval_number(&args[0], output)?.sin())),
            Builtin::Cos => Ok(Value::Number(self.eval_number(&args[0], output)?.cos())),
            Builtin::Exp => Ok(Value::Number(self.eval_number(&args[0], output)?.exp())),
            Builtin::Log => Ok(Value::Number(self.eval_number(&args[0], output)?.ln())),
            Builtin::Sqrt => Ok(Value::Number(self.eval_number(&args[0], output)?.sqrt())),
            Builtin::Int => Ok(Value::Number(self.eval_number(&args[0], output)?.trunc())),
            Builtin::Atan2 => {
                let y = self.eval_number(&args[0], output)?;
                let x = self.eval_number(&args[1], output)?;
                Ok(Value::Number(y.atan2(x)))
            }

            Builtin::Rand => Ok(Value::Number(self.rng.gen_range(0.0..1.0))),

            Builtin::Srand => {
                let previous = self.rand_seed;
                let seed = match args.first() {
                    Some(arg) => self.eval_number(arg, output)?,
                    None => SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs() as f64)
                        .unwrap_or(0.0),
                };
                self.seed_rng(seed);
                Ok(Value::Number(previous))
            }

            Builtin::Asort => {
                let id = self.env.array_id(array_name(func, &args[0])?)?;
                let mut values: Vec<Value> = self.env.array(id).values().cloned().collect();
                values.sort_by(sort_order);
                Ok(self.renumber(id, values))
            }

            Builtin::Asorti => {
                let id = self.env.array_id(array_name(func, &args[0])?)?;
                let mut keys: Vec<String> = self.env.array(id).keys().cloned().collect();
                keys.sort();
                Ok(self.renumber(id, keys.into_iter().map(Value::from_string).collect()))
            }

            Builtin::Fflush => {
                output.flush()?;
                Ok(Value::Number(0.0))
            }

            Builtin::Close => {
                let name = self.eval_string(&args[0], output)?;
                let closed = self.getline_files.remove(&name).is_some();
                Ok(Value::Number(if closed { 0.0 } else { -1.0 }))
            }
        }
    }

    /// Replace the contents of array `id` with `values` keyed 1..n
    fn renumber(&mut self, id: usize, values: Vec<Value>) -> Value {
        let count = values.len();
        let array = self.env.array_mut(id);
        array.clear();
        for (i, value) in values.into_iter().enumerate() {
            array.insert((i + 1).to_string(), value);
        }
        Value::Number(count as f64)
    }
}

fn arity_error(func: Builtin, got: usize, location: SourceLocation) -> Error {
    let expected = match func.arity() {
        (min, max) if min == max => min.to_string(),
        (min, usize::MAX) => format!("at least {}", min),
        (min, max) => format!("{} to {}", min, max),
    };
    Error::runtime_at(
        format!("{}: expected {} arguments, got {}", func.name(), expected, got),
        location,
    )
}

fn array_name(func: Builtin, arg: &Expr) -> Result<&str> {
    match arg {
        Expr::Var(name, _) => Ok(name),
        Expr::Paren(inner, _) => array_name(func, inner),
        other => Err(Error::runtime_at(
            format!("{}: argument is not an array", func.name()),
            other.location(),
        )),
    }
}

fn char_count(s: &str) -> Value {
    Value::Number(s.chars().count() as f64)
}

/// Characters `start..start+length` (1-based, rounded), clipped to the
/// string. The end is computed before `start` is clamped, so
/// `substr("hello", 0, 2)` is `"h"`.
fn substr(s: &str, start: f64, length: Option<f64>) -> String {
    let start = start.round();
    let len = s.chars().count() as f64;
    let end = match length {
        Some(length) => start + length.round(),
        None => len + 1.0,
    };
    if start.is_nan() || end.is_nan() {
        return String::new();
    }
    let first = start.max(1.0);
    let last = end.min(len + 1.0);
    if last <= first {
        return String::new();
    }
    s.chars()
        .skip(first as usize - 1)
        .take((last - first) as usize)
        .collect()
}

/// Replace the first (or every) match of `regex` in `text`. Returns the new
/// text and the number of replacements.
fn substitute(regex: &Regex, text: &str, replacement: &str, global: bool) -> (String, usize) {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for m in regex.find_iter(text) {
        result.push_str(&text[last..m.start()]);
        expand_replacement(replacement, m.as_str(), &mut result);
        last = m.end();
        count += 1;
        if !global {
            break;
        }
    }
    result.push_str(&text[last..]);
    (result, count)
}

/// `&` is the matched text, `\&` a literal ampersand, `\\` a backslash
fn expand_replacement(replacement: &str, matched: &str, out: &mut String) {
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('&') => {
                    out.push('&');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            },
            '&' => out.push_str(matched),
            _ => out.push(c),
        }
    }
}

/// Numbers before strings, numbers by value, strings by bytes
fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.compares_numerically(), b.compares_numerically()) {
        (true, true) => a.to_number().total_cmp(&b.to_number()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.as_str().cmp(&b.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InputSource;
    use crate::parser::parse_program;

    fn run_awk(program: &str, input: &str) -> String {
        let ast = parse_program(program).unwrap();
        let mut interpreter = Interpreter::new(&ast);
        let mut output = Vec::new();
        interpreter
            .run(vec![InputSource::new("-", input.as_bytes())], &mut output)
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    fn eval(expr: &str) -> String {
        run_awk(&format!("BEGIN {{ print {} }}", expr), "")
    }

    #[test]
    fn test_length() {
        assert_eq!(eval("length(\"hello\")"), "5\n");
        assert_eq!(eval("length(\"héllo\")"), "5\n");
        assert_eq!(eval("length(12345)"), "5\n");
        assert_eq!(run_awk("{ print length(), length }", "abc\n"), "3 3\n");
        assert_eq!(run_awk("BEGIN { a[1]; a[2]; print length(a) }", ""), "2\n");
    }

    #[test]
    fn test_substr() {
        assert_eq!(eval("substr(\"hello\", 2, 2)"), "el\n");
        assert_eq!(eval("substr(\"hello\", 6)"), "\n");
        assert_eq!(eval("substr(\"hello\", 2)"), "ello\n");
        assert_eq!(eval("substr(\"hello\", 0, 2)"), "h\n");
        assert_eq!(eval("substr(\"hello\", -1)"), "hello\n");
        assert_eq!(eval("substr(\"hello\", 2, 0)"), "\n");
        assert_eq!(eval("substr(\"hello\", 2, -3)"), "\n");
        assert_eq!(eval("substr(\"hello\", 1.5, 2)"), "el\n");
        assert_eq!(eval("substr(\"héllo\", 2, 3)"), "éll\n");
    }

    #[test]
    fn test_index() {
        assert_eq!(eval("index(\"hello\", \"xyz\")"), "0\n");
        assert_eq!(eval("index(\"hello\", \"ll\")"), "3\n");
        assert_eq!(eval("index(\"héllo\", \"l\")"), "3\n");
        assert_eq!(eval("index(\"hello\", \"\")"), "1\n");
    }

    #[test]
    fn test_split() {
        let output = run_awk("BEGIN { n = split(\"a:b:c\", parts, \":\"); print n, parts[1], parts[3] }", "");
        assert_eq!(output, "3 a c\n");
        let output = run_awk("BEGIN { n = split(\"  one  two \", w); print n, w[1] w[2] }", "");
        assert_eq!(output, "2 onetwo\n");
        let output = run_awk("BEGIN { n = split(\"a1b22c\", p, /[0-9]+/); print n, p[2] }", "");
        assert_eq!(output, "3 b\n");
        let output = run_awk("BEGIN { p[9] = 1; n = split(\"\", p); print n, length(p) }", "");
        assert_eq!(output, "0 0\n");
    }

    #[test]
    fn test_split_uses_current_fs() {
        assert_eq!(run_awk("BEGIN { FS = \",\" } { print split($0, f), f[2] }", "x,y,z\n"), "3 y\n");
    }

    #[test]
    fn test_sub_and_gsub() {
        let output = run_awk("BEGIN { s = \"foo bar\"; n = gsub(/o/, \"0\", s); print n, s }", "");
        assert_eq!(output, "2 f00 bar\n");
        let output = run_awk("BEGIN { s = \"foo bar\"; n = sub(/o/, \"0\", s); print n, s }", "");
        assert_eq!(output, "1 f0o bar\n");
        let output = run_awk("BEGIN { s = \"abc\"; n = gsub(/z/, \"y\", s); print n, s }", "");
        assert_eq!(output, "0 abc\n");
    }

    #[test]
    fn test_gsub_default_target_resplits() {
        assert_eq!(run_awk("{ gsub(/,/, \" \"); print $2, NF }", "a,b,c\n"), "b 3\n");
    }

    #[test]
    fn test_gsub_on_field_and_element() {
        assert_eq!(run_awk("{ gsub(/a/, \"A\", $2); print }", "aa aa\n"), "aa AA\n");
        let output = run_awk("BEGIN { a[\"k\"] = \"xx\"; sub(/x/, \"y\", a[\"k\"]); print a[\"k\"] }", "");
        assert_eq!(output, "yx\n");
    }

    #[test]
    fn test_replacement_escapes() {
        let output = run_awk("BEGIN { s = \"cat\"; gsub(/a/, \"[&]\", s); print s }", "");
        assert_eq!(output, "c[a]t\n");
        let output = run_awk("BEGIN { s = \"cat\"; gsub(/a/, \"\\\\&\", s); print s }", "");
        assert_eq!(output, "c&t\n");
    }

    #[test]
    fn test_gsub_empty_matches() {
        let output = run_awk("BEGIN { s = \"abc\"; n = gsub(/x*/, \"-\", s); print n, s }", "");
        assert_eq!(output, "4 -a-b-c-\n");
    }

    #[test]
    fn test_sub_requires_lvalue() {
        let program = parse_program("BEGIN { sub(/a/, \"b\", \"literal\") }").unwrap();
        let mut interpreter = Interpreter::new(&program);
        let mut output = Vec::new();
        assert!(
            interpreter
                .run(Vec::<InputSource<&[u8]>>::new(), &mut output)
                .is_err()
        );
    }

    #[test]
    fn test_match_sets_rstart_rlength() {
        let output = run_awk("BEGIN { print match(\"foobar\", /ob/), RSTART, RLENGTH }", "");
        assert_eq!(output, "3 3 2\n");
        let output = run_awk("BEGIN { print match(\"foobar\", \"z\"), RSTART, RLENGTH }", "");
        assert_eq!(output, "0 0 -1\n");
    }

    #[test]
    fn test_sprintf_and_case() {
        assert_eq!(eval("sprintf(\"%5.1f|%-3d|%x\", 3.14159, 7, 255)"), "  3.1|7  |ff\n");
        assert_eq!(eval("toupper(\"abc\") tolower(\"DEF\")"), "ABCdef\n");
    }

    #[test]
    fn test_math() {
        assert_eq!(eval("int(3.9), int(-3.9)"), "3 -3\n");
        assert_eq!(eval("sqrt(16), exp(0), log(1)"), "4 1 0\n");
        assert_eq!(eval("sin(0), cos(0)"), "0 1\n");
        assert_eq!(eval("atan2(0, -1)"), "3.14159\n");
    }

    #[test]
    fn test_rand_range_and_seeding() {
        let output = run_awk(
            "BEGIN { for (i = 0; i < 100; i++) { r = rand(); if (r < 0 || r >= 1) bad++ } print bad + 0 }",
            "",
        );
        assert_eq!(output, "0\n");

        let output = run_awk("BEGIN { srand(42); a = rand(); srand(42); b = rand(); print (a == b), srand(7) }", "");
        assert_eq!(output, "1 42\n");
    }

    #[test]
    fn test_asort_and_asorti() {
        let output = run_awk(
            "BEGIN { a[\"x\"] = 3; a[\"y\"] = 1; a[\"z\"] = 2; n = asort(a); print n, a[1], a[2], a[3] }",
            "",
        );
        assert_eq!(output, "3 1 2 3\n");
        let output = run_awk(
            "BEGIN { a[\"b\"]; a[\"c\"]; a[\"a\"]; n = asorti(a); print n, a[1], a[2], a[3] }",
            "",
        );
        assert_eq!(output, "3 a b c\n");
    }

    #[test]
    fn test_asort_mixed_values() {
        let output = run_awk(
            "BEGIN { a[1] = \"pear\"; a[2] = 10; a[3] = \"apple\"; a[4] = 9; asort(a); print a[1], a[2], a[3], a[4] }",
            "",
        );
        assert_eq!(output, "9 10 apple pear\n");
    }

    #[test]
    fn test_wrong_arity_is_an_error() {
        let program = parse_program("BEGIN { print substr(\"a\") }").unwrap();
        let mut interpreter = Interpreter::new(&program);
        let mut output = Vec::new();
        let err = interpreter
            .run(Vec::<InputSource<&[u8]>>::new(), &mut output)
            .unwrap_err();
        assert!(err.to_string().contains("substr: expected 2 to 3 arguments, got 1"));
    }

    #[test]
    fn test_close_and_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "first\nsecond\n").unwrap();
        let program = format!(
            "BEGIN {{ f = \"{0}\"; getline a < f; close(f); getline b < f; print a, b, close(f), close(\"nope\") }}",
            path.display()
        );
        assert_eq!(run_awk(&program, ""), "first first 0 -1\n");
    }

    #[test]
    fn test_substitute_helper() {
        let re = Regex::new("o").unwrap();
        assert_eq!(substitute(&re, "foo", "0", true), ("f00".to_string(), 2));
        assert_eq!(substitute(&re, "foo", "0", false), ("f0o".to_string(), 1));
        let mut out = String::new();
        expand_replacement("<&>\\&\\\\x\\y", "m", &mut out);
        assert_eq!(out, "<m>&\\x\\y");
    }
}
