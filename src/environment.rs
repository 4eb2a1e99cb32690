//! Run-time variable storage: built-in variables, globals, arrays, call
//! frames and the current record.
//!
//! Arrays live in an arena and are referred to by [`ArrayId`], so that a
//! function parameter bound to an array aliases the caller's array instead
//! of copying it.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::record::{FieldSplitter, MAX_FIELDS, Record, RecordSeparator};
use crate::value::{DEFAULT_NUMBER_FORMAT, Value};

pub type ArrayId = usize;
pub type Array = HashMap<String, Value>;

/// What a name is bound to
#[derive(Debug, Clone)]
pub enum Var {
    Scalar(Value),
    Array(ArrayId),
}

/// Built-in variables that are always global
const SPECIAL_VARS: &[&str] = &[
    "NR", "NF", "FNR", "FS", "OFS", "ORS", "RS", "FILENAME", "SUBSEP", "RSTART", "RLENGTH",
    "IGNORECASE", "CONVFMT", "OFMT", "ARGC",
];

pub fn is_special_var(name: &str) -> bool {
    SPECIAL_VARS.contains(&name)
}

/// Check that `name` is usable as a variable name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Default)]
struct Frame {
    locals: HashMap<String, Var>,
    /// Arrays created for this call, released when it returns
    owned: Vec<ArrayId>,
}

#[derive(Debug)]
pub struct Environment {
    globals: HashMap<String, Var>,
    arrays: Vec<Array>,
    free_arrays: Vec<ArrayId>,
    frames: Vec<Frame>,

    record: Record,
    splitter: FieldSplitter,
    separator: RecordSeparator,

    fs: String,
    ofs: String,
    ors: String,
    rs: String,
    subsep: String,
    convfmt: String,
    ofmt: String,
    ignore_case: Value,
    argc: Value,
    pub(crate) filename: String,
    pub(crate) nr: usize,
    pub(crate) fnr: usize,
    pub(crate) rstart: f64,
    pub(crate) rlength: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Self {
            globals: HashMap::new(),
            arrays: Vec::new(),
            free_arrays: Vec::new(),
            frames: Vec::new(),
            record: Record::new(),
            splitter: FieldSplitter::Whitespace,
            separator: RecordSeparator::default(),
            fs: " ".to_string(),
            ofs: " ".to_string(),
            ors: "\n".to_string(),
            rs: "\n".to_string(),
            subsep: "\x1c".to_string(),
            convfmt: DEFAULT_NUMBER_FORMAT.to_string(),
            ofmt: DEFAULT_NUMBER_FORMAT.to_string(),
            ignore_case: Value::Number(0.0),
            argc: Value::Number(0.0),
            filename: String::new(),
            nr: 0,
            fnr: 0,
            rstart: 0.0,
            rlength: -1.0,
        };

        let environ = env.new_array();
        for (key, value) in std::env::vars() {
            env.arrays[environ].insert(key, Value::from_string(value));
        }
        env.globals.insert("ENVIRON".to_string(), Var::Array(environ));
        env.set_args(vec!["awk-ai".to_string()]);
        env
    }

    /// Replace ARGV with `args` and set ARGC to its length
    pub fn set_args(&mut self, args: Vec<String>) {
        let argv = match self.globals.get("ARGV") {
            Some(Var::Array(id)) => *id,
            _ => {
                let id = self.new_array();
                self.globals.insert("ARGV".to_string(), Var::Array(id));
                id
            }
        };
        self.arrays[argv].clear();
        self.argc = Value::Number(args.len() as f64);
        for (i, arg) in args.into_iter().enumerate() {
            self.arrays[argv].insert(i.to_string(), Value::from_string(arg));
        }
    }

    // Accessors for the built-ins the interpreter consults on every record

    pub fn ofs(&self) -> &str {
        &self.ofs
    }

    pub fn ors(&self) -> &str {
        &self.ors
    }

    pub fn subsep(&self) -> &str {
        &self.subsep
    }

    pub fn convfmt(&self) -> &str {
        &self.convfmt
    }

    pub fn ofmt(&self) -> &str {
        &self.ofmt
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case.is_truthy()
    }

    pub fn splitter(&self) -> &FieldSplitter {
        &self.splitter
    }

    pub fn separator(&self) -> &RecordSeparator {
        &self.separator
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Scalar value of `name`. Unknown names read as uninitialized.
    pub fn get_var(&self, name: &str) -> Result<Value> {
        let value = match name {
            "NR" => Value::Number(self.nr as f64),
            "NF" => Value::Number(self.record.nf() as f64),
            "FNR" => Value::Number(self.fnr as f64),
            "FS" => Value::from_string(self.fs.clone()),
            "OFS" => Value::from_string(self.ofs.clone()),
            "ORS" => Value::from_string(self.ors.clone()),
            "RS" => Value::from_string(self.rs.clone()),
            "FILENAME" => Value::from_string(self.filename.clone()),
            "SUBSEP" => Value::from_string(self.subsep.clone()),
            "RSTART" => Value::Number(self.rstart),
            "RLENGTH" => Value::Number(self.rlength),
            "IGNORECASE" => self.ignore_case.clone(),
            "CONVFMT" => Value::from_string(self.convfmt.clone()),
            "OFMT" => Value::from_string(self.ofmt.clone()),
            "ARGC" => self.argc.clone(),
            _ => match self.lookup(name) {
                Some(Var::Scalar(v)) => v.clone(),
                Some(Var::Array(_)) => {
                    return Err(Error::runtime(format!(
                        "attempt to use array `{}` in a scalar context",
                        name
                    )));
                }
                None => Value::Uninitialized,
            },
        };
        Ok(value)
    }

    /// Assign a scalar. Inside a function a non-special name is always
    /// written to the current frame.
    pub fn set_var(&mut self, name: &str, value: Value) -> Result<()> {
        match name {
            "NR" => self.nr = count(&value),
            "FNR" => self.fnr = count(&value),
            "NF" => {
                let n = value.to_number();
                if n < 0.0 {
                    return Err(Error::runtime(format!("NF set to negative value {}", n)));
                }
                if n > MAX_FIELDS as f64 {
                    return Err(Error::runtime(format!(
                        "NF set to {}, above the limit of {}",
                        n, MAX_FIELDS
                    )));
                }
                self.record.set_nf(n as usize, &self.ofs);
            }
            "FS" => {
                let fs = value.to_str(&self.convfmt).into_owned();
                self.splitter = FieldSplitter::new(&fs, self.ignore_case())?;
                self.fs = fs;
            }
            "IGNORECASE" => {
                self.ignore_case = value;
                self.splitter = FieldSplitter::new(&self.fs, self.ignore_case())?;
            }
            "RS" => {
                let rs = value.to_str(&self.convfmt).into_owned();
                self.separator = RecordSeparator::new(&rs)?;
                self.rs = rs;
            }
            "OFS" => self.ofs = value.to_str(&self.convfmt).into_owned(),
            "ORS" => self.ors = value.to_str(&self.convfmt).into_owned(),
            "FILENAME" => self.filename = value.to_str(&self.convfmt).into_owned(),
            "SUBSEP" => self.subsep = value.to_str(&self.convfmt).into_owned(),
            "CONVFMT" => self.convfmt = value.to_str(&self.convfmt).into_owned(),
            "OFMT" => self.ofmt = value.to_str(&self.convfmt).into_owned(),
            "RSTART" => self.rstart = value.to_number(),
            "RLENGTH" => self.rlength = value.to_number(),
            "ARGC" => self.argc = value,
            _ => {
                let scope = match self.frames.last_mut() {
                    Some(frame) => &mut frame.locals,
                    None => &mut self.globals,
                };
                match scope.get_mut(name) {
                    Some(Var::Scalar(slot)) => *slot = value,
                    Some(Var::Array(_)) => {
                        return Err(Error::runtime(format!(
                            "attempt to use array `{}` in a scalar context",
                            name
                        )));
                    }
                    None => {
                        scope.insert(name.to_string(), Var::Scalar(value));
                    }
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&Var> {
        self.frames
            .last()
            .and_then(|frame| frame.locals.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// True when `name` currently refers to an array
    pub fn is_array(&self, name: &str) -> bool {
        matches!(self.lookup(name), Some(Var::Array(_)))
    }

    pub fn new_array(&mut self) -> ArrayId {
        match self.free_arrays.pop() {
            Some(id) => id,
            None => {
                self.arrays.push(Array::new());
                self.arrays.len() - 1
            }
        }
    }

    /// Resolve `name` to an array, creating a global one if the name is
    /// unused. Array parameters resolve to the array they were bound to; an
    /// unset local becomes an array owned by its frame.
    pub fn array_id(&mut self, name: &str) -> Result<ArrayId> {
        match self.frames.last().and_then(|f| f.locals.get(name)) {
            Some(Var::Array(id)) => return Ok(*id),
            Some(Var::Scalar(Value::Uninitialized)) => {
                let id = self.new_array();
                if let Some(frame) = self.frames.last_mut() {
                    frame.locals.insert(name.to_string(), Var::Array(id));
                    frame.owned.push(id);
                }
                return Ok(id);
            }
            Some(Var::Scalar(_)) => return Err(scalar_as_array(name)),
            None => {}
        }
        if is_special_var(name) {
            return Err(scalar_as_array(name));
        }
        match self.globals.get(name) {
            Some(Var::Array(id)) => Ok(*id),
            Some(Var::Scalar(Value::Uninitialized)) | None => {
                let id = self.new_array();
                self.globals.insert(name.to_string(), Var::Array(id));
                Ok(id)
            }
            Some(Var::Scalar(_)) => Err(scalar_as_array(name)),
        }
    }

    pub fn array(&self, id: ArrayId) -> &Array {
        &self.arrays[id]
    }

    pub fn array_mut(&mut self, id: ArrayId) -> &mut Array {
        &mut self.arrays[id]
    }

    /// Reading an element creates it, as in AWK
    pub fn get_array_element(&mut self, name: &str, key: &str) -> Result<Value> {
        let id = self.array_id(name)?;
        Ok(self.arrays[id]
            .entry(key.to_string())
            .or_default()
            .clone())
    }

    pub fn set_array_element(&mut self, name: &str, key: String, value: Value) -> Result<()> {
        let id = self.array_id(name)?;
        self.arrays[id].insert(key, value);
        Ok(())
    }

    pub fn delete_array_element(&mut self, name: &str, key: &str) -> Result<()> {
        let id = self.array_id(name)?;
        self.arrays[id].remove(key);
        Ok(())
    }

    pub fn clear_array(&mut self, name: &str) -> Result<()> {
        let id = self.array_id(name)?;
        self.arrays[id].clear();
        Ok(())
    }

    /// Snapshot of the keys, in no particular order
    pub fn array_keys(&mut self, name: &str) -> Result<Vec<String>> {
        let id = self.array_id(name)?;
        Ok(self.arrays[id].keys().cloned().collect())
    }

    pub fn array_contains(&mut self, name: &str, key: &str) -> Result<bool> {
        let id = self.array_id(name)?;
        Ok(self.arrays[id].contains_key(key))
    }

    pub fn array_len(&mut self, name: &str) -> Result<usize> {
        let id = self.array_id(name)?;
        Ok(self.arrays[id].len())
    }

    /// Enter a function call with the given parameter bindings. Arrays in
    /// `owned` are released by the matching [`Environment::pop_scope`].
    pub fn push_scope(&mut self, bindings: Vec<(String, Var)>, owned: Vec<ArrayId>) {
        self.frames.push(Frame {
            locals: bindings.into_iter().collect(),
            owned,
        });
    }

    pub fn pop_scope(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for id in frame.owned {
                self.arrays[id].clear();
                self.free_arrays.push(id);
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Install a new `$0` and split it with the current FS
    pub fn set_record(&mut self, text: String) {
        let fields = if self.separator.is_paragraph() {
            self.splitter.split_paragraph(&text)
        } else {
            self.splitter.split(&text)
        };
        self.record.set_text(text, fields);
    }

    pub fn get_field(&self, index: usize) -> Value {
        Value::from_string(self.record.field(index).to_string())
    }

    pub fn set_field(&mut self, index: usize, value: String) {
        if index == 0 {
            self.set_record(value);
        } else {
            self.record.set_field(index, value, &self.ofs);
        }
    }
}

fn count(value: &Value) -> usize {
    value.to_number().max(0.0) as usize
}

fn scalar_as_array(name: &str) -> Error {
    Error::runtime(format!("attempt to use scalar `{}` as an array", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_variables_are_uninitialized() {
        let env = Environment::new();
        assert!(matches!(env.get_var("nothing").unwrap(), Value::Uninitialized));
    }

    #[test]
    fn test_special_variable_defaults() {
        let env = Environment::new();
        assert_eq!(env.get_var("FS").unwrap().as_str(), " ");
        assert_eq!(env.get_var("ORS").unwrap().as_str(), "\n");
        assert_eq!(env.get_var("SUBSEP").unwrap().as_str(), "\x1c");
        assert_eq!(env.get_var("RLENGTH").unwrap().to_number(), -1.0);
        assert_eq!(env.get_var("ARGC").unwrap().to_number(), 1.0);
        assert_eq!(env.get_var("CONVFMT").unwrap().as_str(), "%.6g");
    }

    #[test]
    fn test_fs_change_affects_next_split_only() {
        let mut env = Environment::new();
        env.set_record("a:b c".to_string());
        assert_eq!(env.record().nf(), 2);
        env.set_var("FS", Value::from_string(":".to_string())).unwrap();
        assert_eq!(env.record().nf(), 2);
        env.set_record("a:b c".to_string());
        assert_eq!(env.get_field(2).as_str(), "b c");
    }

    #[test]
    fn test_nf_assignment_rebuilds_record() {
        let mut env = Environment::new();
        env.set_record("a b c".to_string());
        env.set_var("NF", Value::Number(2.0)).unwrap();
        assert_eq!(env.record().text(), "a b");
        assert!(env.set_var("NF", Value::Number(-1.0)).is_err());
    }

    #[test]
    fn test_nf_above_limit_is_rejected() {
        let mut env = Environment::new();
        env.set_record("a b".to_string());
        let err = env.set_var("NF", Value::Number(2e9)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Runtime);
        assert_eq!(env.record().nf(), 2);
        env.set_var("NF", Value::Number(MAX_FIELDS as f64)).unwrap();
        assert_eq!(env.record().nf(), MAX_FIELDS);
    }

    #[test]
    fn test_field_zero_assignment_resplits() {
        let mut env = Environment::new();
        env.set_field(0, "x y z".to_string());
        assert_eq!(env.record().nf(), 3);
        env.set_field(2, "Y".to_string());
        assert_eq!(env.record().text(), "x Y z");
    }

    #[test]
    fn test_invalid_fs_is_an_error() {
        let mut env = Environment::new();
        assert!(env.set_var("FS", Value::from_string("a(".to_string())).is_err());
        assert_eq!(env.get_var("FS").unwrap().as_str(), " ");
    }

    #[test]
    fn test_array_operations() {
        let mut env = Environment::new();
        env.set_array_element("a", "x".to_string(), Value::Number(1.0)).unwrap();
        assert!(env.array_contains("a", "x").unwrap());
        assert!(!env.array_contains("a", "y").unwrap());
        assert_eq!(env.get_array_element("a", "x").unwrap().to_number(), 1.0);

        // Referencing creates the element
        env.get_array_element("a", "y").unwrap();
        assert_eq!(env.array_len("a").unwrap(), 2);

        env.delete_array_element("a", "x").unwrap();
        assert_eq!(env.array_keys("a").unwrap(), vec!["y".to_string()]);

        env.clear_array("a").unwrap();
        assert_eq!(env.array_len("a").unwrap(), 0);
    }

    #[test]
    fn test_scalar_array_misuse() {
        let mut env = Environment::new();
        env.set_var("s", Value::Number(1.0)).unwrap();
        assert!(env.array_id("s").is_err());

        env.set_array_element("a", "k".to_string(), Value::Number(1.0)).unwrap();
        assert!(env.get_var("a").is_err());
        assert!(env.set_var("a", Value::Number(2.0)).is_err());
        assert!(env.array_id("NR").is_err());
    }

    #[test]
    fn test_environ_and_argv_are_arrays() {
        let mut env = Environment::new();
        assert!(env.is_array("ENVIRON"));
        env.set_args(vec!["awk-ai".to_string(), "in.txt".to_string()]);
        assert_eq!(env.get_var("ARGC").unwrap().to_number(), 2.0);
        assert_eq!(env.get_array_element("ARGV", "1").unwrap().as_str(), "in.txt");
    }

    #[test]
    fn test_function_scope_is_isolated() {
        let mut env = Environment::new();
        env.set_var("x", Value::Number(1.0)).unwrap();
        env.set_var("g", Value::Number(5.0)).unwrap();

        env.push_scope(vec![("x".to_string(), Var::Scalar(Value::Number(10.0)))], vec![]);
        assert_eq!(env.get_var("x").unwrap().to_number(), 10.0);
        assert_eq!(env.get_var("g").unwrap().to_number(), 5.0);
        env.set_var("g", Value::Number(99.0)).unwrap();
        env.set_var("fresh", Value::Number(3.0)).unwrap();
        assert_eq!(env.get_var("g").unwrap().to_number(), 99.0);
        env.pop_scope();

        assert_eq!(env.get_var("x").unwrap().to_number(), 1.0);
        assert_eq!(env.get_var("g").unwrap().to_number(), 5.0);
        assert!(matches!(env.get_var("fresh").unwrap(), Value::Uninitialized));
    }

    #[test]
    fn test_array_parameter_aliases_caller_array() {
        let mut env = Environment::new();
        let id = env.array_id("data").unwrap();
        env.push_scope(vec![("p".to_string(), Var::Array(id))], vec![]);
        env.set_array_element("p", "k".to_string(), Value::Number(7.0)).unwrap();
        // Non-parameter array names are global
        env.set_array_element("other", "z".to_string(), Value::Number(1.0)).unwrap();
        env.pop_scope();

        assert_eq!(env.get_array_element("data", "k").unwrap().to_number(), 7.0);
        assert!(env.array_contains("other", "z").unwrap());
        assert!(!env.is_array("p"));
    }

    #[test]
    fn test_unset_local_becomes_frame_array() {
        let mut env = Environment::new();
        env.push_scope(vec![("tmp".to_string(), Var::Scalar(Value::Uninitialized))], vec![]);
        env.set_array_element("tmp", "k".to_string(), Value::Number(1.0)).unwrap();
        assert!(env.is_array("tmp"));
        env.pop_scope();
        assert!(!env.is_array("tmp"));
    }

    #[test]
    fn test_owned_arrays_are_recycled() {
        let mut env = Environment::new();
        let local = env.new_array();
        env.push_scope(vec![("tmp".to_string(), Var::Array(local))], vec![local]);
        env.set_array_element("tmp", "1".to_string(), Value::Number(1.0)).unwrap();
        env.pop_scope();

        let reused = env.new_array();
        assert_eq!(reused, local);
        assert!(env.array(reused).is_empty());
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("x"));
        assert!(is_valid_name("_private1"));
        assert!(!is_valid_name("1x"));
        assert!(!is_valid_name("a-b"));
        assert!(!is_valid_name(""));
    }
}
