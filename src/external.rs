//! Host-provided text functions callable from AWK programs.
//!
//! A program calls these exactly like user functions: `ai_sentiment($0)`.
//! The interpreter stringifies the arguments, calls the registered
//! [`ExternalFunction`] and treats the returned string like any other run-time
//! string. Implementations must always return a string; the [`Fallback`] and
//! [`Timeout`] wrappers turn failures and slow calls into a fixed result.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

/// A function the host makes available to AWK programs
pub trait ExternalFunction: Send + Sync {
    fn call(&self, args: &[String]) -> String;
}

impl<F> ExternalFunction for F
where
    F: Fn(&[String]) -> String + Send + Sync,
{
    fn call(&self, args: &[String]) -> String {
        self(args)
    }
}

/// Name-to-function table handed to the interpreter
#[derive(Clone, Default)]
pub struct ExternalFunctions {
    table: HashMap<String, Arc<dyn ExternalFunction>>,
}

impl ExternalFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace `name`
    pub fn register(&mut self, name: impl Into<String>, function: impl ExternalFunction + 'static) {
        self.table.insert(name.into(), Arc::new(function));
    }

    /// Builder-style [`ExternalFunctions::register`]
    pub fn with(mut self, name: impl Into<String>, function: impl ExternalFunction + 'static) -> Self {
        self.register(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ExternalFunction>> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.table.remove(name).is_some()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Debug for ExternalFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunctions")
            .field("names", &self.names())
            .finish()
    }
}

/// Wraps a fallible function; an error is logged and replaced by a fixed
/// string.
pub struct Fallback<F> {
    name: String,
    fallback: String,
    inner: F,
}

impl<F> Fallback<F> {
    pub fn new(name: impl Into<String>, fallback: impl Into<String>, inner: F) -> Self {
        Self {
            name: name.into(),
            fallback: fallback.into(),
            inner,
        }
    }
}

impl<F, E> ExternalFunction for Fallback<F>
where
    F: Fn(&[String]) -> Result<String, E> + Send + Sync,
    E: fmt::Display,
{
    fn call(&self, args: &[String]) -> String {
        match (self.inner)(args) {
            Ok(result) => result,
            Err(e) => {
                warn!(function = %self.name, error = %e, "external function failed, using fallback");
                self.fallback.clone()
            }
        }
    }
}

/// Runs the wrapped function on a helper thread and gives up after `limit`.
/// A call that panics is treated like one that timed out.
///
/// A helper thread that misses its deadline is left to finish on its own.
/// At most `max_in_flight` helpers (default [`Timeout::DEFAULT_MAX_IN_FLIGHT`])
/// run at once; further calls return the fallback without spawning.
pub struct Timeout {
    name: String,
    fallback: String,
    limit: Duration,
    inner: Arc<dyn ExternalFunction>,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Releases one in-flight slot when the helper thread ends, panicking or not
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Timeout {
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

    pub fn new(
        name: impl Into<String>,
        fallback: impl Into<String>,
        limit: Duration,
        inner: impl ExternalFunction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fallback: fallback.into(),
            limit,
            inner: Arc::new(inner),
            max_in_flight: Self::DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }
}

impl ExternalFunction for Timeout {
    fn call(&self, args: &[String]) -> String {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) >= self.max_in_flight {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            warn!(function = %self.name, max_in_flight = self.max_in_flight, "too many unfinished calls, using fallback");
            return self.fallback.clone();
        }
        let slot = InFlightSlot(Arc::clone(&self.in_flight));

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let args = args.to_vec();
        thread::spawn(move || {
            let _slot = slot;
            let _ = tx.send(inner.call(&args));
        });
        match rx.recv_timeout(self.limit) {
            Ok(result) => result,
            Err(e) => {
                warn!(function = %self.name, limit = ?self.limit, error = %e, "external function did not answer, using fallback");
                self.fallback.clone()
            }
        }
    }
}

/// Deterministic offline versions of the `ai_*` functions, driven by
/// keyword tables. Useful for demos and tests; no network access.
pub fn simulated() -> ExternalFunctions {
    ExternalFunctions::new()
        .with("ai_sentiment", |args: &[String]| sentiment(arg(args, 0)).to_string())
        .with("ai_classify", |args: &[String]| classify(arg(args, 0), arg(args, 1)))
        .with("ai_translate", |args: &[String]| translate(arg(args, 0), arg(args, 1)))
        .with("ai_summarize", |args: &[String]| {
            let max_words = args
                .get(1)
                .and_then(|n| n.trim().parse::<usize>().ok())
                .unwrap_or(50);
            summarize(arg(args, 0), max_words)
        })
        .with("ai_extract_info", |args: &[String]| extract(arg(args, 0), arg(args, 1)))
        .with("ai_entity_extract", |args: &[String]| extract(arg(args, 0), arg(args, 1)))
        .with("ai_fact_check", |args: &[String]| fact_check(arg(args, 0)).to_string())
        .with("ai_math_word_problem", |args: &[String]| solve_word_problem(arg(args, 0)))
        .with("ai_generate", |args: &[String]| {
            fill_template(arg(args, 0), args.get(1..).unwrap_or(&[]))
        })
}

fn arg(args: &[String], index: usize) -> &str {
    args.get(index).map(String::as_str).unwrap_or("")
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn sentiment(text: &str) -> &'static str {
    let text = text.to_lowercase();
    if contains_any(&text, &["love", "amazing", "great", "perfect", "excited", "beautiful"]) {
        "positive"
    } else if contains_any(&text, &["hate", "terrible", "awful", "bad", "frustrated", "stressful"]) {
        "negative"
    } else {
        "neutral"
    }
}

const TOPICS: &[(&str, &[&str])] = &[
    ("science", &["discover", "species", "ocean", "earthquake"]),
    ("business", &["stock", "market", "economic", "budget", "layoffs"]),
    ("sports", &["championship", "basketball", "wins"]),
    ("technology", &["technology", "tech", "healthcare", " ai "]),
    ("politics", &["political", "leaders", "climate", "policies"]),
    ("entertainment", &["celebrity", "chef", "restaurant"]),
];

/// Keyword topic, restricted to `categories` (comma separated) when given
fn classify(text: &str, categories: &str) -> String {
    let padded = format!(" {} ", text.to_lowercase());
    let topic = TOPICS
        .iter()
        .find(|(_, words)| contains_any(&padded, words))
        .map(|(topic, _)| *topic)
        .unwrap_or("general");

    let allowed: Vec<&str> = categories
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if allowed.is_empty() {
        return topic.to_string();
    }
    allowed
        .iter()
        .find(|c| c.eq_ignore_ascii_case(topic))
        .unwrap_or(&allowed[0])
        .to_string()
}

const SPANISH: &[(&str, &str)] = &[
    ("i love this", "me encanta esto"),
    ("good morning", "buenos días"),
    ("thank you", "gracias"),
    ("hello", "hola"),
    ("laptop", "portátil"),
    ("headphones", "auriculares"),
    ("phone", "teléfono"),
];

fn translate(text: &str, language: &str) -> String {
    if language.eq_ignore_ascii_case("spanish") || language.eq_ignore_ascii_case("es") {
        let lower = text.to_lowercase();
        for (english, spanish) in SPANISH {
            if lower.contains(english) {
                return lower.replace(english, spanish);
            }
        }
        return "traducción simulada".to_string();
    }
    format!("[{}] {}", language, text)
}

fn summarize(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

static PERSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").expect("valid pattern"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+(\.[\w-]+)+").expect("valid pattern"));
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(\.\d+)?").expect("valid pattern"));

/// Comma-separated matches of the requested kind, or "none"
fn extract(text: &str, kind: &str) -> String {
    let kind = kind.to_lowercase();
    let re = if contains_any(&kind, &["person", "people", "name"]) {
        &*PERSON
    } else if kind.contains("email") {
        &*EMAIL
    } else if contains_any(&kind, &["number", "amount", "price"]) {
        &*NUMBER
    } else {
        return "none".to_string();
    };
    let found: Vec<&str> = re.find_iter(text).map(|m| m.as_str()).collect();
    if found.is_empty() {
        "none".to_string()
    } else {
        found.join(", ")
    }
}

fn fact_check(statement: &str) -> &'static str {
    let text = statement.to_lowercase();
    if text.contains("pacific ocean") && text.contains("largest") {
        "true"
    } else if text.contains("cats") && text.contains("fly") {
        "false"
    } else {
        "uncertain"
    }
}

/// Pick an operation from cue words and apply it to the numbers in the text
fn solve_word_problem(problem: &str) -> String {
    let text = problem.to_lowercase();
    let numbers: Vec<f64> = NUMBER
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let Some((&first, rest)) = numbers.split_first() else {
        return "0".to_string();
    };
    let answer = if contains_any(&text, &["left", "remain", "minus", "fewer", "gave", "spent", "lost", "ate"]) {
        rest.iter().fold(first, |acc, n| acc - n)
    } else if contains_any(&text, &["times", "each", "product"]) {
        rest.iter().fold(first, |acc, n| acc * n)
    } else {
        rest.iter().fold(first, |acc, n| acc + n)
    };
    crate::format::format_number(answer, crate::value::DEFAULT_NUMBER_FORMAT)
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid pattern"));

/// Replace `{0}`, `{1}`... by position, then remaining `{name}` placeholders
/// in order of appearance
fn fill_template(template: &str, values: &[String]) -> String {
    let mut next = 0;
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            let value = match key.parse::<usize>() {
                Ok(index) => values.get(index),
                Err(_) => {
                    next += 1;
                    values.get(next - 1)
                }
            };
            value.cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
