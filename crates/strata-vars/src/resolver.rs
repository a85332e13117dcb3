use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::{CycleError, VariableResult};
use crate::expr;
use crate::registry::VariableRegistry;
use crate::token::{next_token, variable_name};

/// Variable that always names the element under evaluation.
pub const SERVICE_PID: &str = "service.pid";

/// Values visible only while evaluating one element.
pub trait ResolutionScope {
    /// Raw value of an attribute of the current element, usable as a variable.
    fn attribute_value(&self, name: &str) -> Option<String>;

    /// Persistent id of the current element.
    fn service_pid(&self) -> Option<String> {
        None
    }
}

/// A scope with no element behind it.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoScope;

impl ResolutionScope for NoScope {
    fn attribute_value(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Per-evaluation memo of resolved variables.
///
/// Also records which registry variables were read, so callers can tell
/// which elements depend on which variables.
#[derive(Clone, Debug, Default)]
pub struct ResolutionCache {
    memo: HashMap<String, String>,
    consumed: BTreeSet<String>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.memo.get(name).map(String::as_str)
    }

    /// Registry variables read so far.
    pub fn consumed(&self) -> &BTreeSet<String> {
        &self.consumed
    }

    pub fn clear(&mut self) {
        self.memo.clear();
        self.consumed.clear();
    }
}

enum Lookup {
    /// Final text, no further scanning.
    Resolved(String),
    /// Text that still contains tokens.
    Raw(String),
    Missing,
}

enum Step {
    Substitute(String),
    Descend(String, String),
    Literal,
}

/// Text still being scanned. `name` is the variable it is the value of.
struct Frame {
    name: Option<String>,
    text: String,
    cursor: usize,
    out: String,
}

impl Frame {
    fn new(name: Option<String>, text: String) -> Self {
        Self {
            name,
            out: String::with_capacity(text.len()),
            text,
            cursor: 0,
        }
    }
}

/// Substitutes `${name}` tokens.
///
/// For each token the value is taken from, in order: the memo of this
/// evaluation, the registry (explicit then file-level), the attributes of the
/// current element, the environment, the declared default. A token nothing
/// defines is tried as an integer expression over variables and otherwise
/// left in place.
#[derive(Clone, Copy, Debug)]
pub struct VariableResolver<'a> {
    registry: &'a VariableRegistry,
}

impl<'a> VariableResolver<'a> {
    pub fn new(registry: &'a VariableRegistry) -> Self {
        Self { registry }
    }

    /// Replace every token in `raw`.
    pub fn resolve(&self, raw: &str, scope: &dyn ResolutionScope, cache: &mut ResolutionCache) -> VariableResult<String> {
        self.run(vec![Frame::new(None, raw.to_string())], scope, cache)
    }

    /// Fully resolved value of variable `name`, or `None` when nothing defines it.
    pub fn resolve_named(
        &self,
        name: &str,
        scope: &dyn ResolutionScope,
        cache: &mut ResolutionCache,
    ) -> VariableResult<Option<String>> {
        match self.lookup(name, scope, cache) {
            Lookup::Resolved(value) => Ok(Some(value)),
            Lookup::Raw(raw) => self
                .run(vec![Frame::new(Some(name.to_string()), raw)], scope, cache)
                .map(Some),
            Lookup::Missing => Ok(None),
        }
    }

    /// Like [`resolve`](Self::resolve), but a value that is exactly one
    /// `${list(name)}` token becomes the comma-separated items of `name`.
    pub fn resolve_list(
        &self,
        raw: &str,
        scope: &dyn ResolutionScope,
        cache: &mut ResolutionCache,
    ) -> VariableResult<Vec<String>> {
        let trimmed = raw.trim();
        if let Some(token) = next_token(trimmed, 0) {
            if token.is_list() && token.start == 0 && token.end == trimmed.len() {
                return Ok(match self.resolve_named(token.variable(), scope, cache)? {
                    Some(value) => value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    None => vec![raw.to_string()],
                });
            }
        }
        Ok(vec![self.resolve(raw, scope, cache)?])
    }

    fn lookup(&self, name: &str, scope: &dyn ResolutionScope, cache: &mut ResolutionCache) -> Lookup {
        if let Some(value) = cache.memo.get(name) {
            return Lookup::Resolved(value.clone());
        }
        if name == SERVICE_PID {
            if let Some(pid) = scope.service_pid() {
                return Lookup::Resolved(pid);
            }
        }
        if let Some(value) = self.registry.value(name) {
            cache.consumed.insert(name.to_string());
            return classify(value.to_string());
        }
        if let Some(value) = scope.attribute_value(name) {
            return classify(value);
        }
        if let Some(value) = self.registry.environment(name) {
            cache.consumed.insert(name.to_string());
            return Lookup::Resolved(value);
        }
        if let Some(value) = self.registry.default_value(name) {
            cache.consumed.insert(name.to_string());
            return classify(value.to_string());
        }
        Lookup::Missing
    }

    fn run(&self, mut stack: Vec<Frame>, scope: &dyn ResolutionScope, cache: &mut ResolutionCache) -> VariableResult<String> {
        loop {
            let Some(frame) = stack.last() else {
                return Ok(String::new());
            };
            let token = next_token(&frame.text, frame.cursor).map(|t| (t.start, t.end, t.body.to_string()));

            let Some((start, end, body)) = token else {
                let Some(mut done) = stack.pop() else {
                    return Ok(String::new());
                };
                done.out.push_str(&done.text[done.cursor..]);
                if let Some(name) = done.name.take() {
                    cache.memo.insert(name, done.out.clone());
                }
                if stack.is_empty() {
                    return Ok(done.out);
                }
                // The parent re-reads its pending token, now memoized.
                continue;
            };

            match self.step(&body, &stack, scope, cache)? {
                Step::Substitute(value) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.out.push_str(&frame.text[frame.cursor..start]);
                        frame.out.push_str(&value);
                        frame.cursor = end;
                    }
                }
                Step::Descend(name, raw) => stack.push(Frame::new(Some(name), raw)),
                Step::Literal => {
                    if let Some(frame) = stack.last_mut() {
                        frame.out.push_str(&frame.text[frame.cursor..end]);
                        frame.cursor = end;
                    }
                }
            }
        }
    }

    fn step(
        &self,
        body: &str,
        stack: &[Frame],
        scope: &dyn ResolutionScope,
        cache: &mut ResolutionCache,
    ) -> VariableResult<Step> {
        let name = variable_name(body);
        match self.lookup(name, scope, cache) {
            Lookup::Resolved(value) => Ok(Step::Substitute(value)),
            Lookup::Raw(raw) => {
                check_cycle(stack, name)?;
                Ok(Step::Descend(name.to_string(), raw))
            }
            Lookup::Missing => self.expression(body, stack, scope, cache),
        }
    }

    fn expression(
        &self,
        body: &str,
        stack: &[Frame],
        scope: &dyn ResolutionScope,
        cache: &mut ResolutionCache,
    ) -> VariableResult<Step> {
        let Some(tokens) = expr::tokenize(body) else {
            debug!(token = body, "undefined variable left in place");
            return Ok(Step::Literal);
        };

        let mut values: HashMap<&str, i64> = HashMap::new();
        for ident in expr::identifiers(&tokens) {
            let text = match self.lookup(ident, scope, cache) {
                Lookup::Resolved(text) => text,
                Lookup::Raw(raw) => {
                    check_cycle(stack, ident)?;
                    return Ok(Step::Descend(ident.to_string(), raw));
                }
                Lookup::Missing => {
                    debug!(token = body, operand = ident, "expression operand undefined");
                    return Ok(Step::Literal);
                }
            };
            match text.trim().parse::<i64>() {
                Ok(n) => {
                    values.insert(ident, n);
                }
                Err(_) => return Ok(Step::Literal),
            }
        }

        match expr::evaluate(&tokens, |ident| values.get(ident).copied()) {
            Some(result) => Ok(Step::Substitute(result.to_string())),
            None => {
                debug!(token = body, "expression could not be evaluated");
                Ok(Step::Literal)
            }
        }
    }
}

fn classify(value: String) -> Lookup {
    if value.contains("${") {
        Lookup::Raw(value)
    } else {
        Lookup::Resolved(value)
    }
}

fn check_cycle(stack: &[Frame], name: &str) -> Result<(), CycleError> {
    let Some(first) = stack.iter().position(|f| f.name.as_deref() == Some(name)) else {
        return Ok(());
    };
    let mut chain: Vec<String> = stack[first..].iter().filter_map(|f| f.name.clone()).collect();
    chain.push(name.to_string());
    Err(CycleError { chain })
}
