//! Scenario lines: `$exec`, `$set`, `$goto` and `$ret` actions evaluated
//! against a per-invocation context dictionary.
//!
//! Every action may carry `$if` (skip the line when false) and `$catch`
//! (handle a failure of the line instead of ending the run).

use crate::command::{create_command, Command};
use crate::error::{Error, Result};
use crate::object::{create_object_from_descriptor, downcast, get_catalog_data};
use crate::variant::{get_by_path, put_by_path, Dictionary, Variant};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Value computed from the context at execution time.
///
/// `{"$path": p, "$default"?: v}` reads the context, `{"$gpath": name,
/// "$default"?: v}` reads the catalog, `{"$val": v}` is `v` taken verbatim and
/// a command object is executed. Anything else is a literal.
#[derive(Clone)]
pub enum ContextValue {
    Literal(Variant),
    Path { path: String, default: Option<Variant> },
    Catalog { name: String, default: Option<Variant> },
    Command(Arc<Command>),
}

impl ContextValue {
    pub fn new(source: &Variant) -> Result<Self> {
        if let Some(obj) = source.as_object() {
            if let Ok(command) = downcast::<Command>(obj) {
                return Ok(ContextValue::Command(command));
            }
        }
        let Some(dict) = source.as_dict() else {
            return Ok(ContextValue::Literal(source.clone()));
        };
        if let Some(value) = dict.get("$val") {
            return Ok(ContextValue::Literal(value.clone()));
        }
        let default = dict.get("$default").cloned();
        for (key, catalog) in [("$path", false), ("$gpath", true)] {
            let Some(path) = dict.get(key) else {
                continue;
            };
            let path = path
                .as_str()
                .ok_or_else(|| Error::invalid_argument(format!("field <{key}> must be a string, got <{}>", path.value_type())))?
                .to_string();
            return Ok(if catalog {
                ContextValue::Catalog { name: path, default }
            } else {
                ContextValue::Path { path, default }
            });
        }
        Ok(ContextValue::Literal(source.clone()))
    }

    pub fn get(&self, context: &Variant) -> Result<Variant> {
        match self {
            ContextValue::Literal(v) => Ok(v.clone()),
            ContextValue::Path { path, default } => match (get_by_path(context, path), default) {
                (Ok(v), _) => Ok(v.clone()),
                (Err(_), Some(d)) => Ok(d.clone()),
                (Err(e), None) => Err(e),
            },
            ContextValue::Catalog { name, default } => get_catalog_data(name)
                .or_else(|| default.clone())
                .ok_or_else(|| Error::OutOfRange(format!("catalog entry <{name}> not found"))),
            ContextValue::Command(command) => command.execute(&Variant::Null),
        }
    }
}

/// What the interpreter does after a line
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Next,
    Jump { branch: String, default: Option<String> },
    Return(Variant),
}

/// One `$catch` entry. Code 0 catches everything.
#[derive(Debug, Clone, Default, PartialEq)]
struct CatchRule {
    code: i32,
    goto: String,
    log: bool,
    dst: String,
}

impl CatchRule {
    /// `null` = `{}`, `"branch"` = `{"goto": "branch"}`, or `{"code", "goto", "log", "dst"}`
    fn parse(config: &Variant) -> Result<Self> {
        match config.resolve() {
            Variant::Null => Ok(Self::default()),
            Variant::String(branch) => Ok(Self {
                goto: branch.clone(),
                ..Self::default()
            }),
            Variant::Dictionary(d) => Ok(Self {
                code: parse_error_code(d.get("code"))?,
                goto: d.get_or("goto", "").convert(),
                log: d.get_or("log", false).convert(),
                dst: d.get_or("dst", "").convert(),
            }),
            other => Err(Error::invalid_argument(format!("invalid $catch rule <{other}>"))),
        }
    }

    fn matches(&self, error: &Error) -> bool {
        self.code == 0 || error.is_based_on(self.code)
    }
}

/// Integer or hex string (`"0xE0010001"` or `"E0010001"`)
fn parse_error_code(value: Option<&Variant>) -> Result<i32> {
    let Some(value) = value else {
        return Ok(0);
    };
    match value.resolve() {
        Variant::Int(code) => Ok(*code as i32),
        Variant::String(s) if s.is_empty() => Ok(0),
        Variant::String(s) => {
            let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
            u32::from_str_radix(hex, 16)
                .map(|code| code as i32)
                .map_err(|_| Error::invalid_argument(format!("invalid error code <{s}> in $catch rule")))
        }
        other => Err(Error::invalid_argument(format!("invalid error code <{other}> in $catch rule"))),
    }
}

enum Kind {
    Exec { command: Arc<Command>, dst: Option<ContextValue> },
    Set { value: ContextValue, dst: ContextValue },
    Goto { branch: ContextValue, default: Option<ContextValue> },
    Ret(ContextValue),
}

pub struct Action {
    kind: Kind,
    condition: Option<ContextValue>,
    catch: Vec<CatchRule>,
}

impl Action {
    /// The line kind is picked by the first of `$set`, `$goto`, `$ret` present.
    /// Otherwise the line executes `$exec` or, without it, the descriptor itself
    /// as a command (or any `clsid` object that is a command).
    pub fn compile(descriptor: &Variant) -> Result<Self> {
        let dict = descriptor.as_dict().ok_or_else(|| {
            Error::invalid_argument(format!("scenario line must be a dictionary, got <{}>", descriptor.value_type()))
        })?;
        let cav = |key: &str| dict.get(key).map(ContextValue::new).transpose();

        let kind = if let Some(value) = cav("$set")? {
            let dst = cav("$dst")?.ok_or_else(|| Error::invalid_argument("$set requires field <$dst>"))?;
            Kind::Set { value, dst }
        } else if let Some(branch) = cav("$goto")? {
            Kind::Goto {
                branch,
                default: cav("$default")?,
            }
        } else if let Some(value) = cav("$ret")? {
            Kind::Ret(value)
        } else {
            Kind::Exec {
                command: compile_command(dict)?,
                dst: cav("$dst")?,
            }
        };

        let catch = match dict.get("$catch") {
            None => Vec::new(),
            Some(Variant::Sequence(rules)) => rules.iter().map(CatchRule::parse).collect::<Result<_>>()?,
            Some(rule) => vec![CatchRule::parse(rule)?],
        };

        Ok(Self {
            kind,
            condition: cav("$if")?,
            catch,
        })
    }

    /// Run the line, applying `$catch` to a failure
    pub fn execute(&self, context: &mut Variant) -> Result<Outcome> {
        let error = match self.execute_unguarded(context) {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };
        let Some(rule) = self.catch.iter().find(|rule| rule.matches(&error)) else {
            return Err(error);
        };
        if rule.log {
            warn!(action = %self, code = error.code(), error = %error, "scenario line failed, caught");
        }
        if !rule.dst.is_empty() {
            let serialized = crate::dict! { "code" => error.code(), "message" => error.message() };
            put_by_path(context, &rule.dst, serialized, true)?;
        }
        Ok(if rule.goto.is_empty() {
            Outcome::Next
        } else {
            Outcome::Jump {
                branch: rule.goto.clone(),
                default: None,
            }
        })
    }

    fn execute_unguarded(&self, context: &mut Variant) -> Result<Outcome> {
        if let Some(condition) = &self.condition {
            if !condition.get(context)?.convert::<bool>() {
                return Ok(Outcome::Next);
            }
        }
        match &self.kind {
            Kind::Exec { command, dst } => {
                let result = command.execute(&Variant::Null)?;
                if let Some(dst) = dst {
                    let path = dst.get(context)?.convert::<String>();
                    put_by_path(context, &path, result, true)?;
                }
                Ok(Outcome::Next)
            }
            Kind::Set { value, dst } => {
                let value = value.get(context)?;
                let path = dst.get(context)?.convert::<String>();
                put_by_path(context, &path, value, true)?;
                Ok(Outcome::Next)
            }
            Kind::Goto { branch, default } => Ok(Outcome::Jump {
                branch: branch.get(context)?.convert(),
                default: default.as_ref().map(|d| d.get(context)).transpose()?.map(|d| d.convert()),
            }),
            Kind::Ret(value) => Ok(Outcome::Return(value.get(context)?)),
        }
    }
}

fn compile_command(dict: &Dictionary) -> Result<Arc<Command>> {
    if let Some(exec) = dict.get("$exec") {
        return exec
            .as_object()
            .and_then(|obj| downcast::<Command>(obj).ok())
            .ok_or_else(|| Error::invalid_argument(format!("$exec must hold a command object, got <{exec}>")));
    }

    let mut descriptor = Dictionary::new();
    for (key, value) in dict.iter().filter(|(key, _)| !key.starts_with('$')) {
        descriptor.put(key, value.clone());
    }
    if descriptor.has("clsid") {
        let obj = create_object_from_descriptor(&Variant::Dictionary(descriptor))?;
        return downcast::<Command>(&obj).map_err(|e| e.context("scenario line object"));
    }
    create_command(&Variant::Dictionary(descriptor))
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Exec { command, .. } => write!(f, "{command}"),
            Kind::Set { .. } => f.write_str("$set"),
            Kind::Goto { .. } => f.write_str("$goto"),
            Kind::Ret(_) => f.write_str("$ret"),
        }
    }
}
