//! Static function registration table.
//!
//! Built once; the router validates classifier output against it and the
//! executor resolves dispatch targets from it. A function name missing
//! from this table is, by definition, not executable.

use crate::managers::ManagerId;
use serde_json::{Map, Value};

/// Expected type of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Int,
    Bool,
}

/// Declared schema for one argument.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

/// Dispatch target of a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Routed to one manager via the registry.
    Manager(ManagerId),
    /// Routed to the web search module.
    Search,
    /// Routed to the OS launcher seam.
    Launcher,
    /// Aggregate read across all managers.
    Aggregate,
}

/// Declared schema for one registered function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub target: Target,
    pub args: &'static [ArgSpec],
    /// Safe to retry once on a transient failure. Mutating operations
    /// are never marked idempotent.
    pub idempotent: bool,
}

const fn req(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required: true,
    }
}

const fn opt(name: &'static str, kind: ArgKind) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required: false,
    }
}

/// All registered functions.
pub const FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: "set_timer",
        target: Target::Manager(ManagerId::Timers),
        args: &[req("duration", ArgKind::Str), opt("label", ArgKind::Str)],
        idempotent: false,
    },
    FunctionSpec {
        name: "cancel_timer",
        target: Target::Manager(ManagerId::Timers),
        args: &[req("label", ArgKind::Str)],
        idempotent: false,
    },
    FunctionSpec {
        name: "set_alarm",
        target: Target::Manager(ManagerId::Alarms),
        args: &[req("time", ArgKind::Str), opt("label", ArgKind::Str)],
        idempotent: false,
    },
    FunctionSpec {
        name: "create_calendar_event",
        target: Target::Manager(ManagerId::Calendar),
        args: &[
            req("title", ArgKind::Str),
            opt("date", ArgKind::Str),
            opt("time", ArgKind::Str),
            opt("duration", ArgKind::Int),
        ],
        idempotent: false,
    },
    FunctionSpec {
        name: "add_task",
        target: Target::Manager(ManagerId::Tasks),
        args: &[req("text", ArgKind::Str), opt("priority", ArgKind::Str)],
        idempotent: false,
    },
    FunctionSpec {
        name: "complete_task",
        target: Target::Manager(ManagerId::Tasks),
        args: &[req("text", ArgKind::Str)],
        idempotent: false,
    },
    FunctionSpec {
        name: "web_search",
        target: Target::Search,
        args: &[req("query", ArgKind::Str)],
        idempotent: true,
    },
    FunctionSpec {
        name: "get_weather",
        target: Target::Manager(ManagerId::Weather),
        args: &[],
        idempotent: true,
    },
    FunctionSpec {
        name: "get_news",
        target: Target::Manager(ManagerId::News),
        args: &[opt("topic", ArgKind::Str)],
        idempotent: true,
    },
    FunctionSpec {
        name: "get_system_info",
        target: Target::Aggregate,
        args: &[],
        idempotent: true,
    },
    FunctionSpec {
        name: "launch_app",
        target: Target::Launcher,
        args: &[req("name", ArgKind::Str)],
        idempotent: false,
    },
    FunctionSpec {
        name: "play_media",
        target: Target::Launcher,
        args: &[req("query", ArgKind::Str)],
        idempotent: false,
    },
];

/// Look up a registered function by name.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// Validate arguments against a function's declared schema.
///
/// Required arguments must be present, non-null, and of the declared type;
/// optional arguments are type-checked when present. Arguments the schema
/// does not declare are ignored (the classifier is allowed to be sloppy).
///
/// Returns `(field, reason)` on the first violation.
pub fn validate_args(
    spec: &FunctionSpec,
    args: &Map<String, Value>,
) -> std::result::Result<(), (String, String)> {
    for arg in spec.args {
        match args.get(arg.name) {
            None | Some(Value::Null) => {
                if arg.required {
                    return Err((arg.name.to_owned(), "required argument missing".to_owned()));
                }
            }
            Some(value) => {
                let ok = match arg.kind {
                    ArgKind::Str => value.is_string(),
                    ArgKind::Int => value.as_i64().is_some(),
                    ArgKind::Bool => value.is_boolean(),
                };
                if !ok {
                    return Err((
                        arg.name.to_owned(),
                        format!("expected {:?}, got {value}", arg.kind),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn lookup_finds_registered_functions() {
        assert!(lookup("set_timer").is_some());
        assert!(lookup("get_system_info").is_some());
        assert!(lookup("self_destruct").is_none());
    }

    #[test]
    fn required_argument_missing_fails() {
        let spec = lookup("set_timer").unwrap();
        let err = validate_args(spec, &args(json!({ "label": "tea" }))).unwrap_err();
        assert_eq!(err.0, "duration");
    }

    #[test]
    fn type_mismatch_fails() {
        let spec = lookup("create_calendar_event").unwrap();
        let err = validate_args(
            spec,
            &args(json!({ "title": "standup", "duration": "an hour" })),
        )
        .unwrap_err();
        assert_eq!(err.0, "duration");
    }

    #[test]
    fn optional_arguments_may_be_absent() {
        let spec = lookup("set_alarm").unwrap();
        assert!(validate_args(spec, &args(json!({ "time": "7am" }))).is_ok());
    }

    #[test]
    fn undeclared_arguments_are_ignored() {
        let spec = lookup("web_search").unwrap();
        assert!(validate_args(
            spec,
            &args(json!({ "query": "rust", "safesearch": true }))
        )
        .is_ok());
    }

    #[test]
    fn mutating_functions_are_not_idempotent() {
        for name in ["set_timer", "set_alarm", "add_task", "create_calendar_event"] {
            assert!(!lookup(name).unwrap().idempotent, "{name}");
        }
        for name in ["web_search", "get_weather", "get_news", "get_system_info"] {
            assert!(lookup(name).unwrap().idempotent, "{name}");
        }
    }
}
