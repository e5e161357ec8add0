//! The action vocabulary: every operation a script body can reach.

use std::collections::HashSet;

use super::parser::{Call, Expr, Program, StmtKind};
use super::{ScriptIssue, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Click,
    Move,
    Scroll,
    Press,
    KeyDown,
    KeyRelease,
    MouseDown,
    MouseRelease,
    TypeText,
    Sleep,
    MousePosition,
}

/// Parameter default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Required,
    Str(&'static str),
    Num(f64),
    /// Filled from the configured press hold
    Hold,
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub default: ParamDefault,
}

const fn req(name: &'static str) -> Param {
    Param { name, default: ParamDefault::Required }
}

const BUTTON: Param = Param { name: "button", default: ParamDefault::Str("left") };

const CLICK: &[Param] = &[BUTTON, Param { name: "count", default: ParamDefault::Num(1.0) }];
const MOVE: &[Param] = &[req("x"), req("y")];
const SCROLL: &[Param] = &[req("dx"), req("dy")];
const PRESS: &[Param] = &[req("key"), Param { name: "duration", default: ParamDefault::Hold }];
const KEY: &[Param] = &[req("key")];
const BUTTON_ONLY: &[Param] = &[BUTTON];
const TEXT: &[Param] = &[req("text")];
const SECONDS: &[Param] = &[req("seconds")];

/// Names a script may call. The snake_case spellings are kept so older
/// scripts keep running; they resolve to the same entries.
const TABLE: &[(&str, Action)] = &[
    ("click", Action::Click),
    ("move", Action::Move),
    ("scroll", Action::Scroll),
    ("press", Action::Press),
    ("keyDown", Action::KeyDown),
    ("keyRelease", Action::KeyRelease),
    ("mouseDown", Action::MouseDown),
    ("mouseRelease", Action::MouseRelease),
    ("typeText", Action::TypeText),
    ("sleep", Action::Sleep),
    ("mousePosition", Action::MousePosition),
    ("key_down", Action::KeyDown),
    ("key_release", Action::KeyRelease),
    ("mouse_down", Action::MouseDown),
    ("mouse_release", Action::MouseRelease),
    ("type_text", Action::TypeText),
    ("mouse_position", Action::MousePosition),
];

impl Action {
    pub fn lookup(name: &str) -> Option<Self> {
        TABLE.iter().find(|(n, _)| *n == name).map(|(_, a)| *a)
    }

    pub fn params(self) -> &'static [Param] {
        match self {
            Self::Click => CLICK,
            Self::Move => MOVE,
            Self::Scroll => SCROLL,
            Self::Press => PRESS,
            Self::KeyDown | Self::KeyRelease => KEY,
            Self::MouseDown | Self::MouseRelease => BUTTON_ONLY,
            Self::TypeText => TEXT,
            Self::Sleep => SECONDS,
            Self::MousePosition => &[],
        }
    }

    /// Whether the action is exempt from the pause/stop checkpoint.
    pub fn is_query(self) -> bool {
        self == Self::MousePosition
    }
}

/// Match a call's arguments to parameter slots. Each slot holds the index of
/// the argument expression (positional first, then keywords), or `None` when
/// the default applies.
pub fn bind_slots(action: Action, call: &Call) -> Result<Vec<Option<usize>>, String> {
    let params = action.params();
    if call.args.len() > params.len() {
        return Err(format!(
            "takes {} argument(s) but {} were given",
            params.len(),
            call.args.len()
        ));
    }
    let mut slots: Vec<Option<usize>> = (0..params.len())
        .map(|i| (i < call.args.len()).then_some(i))
        .collect();
    for (k, (key, _)) in call.kwargs.iter().enumerate() {
        let Some(i) = params.iter().position(|p| p.name == key.as_str()) else {
            return Err(format!("got an unexpected keyword argument '{}'", key));
        };
        if slots[i].is_some() {
            return Err(format!("got multiple values for argument '{}'", key));
        }
        slots[i] = Some(call.args.len() + k);
    }
    for (i, p) in params.iter().enumerate() {
        if slots[i].is_none() && p.default == ParamDefault::Required {
            return Err(format!("missing required argument '{}'", p.name));
        }
    }
    Ok(slots)
}

fn issue(line: usize, column: usize, code: &'static str, message: String) -> ScriptIssue {
    ScriptIssue { line, column, message, severity: Severity::Error, code }
}

fn check_expr(e: &Expr, bound: &HashSet<String>, out: &mut Vec<ScriptIssue>) {
    match e {
        Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) => {}
        Expr::Var { name, line } => {
            if !bound.contains(name) {
                out.push(issue(*line, 1, "UNDEFINED", format!("name '{}' is not defined", name)));
            }
        }
        Expr::Neg(inner) => check_expr(inner, bound, out),
        Expr::Bin(l, _, r) => {
            check_expr(l, bound, out);
            check_expr(r, bound, out);
        }
        Expr::Call(call) => {
            match Action::lookup(&call.name) {
                None => out.push(issue(
                    call.line,
                    call.col,
                    "UNDEFINED",
                    format!("name '{}' is not defined", call.name),
                )),
                Some(action) => {
                    if let Err(msg) = bind_slots(action, call) {
                        out.push(issue(call.line, call.col, "ARGS", format!("{}() {}", call.name, msg)));
                    }
                }
            }
            for a in &call.args {
                check_expr(a, bound, out);
            }
            for (_, a) in &call.kwargs {
                check_expr(a, bound, out);
            }
        }
    }
}

/// Name and arity diagnostics over a parsed program.
pub fn check_program(program: &Program) -> Vec<ScriptIssue> {
    let mut bound = HashSet::new();
    let mut out = Vec::new();
    for stmt in &program.stmts {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                check_expr(e, &bound, &mut out);
                if let Expr::Call(call) = e {
                    if Action::lookup(&call.name).is_some_and(Action::is_query) {
                        out.push(ScriptIssue {
                            line: call.line,
                            column: call.col,
                            message: format!("result of {}() is unused", call.name),
                            severity: Severity::Warning,
                            code: "UNUSED",
                        });
                    }
                }
            }
            StmtKind::Assign(names, e) => {
                check_expr(e, &bound, &mut out);
                bound.extend(names.iter().cloned());
            }
        }
    }
    out
}
