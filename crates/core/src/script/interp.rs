use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::control::{Control, Stopped};
use crate::keys::Key;
use crate::logger;
use crate::platform::InputDriver;
use crate::types::MouseButton;
use super::parser::{BinOp, Call, Expr, Program, StmtKind};
use super::vocab::{bind_slots, Action, ParamDefault};
use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Num(f64),
    Str(String),
    Bool(bool),
    Tuple(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Num(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Num(_) => "number",
            Self::Str(_) => "str",
            Self::Bool(_) => "bool",
            Self::Tuple(_) => "tuple",
        }
    }
}

/// Walks a parsed program against an input driver.
///
/// Every vocabulary call except the position query passes the control
/// checkpoint first, so stop aborts and pause blocks between actions.
pub struct Interpreter<'a> {
    driver: &'a dyn InputDriver,
    control: &'a Control,
    slice: Duration,
    press_hold: f64,
    vars: HashMap<String, Value>,
    on_line: Box<dyn FnMut(usize) + 'a>,
}

impl<'a> Interpreter<'a> {
    pub fn new(driver: &'a dyn InputDriver, control: &'a Control) -> Self {
        Self {
            driver,
            control,
            slice: Duration::from_millis(100),
            press_hold: 0.05,
            vars: HashMap::new(),
            on_line: Box::new(|_| {}),
        }
    }

    pub fn with_slice(mut self, slice: Duration) -> Self {
        self.slice = slice;
        self
    }

    pub fn with_press_hold(mut self, secs: f64) -> Self {
        self.press_hold = secs;
        self
    }

    /// Observe the line of each statement as it starts.
    pub fn on_line(mut self, f: impl FnMut(usize) + 'a) -> Self {
        self.on_line = Box::new(f);
        self
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        for stmt in &program.stmts {
            (self.on_line)(stmt.line);
            match &stmt.kind {
                StmtKind::Expr(e) => {
                    self.eval(e, stmt.line)?;
                }
                StmtKind::Assign(names, e) => {
                    let value = self.eval(e, stmt.line)?;
                    self.assign(names, value, stmt.line)?;
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, names: &[String], value: Value, line: usize) -> Result<(), ScriptError> {
        if let [name] = names {
            self.vars.insert(name.clone(), value);
            return Ok(());
        }
        match value {
            Value::Tuple(items) if items.len() == names.len() => {
                for (name, v) in names.iter().zip(items) {
                    self.vars.insert(name.clone(), v);
                }
                Ok(())
            }
            other => Err(ScriptError::Type {
                line,
                msg: format!("cannot unpack {} into {} names", other.type_name(), names.len()),
            }),
        }
    }

    fn eval(&mut self, e: &Expr, line: usize) -> Result<Value, ScriptError> {
        match e {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Var { name, line } => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::UnknownName { line: *line, name: name.clone() }),
            Expr::Neg(inner) => match self.eval(inner, line)? {
                Value::Num(n) => Ok(Value::Num(-n)),
                other => Err(ScriptError::Type {
                    line,
                    msg: format!("bad operand type for unary -: {}", other.type_name()),
                }),
            },
            Expr::Bin(l, op, r) => {
                let l = self.eval(l, line)?;
                let r = self.eval(r, line)?;
                binary(l, *op, r, line)
            }
            Expr::Call(call) => self.call(call),
        }
    }

    fn call(&mut self, call: &Call) -> Result<Value, ScriptError> {
        let action = Action::lookup(&call.name)
            .ok_or_else(|| ScriptError::UnknownName { line: call.line, name: call.name.clone() })?;
        let slots = bind_slots(action, call).map_err(|msg| ScriptError::Argument {
            line: call.line,
            name: call.name.clone(),
            msg,
        })?;

        let mut given = Vec::with_capacity(call.args.len() + call.kwargs.len());
        for e in call.args.iter().chain(call.kwargs.iter().map(|(_, e)| e)) {
            given.push(self.eval(e, call.line)?);
        }
        let args: Vec<Value> = action
            .params()
            .iter()
            .zip(slots)
            .map(|(param, slot)| match (slot, param.default) {
                (Some(i), _) => given[i].clone(),
                (None, ParamDefault::Str(s)) => Value::Str(s.to_string()),
                (None, ParamDefault::Num(n)) => Value::Num(n),
                (None, ParamDefault::Hold) => Value::Num(self.press_hold),
                (None, ParamDefault::Required) => Value::None,
            })
            .collect();

        if action.is_query() {
            return self.perform(action, call, &args);
        }
        self.control.checkpoint()?;
        let result = self.perform(action, call, &args)?;
        if self.control.is_stopped() {
            return Err(ScriptError::Stopped);
        }
        Ok(result)
    }

    fn perform(&mut self, action: Action, call: &Call, args: &[Value]) -> Result<Value, ScriptError> {
        match action {
            Action::Click => {
                let button = button(&args[0], call)?;
                let count = int(&args[1], call)?;
                if count < 0 {
                    return Err(arg_error(call, "count must be non-negative"));
                }
                self.drive(call, |d| d.click(button, count as u32));
            }
            Action::Move => {
                let (x, y) = (int(&args[0], call)?, int(&args[1], call)?);
                self.drive(call, |d| d.move_to(x, y));
            }
            Action::Scroll => {
                let (dx, dy) = (int(&args[0], call)?, int(&args[1], call)?);
                self.drive(call, |d| d.scroll(dx, dy));
            }
            Action::Press => {
                let hold = duration(&args[1], call)?;
                let Some(key) = self.key(&args[0], call)? else { return Ok(Value::None) };
                if self.drive(call, |d| d.key_down(key)) {
                    let held = self.hold(hold);
                    self.drive(call, |d| d.key_up(key));
                    held?;
                }
            }
            Action::KeyDown => {
                if let Some(key) = self.key(&args[0], call)? {
                    self.drive(call, |d| d.key_down(key));
                }
            }
            Action::KeyRelease => {
                if let Some(key) = self.key(&args[0], call)? {
                    self.drive(call, |d| d.key_up(key));
                }
            }
            Action::MouseDown => {
                let button = button(&args[0], call)?;
                self.drive(call, |d| d.button_down(button));
            }
            Action::MouseRelease => {
                let button = button(&args[0], call)?;
                self.drive(call, |d| d.button_up(button));
            }
            Action::TypeText => {
                let text = args[0].to_string();
                self.drive(call, |d| d.type_text(&text));
            }
            Action::Sleep => {
                let d = duration(&args[0], call)?;
                self.control.sleep(d, self.slice)?;
            }
            Action::MousePosition => {
                return Ok(match self.driver.position() {
                    Ok((x, y)) => Value::Tuple(vec![Value::Num(x as f64), Value::Num(y as f64)]),
                    Err(e) => {
                        logger::warn_p("engine", &format!("line {}: mousePosition() failed: {:#}", call.line, e));
                        Value::None
                    }
                });
            }
        }
        Ok(Value::None)
    }

    /// Run one driver call. Failures are logged and skipped.
    fn drive(&self, call: &Call, f: impl FnOnce(&dyn InputDriver) -> anyhow::Result<()>) -> bool {
        match f(self.driver) {
            Ok(()) => true,
            Err(e) => {
                logger::warn_p("engine", &format!("line {}: {}() skipped: {:#}", call.line, call.name, e));
                false
            }
        }
    }

    /// Resolve a key name; unknown names are logged and the action skipped.
    fn key(&self, v: &Value, call: &Call) -> Result<Option<Key>, ScriptError> {
        let name = text(v, call)?;
        let key = Key::parse(&name);
        if key.is_none() {
            logger::warn_p("engine", &format!("line {}: {}() unknown key '{}', skipped", call.line, call.name, name));
        }
        Ok(key)
    }

    /// Keep a key held. Ignores pause; gives up early on stop.
    fn hold(&self, total: Duration) -> Result<(), Stopped> {
        let started = Instant::now();
        loop {
            if self.control.is_stopped() {
                return Err(Stopped);
            }
            let left = total.saturating_sub(started.elapsed());
            if left.is_zero() {
                return Ok(());
            }
            thread::sleep(left.min(self.slice));
        }
    }
}

fn arg_error(call: &Call, msg: impl Into<String>) -> ScriptError {
    ScriptError::Argument { line: call.line, name: call.name.clone(), msg: msg.into() }
}

fn num(v: &Value, call: &Call) -> Result<f64, ScriptError> {
    match v {
        Value::Num(n) => Ok(*n),
        other => Err(ScriptError::Type {
            line: call.line,
            msg: format!("{}() expected a number, got {}", call.name, other.type_name()),
        }),
    }
}

fn int(v: &Value, call: &Call) -> Result<i32, ScriptError> {
    num(v, call).map(|n| n.round() as i32)
}

fn duration(v: &Value, call: &Call) -> Result<Duration, ScriptError> {
    let secs = num(v, call)?;
    if secs < 0.0 {
        return Err(ScriptError::Runtime {
            line: call.line,
            msg: format!("{}() duration must be non-negative", call.name),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| ScriptError::Runtime {
        line: call.line,
        msg: format!("{}() invalid duration: {}", call.name, e),
    })
}

fn text(v: &Value, call: &Call) -> Result<String, ScriptError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        Value::Num(_) => Ok(v.to_string()),
        other => Err(ScriptError::Type {
            line: call.line,
            msg: format!("{}() expected a string, got {}", call.name, other.type_name()),
        }),
    }
}

fn button(v: &Value, call: &Call) -> Result<MouseButton, ScriptError> {
    let name = text(v, call)?;
    MouseButton::parse(&name).ok_or_else(|| arg_error(call, format!("unknown button '{}'", name)))
}

fn binary(l: Value, op: BinOp, r: Value, line: usize) -> Result<Value, ScriptError> {
    match (l, op, r) {
        (Value::Num(a), BinOp::Add, Value::Num(b)) => Ok(Value::Num(a + b)),
        (Value::Str(a), BinOp::Add, Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::Num(a), BinOp::Sub, Value::Num(b)) => Ok(Value::Num(a - b)),
        (Value::Num(a), BinOp::Mul, Value::Num(b)) => Ok(Value::Num(a * b)),
        (Value::Num(_), BinOp::Div, Value::Num(b)) if b == 0.0 => {
            Err(ScriptError::Runtime { line, msg: "division by zero".into() })
        }
        (Value::Num(a), BinOp::Div, Value::Num(b)) => Ok(Value::Num(a / b)),
        (l, op, r) => Err(ScriptError::Type {
            line,
            msg: format!("unsupported operands for {:?}: {} and {}", op, l.type_name(), r.type_name()),
        }),
    }
}
