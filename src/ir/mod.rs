//! IR data model: programs, functions, instructions, opcode categories.
//!
//! The wire format is JSON: a program is `{"functions": [...]}`, a function
//! carries `name`, optional typed `args`, an optional return `type`, and an
//! ordered `instrs` list. An instruction is either `{"label": ...}` or an
//! object with an `op` key and a subset of dest/type/value/args/labels/funcs.
//!
//! Internally an instruction is a four-variant tagged union so every pass
//! pattern-matches instead of probing optional keys; the raw record shape
//! only exists at the serde boundary, where malformed instructions surface
//! as [`IrError`] instead of missing-key lookups deep inside a pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors for IR that violates the structural rules.
///
/// These are fatal: the CLI reports them with a non-zero exit. Passes that
/// can recover locally (LICM on an irreducible CFG, LVN on an unfoldable
/// constant) do so by returning their input unchanged and never produce one
/// of these.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("function `{function}`: jump or branch target `{label}` is undefined")]
    UndefinedLabel { function: String, label: String },

    #[error("function `{function}`: label `{label}` is defined more than once")]
    DuplicateLabel { function: String, label: String },

    #[error("function `{function}`: phi into `{dest}` has {args} arguments for {labels} labels")]
    PhiArityMismatch {
        function: String,
        dest: String,
        args: usize,
        labels: usize,
    },

    #[error("function `{function}`: variable `{variable}` is referenced but never defined")]
    UndefinedVariable { function: String, variable: String },

    #[error("malformed instruction: {0}")]
    Malformed(String),
}

/// A whole program: an ordered sequence of functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
}

/// A function: name, typed parameters, optional return type, instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Param>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub return_type: Option<Type>,
    #[serde(default)]
    pub instrs: Vec<Instr>,
}

/// A typed function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: Type,
}

/// A value type: a bare tag string (`"int"`, `"bool"`, ...) or a pointer
/// `{"ptr": <type>}` whose target is propagated opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Type {
    Ptr { ptr: Box<Type> },
    Name(String),
}

impl Type {
    pub fn int() -> Type {
        Type::Name("int".to_string())
    }

    pub fn boolean() -> Type {
        Type::Name("bool".to_string())
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr { .. })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Ptr { ptr } => write!(f, "ptr<{}>", ptr),
            Type::Name(name) => write!(f, "{}", name),
        }
    }
}

/// A constant literal. Integers and booleans are distinct variants so a
/// boolean `true` can never collide with an integer `1` in a value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// The closed operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Const,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    And,
    Or,
    Id,
    Jmp,
    Br,
    Ret,
    Print,
    Nop,
    Call,
    Phi,
    Alloc,
    Free,
    Store,
    Load,
    #[serde(rename = "ptradd")]
    PtrAdd,
}

impl Op {
    /// Operations that close a basic block.
    pub fn is_terminator(self) -> bool {
        matches!(self, Op::Jmp | Op::Br | Op::Ret)
    }

    /// Operations whose argument order does not matter.
    pub fn is_commutative(self) -> bool {
        matches!(self, Op::Add | Op::Mul | Op::And | Op::Or | Op::Eq | Op::Ne)
    }

    /// Operations with side effects or non-pure semantics. Value numbering
    /// never folds them and loop-invariant motion never hoists them.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            Op::Call | Op::Alloc | Op::Load | Op::Store | Op::Free | Op::Print | Op::Phi
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Op::Const => "const",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lt => "lt",
            Op::Le => "le",
            Op::Gt => "gt",
            Op::Ge => "ge",
            Op::Not => "not",
            Op::And => "and",
            Op::Or => "or",
            Op::Id => "id",
            Op::Jmp => "jmp",
            Op::Br => "br",
            Op::Ret => "ret",
            Op::Print => "print",
            Op::Nop => "nop",
            Op::Call => "call",
            Op::Phi => "phi",
            Op::Alloc => "alloc",
            Op::Free => "free",
            Op::Store => "store",
            Op::Load => "load",
            Op::PtrAdd => "ptradd",
        };
        write!(f, "{}", name)
    }
}

/// A single instruction.
///
/// `Value` covers every operation that names a destination (including
/// `call` with a result and `phi`); `Effect` covers the rest. The raw
/// optional-key record only exists at the serde boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInstr", into = "RawInstr")]
pub enum Instr {
    Label {
        label: String,
    },
    Const {
        dest: String,
        typ: Type,
        value: Literal,
    },
    Value {
        op: Op,
        dest: String,
        typ: Type,
        args: Vec<String>,
        labels: Vec<String>,
        funcs: Vec<String>,
    },
    Effect {
        op: Op,
        args: Vec<String>,
        labels: Vec<String>,
        funcs: Vec<String>,
    },
}

impl Instr {
    pub fn is_label(&self) -> bool {
        matches!(self, Instr::Label { .. })
    }

    pub fn op(&self) -> Option<Op> {
        match self {
            Instr::Label { .. } => None,
            Instr::Const { .. } => Some(Op::Const),
            Instr::Value { op, .. } | Instr::Effect { op, .. } => Some(*op),
        }
    }

    pub fn dest(&self) -> Option<&str> {
        match self {
            Instr::Const { dest, .. } | Instr::Value { dest, .. } => Some(dest),
            _ => None,
        }
    }

    pub fn typ(&self) -> Option<&Type> {
        match self {
            Instr::Const { typ, .. } | Instr::Value { typ, .. } => Some(typ),
            _ => None,
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            Instr::Value { args, .. } | Instr::Effect { args, .. } => args,
            _ => &[],
        }
    }

    pub fn args_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Instr::Value { args, .. } | Instr::Effect { args, .. } => Some(args),
            _ => None,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            Instr::Value { labels, .. } | Instr::Effect { labels, .. } => labels,
            _ => &[],
        }
    }

    pub fn labels_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Instr::Value { labels, .. } | Instr::Effect { labels, .. } => Some(labels),
            _ => None,
        }
    }

    pub fn set_dest(&mut self, name: String) {
        match self {
            Instr::Const { dest, .. } | Instr::Value { dest, .. } => *dest = name,
            _ => {}
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.op().map_or(false, Op::is_terminator)
    }

    pub fn is_special(&self) -> bool {
        self.op().map_or(false, Op::is_special)
    }

    /// Build a plain value operation with no labels or function references.
    pub fn value(op: Op, dest: impl Into<String>, typ: Type, args: Vec<String>) -> Instr {
        Instr::Value {
            op,
            dest: dest.into(),
            typ,
            args,
            labels: Vec::new(),
            funcs: Vec::new(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Label { label } => write!(f, ".{}", label),
            Instr::Const { dest, typ, value } => {
                write!(f, "{}: {} = const {}", dest, typ, value)
            }
            Instr::Value {
                op, dest, typ, args, ..
            } => write!(f, "{}: {} = {} {}", dest, typ, op, args.join(" ")),
            Instr::Effect { op, args, labels, .. } => {
                write!(f, "{}", op)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                for label in labels {
                    write!(f, " .{}", label)?;
                }
                Ok(())
            }
        }
    }
}

/// The flat optional-key record matching the JSON wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInstr {
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    op: Option<Op>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    typ: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Literal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    funcs: Option<Vec<String>>,
}

impl TryFrom<RawInstr> for Instr {
    type Error = IrError;

    fn try_from(raw: RawInstr) -> Result<Instr, IrError> {
        if let Some(label) = raw.label {
            if raw.op.is_some() {
                return Err(IrError::Malformed(format!(
                    "label `{}` also carries an op",
                    label
                )));
            }
            return Ok(Instr::Label { label });
        }

        let op = raw
            .op
            .ok_or_else(|| IrError::Malformed("instruction has neither label nor op".into()))?;
        let args = raw.args.unwrap_or_default();
        let labels = raw.labels.unwrap_or_default();
        let funcs = raw.funcs.unwrap_or_default();

        if op == Op::Const {
            let dest = raw
                .dest
                .ok_or_else(|| IrError::Malformed("const without dest".into()))?;
            let typ = raw
                .typ
                .ok_or_else(|| IrError::Malformed(format!("const `{}` without type", dest)))?;
            let value = raw
                .value
                .ok_or_else(|| IrError::Malformed(format!("const `{}` without value", dest)))?;
            return Ok(Instr::Const { dest, typ, value });
        }

        match raw.dest {
            Some(dest) => {
                let typ = raw.typ.ok_or_else(|| {
                    IrError::Malformed(format!("`{} {}` without a result type", op, dest))
                })?;
                Ok(Instr::Value {
                    op,
                    dest,
                    typ,
                    args,
                    labels,
                    funcs,
                })
            }
            None => Ok(Instr::Effect {
                op,
                args,
                labels,
                funcs,
            }),
        }
    }
}

impl From<Instr> for RawInstr {
    fn from(instr: Instr) -> RawInstr {
        fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        }

        match instr {
            Instr::Label { label } => RawInstr {
                label: Some(label),
                op: None,
                dest: None,
                typ: None,
                value: None,
                args: None,
                labels: None,
                funcs: None,
            },
            Instr::Const { dest, typ, value } => RawInstr {
                label: None,
                op: Some(Op::Const),
                dest: Some(dest),
                typ: Some(typ),
                value: Some(value),
                args: None,
                labels: None,
                funcs: None,
            },
            Instr::Value {
                op,
                dest,
                typ,
                args,
                labels,
                funcs,
            } => RawInstr {
                label: None,
                op: Some(op),
                dest: Some(dest),
                typ: Some(typ),
                value: None,
                args: non_empty(args),
                labels: non_empty(labels),
                funcs: non_empty(funcs),
            },
            Instr::Effect {
                op,
                args,
                labels,
                funcs,
            } => RawInstr {
                label: None,
                op: Some(op),
                dest: None,
                typ: None,
                value: None,
                args: non_empty(args),
                labels: non_empty(labels),
                funcs: non_empty(funcs),
            },
        }
    }
}
