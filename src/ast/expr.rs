//! Expression nodes (`ExprNode`).
//!
//! Expression evaluation is pure — no atom dispatch, no I/O — so this module has no dependency on the async atom layer.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// `$expr`-discriminated expression AST node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$expr")]
pub enum ExprNode {
    #[serde(rename = "literal")]
    Literal { value: Json },

    #[serde(rename = "ident")]
    Ident { name: String },

    #[serde(rename = "member")]
    Member {
        object: Box<ExprNode>,
        property: String,
        #[serde(default)]
        optional: bool,
    },

    #[serde(rename = "binary")]
    Binary {
        op: String,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },

    #[serde(rename = "unary")]
    Unary {
        op: String,
        argument: Box<ExprNode>,
    },

    #[serde(rename = "logical")]
    Logical {
        op: String,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },

    #[serde(rename = "conditional")]
    Conditional {
        test: Box<ExprNode>,
        consequent: Box<ExprNode>,
        alternate: Box<ExprNode>,
    },

    #[serde(rename = "array")]
    Array { elements: Vec<ExprNode> },

    #[serde(rename = "object")]
    Object { properties: Vec<ObjectProp> },

    #[serde(rename = "call")]
    Call {
        callee: String,
        #[serde(default)]
        arguments: Vec<ExprNode>,
    },

    #[serde(rename = "methodCall")]
    MethodCall {
        object: Box<ExprNode>,
        method: String,
        #[serde(default)]
        arguments: Vec<ExprNode>,
        #[serde(default)]
        optional: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectProp {
    pub key: String,
    pub value: ExprNode,
}

/// Parsed binary operator. Unrecognized tokens fail at evaluation time
/// with a validation error rather than at deserialization time, so a
/// malformed operator surfaces monadically like any other bad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl BinaryOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "**" => Self::Pow,
            "==" => Self::Eq,
            "!=" => Self::NotEq,
            "===" => Self::StrictEq,
            "!==" => Self::StrictNotEq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    TypeOf,
}

impl UnaryOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "!" => Self::Not,
            "-" => Self::Neg,
            "+" => Self::Pos,
            "typeof" => Self::TypeOf,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    NullishCoalesce,
}

impl LogicalOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "&&" => Self::And,
            "||" => Self::Or,
            "??" => Self::NullishCoalesce,
            _ => return None,
        })
    }
}
