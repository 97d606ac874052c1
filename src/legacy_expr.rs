//! Parses the legacy `if`/`while` condition shape: a flat string
//! expression plus a separate `vars` mapping, instead of the canonical
//! `ExprNode`.
//!
//! This is a small recursive-descent parser over a restricted
//! arithmetic/comparison/logical grammar — not a reimplementation of the
//! excluded transpiler. It only covers the flat-expression shape old
//! programs carry; it never parses general program syntax.

use serde_json::Value as Json;

use crate::ast::expr::ExprNode;
use crate::error::kind;
use crate::value::ErrorValue;

/// Parses `source` into an `ExprNode`. `vars` maps identifiers appearing
/// in `source` to the state/arg path they actually refer to; an
/// identifier absent from `vars` is left as a bare `ident` node so plain
/// state lookups keep working unchanged.
pub fn parse(op: &str, source: &str, vars: &Json) -> Result<ExprNode, ErrorValue> {
    let renames = vars.as_object();
    let tokens = tokenize(op, source)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, op, renames };
    let node = parser.parse_logical_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(kind::validation(op, "trailing tokens in legacy condition"));
    }
    Ok(node)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(op: &str, src: &str) -> Result<Vec<Token>, ErrorValue> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            out.push(Token::LParen);
            i += 1;
            continue;
        }
        if c == ')' {
            out.push(Token::RParen);
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| kind::validation(op, format!("invalid number literal '{text}'")))?;
            out.push(Token::Number(n));
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            i += 1; // closing quote
            out.push(Token::Str(text));
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            out.push(Token::Ident(text));
            continue;
        }
        // Multi-char operators before single-char ones.
        let rest: String = chars[i..].iter().take(3).collect();
        let multi = ["===", "!==", "&&", "||", "??", "==", "!=", ">=", "<=", "**"];
        if let Some(m) = multi.iter().find(|m| rest.starts_with(**m)) {
            out.push(Token::Op(m));
            i += m.len();
            continue;
        }
        let single = ['+', '-', '*', '/', '%', '>', '<', '!'];
        if single.contains(&c) {
            let s: &'static str = match c {
                '+' => "+",
                '-' => "-",
                '*' => "*",
                '/' => "/",
                '%' => "%",
                '>' => ">",
                '<' => "<",
                '!' => "!",
                _ => unreachable!(),
            };
            out.push(Token::Op(s));
            i += 1;
            continue;
        }
        return Err(kind::validation(op, format!("unexpected character '{c}' in legacy condition")));
    }
    Ok(out)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    op: &'a str,
    renames: Option<&'a serde_json::Map<String, Json>>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_logical_or(&mut self) -> Result<ExprNode, ErrorValue> {
        let mut left = self.parse_logical_and()?;
        loop {
            if self.eat_op("||") {
                let right = self.parse_logical_and()?;
                left = ExprNode::Logical { op: "||".into(), left: Box::new(left), right: Box::new(right) };
            } else if self.eat_op("??") {
                let right = self.parse_logical_and()?;
                left = ExprNode::Logical { op: "??".into(), left: Box::new(left), right: Box::new(right) };
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_logical_and(&mut self) -> Result<ExprNode, ErrorValue> {
        let mut left = self.parse_equality()?;
        while self.eat_op("&&") {
            let right = self.parse_equality()?;
            left = ExprNode::Logical { op: "&&".into(), left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<ExprNode, ErrorValue> {
        let mut left = self.parse_relational()?;
        loop {
            let op = ["===", "!==", "==", "!="].iter().find(|o| self.eat_op(o));
            let Some(op) = op else { return Ok(left) };
            let right = self.parse_relational()?;
            left = ExprNode::Binary { op: (*op).to_string(), left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_relational(&mut self) -> Result<ExprNode, ErrorValue> {
        let mut left = self.parse_additive()?;
        loop {
            let op = [">=", "<=", ">", "<"].iter().find(|o| self.eat_op(o));
            let Some(op) = op else { return Ok(left) };
            let right = self.parse_additive()?;
            left = ExprNode::Binary { op: (*op).to_string(), left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_additive(&mut self) -> Result<ExprNode, ErrorValue> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = ["+", "-"].iter().find(|o| self.eat_op(o));
            let Some(op) = op else { return Ok(left) };
            let right = self.parse_multiplicative()?;
            left = ExprNode::Binary { op: (*op).to_string(), left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ExprNode, ErrorValue> {
        let mut left = self.parse_unary()?;
        loop {
            let op = ["**", "*", "/", "%"].iter().find(|o| self.eat_op(o));
            let Some(op) = op else { return Ok(left) };
            let right = self.parse_unary()?;
            left = ExprNode::Binary { op: (*op).to_string(), left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_unary(&mut self) -> Result<ExprNode, ErrorValue> {
        if self.eat_op("!") {
            let arg = self.parse_unary()?;
            return Ok(ExprNode::Unary { op: "!".into(), argument: Box::new(arg) });
        }
        if self.eat_op("-") {
            let arg = self.parse_unary()?;
            return Ok(ExprNode::Unary { op: "-".into(), argument: Box::new(arg) });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ExprNode, ErrorValue> {
        match self.bump().cloned() {
            Some(Token::Number(n)) => Ok(ExprNode::Literal { value: serde_json::json!(n) }),
            Some(Token::Str(s)) => Ok(ExprNode::Literal { value: Json::String(s) }),
            Some(Token::Ident(name)) => {
                let resolved = self
                    .renames
                    .and_then(|m| m.get(&name))
                    .and_then(Json::as_str)
                    .map(|s| s.to_string())
                    .unwrap_or(name);
                Ok(path_to_expr(&resolved))
            }
            Some(Token::LParen) => {
                let inner = self.parse_logical_or()?;
                if !matches!(self.bump(), Some(Token::RParen)) {
                    return Err(kind::validation(self.op, "unbalanced parentheses in legacy condition"));
                }
                Ok(inner)
            }
            other => Err(kind::validation(
                self.op,
                format!("unexpected token in legacy condition: {other:?}"),
            )),
        }
    }
}

/// Turns a dot-path (`user.age`) into nested `member` nodes rooted at an
/// `ident`, so `__proto__`/`constructor`/`prototype` segments still hit
/// the evaluator's forbidden-property check at evaluation time.
fn path_to_expr(path: &str) -> ExprNode {
    let mut segments = path.split('.');
    let Some(head) = segments.next() else {
        return ExprNode::Literal { value: Json::Null };
    };
    let mut node = ExprNode::Ident { name: head.to_string() };
    for seg in segments {
        node = ExprNode::Member {
            object: Box::new(node),
            property: seg.to_string(),
            optional: false,
        };
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let node = parse("if", "age >= 18", &Json::Null).unwrap();
        match node {
            ExprNode::Binary { op, .. } => assert_eq!(op, ">="),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn parses_logical_and_with_parens() {
        let node = parse("if", "(a && b) || c", &Json::Null).unwrap();
        assert!(matches!(node, ExprNode::Logical { .. }));
    }

    #[test]
    fn applies_vars_rename() {
        let vars = serde_json::json!({ "n": "user.age" });
        let node = parse("if", "n > 10", &vars).unwrap();
        let ExprNode::Binary { left, .. } = node else { panic!("not binary") };
        assert!(matches!(*left, ExprNode::Member { .. }));
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse("if", "(a && b", &Json::Null).is_err());
    }
}
