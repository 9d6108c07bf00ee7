//! Parser for declared predicate text.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr    := term (OR term)*
//! term    := factor (AND factor)*
//! factor  := NOT factor | '(' expr ')' | field op operand
//!          | field IS [NOT] NULL | field [NOT] IN '(' operand (',' operand)* ')'
//! op      := = | != | <> | < | <= | > | >=
//! operand := ? | 'text' | number | true | false | null
//! ```
//!
//! `?` placeholders are numbered left to right and bound at call time.

use super::condition::{CompareOp, Condition};
use super::{QueryError, QueryResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?P<param>\?)|(?P<string>'(?:[^']|'')*')|(?P<number>-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)|(?P<op><=|>=|<>|!=|=|<|>)|(?P<punct>[(),])|(?P<word>[A-Za-z_][A-Za-z0-9_.]*))",
    )
    .expect("valid token regex")
});

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Param,
    Text(String),
    Number(Value),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Literal(Value),
    Param(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Compare {
        field: String,
        op: CompareOp,
        operand: Operand,
    },
    In {
        field: String,
        operands: Vec<Operand>,
    },
    IsNull(String),
    IsNotNull(String),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

/// Parsed predicate with unbound `?` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    root: Option<Node>,
    parameters: usize,
}

impl Predicate {
    /// Predicate matching every document.
    pub fn unconstrained() -> Self {
        Self {
            root: None,
            parameters: 0,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters
    }

    /// Substitutes `args` for the placeholders.
    ///
    /// Returns `None` for an unconstrained predicate.
    ///
    /// # Errors
    /// - `ParameterCount` when `args.len()` differs from the placeholder count.
    pub fn bind(&self, args: &[Value]) -> QueryResult<Option<Condition>> {
        if args.len() != self.parameters {
            return Err(QueryError::ParameterCount {
                expected: self.parameters,
                actual: args.len(),
            });
        }
        Ok(self.root.as_ref().map(|node| bind_node(node, args)))
    }
}

fn bind_node(node: &Node, args: &[Value]) -> Condition {
    match node {
        Node::Compare { field, op, operand } => Condition::Compare {
            field: field.clone(),
            op: *op,
            value: bind_operand(operand, args),
        },
        Node::In { field, operands } => Condition::In {
            field: field.clone(),
            values: operands.iter().map(|o| bind_operand(o, args)).collect(),
        },
        Node::IsNull(field) => Condition::NotExists(field.clone()),
        Node::IsNotNull(field) => Condition::Exists(field.clone()),
        Node::And(nodes) => Condition::And(nodes.iter().map(|n| bind_node(n, args)).collect()),
        Node::Or(nodes) => Condition::Or(nodes.iter().map(|n| bind_node(n, args)).collect()),
        Node::Not(node) => Condition::Not(Box::new(bind_node(node, args))),
    }
}

fn bind_operand(operand: &Operand, args: &[Value]) -> Value {
    match operand {
        Operand::Literal(value) => value.clone(),
        // Index is in range: `bind` checked the argument count.
        Operand::Param(index) => args[*index].clone(),
    }
}

/// Parses predicate text. Blank text yields an unconstrained predicate.
pub fn parse_predicate(text: &str) -> QueryResult<Predicate> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Ok(Predicate::unconstrained());
    }

    let mut parser = Parser {
        text,
        tokens,
        index: 0,
        parameters: 0,
    };
    let root = parser.parse_or()?;
    if let Some((position, token)) = parser.tokens.get(parser.index) {
        return Err(parser.error_at(*position, format!("unexpected token {token:?}")));
    }

    Ok(Predicate {
        root: Some(root),
        parameters: parser.parameters,
    })
}

fn tokenize(text: &str) -> QueryResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut position = 0;

    while !text[position..].trim().is_empty() {
        let Some(captures) = TOKEN_RE.captures(&text[position..]) else {
            let offset = text[position..].len() - text[position..].trim_start().len();
            return Err(syntax_error(text, position + offset, "unrecognized input"));
        };
        let whole = captures.get(0).map_or(0, |m| m.end());
        let start = position + whole - token_len(&captures);

        let token = if captures.name("param").is_some() {
            Token::Param
        } else if let Some(m) = captures.name("string") {
            let raw = m.as_str();
            Token::Text(raw[1..raw.len() - 1].replace("''", "'"))
        } else if let Some(m) = captures.name("number") {
            Token::Number(parse_number(text, start, m.as_str())?)
        } else if let Some(m) = captures.name("op") {
            Token::Op(match m.as_str() {
                "=" => CompareOp::Eq,
                "!=" | "<>" => CompareOp::Ne,
                "<" => CompareOp::Lt,
                "<=" => CompareOp::Le,
                ">" => CompareOp::Gt,
                _ => CompareOp::Ge,
            })
        } else if let Some(m) = captures.name("punct") {
            match m.as_str() {
                "(" => Token::LParen,
                ")" => Token::RParen,
                _ => Token::Comma,
            }
        } else {
            Token::Word(captures.name("word").map_or("", |m| m.as_str()).to_string())
        };

        tokens.push((start, token));
        position += whole;
    }

    Ok(tokens)
}

fn token_len(captures: &regex::Captures<'_>) -> usize {
    captures
        .iter()
        .skip(1)
        .flatten()
        .next()
        .map_or(0, |m| m.len())
}

fn parse_number(text: &str, position: usize, raw: &str) -> QueryResult<Value> {
    if raw.contains(['.', 'e', 'E']) {
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| syntax_error(text, position, "invalid number"))
    } else {
        raw.parse::<i64>()
            .map(Value::from)
            .map_err(|_| syntax_error(text, position, "integer out of range"))
    }
}

fn syntax_error(text: &str, position: usize, message: impl Into<String>) -> QueryError {
    QueryError::Syntax {
        text: text.to_string(),
        position,
        message: message.into(),
    }
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(usize, Token)>,
    index: usize,
    parameters: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.text.len(), |(position, _)| *position)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> QueryError {
        syntax_error(self.text, position, message)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(_, token)| token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.index += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, expected: Token, label: &str) -> QueryResult<()> {
        let position = self.position();
        match self.next() {
            Some(token) if token == expected => Ok(()),
            _ => Err(self.error_at(position, format!("expected {label}"))),
        }
    }

    fn parse_or(&mut self) -> QueryResult<Node> {
        let mut nodes = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            nodes.push(self.parse_and()?);
        }
        Ok(collapse(nodes, Node::Or))
    }

    fn parse_and(&mut self) -> QueryResult<Node> {
        let mut nodes = vec![self.parse_factor()?];
        while self.eat_keyword("and") {
            nodes.push(self.parse_factor()?);
        }
        Ok(collapse(nodes, Node::And))
    }

    fn parse_factor(&mut self) -> QueryResult<Node> {
        if self.eat_keyword("not") {
            return Ok(Node::Not(Box::new(self.parse_factor()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.index += 1;
            let node = self.parse_or()?;
            self.expect(Token::RParen, "`)`")?;
            return Ok(node);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> QueryResult<Node> {
        let position = self.position();
        let field = match self.next() {
            Some(Token::Word(word)) if !is_keyword(&word) => word,
            _ => return Err(self.error_at(position, "expected field name")),
        };

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            let position = self.position();
            if !self.eat_keyword("null") {
                return Err(self.error_at(position, "expected NULL"));
            }
            return Ok(if negated {
                Node::IsNotNull(field)
            } else {
                Node::IsNull(field)
            });
        }

        let negated_in = self.peek_keyword("not");
        if negated_in {
            self.index += 1;
        }
        if self.eat_keyword("in") {
            let operands = self.parse_operand_list()?;
            let node = Node::In { field, operands };
            return Ok(if negated_in {
                Node::Not(Box::new(node))
            } else {
                node
            });
        }
        if negated_in {
            return Err(self.error_at(self.position(), "expected IN"));
        }

        let position = self.position();
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error_at(position, "expected comparison operator")),
        };
        let operand = self.parse_operand()?;
        Ok(Node::Compare { field, op, operand })
    }

    fn parse_operand_list(&mut self) -> QueryResult<Vec<Operand>> {
        self.expect(Token::LParen, "`(`")?;
        let mut operands = vec![self.parse_operand()?];
        while self.peek() == Some(&Token::Comma) {
            self.index += 1;
            operands.push(self.parse_operand()?);
        }
        self.expect(Token::RParen, "`)`")?;
        Ok(operands)
    }

    fn parse_operand(&mut self) -> QueryResult<Operand> {
        let position = self.position();
        match self.next() {
            Some(Token::Param) => {
                let index = self.parameters;
                self.parameters += 1;
                Ok(Operand::Param(index))
            }
            Some(Token::Text(text)) => Ok(Operand::Literal(Value::String(text))),
            Some(Token::Number(number)) => Ok(Operand::Literal(number)),
            Some(Token::Word(word)) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(Operand::Literal(Value::Bool(true))),
                "false" => Ok(Operand::Literal(Value::Bool(false))),
                "null" => Ok(Operand::Literal(Value::Null)),
                _ => Err(self.error_at(position, format!("unexpected word `{word}`"))),
            },
            _ => Err(self.error_at(position, "expected value or `?`")),
        }
    }
}

fn collapse(mut nodes: Vec<Node>, combine: fn(Vec<Node>) -> Node) -> Node {
    if nodes.len() == 1 {
        return nodes.remove(0);
    }
    combine(nodes)
}

fn is_keyword(word: &str) -> bool {
    ["and", "or", "not", "is", "in", "null", "true", "false"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

#[cfg(test)]
mod tests {
    use super::parse_predicate;
    use crate::query::condition::{CompareOp, Condition};
    use crate::query::QueryError;
    use serde_json::json;

    #[test]
    fn blank_text_is_unconstrained() {
        let predicate = parse_predicate("   ").unwrap();
        assert_eq!(predicate.parameter_count(), 0);
        assert_eq!(predicate.bind(&[]).unwrap(), None);
    }

    #[test]
    fn placeholders_bind_in_order() {
        let predicate = parse_predicate("name = ? and age >= ?").unwrap();
        assert_eq!(predicate.parameter_count(), 2);

        let condition = predicate.bind(&[json!("ada"), json!(30)]).unwrap();
        assert_eq!(
            condition,
            Some(Condition::And(vec![
                Condition::eq("name", "ada"),
                Condition::compare("age", CompareOp::Ge, 30),
            ]))
        );
    }

    #[test]
    fn literals_keywords_and_grouping_parse() {
        let predicate = parse_predicate(
            "NOT (enabled = true OR nick IS NULL) AND city IN ('Oslo', 'it''s') AND score <> 1.5",
        )
        .unwrap();

        let condition = predicate.bind(&[]).unwrap().unwrap();
        assert_eq!(
            condition,
            Condition::And(vec![
                Condition::Not(Box::new(Condition::Or(vec![
                    Condition::eq("enabled", true),
                    Condition::not_exists("nick"),
                ]))),
                Condition::is_in("city", ["Oslo", "it's"]),
                Condition::ne("score", 1.5),
            ])
        );
    }

    #[test]
    fn not_in_and_is_not_null_parse() {
        let condition = parse_predicate("address.city NOT IN (?, ?) or email is not null")
            .unwrap()
            .bind(&[json!("a"), json!("b")])
            .unwrap()
            .unwrap();

        assert_eq!(
            condition,
            Condition::Or(vec![
                Condition::Not(Box::new(Condition::is_in("address.city", ["a", "b"]))),
                Condition::exists("email"),
            ])
        );
    }

    #[test]
    fn argument_count_must_match_placeholders() {
        let predicate = parse_predicate("name = ?").unwrap();
        let err = predicate.bind(&[]).unwrap_err();
        assert!(matches!(
            err,
            QueryError::ParameterCount {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn syntax_errors_report_position() {
        match parse_predicate("name = ? and") {
            Err(QueryError::Syntax { position, .. }) => assert_eq!(position, 12),
            other => panic!("unexpected result: {other:?}"),
        }
        match parse_predicate("name ~ 1") {
            Err(QueryError::Syntax { position, .. }) => assert_eq!(position, 5),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            parse_predicate("(name = 1"),
            Err(QueryError::Syntax { .. })
        ));
        assert!(matches!(
            parse_predicate("name = 1 age = 2"),
            Err(QueryError::Syntax { .. })
        ));
    }
}
