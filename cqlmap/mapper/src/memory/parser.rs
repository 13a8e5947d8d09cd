//! CQL statement parser
//!
//! Covers the statement shapes the mapper emits: select with where, order by
//! and limit; single and multi-row insert; update with key and condition
//! predicates; delete by key. Identifiers are case-insensitive and returned
//! in lower case. `?` markers are numbered in order of appearance.

use super::store::MemoryStoreError;
use crate::CqlValue;

type ParseResult<T> = Result<T, MemoryStoreError>;

/// Parsed CQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum CqlStatement {
    Select {
        /// Columns to select; empty for `*`
        columns: Vec<String>,
        table: String,
        where_clause: Vec<WhereCondition>,
        order_by: Vec<(String, ClusteringOrder)>,
        limit: Option<usize>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        /// One entry per `(...)` group
        rows: Vec<Vec<Operand>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        where_clause: Vec<WhereCondition>,
    },
    Delete {
        table: String,
        where_clause: Vec<WhereCondition>,
    },
}

impl CqlStatement {
    pub fn table(&self) -> &str {
        match self {
            CqlStatement::Select { table, .. }
            | CqlStatement::Insert { table, .. }
            | CqlStatement::Update { table, .. }
            | CqlStatement::Delete { table, .. } => table,
        }
    }
}

/// A value position in a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Positional bind marker
    Bind(usize),
    Literal(CqlValue),
}

impl Operand {
    pub fn resolve(&self, params: &[CqlValue]) -> ParseResult<CqlValue> {
        match self {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Bind(i) => params
                .get(*i)
                .cloned()
                .ok_or(MemoryStoreError::MissingParameter(*i)),
        }
    }
}

/// WHERE clause condition
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub value: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Text(String),
    Number(String),
    Bind(usize),
    Punct(&'static str),
}

fn tokenize(query: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    let mut binds = 0;

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                text.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(MemoryStoreError::Parse("unterminated string".to_string()))
                        }
                    }
                }
                tokens.push(Token::Text(text));
            }
            '?' => {
                chars.next();
                tokens.push(Token::Bind(binds));
                binds += 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        word.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            '<' | '>' | '!' => {
                chars.next();
                let punct = match (c, chars.peek().copied()) {
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('!', Some('=')) => "!=",
                    ('<', Some('>')) => "<>",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => return Err(MemoryStoreError::Parse("unexpected '!'".to_string())),
                };
                if punct.len() == 2 {
                    chars.next();
                }
                tokens.push(Token::Punct(punct));
            }
            '(' | ')' | ',' | '=' | '*' | '.' | ';' => {
                chars.next();
                tokens.push(Token::Punct(match c {
                    '(' => "(",
                    ')' => ")",
                    ',' => ",",
                    '=' => "=",
                    '*' => "*",
                    '.' => ".",
                    _ => ";",
                }));
            }
            other => {
                return Err(MemoryStoreError::Parse(format!(
                    "unexpected character '{other}'"
                )))
            }
        }
    }
    Ok(tokens)
}

/// Parse a literal the way the CQL shell would read it
fn parse_number(raw: &str) -> ParseResult<CqlValue> {
    if let Ok(int_val) = raw.parse::<i32>() {
        return Ok(CqlValue::Int(int_val));
    }
    if let Ok(bigint_val) = raw.parse::<i64>() {
        return Ok(CqlValue::Bigint(bigint_val));
    }
    raw.parse::<f64>()
        .map(CqlValue::Double)
        .map_err(|_| MemoryStoreError::Parse(format!("invalid number '{raw}'")))
}

/// CQL parser
pub struct CqlParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl CqlParser {
    /// Parse a CQL statement
    pub fn parse(query: &str) -> ParseResult<CqlStatement> {
        let mut parser = Self {
            tokens: tokenize(query)?,
            pos: 0,
        };
        let statement = match parser.keyword()?.as_str() {
            "select" => parser.parse_select()?,
            "insert" => parser.parse_insert()?,
            "update" => parser.parse_update()?,
            "delete" => parser.parse_delete()?,
            other => {
                return Err(MemoryStoreError::Parse(format!(
                    "unsupported statement '{other}'"
                )))
            }
        };
        parser.eat_punct(";");
        if parser.pos < parser.tokens.len() {
            return Err(MemoryStoreError::Parse(format!(
                "unexpected trailing input in '{query}'"
            )));
        }
        Ok(statement)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(Token::Word(w)) => Ok(w.to_lowercase()),
            other => Err(MemoryStoreError::Parse(format!(
                "expected keyword, found {other:?}"
            ))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(MemoryStoreError::Parse(format!(
                "expected '{keyword}', found {:?}",
                self.peek()
            )))
        }
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(MemoryStoreError::Parse(format!(
                "expected '{punct}', found {:?}",
                self.peek()
            )))
        }
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(Token::Word(w)) => Ok(w.to_lowercase()),
            Some(Token::Text(t)) => Ok(t.to_lowercase()),
            other => Err(MemoryStoreError::Parse(format!(
                "expected identifier, found {other:?}"
            ))),
        }
    }

    /// `table` or `keyspace.table`
    fn table_name(&mut self) -> ParseResult<String> {
        let mut name = self.identifier()?;
        if self.eat_punct(".") {
            name = format!("{name}.{}", self.identifier()?);
        }
        Ok(name)
    }

    fn operand(&mut self) -> ParseResult<Operand> {
        match self.advance() {
            Some(Token::Bind(i)) => Ok(Operand::Bind(i)),
            Some(Token::Text(t)) => Ok(Operand::Literal(CqlValue::Text(t))),
            Some(Token::Number(n)) => Ok(Operand::Literal(parse_number(&n)?)),
            Some(Token::Word(w)) => match w.to_lowercase().as_str() {
                "null" => Ok(Operand::Literal(CqlValue::Null)),
                "true" => Ok(Operand::Literal(CqlValue::Boolean(true))),
                "false" => Ok(Operand::Literal(CqlValue::Boolean(false))),
                _ => Err(MemoryStoreError::Parse(format!("unexpected word '{w}'"))),
            },
            other => Err(MemoryStoreError::Parse(format!(
                "expected value, found {other:?}"
            ))),
        }
    }

    fn identifier_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = vec![self.identifier()?];
        while self.eat_punct(",") {
            names.push(self.identifier()?);
        }
        Ok(names)
    }

    fn parse_where_clause(&mut self) -> ParseResult<Vec<WhereCondition>> {
        let mut conditions = Vec::new();
        if !self.peek_keyword("where") {
            return Ok(conditions);
        }
        self.pos += 1;
        loop {
            let column = self.identifier()?;
            let operator = match self.advance() {
                Some(Token::Punct("=")) => ComparisonOperator::Equal,
                Some(Token::Punct(">")) => ComparisonOperator::GreaterThan,
                Some(Token::Punct(">=")) => ComparisonOperator::GreaterThanOrEqual,
                Some(Token::Punct("<")) => ComparisonOperator::LessThan,
                Some(Token::Punct("<=")) => ComparisonOperator::LessThanOrEqual,
                Some(Token::Punct("!=")) | Some(Token::Punct("<>")) => ComparisonOperator::NotEqual,
                other => {
                    return Err(MemoryStoreError::Parse(format!(
                        "expected comparison operator, found {other:?}"
                    )))
                }
            };
            let value = self.operand()?;
            conditions.push(WhereCondition {
                column,
                operator,
                value,
            });
            if self.peek_keyword("and") {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(conditions)
    }

    fn parse_select(&mut self) -> ParseResult<CqlStatement> {
        let columns = if self.eat_punct("*") {
            Vec::new()
        } else {
            self.identifier_list()?
        };
        self.expect_keyword("from")?;
        let table = self.table_name()?;
        let where_clause = self.parse_where_clause()?;

        let mut order_by = Vec::new();
        if self.peek_keyword("order") {
            self.pos += 1;
            self.expect_keyword("by")?;
            loop {
                let column = self.identifier()?;
                let order = if self.peek_keyword("desc") {
                    self.pos += 1;
                    ClusteringOrder::Desc
                } else {
                    if self.peek_keyword("asc") {
                        self.pos += 1;
                    }
                    ClusteringOrder::Asc
                };
                order_by.push((column, order));
                if !self.eat_punct(",") {
                    break;
                }
            }
        }

        let limit = if self.peek_keyword("limit") {
            self.pos += 1;
            match self.advance() {
                Some(Token::Number(n)) => Some(
                    n.parse::<usize>()
                        .map_err(|_| MemoryStoreError::Parse(format!("invalid limit '{n}'")))?,
                ),
                other => {
                    return Err(MemoryStoreError::Parse(format!(
                        "expected limit, found {other:?}"
                    )))
                }
            }
        } else {
            None
        };

        Ok(CqlStatement::Select {
            columns,
            table,
            where_clause,
            order_by,
            limit,
        })
    }

    fn parse_insert(&mut self) -> ParseResult<CqlStatement> {
        self.expect_keyword("into")?;
        let table = self.table_name()?;
        self.expect_punct("(")?;
        let columns = self.identifier_list()?;
        self.expect_punct(")")?;
        self.expect_keyword("values")?;

        let mut rows = Vec::new();
        loop {
            self.expect_punct("(")?;
            let mut values = vec![self.operand()?];
            while self.eat_punct(",") {
                values.push(self.operand()?);
            }
            self.expect_punct(")")?;
            if values.len() != columns.len() {
                return Err(MemoryStoreError::Parse(format!(
                    "{} values for {} columns",
                    values.len(),
                    columns.len()
                )));
            }
            rows.push(values);
            if !self.eat_punct(",") {
                break;
            }
        }

        Ok(CqlStatement::Insert {
            table,
            columns,
            rows,
        })
    }

    fn parse_update(&mut self) -> ParseResult<CqlStatement> {
        let table = self.table_name()?;
        self.expect_keyword("set")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.identifier()?;
            self.expect_punct("=")?;
            assignments.push((column, self.operand()?));
            if !self.eat_punct(",") {
                break;
            }
        }
        let where_clause = self.parse_where_clause()?;
        Ok(CqlStatement::Update {
            table,
            assignments,
            where_clause,
        })
    }

    fn parse_delete(&mut self) -> ParseResult<CqlStatement> {
        self.expect_keyword("from")?;
        let table = self.table_name()?;
        let where_clause = self.parse_where_clause()?;
        Ok(CqlStatement::Delete {
            table,
            where_clause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select() {
        let stmt = CqlParser::parse(
            "SELECT id,name FROM ks.users WHERE id = ? AND age>=21 ORDER BY name DESC,id LIMIT 10",
        )
        .unwrap();
        assert_eq!(
            stmt,
            CqlStatement::Select {
                columns: vec!["id".into(), "name".into()],
                table: "ks.users".into(),
                where_clause: vec![
                    WhereCondition {
                        column: "id".into(),
                        operator: ComparisonOperator::Equal,
                        value: Operand::Bind(0),
                    },
                    WhereCondition {
                        column: "age".into(),
                        operator: ComparisonOperator::GreaterThanOrEqual,
                        value: Operand::Literal(CqlValue::Int(21)),
                    },
                ],
                order_by: vec![
                    ("name".into(), ClusteringOrder::Desc),
                    ("id".into(), ClusteringOrder::Asc),
                ],
                limit: Some(10),
            }
        );
    }

    #[test]
    fn test_parse_multi_row_insert() {
        let stmt =
            CqlParser::parse("insert into T(id,name,version) values(?,'it''s',1),(?,null,-2)").unwrap();
        match stmt {
            CqlStatement::Insert { columns, rows, .. } => {
                assert_eq!(columns, vec!["id", "name", "version"]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0][1], Operand::Literal(CqlValue::from("it's")));
                assert_eq!(rows[1][0], Operand::Bind(1));
                assert_eq!(rows[1][1], Operand::Literal(CqlValue::Null));
                assert_eq!(rows[1][2], Operand::Literal(CqlValue::Int(-2)));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_parse_versioned_update() {
        let stmt = CqlParser::parse("update T set name=?,active=true,version=4 where id=? and version=3").unwrap();
        match stmt {
            CqlStatement::Update {
                assignments,
                where_clause,
                ..
            } => {
                assert_eq!(assignments.len(), 3);
                assert_eq!(assignments[0], ("name".to_string(), Operand::Bind(0)));
                assert_eq!(where_clause[0].value, Operand::Bind(1));
                assert_eq!(where_clause[1].value, Operand::Literal(CqlValue::Int(3)));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(CqlParser::parse("drop table t").is_err());
        assert!(CqlParser::parse("insert into t(a,b) values(1)").is_err());
        assert!(CqlParser::parse("select * from t where a = 'open").is_err());
        assert!(CqlParser::parse("select * from t garbage").is_err());
    }
}
