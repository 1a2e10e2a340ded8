// ABOUTME: Validation and parsing of user-supplied WHERE filter strings
// ABOUTME: Rejects injection patterns and turns accepted filters into parameterized predicates

use crate::dialect::Dialect;
use crate::error::InterchangeError;
use crate::quoting::{quote_identifier, quote_qualified_identifier};
use anyhow::{bail, Result};
use std::fmt;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "UNION", "DROP", "DELETE", "INSERT", "UPDATE", "TRUNCATE", "ALTER", "CREATE", "GRANT",
    "EXEC", "EXECUTE",
];

const DANGEROUS_FUNCTIONS: &[&str] = &["SLEEP", "BENCHMARK", "LOAD_FILE"];

/// A filter accepted by [`parse`]: SQL with `?` placeholders plus the values
/// to bind, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPredicate {
    pub sql: String,
    pub bindings: Vec<String>,
}

impl ParsedPredicate {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// `" WHERE <sql>"`, or an empty string when there is no filter.
    pub fn where_sql(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// Why a WHERE clause was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Comment,
    StatementSeparator,
    ForbiddenKeyword(&'static str),
    Subquery,
    DangerousFunction(&'static str),
    HexLiteral,
    UnbalancedQuotes,
    UnbalancedParentheses,
    Parentheses,
    UnexpectedCharacter(char),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Comment => write!(f, "SQL comments are not allowed"),
            Rejection::StatementSeparator => write!(f, "statement separators (;) are not allowed"),
            Rejection::ForbiddenKeyword(kw) => write!(f, "keyword {} is not allowed", kw),
            Rejection::Subquery => write!(f, "subqueries are not allowed"),
            Rejection::DangerousFunction(name) => write!(f, "function {} is not allowed", name),
            Rejection::HexLiteral => write!(f, "hexadecimal literals are not allowed"),
            Rejection::UnbalancedQuotes => write!(f, "unbalanced quotes"),
            Rejection::UnbalancedParentheses => write!(f, "unbalanced parentheses"),
            Rejection::Parentheses => {
                write!(f, "parentheses are only allowed around an IN value list")
            }
            Rejection::UnexpectedCharacter(c) => write!(f, "unexpected character '{}'", c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Unquoted identifier-shaped run (`status`, `t.id`, `AND`)
    Word(String),
    /// Unquoted value that is not identifier-shaped (`18`, `-2.5`, `2024-01-01`)
    Literal(String),
    /// `'...'` or `"..."`, already unescaped
    Quoted { value: String, quote: char },
    /// `` `...` `` or `[...]`, already unescaped
    Identifier(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

/// Check a WHERE clause against the injection rules.
///
/// Empty or whitespace-only input is valid and means "no filter".
///
/// # Examples
///
/// ```
/// # use table_interchange::where_clause::{validate, Rejection};
/// assert!(validate("status = 'active' AND age >= 18").is_ok());
/// assert_eq!(validate("1=1; DROP TABLE users"), Err(Rejection::StatementSeparator));
/// ```
pub fn validate(clause: &str) -> Result<(), Rejection> {
    if clause.trim().is_empty() {
        return Ok(());
    }

    if clause.contains("--") || clause.contains("/*") || clause.contains("*/") {
        return Err(Rejection::Comment);
    }
    if clause.contains('#') {
        return Err(Rejection::Comment);
    }
    if clause.contains(';') {
        return Err(Rejection::StatementSeparator);
    }

    let upper = clause.to_ascii_uppercase();
    for keyword in FORBIDDEN_KEYWORDS {
        if contains_keyword(&upper, keyword) {
            return Err(Rejection::ForbiddenKeyword(keyword));
        }
    }
    if contains_keyword(&upper, "SELECT") {
        return Err(Rejection::Subquery);
    }
    for function in DANGEROUS_FUNCTIONS {
        if contains_keyword(&upper, function) {
            return Err(Rejection::DangerousFunction(function));
        }
    }
    if contains_hex_literal(&upper) {
        return Err(Rejection::HexLiteral);
    }

    let tokens = tokenize(clause)?;
    check_parentheses(&tokens)
}

/// `true` when [`validate`] accepts the clause.
pub fn is_valid(clause: &str) -> bool {
    validate(clause).is_ok()
}

/// Parse a validated WHERE clause into a parameterized predicate.
///
/// Conditions are split on top-level `AND`/`OR` and emitted in the same
/// left-to-right order with uppercase connectors; nothing is regrouped.
/// Columns are quoted for `dialect`; every value becomes a `?` binding.
///
/// Supported operators: `=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`, `LIKE`,
/// `IN (...)`, `IS NULL`, `IS NOT NULL`, `BETWEEN ... AND ...`.
///
/// # Examples
///
/// ```
/// # use table_interchange::dialect::Dialect;
/// # use table_interchange::where_clause::parse;
/// let parsed = parse("name = 'O''Brien' or age > 30", Dialect::Postgres).unwrap();
/// assert_eq!(parsed.sql, "\"name\" = ? OR \"age\" > ?");
/// assert_eq!(parsed.bindings, vec!["O'Brien", "30"]);
/// ```
pub fn parse(clause: &str, dialect: Dialect) -> Result<ParsedPredicate> {
    if clause.trim().is_empty() {
        return Ok(ParsedPredicate::default());
    }

    let tokens = tokenize(clause).map_err(|r| anyhow::anyhow!("Cannot parse WHERE clause: {}", r))?;

    let mut sql = String::new();
    let mut bindings = Vec::new();

    for (connector, condition) in split_conditions(&tokens)? {
        if let Some(connector) = connector {
            sql.push(' ');
            sql.push_str(connector);
            sql.push(' ');
        }
        render_condition(condition, dialect, &mut sql, &mut bindings)?;
    }

    tracing::debug!(
        "Parsed WHERE clause into '{}' with {} binding(s)",
        sql,
        bindings.len()
    );

    Ok(ParsedPredicate { sql, bindings })
}

/// Validate then parse the filter configured for `table`.
///
/// Returns `Ok(None)` for an empty filter. A rejected clause becomes an
/// [`InterchangeError::SecurityRejection`] and is never parsed.
pub fn parse_for_table(
    table: &str,
    clause: &str,
    dialect: Dialect,
) -> Result<Option<ParsedPredicate>> {
    if let Err(rejection) = validate(clause) {
        tracing::warn!(
            "Rejected WHERE clause for table '{}': {}",
            crate::utils::sanitize_identifier(table),
            rejection
        );
        return Err(InterchangeError::SecurityRejection {
            table: table.to_string(),
            reason: rejection.to_string(),
        }
        .into());
    }

    let parsed = parse(clause, dialect)?;
    Ok((!parsed.is_empty()).then_some(parsed))
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn contains_keyword(upper: &str, keyword: &str) -> bool {
    upper.match_indices(keyword).any(|(idx, _)| {
        let before = upper[..idx].chars().next_back();
        let after = upper[idx + keyword.len()..].chars().next();
        !before.is_some_and(is_identifier_char) && !after.is_some_and(is_identifier_char)
    })
}

fn contains_hex_literal(upper: &str) -> bool {
    upper.match_indices("0X").any(|(idx, _)| {
        let before = upper[..idx].chars().next_back();
        let after = upper[idx + 2..].chars().next();
        !before.is_some_and(is_identifier_char) && after.is_some_and(|c| c.is_ascii_hexdigit())
    })
}

fn tokenize(clause: &str) -> Result<Vec<Token>, Rejection> {
    let chars: Vec<char> = clause.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' => {
                let (value, next) = read_string(&chars, i, c)?;
                tokens.push(Token::Quoted { value, quote: c });
                i = next;
            }
            '`' => {
                let (value, next) = read_delimited(&chars, i, '`')?;
                tokens.push(Token::Identifier(value));
                i = next;
            }
            '[' => {
                let (value, next) = read_delimited(&chars, i, ']')?;
                tokens.push(Token::Identifier(value));
                i = next;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op("<="));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op("<>"));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op("<"));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(">="));
                    i += 2;
                } else {
                    tokens.push(Token::Op(">"));
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op("!="));
                    i += 2;
                } else {
                    return Err(Rejection::UnexpectedCharacter('!'));
                }
            }
            ']' => return Err(Rejection::UnexpectedCharacter(']')),
            _ => {
                let start = i;
                while i < chars.len() && !is_token_boundary(chars[i]) {
                    i += 1;
                }
                let run: String = chars[start..i].iter().collect();
                if is_word(&run) {
                    tokens.push(Token::Word(run));
                } else {
                    tokens.push(Token::Literal(run));
                }
            }
        }
    }

    Ok(tokens)
}

fn is_token_boundary(c: char) -> bool {
    c.is_whitespace() || "'\"`[]()=<>!,".contains(c)
}

fn is_word(run: &str) -> bool {
    let mut chars = run.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| is_identifier_char(c) || c == '.')
        }
        _ => false,
    }
}

/// Read a `'` or `"` string starting at `start`.
///
/// A quote preceded by an odd number of backslashes is escaped; a doubled
/// quote is a literal quote. Backslashes before anything other than a quote
/// or another backslash are kept as-is.
fn read_string(chars: &[char], start: usize, quote: char) -> Result<(String, usize), Rejection> {
    let mut value = String::new();
    let mut i = start + 1;

    loop {
        let Some(&ch) = chars.get(i) else {
            return Err(Rejection::UnbalancedQuotes);
        };

        if ch == '\\' {
            match chars.get(i + 1) {
                Some(&next) if next == '\\' || next == '\'' || next == '"' => {
                    value.push(next);
                    i += 2;
                }
                _ => {
                    value.push('\\');
                    i += 1;
                }
            }
            continue;
        }

        if ch == quote {
            if chars.get(i + 1) == Some(&quote) {
                value.push(quote);
                i += 2;
                continue;
            }
            return Ok((value, i + 1));
        }

        value.push(ch);
        i += 1;
    }
}

fn read_delimited(chars: &[char], start: usize, close: char) -> Result<(String, usize), Rejection> {
    let mut value = String::new();
    let mut i = start + 1;

    loop {
        let Some(&ch) = chars.get(i) else {
            return Err(Rejection::UnbalancedQuotes);
        };
        if ch == close {
            if chars.get(i + 1) == Some(&close) {
                value.push(close);
                i += 2;
                continue;
            }
            return Ok((value, i + 1));
        }
        value.push(ch);
        i += 1;
    }
}

fn check_parentheses(tokens: &[Token]) -> Result<(), Rejection> {
    let mut in_list = false;

    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => {
                let follows_in = idx > 0 && tokens[idx - 1].is_keyword("IN");
                if in_list || !follows_in {
                    return Err(Rejection::Parentheses);
                }
                in_list = true;
            }
            Token::RParen => {
                if !in_list {
                    return Err(Rejection::UnbalancedParentheses);
                }
                in_list = false;
            }
            Token::Op(_) if in_list => return Err(Rejection::Parentheses),
            Token::Word(w) if in_list && is_connector(w) => return Err(Rejection::Parentheses),
            _ => {}
        }
    }

    if in_list {
        return Err(Rejection::UnbalancedParentheses);
    }
    Ok(())
}

fn is_connector(word: &str) -> bool {
    word.eq_ignore_ascii_case("AND") || word.eq_ignore_ascii_case("OR")
}

fn split_conditions(tokens: &[Token]) -> Result<Vec<(Option<&'static str>, &[Token])>> {
    let mut conditions = Vec::new();
    let mut connector: Option<&'static str> = None;
    let mut start = 0;
    let mut between_pending = false;

    for (idx, token) in tokens.iter().enumerate() {
        if token.is_keyword("BETWEEN") {
            between_pending = true;
            continue;
        }
        let Token::Word(word) = token else {
            continue;
        };
        if !is_connector(word) {
            continue;
        }
        if word.eq_ignore_ascii_case("AND") && between_pending {
            between_pending = false;
            continue;
        }

        if idx == start {
            bail!("WHERE clause has an empty condition before '{}'", word);
        }
        conditions.push((connector, &tokens[start..idx]));
        connector = Some(if word.eq_ignore_ascii_case("AND") {
            "AND"
        } else {
            "OR"
        });
        start = idx + 1;
    }

    if start >= tokens.len() {
        bail!("WHERE clause ends with a dangling connector");
    }
    conditions.push((connector, &tokens[start..]));

    Ok(conditions)
}

fn render_condition(
    tokens: &[Token],
    dialect: Dialect,
    sql: &mut String,
    bindings: &mut Vec<String>,
) -> Result<()> {
    let mut iter = tokens.iter().peekable();

    let column = match iter.next() {
        Some(token) => render_column(token, dialect)?,
        None => bail!("WHERE clause has an empty condition"),
    };
    sql.push_str(&column);

    let operator = iter
        .next()
        .ok_or_else(|| anyhow::anyhow!("Missing operator after column {}", column))?;

    match operator {
        Token::Op(op) => {
            bindings.push(take_value(&mut iter, op)?);
            sql.push_str(&format!(" {} ?", op));
        }
        t if t.is_keyword("LIKE") => {
            bindings.push(take_value(&mut iter, "LIKE")?);
            sql.push_str(" LIKE ?");
        }
        t if t.is_keyword("IN") => {
            if iter.next() != Some(&Token::LParen) {
                bail!("IN must be followed by a parenthesised value list");
            }
            let mut placeholders = Vec::new();
            loop {
                bindings.push(take_value(&mut iter, "IN")?);
                placeholders.push("?");
                match iter.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => bail!("Malformed IN value list"),
                }
            }
            sql.push_str(&format!(" IN ({})", placeholders.join(", ")));
        }
        t if t.is_keyword("IS") => match iter.next() {
            Some(t) if t.is_keyword("NULL") => sql.push_str(" IS NULL"),
            Some(t) if t.is_keyword("NOT") => match iter.next() {
                Some(t) if t.is_keyword("NULL") => sql.push_str(" IS NOT NULL"),
                _ => bail!("IS NOT must be followed by NULL"),
            },
            _ => bail!("IS must be followed by NULL or NOT NULL"),
        },
        t if t.is_keyword("BETWEEN") => {
            let low = take_value(&mut iter, "BETWEEN")?;
            match iter.next() {
                Some(t) if t.is_keyword("AND") => {}
                _ => bail!("BETWEEN must be of the form BETWEEN <low> AND <high>"),
            }
            let high = take_value(&mut iter, "BETWEEN")?;
            bindings.push(low);
            bindings.push(high);
            sql.push_str(" BETWEEN ? AND ?");
        }
        other => bail!("Unsupported operator {:?} after column {}", other, column),
    }

    if let Some(extra) = iter.next() {
        bail!("Unexpected {:?} after condition on column {}", extra, column);
    }

    Ok(())
}

fn render_column(token: &Token, dialect: Dialect) -> Result<String> {
    let rendered = match token {
        Token::Word(word) => {
            if is_connector(word) || word.eq_ignore_ascii_case("NOT") {
                bail!("Expected a column name, found keyword {}", word);
            }
            let parts: Vec<&str> = word.split('.').collect();
            if parts.iter().any(|p| p.is_empty()) {
                bail!("Malformed column reference '{}'", word);
            }
            quote_qualified_identifier(&parts, dialect)
        }
        Token::Identifier(name) | Token::Quoted { value: name, quote: '"' } => {
            if name.is_empty() {
                bail!("Column name cannot be empty");
            }
            if name.contains('?') {
                bail!("Column name '{}' cannot contain '?'", name);
            }
            quote_identifier(name, dialect)
        }
        other => bail!("Expected a column name, found {:?}", other),
    };
    Ok(rendered)
}

fn take_value<'a, I>(iter: &mut I, operator: &str) -> Result<String>
where
    I: Iterator<Item = &'a Token>,
{
    match iter.next() {
        Some(Token::Quoted { value, .. }) => Ok(value.clone()),
        Some(Token::Literal(value)) => Ok(value.clone()),
        Some(Token::Word(word)) if !is_connector(word) => Ok(word.clone()),
        Some(other) => bail!("Expected a value after {}, found {:?}", operator, other),
        None => bail!("Missing value after {}", operator),
    }
}
