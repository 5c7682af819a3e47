//! Recursive-descent parser for the Cypher subset.
//!
//! Supports `MATCH` / `OPTIONAL MATCH` with node and relationship patterns,
//! `WHERE`, `WITH`, `RETURN`, `ORDER BY`, `SKIP` and `LIMIT`. Write clauses
//! are out of scope; they are rejected as unexpected tokens.

use crate::ast::{
    Clause, CompareOp, Direction, Expr, Literal, MatchClause, NodePattern, OrderItem, PathPattern,
    ProjectionItem, Query, RelPattern, ReturnClause, WithClause,
};
use crate::error::ParseError;
use crate::token::{Spanned, Token, tokenize};

/// Parses a full query.
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    let mut parser = Parser::new(input)?;
    let query = parser.query()?;
    parser.expect_eof()?;
    Ok(query)
}

/// Parses a standalone predicate, as stored in permission filters.
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            end: input.len(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|s| s.token.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_keyword(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(word))
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{word}'")))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.advance() else {
                    unreachable!()
                };
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("expected {what}"))),
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected("expected end of query"))
        }
    }

    fn unexpected(&self, message: &str) -> ParseError {
        ParseError::new(self.offset(), message)
    }

    fn query(&mut self) -> Result<Query, ParseError> {
        let mut clauses = Vec::new();
        loop {
            if self.at_keyword("MATCH") || self.at_keyword("OPTIONAL") {
                clauses.push(Clause::Match(self.match_clause()?));
            } else if self.at_keyword("WITH") {
                clauses.push(Clause::With(self.with_clause()?));
            } else {
                break;
            }
        }

        let ret = if self.eat_keyword("RETURN") {
            let distinct = self.eat_keyword("DISTINCT");
            let items = self.projection_items()?;
            Some(ReturnClause { distinct, items })
        } else {
            None
        };

        if clauses.is_empty() && ret.is_none() {
            return Err(self.unexpected("expected MATCH, WITH or RETURN"));
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.expression()?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                order_by.push(OrderItem { expr, descending });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        let skip = if self.eat_keyword("SKIP") {
            Some(self.expression()?)
        } else {
            None
        };
        let limit = if self.eat_keyword("LIMIT") {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(Query {
            clauses,
            ret,
            order_by,
            skip,
            limit,
        })
    }

    fn match_clause(&mut self) -> Result<MatchClause, ParseError> {
        let optional = self.eat_keyword("OPTIONAL");
        self.expect_keyword("MATCH")?;

        let mut patterns = vec![self.path_pattern()?];
        while self.eat(&Token::Comma) {
            patterns.push(self.path_pattern()?);
        }

        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(MatchClause {
            optional,
            patterns,
            where_clause,
        })
    }

    fn with_clause(&mut self) -> Result<WithClause, ParseError> {
        self.expect_keyword("WITH")?;
        let distinct = self.eat_keyword("DISTINCT");
        let items = self.projection_items()?;
        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(WithClause {
            distinct,
            items,
            where_clause,
        })
    }

    fn projection_items(&mut self) -> Result<Vec<ProjectionItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let expr = if self.eat(&Token::Star) {
                Expr::Star
            } else {
                self.expression()?
            };
            let alias = if self.eat_keyword("AS") {
                Some(self.expect_ident("alias after AS")?)
            } else {
                None
            };
            items.push(ProjectionItem { expr, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn path_pattern(&mut self) -> Result<PathPattern, ParseError> {
        let start = self.node_pattern()?;
        let mut segments = Vec::new();
        while matches!(self.peek(), Some(Token::Dash | Token::Lt)) {
            let rel = self.rel_pattern()?;
            let node = self.node_pattern()?;
            segments.push((rel, node));
        }
        Ok(PathPattern { start, segments })
    }

    fn node_pattern(&mut self) -> Result<NodePattern, ParseError> {
        self.expect(&Token::LParen, "'(' to open a node pattern")?;
        let variable = match self.peek() {
            Some(Token::Ident(_)) => Some(self.expect_ident("variable")?),
            _ => None,
        };
        let mut labels = Vec::new();
        while self.eat(&Token::Colon) {
            labels.push(self.expect_ident("label after ':'")?);
        }
        let properties = if self.peek() == Some(&Token::LBrace) {
            self.property_map()?
        } else {
            Vec::new()
        };
        self.expect(&Token::RParen, "')' to close a node pattern")?;
        Ok(NodePattern {
            variable,
            labels,
            properties,
        })
    }

    fn rel_pattern(&mut self) -> Result<RelPattern, ParseError> {
        let incoming = self.eat(&Token::Lt);
        self.expect(&Token::Dash, "'-' in a relationship pattern")?;

        let mut variable = None;
        let mut types = Vec::new();
        let mut var_length = None;
        let mut properties = Vec::new();

        if self.eat(&Token::LBracket) {
            if let Some(Token::Ident(_)) = self.peek() {
                variable = Some(self.expect_ident("relationship variable")?);
            }
            if self.eat(&Token::Colon) {
                types.push(self.expect_ident("relationship type after ':'")?);
            }
            if self.eat(&Token::Star) {
                var_length = Some(self.var_length_bounds()?);
            }
            if self.peek() == Some(&Token::LBrace) {
                properties = self.property_map()?;
            }
            self.expect(&Token::RBracket, "']' to close a relationship pattern")?;
        }

        self.expect(&Token::Dash, "'-' in a relationship pattern")?;
        let outgoing = self.eat(&Token::Gt);

        let direction = match (incoming, outgoing) {
            (true, true) => return Err(self.unexpected("relationship cannot point both ways")),
            (true, false) => Direction::Incoming,
            (false, true) => Direction::Outgoing,
            (false, false) => Direction::Undirected,
        };

        Ok(RelPattern {
            variable,
            types,
            properties,
            direction,
            var_length,
        })
    }

    fn var_length_bounds(&mut self) -> Result<(Option<i64>, Option<i64>), ParseError> {
        let min = if let Some(Token::Int(n)) = self.peek() {
            let n = *n;
            self.pos += 1;
            Some(n)
        } else {
            None
        };
        if self.eat(&Token::Dot) {
            self.expect(&Token::Dot, "'..' in a variable-length bound")?;
            let max = if let Some(Token::Int(n)) = self.peek() {
                let n = *n;
                self.pos += 1;
                Some(n)
            } else {
                None
            };
            Ok((min, max))
        } else {
            // `*n` is an exact hop count; bare `*` is unbounded.
            Ok((min, min))
        }
    }

    fn property_map(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        self.expect(&Token::LBrace, "'{' to open a property map")?;
        let mut properties = Vec::new();
        if self.peek() != Some(&Token::RBrace) {
            loop {
                let key = self.expect_ident("property key")?;
                self.expect(&Token::Colon, "':' after property key")?;
                let value = self.expression()?;
                properties.push((key, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace, "'}' to close a property map")?;
        Ok(properties)
    }

    // Expression grammar: OR < AND < NOT < comparison < atoms.

    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_expression()?;
        while self.eat_keyword("OR") {
            let right = self.and_expression()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_expression()?;
        while self.eat_keyword("AND") {
            let right = self.not_expression()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expression(&mut self) -> Result<Expr, ParseError> {
        if self.at_keyword("NOT") {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.not_expression()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.atom()?;

        let op = match self.peek() {
            Some(Token::Eq) => Some(CompareOp::Eq),
            Some(Token::Ne) => Some(CompareOp::Ne),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Le) => Some(CompareOp::Le),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Ge) => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.atom()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        if self.at_keyword("IN") {
            self.pos += 1;
            let list = self.atom()?;
            return Ok(Expr::In {
                expr: Box::new(left),
                list: Box::new(list),
                negated: false,
            });
        }
        if self.at_keyword("NOT") && self.peek_at(1).is_some_and(|t| t.is_keyword("IN")) {
            self.pos += 2;
            let list = self.atom()?;
            return Ok(Expr::In {
                expr: Box::new(left),
                list: Box::new(list),
                negated: true,
            });
        }
        if self.at_keyword("IS") {
            self.pos += 1;
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        Ok(left)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let base = match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(&Token::RParen, "')' to close a group")?;
                inner
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "']' to close a list")?;
                Expr::List(items)
            }
            Some(Token::Str(_)) => {
                let Some(Token::Str(s)) = self.advance() else {
                    unreachable!()
                };
                Expr::Literal(Literal::Text(s))
            }
            Some(Token::Int(n)) => {
                let n = *n;
                self.pos += 1;
                Expr::Literal(Literal::Int(n))
            }
            Some(Token::Float(x)) => {
                let x = *x;
                self.pos += 1;
                Expr::Literal(Literal::Float(x))
            }
            Some(Token::Dash) => {
                // Negative numeric literal.
                self.pos += 1;
                match self.advance() {
                    Some(Token::Int(n)) => Expr::Literal(Literal::Int(-n)),
                    Some(Token::Float(x)) => Expr::Literal(Literal::Float(-x)),
                    _ => return Err(self.unexpected("expected a number after '-'")),
                }
            }
            Some(Token::Param(_)) => {
                let Some(Token::Param(name)) = self.advance() else {
                    unreachable!()
                };
                Expr::Param(name)
            }
            Some(Token::Ident(name)) => {
                if name.eq_ignore_ascii_case("null") {
                    self.pos += 1;
                    Expr::Literal(Literal::Null)
                } else if name.eq_ignore_ascii_case("true") {
                    self.pos += 1;
                    Expr::Literal(Literal::Bool(true))
                } else if name.eq_ignore_ascii_case("false") {
                    self.pos += 1;
                    Expr::Literal(Literal::Bool(false))
                } else {
                    let name = self.expect_ident("identifier")?;
                    if self.eat(&Token::LParen) {
                        let mut args = Vec::new();
                        if self.peek() != Some(&Token::RParen) {
                            loop {
                                if self.eat(&Token::Star) {
                                    args.push(Expr::Star);
                                } else {
                                    args.push(self.expression()?);
                                }
                                if !self.eat(&Token::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(&Token::RParen, "')' to close an argument list")?;
                        Expr::FunctionCall { name, args }
                    } else {
                        Expr::Ident(name)
                    }
                }
            }
            _ => return Err(self.unexpected("expected an expression")),
        };

        // Postfix property access chains.
        let mut expr = base;
        while self.eat(&Token::Dot) {
            let name = self.expect_ident("property name after '.'")?;
            expr = Expr::Property {
                base: Box::new(expr),
                name,
            };
        }
        Ok(expr)
    }
}
