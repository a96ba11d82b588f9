//! Recursive-descent parser for contract source.
//!
//! ```text
//! program  = {pragma} {import} {contract}
//! contract = "contract" id "(" [params] ")" ["extends" idlist] "locks" value "{" clause+ "}"
//! clause   = "clause" id "(" [params] ")" ["requires" reqlist] "{" stmt+ "}"
//! stmt     = verify | unlock | lock | define | assign | if
//! ```

use super::ast::{
    Clause, Contract, Expr, Import, Param, Pragma, Program, Requirement, Statement, ValueBinding,
    ValueRef,
};
use super::errors::{CompileError, Position};
use super::lexer::{Keyword, TokKind, Token, lex};
use super::types::{BinaryOp, Type, UnaryOp};

/// Lowest binary precedence level.
const MIN_PRECEDENCE: u8 = 1;

/// Parses a complete source file.
pub fn parse(src: &str) -> Result<Program, CompileError> {
    let tokens = lex(src)?;
    let end = Position {
        offset: src.len(),
        line: src.lines().count().max(1),
        col: src.lines().last().map_or(1, |l| l.chars().count() + 1),
    };
    Parser {
        tokens,
        pos: 0,
        end,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Reported for errors at end of input.
    end: Position,
}

impl Parser {
    fn peek(&self) -> Option<&TokKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn here(&self) -> Position {
        self.tokens.get(self.pos).map_or(self.end, |t| t.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::Parse {
            pos: self.here(),
            message: message.into(),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            None => "end of input".to_string(),
            Some(TokKind::Ident(name)) => format!("\"{name}\""),
            Some(TokKind::Keyword(kw)) => format!("\"{}\"", kw.as_str()),
            Some(TokKind::Int(n)) => n.to_string(),
            Some(TokKind::Hex(bytes)) => format!("0x{}", hex::encode(bytes)),
            Some(TokKind::Str(_)) => "string literal".to_string(),
            Some(TokKind::Pragma(_)) => "pragma".to_string(),
            Some(TokKind::Punct(p)) => format!("\"{p}\""),
        }
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(TokKind::Punct(q)) if *q == p)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.peek() == Some(&TokKind::Keyword(kw))
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        let hit = self.at_punct(p);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        let hit = self.at_keyword(kw);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), CompileError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error(format!("expected \"{p}\", found {}", self.describe())))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), CompileError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected \"{}\", found {}",
                kw.as_str(),
                self.describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.peek() {
            Some(TokKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected identifier, found {}", self.describe()))),
        }
    }

    // ==================== Declarations ====================

    fn program(mut self) -> Result<Program, CompileError> {
        let mut program = Program::default();
        while let Some(TokKind::Pragma(constraint)) = self.peek() {
            let constraint = constraint.clone();
            let pos = self.here();
            self.pos += 1;
            program.pragmas.push(Pragma { constraint, pos });
        }
        while self.at_keyword(Keyword::Import) {
            let pos = self.here();
            self.pos += 1;
            let path = match self.advance().map(|t| t.kind) {
                Some(TokKind::Str(bytes)) => String::from_utf8(bytes)
                    .map_err(|_| CompileError::Parse {
                        pos,
                        message: "import path is not UTF-8".to_string(),
                    })?,
                _ => {
                    return Err(CompileError::Parse {
                        pos,
                        message: "expected a quoted path after import".to_string(),
                    });
                }
            };
            self.eat_punct(";");
            program.imports.push(Import { path, pos });
        }
        while self.peek().is_some() {
            program.contracts.push(self.contract()?);
        }
        Ok(program)
    }

    fn contract(&mut self) -> Result<Contract, CompileError> {
        let pos = self.here();
        self.expect_keyword(Keyword::Contract)?;
        let name = self.expect_ident()?;
        let params = self.params()?;

        let mut extends = Vec::new();
        if self.eat_keyword(Keyword::Extends) {
            extends.push(self.expect_ident()?);
            while self.eat_punct(",") {
                extends.push(self.expect_ident()?);
            }
        }

        self.expect_keyword(Keyword::Locks)?;
        let first = self.expect_ident()?;
        let value = if self.eat_keyword(Keyword::Of) {
            ValueBinding::Split {
                amount: first,
                asset: self.expect_ident()?,
            }
        } else {
            ValueBinding::Named(first)
        };

        self.expect_punct("{")?;
        let mut clauses = Vec::new();
        while !self.at_punct("}") {
            clauses.push(self.clause()?);
        }
        self.expect_punct("}")?;
        if clauses.is_empty() && extends.is_empty() {
            return Err(CompileError::Parse {
                pos,
                message: format!("contract {name} has no clauses"),
            });
        }

        Ok(Contract {
            name,
            params,
            extends,
            value,
            clauses,
            recursive: false,
            pos,
        })
    }

    /// `( a, b: Type, c: Type )` where names before a type share it.
    fn params(&mut self) -> Result<Vec<Param>, CompileError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if self.eat_punct(")") {
            return Ok(params);
        }
        loop {
            let mut names = vec![self.expect_ident()?];
            while self.eat_punct(",") {
                names.push(self.expect_ident()?);
            }
            self.expect_punct(":")?;
            let ty = self.type_name()?;
            params.extend(names.into_iter().map(|name| Param {
                name,
                ty: ty.clone(),
            }));
            if self.eat_punct(")") {
                return Ok(params);
            }
            self.expect_punct(",")?;
        }
    }

    fn type_name(&mut self) -> Result<Type, CompileError> {
        let pos = self.here();
        let name = self.expect_ident()?;
        name.parse::<Type>().map_err(|_| CompileError::Parse {
            pos,
            message: format!("unknown type \"{name}\""),
        })
    }

    fn clause(&mut self) -> Result<Clause, CompileError> {
        let pos = self.here();
        self.expect_keyword(Keyword::Clause)?;
        let name = self.expect_ident()?;
        let params = self.params()?;

        let mut reqs = Vec::new();
        if self.eat_keyword(Keyword::Requires) {
            loop {
                let name = self.expect_ident()?;
                self.expect_punct(":")?;
                let amount = self.expr()?;
                self.expect_keyword(Keyword::Of)?;
                let asset = self.expr()?;
                reqs.push(Requirement {
                    name,
                    amount,
                    asset,
                });
                if !self.eat_punct(",") {
                    break;
                }
            }
        }

        let statements = self.block()?;
        Ok(Clause {
            name,
            params,
            reqs,
            statements,
            pos,
        })
    }

    // ==================== Statements ====================

    /// `{ stmt+ }`
    fn block(&mut self) -> Result<Vec<Statement>, CompileError> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.eat_punct("}") {
            stmts.push(self.statement()?);
            while self.eat_punct(";") {}
        }
        if stmts.is_empty() {
            return Err(self.error("empty block"));
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Statement, CompileError> {
        let Some(TokKind::Keyword(kw)) = self.peek() else {
            return Err(self.error(format!("expected statement, found {}", self.describe())));
        };
        let kw = *kw;
        self.pos += 1;
        match kw {
            Keyword::Verify => Ok(Statement::Verify(self.expr()?)),
            Keyword::Unlock => Ok(Statement::Unlock {
                value: self.value_ref()?,
                index: 0,
            }),
            Keyword::Lock => {
                let value = self.value_ref()?;
                self.expect_keyword(Keyword::With)?;
                let program = self.expr()?;
                Ok(Statement::Lock {
                    value,
                    program,
                    index: 0,
                })
            }
            Keyword::Define => {
                let name = self.expect_ident()?;
                self.expect_punct(":")?;
                let ty = self.type_name()?;
                let init = if self.eat_punct("=") {
                    Some(self.expr()?)
                } else {
                    None
                };
                Ok(Statement::Define { name, ty, init })
            }
            Keyword::Assign => {
                let name = self.expect_ident()?;
                self.expect_punct("=")?;
                Ok(Statement::Assign {
                    name,
                    expr: self.expr()?,
                })
            }
            Keyword::If => {
                let cond = self.expr()?;
                let then_body = self.block()?;
                let else_body = if self.eat_keyword(Keyword::Else) {
                    self.block()?
                } else {
                    Vec::new()
                };
                Ok(Statement::If {
                    cond,
                    then_body,
                    else_body,
                })
            }
            other => {
                self.pos -= 1;
                Err(self.error(format!("unexpected \"{}\"", other.as_str())))
            }
        }
    }

    /// `name` or `amount of asset`.
    fn value_ref(&mut self) -> Result<ValueRef, CompileError> {
        let pos = self.here();
        let first = self.expr()?;
        if self.eat_keyword(Keyword::Of) {
            return Ok(ValueRef::Split {
                amount: first,
                asset: self.expr()?,
            });
        }
        match first {
            Expr::Var(name) => Ok(ValueRef::Named(name)),
            other => Err(CompileError::Parse {
                pos,
                message: format!("expected a value name or \"amount of asset\", found {other}"),
            }),
        }
    }

    // ==================== Expressions ====================

    fn expr(&mut self) -> Result<Expr, CompileError> {
        self.binary(MIN_PRECEDENCE)
    }

    /// Precedence climbing; every level associates left.
    fn binary(&mut self, min: u8) -> Result<Expr, CompileError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokKind::Punct(p)) => BinaryOp::from_symbol(p),
                _ => None,
            };
            let Some(op) = op.filter(|op| op.precedence() >= min) else {
                return Ok(left);
            };
            self.pos += 1;
            let right = self.binary(op.precedence() + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = if self.eat_punct("~") {
            Some(UnaryOp::Invert)
        } else if self.eat_punct("!") {
            Some(UnaryOp::Not)
        } else {
            None
        };
        match op {
            Some(op) => Ok(Expr::Unary {
                op,
                operand: Box::new(self.unary()?),
            }),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let Some(tok) = self.advance() else {
            return Err(self.error("expected expression, found end of input"));
        };
        match tok.kind {
            TokKind::Int(n) => Ok(Expr::Int(n)),
            TokKind::Hex(bytes) | TokKind::Str(bytes) => Ok(Expr::Bytes(bytes)),
            TokKind::Keyword(Keyword::True) => Ok(Expr::Bool(true)),
            TokKind::Keyword(Keyword::False) => Ok(Expr::Bool(false)),
            TokKind::Ident(name) => {
                if !self.eat_punct("(") {
                    return Ok(Expr::Var(name));
                }
                let args = self.expr_list(")")?;
                Ok(Expr::Call { name, args })
            }
            TokKind::Punct("(") => {
                let inner = self.expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokKind::Punct("[") => Ok(Expr::List(self.expr_list("]")?)),
            _ => {
                self.pos -= 1;
                Err(self.error(format!("expected expression, found {}", self.describe())))
            }
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn expr_list(&mut self, close: &str) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        if self.eat_punct(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat_punct(close) {
                return Ok(items);
            }
            self.expect_punct(",")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trade_offer() {
        let program = parse(
            "contract TradeOffer(requestedAsset: Asset, requestedAmount: Amount,
                                 sellerProgram: Program, sellerKey: PublicKey) locks offered {
               clause trade() requires payment: requestedAmount of requestedAsset {
                 lock payment with sellerProgram
                 unlock offered
               }
               clause cancel(sellerSig: Signature) {
                 verify checkTxSig(sellerKey, sellerSig)
                 unlock offered
               }
             }",
        )
        .unwrap();
        let c = &program.contracts[0];
        assert_eq!(c.name, "TradeOffer");
        assert_eq!(c.params.len(), 4);
        assert_eq!(c.params[1].ty, Type::Amount);
        assert_eq!(c.value, ValueBinding::Named("offered".into()));
        assert_eq!(c.clauses.len(), 2);
        assert_eq!(c.clauses[0].reqs[0].name, "payment");
        assert!(matches!(
            &c.clauses[0].statements[0],
            Statement::Lock { value: ValueRef::Named(v), program: Expr::Var(p), .. }
                if v == "payment" && p == "sellerProgram"
        ));
        assert!(matches!(&c.clauses[1].statements[0], Statement::Verify(Expr::Call { name, args })
            if name == "checkTxSig" && args.len() == 2));
    }

    #[test]
    fn grouped_params_share_type() {
        let program = parse(
            "contract K(k1, k2, k3: PublicKey) locks amt of asset {
               clause c(s1, s2: Signature) { verify checkTxMultiSig([k1, k2, k3], [s1, s2]); unlock amt of asset }
             }",
        )
        .unwrap();
        let c = &program.contracts[0];
        assert!(c.params.iter().all(|p| p.ty == Type::PublicKey));
        assert_eq!(c.clauses[0].params.len(), 2);
        assert_eq!(
            c.value,
            ValueBinding::Split {
                amount: "amt".into(),
                asset: "asset".into()
            }
        );
        assert!(matches!(
            &c.clauses[0].statements[1],
            Statement::Unlock { value: ValueRef::Split { .. }, .. }
        ));
    }

    #[test]
    fn precedence_and_associativity() {
        let program = parse(
            "contract P(a: Integer, b: Integer) locks v {
               clause c() { verify a + b * 2 > a - b - 1 || !(a == b) && true; unlock v }
             }",
        )
        .unwrap();
        let Statement::Verify(e) = &program.contracts[0].clauses[0].statements[0] else {
            panic!("expected verify");
        };
        assert_eq!(
            e.to_string(),
            "((a + (b * 2)) > ((a - b) - 1)) || (!(a == b) && true)"
        );
    }

    #[test]
    fn statements_pragma_and_imports() {
        let program = parse(
            "pragma version >=0.1.0;
             import \"lib/base.equity\";
             contract D(x: Integer) locks v {
               clause c(y: Integer) {
                 define z: Integer = x + y
                 define w: Integer
                 assign w = z * 2
                 if w > 10 { verify true } else { verify w < 3 }
                 unlock v
               }
             }",
        )
        .unwrap();
        assert_eq!(program.pragmas[0].constraint, ">=0.1.0");
        assert_eq!(program.imports[0].path, "lib/base.equity");
        let stmts = &program.contracts[0].clauses[0].statements;
        let kinds: Vec<_> = stmts.iter().map(Statement::kind).collect();
        assert_eq!(kinds, ["define", "define", "assign", "if", "unlock"]);
    }

    #[test]
    fn extends_list() {
        let program = parse(
            "contract A() locks v { clause a() { unlock v } }
             contract B() extends A locks v { clause b() { unlock v } }",
        )
        .unwrap();
        assert_eq!(program.contracts[1].extends, ["A"]);
    }

    #[test]
    fn errors_report_position() {
        let err = parse("contract X() locks v {\n  clause c() { verify }\n}").unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.col), (2, 23));
        assert!(err.to_string().contains("expected expression"));

        let err = parse("contract X() locks v { }").unwrap_err();
        assert!(err.to_string().contains("has no clauses"));

        let err = parse("contract X(a: Bytes) locks v { clause c() { unlock v } }").unwrap_err();
        assert!(err.to_string().contains("unknown type \"Bytes\""));

        let err = parse("contract X() locks v { clause c() { lock 1 + 2 with p } }").unwrap_err();
        assert!(err.to_string().contains("expected a value name"));
    }
}
