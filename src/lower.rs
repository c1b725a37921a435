//! Turns the raw derivation tree into the typed [`ast`](crate::ast).
//!
//! Each production is matched against the closed list of grammar
//! alternatives exactly once, here; later passes never look at rule text.

use crate::ast::*;
use crate::error::ReadError;
use crate::tree::{Node, Tree};
use crate::types::Type;

pub fn lower(tree: &Tree) -> Result<Program, ReadError> {
    let mut b = Builder { tree, next_id: 0 };
    let (procedures, wain) = b.build_start(tree.root())?;
    log::debug!(
        "lowered {} procedures plus wain, {} typed nodes",
        procedures.len(),
        b.next_id
    );
    Ok(Program {
        procedures,
        wain,
        expr_count: b.next_id,
    })
}

struct Builder<'t> {
    tree: &'t Tree,
    next_id: u32,
}

fn unexpected(expected: &str, n: &Node) -> ReadError {
    ReadError::UnexpectedProduction {
        expected: expected.to_string(),
        found: n.rule(),
        line: n.line,
    }
}

/// The lexeme of a terminal child, checking its kind.
fn lexeme<'a>(n: &'a Node, kind: &str) -> Result<&'a str, ReadError> {
    if n.lhs != kind || !n.is_terminal() {
        return Err(unexpected(kind, n));
    }
    n.rhs.first().map(String::as_str).ok_or_else(|| unexpected(kind, n))
}

fn expect(n: &Node, lhs: &str) -> Result<(), ReadError> {
    if n.lhs == lhs && n.children.len() == n.rhs.len() {
        Ok(())
    } else {
        Err(unexpected(lhs, n))
    }
}

impl Builder<'_> {
    fn fresh(&mut self, kind: ExprKind) -> Expr {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        Expr { id, kind }
    }

    fn build_start(&mut self, n: &Node) -> Result<(Vec<Procedure>, Procedure), ReadError> {
        expect(n, "start")?;
        match n.shape().as_slice() {
            ["BOF", "procedures", "EOF"] => {
                let mut procedures = vec![];
                let mut cur = self.tree.child(n, 1);
                loop {
                    expect(cur, "procedures")?;
                    match cur.shape().as_slice() {
                        ["procedure", "procedures"] => {
                            procedures.push(self.build_procedure(self.tree.child(cur, 0))?);
                            cur = self.tree.child(cur, 1);
                        }
                        ["main"] => {
                            let wain = self.build_main(self.tree.child(cur, 0))?;
                            return Ok((procedures, wain));
                        }
                        _ => return Err(unexpected("procedures", cur)),
                    }
                }
            }
            _ => Err(unexpected("start", n)),
        }
    }

    fn build_procedure(&mut self, n: &Node) -> Result<Procedure, ReadError> {
        expect(n, "procedure")?;
        match n.shape().as_slice() {
            [
                "INT", "ID", "LPAREN", "params", "RPAREN", "LBRACE", "dcls", "statements",
                "RETURN", "expr", "SEMI", "RBRACE",
            ] => Ok(Procedure {
                name: lexeme(self.tree.child(n, 1), "ID")?.to_string(),
                params: self.build_params(self.tree.child(n, 3))?,
                dcls: self.build_dcls(self.tree.child(n, 6))?,
                body: self.build_statements(self.tree.child(n, 7))?,
                ret: self.build_expr(self.tree.child(n, 9))?,
            }),
            _ => Err(unexpected("procedure", n)),
        }
    }

    fn build_main(&mut self, n: &Node) -> Result<Procedure, ReadError> {
        expect(n, "main")?;
        match n.shape().as_slice() {
            [
                "INT", "WAIN", "LPAREN", "dcl", "COMMA", "dcl", "RPAREN", "LBRACE", "dcls",
                "statements", "RETURN", "expr", "SEMI", "RBRACE",
            ] => Ok(Procedure {
                name: lexeme(self.tree.child(n, 1), "WAIN")?.to_string(),
                params: vec![
                    self.build_dcl(self.tree.child(n, 3))?,
                    self.build_dcl(self.tree.child(n, 5))?,
                ],
                dcls: self.build_dcls(self.tree.child(n, 8))?,
                body: self.build_statements(self.tree.child(n, 9))?,
                ret: self.build_expr(self.tree.child(n, 11))?,
            }),
            _ => Err(unexpected("main", n)),
        }
    }

    fn build_params(&mut self, n: &Node) -> Result<Vec<Dcl>, ReadError> {
        expect(n, "params")?;
        match n.shape().as_slice() {
            [] => Ok(vec![]),
            ["paramlist"] => {
                let mut out = vec![];
                let mut cur = self.tree.child(n, 0);
                loop {
                    expect(cur, "paramlist")?;
                    match cur.shape().as_slice() {
                        ["dcl"] => {
                            out.push(self.build_dcl(self.tree.child(cur, 0))?);
                            return Ok(out);
                        }
                        ["dcl", "COMMA", "paramlist"] => {
                            out.push(self.build_dcl(self.tree.child(cur, 0))?);
                            cur = self.tree.child(cur, 2);
                        }
                        _ => return Err(unexpected("paramlist", cur)),
                    }
                }
            }
            _ => Err(unexpected("params", n)),
        }
    }

    fn build_dcl(&mut self, n: &Node) -> Result<Dcl, ReadError> {
        expect(n, "dcl")?;
        match n.shape().as_slice() {
            ["type", "ID"] => {
                let t = self.tree.child(n, 0);
                expect(t, "type")?;
                let ty = match t.shape().as_slice() {
                    ["INT"] => Type::Int,
                    ["INT", "STAR"] => Type::IntPtr,
                    _ => return Err(unexpected("type", t)),
                };
                Ok(Dcl {
                    name: lexeme(self.tree.child(n, 1), "ID")?.to_string(),
                    ty,
                })
            }
            _ => Err(unexpected("dcl", n)),
        }
    }

    /// `dcls` is left-recursive: the innermost node holds the first declaration.
    fn build_dcls(&mut self, n: &Node) -> Result<Vec<Declaration>, ReadError> {
        let mut rev = vec![];
        let mut cur = n;
        loop {
            expect(cur, "dcls")?;
            let init = match cur.shape().as_slice() {
                [] => break,
                ["dcls", "dcl", "BECOMES", "NUM", "SEMI"] => {
                    Initializer::Num(parse_num(self.tree.child(cur, 3))?)
                }
                ["dcls", "dcl", "BECOMES", "NULL", "SEMI"] => {
                    lexeme(self.tree.child(cur, 3), "NULL")?;
                    Initializer::Null
                }
                _ => return Err(unexpected("dcls", cur)),
            };
            rev.push(Declaration {
                dcl: self.build_dcl(self.tree.child(cur, 1))?,
                init,
            });
            cur = self.tree.child(cur, 0);
        }
        rev.reverse();
        Ok(rev)
    }

    fn build_statements(&mut self, n: &Node) -> Result<Vec<Statement>, ReadError> {
        // Collect the left spine first so statements are lowered in source order.
        let mut spine = vec![];
        let mut cur = n;
        loop {
            expect(cur, "statements")?;
            match cur.shape().as_slice() {
                [] => break,
                ["statements", "statement"] => {
                    spine.push(self.tree.child(cur, 1));
                    cur = self.tree.child(cur, 0);
                }
                _ => return Err(unexpected("statements", cur)),
            }
        }
        spine
            .into_iter()
            .rev()
            .map(|s| self.build_statement(s))
            .collect()
    }

    fn build_statement(&mut self, n: &Node) -> Result<Statement, ReadError> {
        expect(n, "statement")?;
        match n.shape().as_slice() {
            ["lvalue", "BECOMES", "expr", "SEMI"] => {
                let target = self.build_lvalue(self.tree.child(n, 0))?;
                Ok(Statement::Assign(target, self.build_expr(self.tree.child(n, 2))?))
            }
            [
                "IF", "LPAREN", "test", "RPAREN", "LBRACE", "statements", "RBRACE", "ELSE",
                "LBRACE", "statements", "RBRACE",
            ] => Ok(Statement::If {
                test: self.build_test(self.tree.child(n, 2))?,
                then_body: self.build_statements(self.tree.child(n, 5))?,
                else_body: self.build_statements(self.tree.child(n, 9))?,
            }),
            ["WHILE", "LPAREN", "test", "RPAREN", "LBRACE", "statements", "RBRACE"] => {
                Ok(Statement::While {
                    test: self.build_test(self.tree.child(n, 2))?,
                    body: self.build_statements(self.tree.child(n, 5))?,
                })
            }
            ["PRINTLN", "LPAREN", "expr", "RPAREN", "SEMI"] => {
                Ok(Statement::Println(self.build_expr(self.tree.child(n, 2))?))
            }
            ["DELETE", "LBRACK", "RBRACK", "expr", "SEMI"] => {
                Ok(Statement::Delete(self.build_expr(self.tree.child(n, 3))?))
            }
            _ => Err(unexpected("statement", n)),
        }
    }

    fn build_test(&mut self, n: &Node) -> Result<Test, ReadError> {
        expect(n, "test")?;
        let op = match n.shape().as_slice() {
            ["expr", "EQ", "expr"] => RelOp::Eq,
            ["expr", "NE", "expr"] => RelOp::Ne,
            ["expr", "LT", "expr"] => RelOp::Lt,
            ["expr", "LE", "expr"] => RelOp::Le,
            ["expr", "GE", "expr"] => RelOp::Ge,
            ["expr", "GT", "expr"] => RelOp::Gt,
            _ => return Err(unexpected("test", n)),
        };
        Ok(Test {
            lhs: self.build_expr(self.tree.child(n, 0))?,
            op,
            rhs: self.build_expr(self.tree.child(n, 2))?,
        })
    }

    /// `expr` and `term` nest to the left; the spine is walked in a loop and
    /// the operands folded back together in source order.
    fn build_expr(&mut self, n: &Node) -> Result<Expr, ReadError> {
        let mut operands = vec![];
        let mut cur = n;
        let first = loop {
            expect(cur, "expr")?;
            let op = match cur.shape().as_slice() {
                ["term"] => break self.tree.child(cur, 0),
                ["expr", "PLUS", "term"] => BinOp::Add,
                ["expr", "MINUS", "term"] => BinOp::Sub,
                _ => return Err(unexpected("expr", cur)),
            };
            operands.push((op, self.tree.child(cur, 2)));
            cur = self.tree.child(cur, 0);
        };
        let mut acc = self.build_term(first)?;
        for (op, term) in operands.into_iter().rev() {
            let rhs = self.build_term(term)?;
            acc = self.fresh(ExprKind::Binary(Box::new(acc), op, Box::new(rhs)));
        }
        Ok(acc)
    }

    fn build_term(&mut self, n: &Node) -> Result<Expr, ReadError> {
        let mut operands = vec![];
        let mut cur = n;
        let first = loop {
            expect(cur, "term")?;
            let op = match cur.shape().as_slice() {
                ["factor"] => break self.tree.child(cur, 0),
                ["term", "STAR", "factor"] => BinOp::Mul,
                ["term", "SLASH", "factor"] => BinOp::Div,
                ["term", "PCT", "factor"] => BinOp::Rem,
                _ => return Err(unexpected("term", cur)),
            };
            operands.push((op, self.tree.child(cur, 2)));
            cur = self.tree.child(cur, 0);
        };
        let mut acc = self.build_factor(first)?;
        for (op, factor) in operands.into_iter().rev() {
            let rhs = self.build_factor(factor)?;
            acc = self.fresh(ExprKind::Binary(Box::new(acc), op, Box::new(rhs)));
        }
        Ok(acc)
    }

    fn build_factor(&mut self, n: &Node) -> Result<Expr, ReadError> {
        expect(n, "factor")?;
        let tree = self.tree;
        let kind = match n.shape().as_slice() {
            ["ID"] => ExprKind::Var(lexeme(tree.child(n, 0), "ID")?.to_string()),
            ["NUM"] => ExprKind::Num(parse_num(tree.child(n, 0))?),
            ["NULL"] => {
                lexeme(tree.child(n, 0), "NULL")?;
                ExprKind::Null
            }
            ["LPAREN", "expr", "RPAREN"] => {
                ExprKind::Paren(Box::new(self.build_expr(tree.child(n, 1))?))
            }
            ["AMP", "lvalue"] => ExprKind::AddressOf(self.build_lvalue(tree.child(n, 1))?),
            ["STAR", "factor"] => ExprKind::Deref(Box::new(self.build_factor(tree.child(n, 1))?)),
            ["NEW", "INT", "LBRACK", "expr", "RBRACK"] => {
                ExprKind::New(Box::new(self.build_expr(tree.child(n, 3))?))
            }
            ["ID", "LPAREN", "RPAREN"] => {
                ExprKind::Call(lexeme(tree.child(n, 0), "ID")?.to_string(), vec![])
            }
            ["ID", "LPAREN", "arglist", "RPAREN"] => {
                let name = lexeme(tree.child(n, 0), "ID")?.to_string();
                ExprKind::Call(name, self.build_arglist(tree.child(n, 2))?)
            }
            _ => return Err(unexpected("factor", n)),
        };
        Ok(self.fresh(kind))
    }

    fn build_arglist(&mut self, n: &Node) -> Result<Vec<Expr>, ReadError> {
        let mut out = vec![];
        let mut cur = n;
        loop {
            expect(cur, "arglist")?;
            match cur.shape().as_slice() {
                ["expr"] => {
                    out.push(self.build_expr(self.tree.child(cur, 0))?);
                    return Ok(out);
                }
                ["expr", "COMMA", "arglist"] => {
                    out.push(self.build_expr(self.tree.child(cur, 0))?);
                    cur = self.tree.child(cur, 2);
                }
                _ => return Err(unexpected("arglist", cur)),
            }
        }
    }

    fn build_lvalue(&mut self, n: &Node) -> Result<LValue, ReadError> {
        expect(n, "lvalue")?;
        match n.shape().as_slice() {
            ["ID"] => Ok(LValue::Var(lexeme(self.tree.child(n, 0), "ID")?.to_string())),
            ["STAR", "factor"] => Ok(LValue::Deref(Box::new(
                self.build_factor(self.tree.child(n, 1))?,
            ))),
            ["LPAREN", "lvalue", "RPAREN"] => Ok(LValue::Paren(Box::new(
                self.build_lvalue(self.tree.child(n, 1))?,
            ))),
            _ => Err(unexpected("lvalue", n)),
        }
    }
}

fn parse_num(n: &Node) -> Result<i32, ReadError> {
    let text = lexeme(n, "NUM")?;
    text.parse::<i32>().map_err(|_| ReadError::BadNumber {
        text: text.to_string(),
        line: n.line,
    })
}
