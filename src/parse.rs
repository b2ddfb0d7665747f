use std::fmt::Display;
use std::sync::Arc;

use thiserror::Error;

use crate::cmd::Decl;
use crate::lex::{Lex, LexError, Span, Token, TokenKind};
use crate::tt::Name;

/// Surface syntax. Binders still carry names here; the elaborator turns them
/// into indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(Name),
    App(Box<ExprApp>),
    Abs(Box<ExprAbs>),
    Pi(Box<ExprPi>),
    Binding(Box<ExprBinding>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprApp {
    pub fun: Expr,
    pub arg: Expr,
}

/// `head` is either a `Binding` (annotated binder) or a bare expression used
/// as the type of an anonymous binder. The same shape serves `Abs` and `Pi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprAbs {
    pub head: Expr,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprPi {
    pub head: Expr,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprBinding {
    pub name: Name,
    pub ty: Expr,
}

#[inline]
pub fn mk_expr_app(fun: Expr, arg: Expr) -> Expr {
    Expr::App(Box::new(ExprApp { fun, arg }))
}

#[inline]
pub fn mk_expr_abs(head: Expr, body: Expr) -> Expr {
    Expr::Abs(Box::new(ExprAbs { head, body }))
}

#[inline]
pub fn mk_expr_pi(head: Expr, body: Expr) -> Expr {
    Expr::Pi(Box::new(ExprPi { head, body }))
}

#[inline]
pub fn mk_expr_binding(name: Name, ty: Expr) -> Expr {
    Expr::Binding(Box::new(ExprBinding { name, ty }))
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::App(inner) => write!(f, "({} {})", inner.fun, inner.arg),
            Expr::Abs(inner) => write!(f, "({} => {})", inner.head, inner.body),
            Expr::Pi(inner) => write!(f, "({} -> {})", inner.head, inner.body),
            Expr::Binding(inner) => write!(f, "({} : {})", inner.name, inner.ty),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("tokenize error")]
    Lex(#[from] LexError),
    #[error("parse error: {message} at {span}")]
    Parse { message: String, span: Span },
    #[error("unexpected end of input at {span}")]
    Eof { span: Span },
}

pub struct Parser<'a> {
    lex: &'a mut Lex,
}

impl<'a> Parser<'a> {
    pub fn new(lex: &'a mut Lex) -> Self {
        Self { lex }
    }

    fn fail<R>(token: Token, message: impl Into<String>) -> Result<R, ParseError> {
        Err(ParseError::Parse {
            message: message.into(),
            span: token.span,
        })
    }

    fn eof_error(&self) -> ParseError {
        ParseError::Eof {
            span: Span::eof(Arc::clone(self.lex.file())),
        }
    }

    fn optional<F, R>(&mut self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Self) -> Result<R, ParseError>,
    {
        let start = self.lex.offset();
        match f(self) {
            Ok(m) => Some(m),
            Err(_err) => {
                self.lex.rewind(start);
                None
            }
        }
    }

    fn peek_opt(&mut self) -> Option<Token> {
        self.optional(|this| this.peek())
    }

    fn peek(&mut self) -> Result<Token, ParseError> {
        self.lex
            .clone()
            .next()
            .transpose()?
            .ok_or_else(|| self.eof_error())
    }

    fn advance(&mut self) {
        self.lex
            .next()
            .expect("unchecked advance")
            .expect("impossible lex error! probably due to unchecked advance");
    }

    fn any_token(&mut self) -> Result<Token, ParseError> {
        self.lex
            .next()
            .transpose()?
            .ok_or_else(|| self.eof_error())
    }

    fn ident(&mut self) -> Result<Token, ParseError> {
        let token = self.any_token()?;
        if !token.is_ident() {
            return Self::fail(token, "expected identifier");
        }
        Ok(token)
    }

    fn name(&mut self) -> Result<Name, ParseError> {
        let token = self.ident()?;
        match Name::intern(token.text()) {
            Ok(name) => Ok(name),
            Err(_) => Self::fail(token, "invalid identifier"),
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ParseError> {
        let token = self.any_token()?;
        if token.kind == TokenKind::Symbol && token.text() == sym {
            return Ok(());
        }
        Self::fail(token, format!("expected '{}'", sym))
    }

    fn symbol_opt(&mut self, sym: &str) -> bool {
        if let Some(token) = self.peek_opt()
            && token.is_symbol()
            && token.text() == sym
        {
            self.advance();
            return true;
        }
        false
    }

    /// `name : ty ( := def )? ;`. Returns `None` at a clean end of input;
    /// running out of tokens mid-declaration is an error.
    pub fn decl_opt(&mut self) -> Result<Option<Decl>, ParseError> {
        if self.lex.is_eof() {
            return Ok(None);
        }
        let name = self.name()?;
        self.expect_symbol(":")?;
        let ty = self.expr()?;
        let def = if self.symbol_opt(":=") {
            Some(self.expr()?)
        } else {
            None
        };
        self.expect_symbol(";")?;
        Ok(Some(Decl { name, ty, def }))
    }

    /// An application spine, optionally continued by a right-associated
    /// `=>` or `->` whose body is the rest of the expression.
    pub fn expr(&mut self) -> Result<Expr, ParseError> {
        let head = self.app_expr()?;
        if self.symbol_opt("=>") {
            let body = self.expr()?;
            return Ok(mk_expr_abs(head, body));
        }
        if self.symbol_opt("->") {
            let body = self.expr()?;
            return Ok(mk_expr_pi(head, body));
        }
        Ok(head)
    }

    /// Juxtaposition, folded left-to-right: `a b c` is `((a b) c)`.
    fn app_expr(&mut self) -> Result<Expr, ParseError> {
        let mut m = self.atom()?;
        while let Some(token) = self.peek_opt() {
            let starts_atom = token.is_ident() || (token.is_symbol() && token.text() == "(");
            if !starts_atom {
                break;
            }
            let arg = self.atom()?;
            m = mk_expr_app(m, arg);
        }
        Ok(m)
    }

    /// `ident`, `( ident : expr )` (an annotated binding, chosen only when
    /// an identifier and `:` immediately follow the parenthesis), or
    /// `( expr )`.
    fn atom(&mut self) -> Result<Expr, ParseError> {
        let token = self.any_token()?;
        if token.is_ident() {
            return match Name::intern(token.text()) {
                Ok(name) => Ok(Expr::Ident(name)),
                Err(_) => Self::fail(token, "invalid identifier"),
            };
        }
        if token.is_symbol() && token.text() == "(" {
            if self.peek_binding() {
                let name = self.name()?;
                self.expect_symbol(":")?;
                let ty = self.expr()?;
                self.expect_symbol(")")?;
                return Ok(mk_expr_binding(name, ty));
            }
            let m = self.expr()?;
            self.expect_symbol(")")?;
            return Ok(m);
        }
        Self::fail(token, "expected expression")
    }

    fn peek_binding(&self) -> bool {
        let mut lex = self.lex.clone();
        let Some(Ok(first)) = lex.next() else {
            return false;
        };
        let Some(Ok(second)) = lex.next() else {
            return false;
        };
        first.is_ident() && second.is_symbol() && second.text() == ":"
    }
}
