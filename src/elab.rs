use anyhow::bail;

use crate::parse::Expr;
use crate::tt::{GlobalEnv, Name, Term, mk_abs, mk_app, mk_const, mk_pi, mk_var};

/// Resolves surface syntax into the kernel: named binders become 1-based
/// indices counted from the innermost binder, and globals with a defining
/// body are inlined, so kernel terms mention axiomatic names only. Inlined
/// bodies were resolved at top level and are closed, hence need no lifting.
pub fn elaborate(env: &GlobalEnv, expr: &Expr) -> anyhow::Result<Term> {
    let mut elab = Elaborator { env, bound: vec![] };
    elab.visit(expr)
}

struct Elaborator<'a> {
    env: &'a GlobalEnv,
    /// In-scope binders, outermost first; `None` for anonymous binders.
    bound: Vec<Option<Name>>,
}

impl Elaborator<'_> {
    fn visit(&mut self, expr: &Expr) -> anyhow::Result<Term> {
        match expr {
            Expr::Ident(name) => self.visit_ident(*name),
            Expr::App(inner) => Ok(mk_app(self.visit(&inner.fun)?, self.visit(&inner.arg)?)),
            Expr::Abs(inner) => {
                let (binder_type, body) = self.visit_binder(&inner.head, &inner.body)?;
                Ok(mk_abs(binder_type, body))
            }
            Expr::Pi(inner) => {
                let (binder_type, body) = self.visit_binder(&inner.head, &inner.body)?;
                Ok(mk_pi(binder_type, body))
            }
            Expr::Binding(_) => bail!("binding {} appears outside a binder head", expr),
        }
    }

    fn visit_binder(&mut self, head: &Expr, body: &Expr) -> anyhow::Result<(Term, Term)> {
        let (binder_type, binder_name) = match head {
            Expr::Binding(inner) => (self.visit(&inner.ty)?, Some(inner.name)),
            _ => (self.visit(head)?, None),
        };
        self.bound.push(binder_name);
        let body = self.visit(body);
        self.bound.pop();
        Ok((binder_type, body?))
    }

    fn visit_ident(&mut self, name: Name) -> anyhow::Result<Term> {
        for (i, binder) in self.bound.iter().rev().enumerate() {
            if *binder == Some(name) {
                return Ok(mk_var(i + 1));
            }
        }
        let Some(c) = self.env.get(name) else {
            bail!("{} not defined", name);
        };
        match &c.def {
            Some(def) => {
                log::debug!("inlining '{}'", name);
                Ok(def.clone())
            }
            None => Ok(mk_const(name)),
        }
    }
}
