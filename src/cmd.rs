use crate::elab;
use crate::parse::Expr;
use crate::tt::{Const, Env, GlobalEnv, Name};

/// A top-level declaration. Without a body it introduces an axiom of the
/// given type; with a body it is a proof obligation.
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: Name,
    pub ty: Expr,
    pub def: Option<Expr>,
}

#[derive(Debug, Default)]
pub struct Eval {
    pub env: GlobalEnv,
}

impl Eval {
    /// Resolves a declaration against the current environment, checks the
    /// body (if any) against the declared type, and registers the result.
    /// Declarations may refer to everything registered before them.
    pub fn run_decl(&mut self, decl: Decl) -> anyhow::Result<()> {
        let Decl { name, ty, def } = decl;
        let ty = elab::elaborate(&self.env, &ty)?;
        let def = match def {
            Some(def) => Some(elab::elaborate(&self.env, &def)?),
            None => None,
        };
        let def = match def {
            Some(mut def) => {
                let checker = Env { globals: &self.env };
                checker.check_type(&mut vec![], &def, &ty)?;
                println!("Proof '{}' passed", name);
                // the environment keeps normal forms, so inlining stays small
                def.normalize();
                Some(def)
            }
            None => {
                log::debug!("axiom '{}' registered", name);
                None
            }
        };
        self.env.add(name, Const { ty, def });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::{File, Lex};
    use crate::parse::Parser;
    use crate::tt::{mk_const, mk_pi, mk_type, mk_var};
    use std::sync::Arc;

    fn run(input: &str) -> anyhow::Result<Eval> {
        let file = Arc::new(File::new("<test>", input.to_owned()));
        let mut lex = Lex::new(file);
        let mut eval = Eval::default();
        loop {
            let decl = Parser::new(&mut lex).decl_opt()?;
            let Some(decl) = decl else {
                return Ok(eval);
            };
            eval.run_decl(decl)?;
        }
    }

    fn name(value: &str) -> Name {
        Name::intern(value).expect("valid name")
    }

    #[test]
    fn identity_proof_passes() {
        let eval = run("id : (T : Type) -> T -> T := (T : Type) => (x : T) => x;")
            .expect("identity checks");
        let id = eval.env.get(name("id")).expect("registered");
        assert_eq!(id.ty, mk_pi(mk_type(), mk_pi(mk_var(1), mk_var(2))));
    }

    #[test]
    fn dependent_application_normalises_in_the_environment() {
        let eval = run(
            "Nat : Type; zero : Nat; \
             id : (T : Type) -> T -> T := (T : Type) => (x : T) => x; \
             test : Nat := id Nat zero;",
        )
        .expect("all declarations check");
        let test = eval.env.get(name("test")).expect("registered");
        assert_eq!(test.def.as_ref().expect("has a body"), &mk_const(name("zero")));
    }

    #[test]
    fn application_type_mismatch_is_fatal() {
        let err = run(
            "Nat : Type; Bool : Type; t : Bool; \
             f : Nat -> Nat := (x : Nat) => x; bad : Nat := f t;",
        )
        .expect_err("Bool is not Nat");
        assert_eq!(
            err.to_string(),
            "Type mismatch: t has type Bool, which is not a member of Nat"
        );
    }

    #[test]
    fn axioms_never_fail() {
        let eval = run("Nat : Type; zero : Nat; succ : Nat -> Nat;").expect("axioms register");
        assert!(eval.env.get(name("succ")).expect("registered").def.is_none());
    }

    #[test]
    fn undefined_name_is_fatal() {
        let err = run("bad : Nat;").expect_err("Nat has not been declared");
        assert!(err.to_string().contains("Nat not defined"));
    }

    #[test]
    fn sorry_inhabits_anything() {
        let eval = run("Nat : Type; zero : Nat := SORRY Nat;").expect("the escape hatch passes");
        let zero = eval.env.get(name("zero")).expect("registered");
        assert_eq!(zero.def.as_ref().expect("has a body"), &mk_const(name("Nat")));
    }

    #[test]
    fn later_declarations_see_earlier_ones() {
        run("Nat : Type; zero : Nat; one : Nat := zero;").expect("chained declarations check");
    }
}
