use std::collections::HashMap;
use std::fmt::Display;
use std::mem;
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::bail;
use regex::Regex;
use thiserror::Error;

/// An interned identifier. Comparisons are integer comparisons; the spelling
/// lives in a process-wide table and is only consulted for display.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Name(usize);

/// Both directions of the intern table, guarded together: a `Name` is an
/// index into `spellings`, so the two sides can never drift apart.
#[derive(Default)]
struct NameTable {
    ids: HashMap<String, Name>,
    spellings: Vec<String>,
}

static NAMES: LazyLock<Mutex<NameTable>> = LazyLock::new(Default::default);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match NAMES.lock().unwrap().spellings.get(self.0) {
            Some(spelling) => write!(f, "{}", spelling),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("invalid name")]
pub struct InvalidNameError;

impl TryFrom<&str> for Name {
    type Error = InvalidNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Name::intern(value)
    }
}

impl Name {
    pub fn intern(value: &str) -> Result<Name, InvalidNameError> {
        static VALID: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._]+$").unwrap());
        if !VALID.is_match(value) {
            return Err(InvalidNameError);
        }
        let mut table = NAMES.lock().unwrap();
        if let Some(&name) = table.ids.get(value) {
            return Ok(name);
        }
        let name = Name(table.spellings.len());
        table.spellings.push(value.to_owned());
        table.ids.insert(value.to_owned(), name);
        Ok(name)
    }

    /// The sort of types. Its own stored type is an uninspected placeholder.
    pub fn type_sort() -> Name {
        static TYPE: LazyLock<Name> = LazyLock::new(|| Name::intern("Type").unwrap());
        *TYPE
    }

    /// The unsound escape hatch. Applying it returns the argument, typed as demanded.
    pub fn sorry() -> Name {
        static SORRY: LazyLock<Name> = LazyLock::new(|| Name::intern("SORRY").unwrap());
        *SORRY
    }
}

/// Binders carry no names: a `Var` is a 1-based count of enclosing binders,
/// index 1 being the innermost. Sharing is structural through `Arc`; all
/// traversals mutate through `Arc::make_mut` so aliased trees are never
/// observed mid-rewrite.
#[derive(Clone, Debug)]
pub enum Term {
    #[non_exhaustive]
    Var(Arc<TermVar>),
    #[non_exhaustive]
    Abs(Arc<TermAbs>),
    #[non_exhaustive]
    Pi(Arc<TermPi>),
    #[non_exhaustive]
    App(Arc<TermApp>),
    #[non_exhaustive]
    Const(Arc<TermConst>),
    /// Stored type of `SORRY`; applying a function of this type yields the
    /// argument itself as the result type.
    Sorry,
    /// Stored type of `Type`. Never inspected.
    Error,
}

#[derive(Clone, Debug)]
pub struct TermVar {
    pub index: usize,
}

#[derive(Clone, Debug)]
pub struct TermAbs {
    pub binder_type: Term,
    pub body: Term,
}

#[derive(Clone, Debug)]
pub struct TermPi {
    pub binder_type: Term,
    pub body: Term,
}

#[derive(Clone, Debug)]
pub struct TermApp {
    pub fun: Term,
    pub arg: Term,
}

#[derive(Clone, Debug)]
pub struct TermConst {
    pub name: Name,
}

impl Default for Term {
    fn default() -> Self {
        mk_var(usize::MAX)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Var(inner) => write!(f, "\\{}", inner.index),
            Term::Abs(inner) => write!(f, "({} => {})", inner.binder_type, inner.body),
            Term::Pi(inner) => write!(f, "({} -> {})", inner.binder_type, inner.body),
            Term::App(inner) => write!(f, "({} {})", inner.fun, inner.arg),
            Term::Const(inner) => write!(f, "{}", inner.name),
            Term::Sorry => write!(f, "SORRY"),
            Term::Error => write!(f, "?"),
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Var(inner1), Term::Var(inner2)) => inner1.index == inner2.index,
            (Term::Abs(inner1), Term::Abs(inner2)) => {
                inner1.binder_type == inner2.binder_type && inner1.body == inner2.body
            }
            (Term::Pi(inner1), Term::Pi(inner2)) => {
                inner1.binder_type == inner2.binder_type && inner1.body == inner2.body
            }
            (Term::App(inner1), Term::App(inner2)) => {
                inner1.fun == inner2.fun && inner1.arg == inner2.arg
            }
            (Term::Const(inner1), Term::Const(inner2)) => inner1.name == inner2.name,
            (Term::Sorry, Term::Sorry) => true,
            (Term::Error, Term::Error) => true,
            _ => false,
        }
    }
}

impl Eq for Term {}

#[inline]
pub fn mk_var(index: usize) -> Term {
    Term::Var(Arc::new(TermVar { index }))
}

#[inline]
pub fn mk_abs(binder_type: Term, body: Term) -> Term {
    Term::Abs(Arc::new(TermAbs { binder_type, body }))
}

#[inline]
pub fn mk_pi(binder_type: Term, body: Term) -> Term {
    Term::Pi(Arc::new(TermPi { binder_type, body }))
}

#[inline]
pub fn mk_app(fun: Term, arg: Term) -> Term {
    Term::App(Arc::new(TermApp { fun, arg }))
}

#[inline]
pub fn mk_const(name: Name) -> Term {
    Term::Const(Arc::new(TermConst { name }))
}

pub fn mk_type() -> Term {
    static TYPE: LazyLock<Term> = LazyLock::new(|| mk_const(Name::type_sort()));
    TYPE.clone()
}

impl Term {
    /// Adds `k` to every free variable of the term. Indices bound by a binder
    /// inside the term itself are left alone; the invariant is that a free
    /// `Var` still refers to the same enclosing binder afterwards.
    pub fn shift(&mut self, k: usize) {
        if k != 0 {
            self.shift_at(k, 0);
        }
    }

    fn shift_at(&mut self, k: usize, cutoff: usize) {
        match self {
            Term::Var(inner) => {
                if inner.index > cutoff {
                    Arc::make_mut(inner).index += k;
                }
            }
            Term::Abs(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.shift_at(k, cutoff);
                inner.body.shift_at(k, cutoff + 1);
            }
            Term::Pi(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.shift_at(k, cutoff);
                inner.body.shift_at(k, cutoff + 1);
            }
            Term::App(inner) => {
                let inner = Arc::make_mut(inner);
                inner.fun.shift_at(k, cutoff);
                inner.arg.shift_at(k, cutoff);
            }
            Term::Const(_) | Term::Sorry | Term::Error => {}
        }
    }

    /// Replaces the binder at `depth` with `value` and contracts the index
    /// space: references outside the eliminated binder close one level.
    /// `depth` starts at 1 (the innermost binder). The value is lifted by the
    /// number of binders it crossed on the way in.
    pub fn subst(&mut self, value: &Term, depth: usize) {
        match self {
            Term::Var(inner) => {
                let index = inner.index;
                if index == depth {
                    let mut m = value.clone();
                    m.shift(index - 1);
                    *self = m;
                } else if index > depth {
                    Arc::make_mut(inner).index -= 1;
                }
            }
            Term::Abs(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.subst(value, depth);
                inner.body.subst(value, depth + 1);
            }
            Term::Pi(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.subst(value, depth);
                inner.body.subst(value, depth + 1);
            }
            Term::App(inner) => {
                let inner = Arc::make_mut(inner);
                inner.fun.subst(value, depth);
                inner.arg.subst(value, depth);
            }
            Term::Const(_) | Term::Sorry | Term::Error => {}
        }
    }

    fn beta_reduce(&mut self) -> bool {
        let Term::App(inner) = self else {
            return false;
        };
        let TermApp { fun, arg } = Arc::make_mut(inner);
        match fun {
            Term::Abs(abs) => {
                let TermAbs {
                    binder_type: _,
                    body,
                } = Arc::make_mut(abs);
                body.subst(arg, 1);
                *self = mem::take(body);
                true
            }
            Term::Const(head) if head.name == Name::sorry() => {
                *self = mem::take(arg);
                true
            }
            _ => false,
        }
    }

    /// Call-by-value normalisation: arguments first, then the redex, then the
    /// contractum again. Recurses under binders. Not proven terminating; the
    /// language admits non-terminating terms through axioms.
    pub fn normalize(&mut self) {
        match self {
            Term::App(inner) => {
                let inner = Arc::make_mut(inner);
                inner.fun.normalize();
                inner.arg.normalize();
                if self.beta_reduce() {
                    self.normalize();
                }
            }
            Term::Abs(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.normalize();
                inner.body.normalize();
            }
            Term::Pi(inner) => {
                let inner = Arc::make_mut(inner);
                inner.binder_type.normalize();
                inner.body.normalize();
            }
            Term::Var(_) | Term::Const(_) | Term::Sorry | Term::Error => {}
        }
    }

    /// Every `Var(i)` satisfies `1 ≤ i ≤ depth + <binders crossed>`.
    pub fn is_closed_under(&self, depth: usize) -> bool {
        match self {
            Term::Var(inner) => 1 <= inner.index && inner.index <= depth,
            Term::Abs(inner) => {
                inner.binder_type.is_closed_under(depth) && inner.body.is_closed_under(depth + 1)
            }
            Term::Pi(inner) => {
                inner.binder_type.is_closed_under(depth) && inner.body.is_closed_under(depth + 1)
            }
            Term::App(inner) => {
                inner.fun.is_closed_under(depth) && inner.arg.is_closed_under(depth)
            }
            Term::Const(_) | Term::Sorry | Term::Error => true,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed_under(0)
    }
}

/// A global declaration: a type, and for definitions the (normalised) body.
#[derive(Debug, Clone)]
pub struct Const {
    pub ty: Term,
    pub def: Option<Term>,
}

/// The global environment. Append-only and ordered; lookups walk from the
/// most recent entry, so re-declaring a name shadows the older entry.
#[derive(Debug, Clone)]
pub struct GlobalEnv {
    consts: Vec<(Name, Const)>,
}

impl Default for GlobalEnv {
    fn default() -> Self {
        let mut env = GlobalEnv { consts: vec![] };
        env.add(
            Name::type_sort(),
            Const {
                ty: Term::Error,
                def: None,
            },
        );
        env.add(
            Name::sorry(),
            Const {
                ty: Term::Sorry,
                def: None,
            },
        );
        env
    }
}

impl GlobalEnv {
    pub fn add(&mut self, name: Name, c: Const) {
        self.consts.push((name, c));
    }

    pub fn get(&self, name: Name) -> Option<&Const> {
        self.consts
            .iter()
            .rev()
            .find_map(|(n, c)| if *n == name { Some(c) } else { None })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Name, &Const)> {
        self.consts.iter().map(|(n, c)| (*n, c))
    }
}

/// A checking view over the global environment.
#[derive(Debug, Clone)]
pub struct Env<'a> {
    pub globals: &'a GlobalEnv,
}

impl Env<'_> {
    /// Synthesises the type of `m`. `refs` is the stack of binder types of
    /// the enclosing binders; the top entry belongs to `Var(1)`.
    pub fn infer_type(&self, refs: &mut Vec<Term>, m: &Term) -> anyhow::Result<Term> {
        match m {
            Term::Const(inner) => {
                let Some(c) = self.globals.get(inner.name) else {
                    bail!("{} not defined", inner.name);
                };
                Ok(c.ty.clone())
            }
            Term::Var(inner) => {
                let index = inner.index;
                if index == 0 || index > refs.len() {
                    bail!("unbound reference \\{}", index);
                }
                // The stored type crossed `index` binders on its way out, so
                // every free variable inside it moves by that much.
                let mut ty = refs[refs.len() - index].clone();
                ty.shift(index);
                Ok(ty)
            }
            Term::Abs(inner) => {
                refs.push(inner.binder_type.clone());
                let target = self.infer_type(refs, &inner.body);
                refs.pop();
                Ok(mk_pi(inner.binder_type.clone(), target?))
            }
            Term::Pi(_) => Ok(mk_type()),
            Term::App(inner) => {
                let fun_ty = self.infer_type(refs, &inner.fun)?;
                self.apply_type(refs, fun_ty, &inner.arg)
            }
            Term::Sorry | Term::Error => bail!("no typing rule for {}", m),
        }
    }

    /// The type of an application, given the type of its function part.
    fn apply_type(&self, refs: &mut Vec<Term>, fun_ty: Term, arg: &Term) -> anyhow::Result<Term> {
        match fun_ty {
            Term::Pi(inner) => {
                self.check_type(refs, arg, &inner.binder_type)?;
                let TermPi {
                    binder_type: _,
                    body,
                } = Arc::unwrap_or_clone(inner);
                let mut target = body;
                target.subst(arg, 1);
                target.normalize();
                Ok(target)
            }
            Term::Sorry => Ok(arg.clone()),
            _ => bail!("not a function type: {}", fun_ty),
        }
    }

    /// Membership: the synthesised type must equal the target up to
    /// normalisation. Definitional equality beyond that is out of scope.
    pub fn check_type(&self, refs: &mut Vec<Term>, m: &Term, target: &Term) -> anyhow::Result<()> {
        let inferred = self.infer_type(refs, m)?;
        let mut lhs = inferred.clone();
        lhs.normalize();
        let mut rhs = target.clone();
        rhs.normalize();
        if lhs != rhs {
            bail!(
                "Type mismatch: {} has type {}, which is not a member of {}",
                m,
                inferred,
                target
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(value: &str) -> Name {
        Name::intern(value).expect("valid name")
    }

    fn cnst(value: &str) -> Term {
        mk_const(name(value))
    }

    struct EnvFixture {
        globals: GlobalEnv,
    }

    impl EnvFixture {
        fn new() -> Self {
            Self {
                globals: GlobalEnv::default(),
            }
        }

        fn with_axiom(mut self, value: &str, ty: Term) -> Self {
            self.globals.add(name(value), Const { ty, def: None });
            self
        }

        fn env(&self) -> Env<'_> {
            Env {
                globals: &self.globals,
            }
        }
    }

    /// (T : Type) => (x : T) => x
    fn identity_fn() -> Term {
        mk_abs(mk_type(), mk_abs(mk_var(1), mk_var(1)))
    }

    /// (T : Type) -> T -> T
    fn identity_ty() -> Term {
        mk_pi(mk_type(), mk_pi(mk_var(1), mk_var(2)))
    }

    #[test]
    fn shift_composes() {
        let base = mk_app(mk_abs(cnst("A"), mk_app(mk_var(1), mk_var(3))), mk_var(2));
        let mut twice = base.clone();
        twice.shift(2);
        twice.shift(3);
        let mut once = base;
        once.shift(5);
        assert_eq!(twice, once);
    }

    #[test]
    fn shift_spares_bound_references() {
        let mut closed = mk_abs(cnst("A"), mk_var(1));
        let original = closed.clone();
        closed.shift(4);
        assert_eq!(closed, original);

        let mut free = mk_var(1);
        free.shift(4);
        assert_eq!(free, mk_var(5));
    }

    #[test]
    fn subst_contracts_outer_references() {
        // tail is scoped under two binders, value under one
        let mut tail = mk_app(mk_var(1), mk_var(2));
        tail.subst(&mk_var(1), 1);
        assert_eq!(tail, mk_app(mk_var(1), mk_var(1)));
        assert!(tail.is_closed_under(1));
    }

    #[test]
    fn subst_lifts_value_under_binders() {
        // (A => (B => \2)) applied to a free reference: the reference must
        // still point at the same outer binder once inside the new lambda.
        let mut m = mk_app(mk_abs(cnst("A"), mk_abs(cnst("B"), mk_var(2))), mk_var(1));
        m.normalize();
        assert_eq!(m, mk_abs(cnst("B"), mk_var(2)));
    }

    #[test]
    fn normalize_beta_reduces() {
        let mut m = mk_app(mk_abs(cnst("T"), mk_var(1)), cnst("a"));
        m.normalize();
        assert_eq!(m, cnst("a"));
    }

    #[test]
    fn normalize_reaches_under_binders() {
        let mut m = mk_abs(cnst("T"), mk_app(mk_abs(cnst("U"), mk_var(1)), cnst("a")));
        m.normalize();
        assert_eq!(m, mk_abs(cnst("T"), cnst("a")));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut m = mk_app(
            identity_fn(),
            mk_app(mk_abs(mk_type(), mk_var(1)), cnst("Nat")),
        );
        m.normalize();
        let once = m.clone();
        m.normalize();
        assert_eq!(m, once);
    }

    #[test]
    fn normalize_collapses_sorry_application() {
        let mut m = mk_app(mk_const(Name::sorry()), cnst("Nat"));
        m.normalize();
        assert_eq!(m, cnst("Nat"));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(mk_var(1), mk_var(1));
        assert_ne!(mk_var(1), mk_var(2));
        assert_ne!(cnst("a"), cnst("b"));
        assert_ne!(
            mk_abs(cnst("T"), mk_var(1)),
            mk_pi(cnst("T"), mk_var(1)),
        );
    }

    #[test]
    fn display_uses_backslash_indices() {
        assert_eq!(identity_ty().to_string(), "(Type -> (\\1 -> \\2))");
        assert_eq!(identity_fn().to_string(), "(Type => (\\1 => \\1))");
    }

    #[test]
    fn infer_abstraction_builds_pi() {
        let fixture = EnvFixture::new();
        let env = fixture.env();
        let inferred = env
            .infer_type(&mut vec![], &identity_fn())
            .expect("identity is well-typed");
        assert_eq!(inferred, identity_ty());
    }

    #[test]
    fn infer_dependent_application() {
        let fixture = EnvFixture::new()
            .with_axiom("Nat", mk_type())
            .with_axiom("zero", cnst("Nat"));
        let env = fixture.env();
        let m = mk_app(mk_app(identity_fn(), cnst("Nat")), cnst("zero"));
        let inferred = env.infer_type(&mut vec![], &m).expect("application types");
        assert_eq!(inferred, cnst("Nat"));
    }

    #[test]
    fn axioms_synthesise_their_declared_type() {
        let fixture = EnvFixture::new().with_axiom("Nat", mk_type());
        let env = fixture.env();
        let inferred = env
            .infer_type(&mut vec![], &cnst("Nat"))
            .expect("axiom is in scope");
        assert_eq!(inferred, mk_type());
    }

    #[test]
    fn pi_has_type_type() {
        let fixture = EnvFixture::new().with_axiom("Nat", mk_type());
        let env = fixture.env();
        let inferred = env
            .infer_type(&mut vec![], &mk_pi(cnst("Nat"), cnst("Nat")))
            .expect("pi types");
        assert_eq!(inferred, mk_type());
    }

    #[test]
    fn undefined_constant_is_reported() {
        let fixture = EnvFixture::new();
        let env = fixture.env();
        let err = env
            .infer_type(&mut vec![], &cnst("missing"))
            .expect_err("undefined name");
        assert!(err.to_string().contains("missing not defined"));
    }

    #[test]
    fn argument_mismatch_is_reported() {
        let fixture = EnvFixture::new()
            .with_axiom("Nat", mk_type())
            .with_axiom("Bool", mk_type())
            .with_axiom("t", cnst("Bool"));
        let env = fixture.env();
        let f = mk_abs(cnst("Nat"), mk_var(1));
        let err = env
            .infer_type(&mut vec![], &mk_app(f, cnst("t")))
            .expect_err("Bool is not Nat");
        assert_eq!(
            err.to_string(),
            "Type mismatch: t has type Bool, which is not a member of Nat"
        );
    }

    #[test]
    fn applying_a_non_function_is_reported() {
        let fixture = EnvFixture::new().with_axiom("Nat", mk_type());
        let env = fixture.env();
        let err = env
            .infer_type(&mut vec![], &mk_app(cnst("Nat"), cnst("Nat")))
            .expect_err("Nat is not a function");
        assert!(err.to_string().contains("not a function type"));
    }

    #[test]
    fn membership_compares_normal_forms() {
        let fixture = EnvFixture::new()
            .with_axiom("Nat", mk_type())
            .with_axiom("zero", cnst("Nat"));
        let env = fixture.env();
        // declared type ((T : Type) => T) Nat normalises to Nat
        let target = mk_app(mk_abs(mk_type(), mk_var(1)), cnst("Nat"));
        env.check_type(&mut vec![], &cnst("zero"), &target)
            .expect("normalisation bridges the comparison");
    }

    #[test]
    fn sorry_application_takes_the_demanded_type() {
        let fixture = EnvFixture::new().with_axiom("Nat", mk_type());
        let env = fixture.env();
        let m = mk_app(mk_const(Name::sorry()), cnst("Nat"));
        env.check_type(&mut vec![], &m, &cnst("Nat"))
            .expect("SORRY inhabits anything");
    }

    #[test]
    fn duplicate_names_shadow() {
        let mut globals = GlobalEnv::default();
        globals.add(
            name("n"),
            Const {
                ty: cnst("A"),
                def: None,
            },
        );
        globals.add(
            name("n"),
            Const {
                ty: cnst("B"),
                def: None,
            },
        );
        assert_eq!(globals.get(name("n")).expect("present").ty, cnst("B"));
    }
}
