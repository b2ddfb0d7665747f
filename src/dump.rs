//! Machine-readable dump of the final global environment.
//!
//! The schema is advisory: each declared name maps to its type and, for
//! definitions, its (normalised) body, with every expression serialised by
//! tag and fields. Written as `dump.json` after a successful run so proofs
//! can be inspected by other tooling.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::tt::{GlobalEnv, Term};

/// JSON rendition of a kernel expression, tagged by constructor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tag")]
pub enum ExprDump {
    /// 1-based reference to an enclosing binder.
    Ref { index: usize },
    Lambda {
        head: Box<ExprDump>,
        body: Box<ExprDump>,
    },
    Pi {
        head: Box<ExprDump>,
        body: Box<ExprDump>,
    },
    App {
        fun: Box<ExprDump>,
        arg: Box<ExprDump>,
    },
    Ident { name: String },
    Sorry,
    Error,
}

impl From<&Term> for ExprDump {
    fn from(m: &Term) -> Self {
        match m {
            Term::Var(inner) => ExprDump::Ref { index: inner.index },
            Term::Abs(inner) => ExprDump::Lambda {
                head: Box::new((&inner.binder_type).into()),
                body: Box::new((&inner.body).into()),
            },
            Term::Pi(inner) => ExprDump::Pi {
                head: Box::new((&inner.binder_type).into()),
                body: Box::new((&inner.body).into()),
            },
            Term::App(inner) => ExprDump::App {
                fun: Box::new((&inner.fun).into()),
                arg: Box::new((&inner.arg).into()),
            },
            Term::Const(inner) => ExprDump::Ident {
                name: inner.name.to_string(),
            },
            Term::Sorry => ExprDump::Sorry,
            Term::Error => ExprDump::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstDump {
    pub ty: ExprDump,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub def: Option<ExprDump>,
}

/// The whole environment, in declaration order (seeded names included).
#[derive(Debug, Clone)]
pub struct EnvDump {
    decls: Vec<(String, ConstDump)>,
}

impl From<&GlobalEnv> for EnvDump {
    fn from(env: &GlobalEnv) -> Self {
        let decls = env
            .iter()
            .map(|(name, c)| {
                let dump = ConstDump {
                    ty: (&c.ty).into(),
                    def: c.def.as_ref().map(Into::into),
                };
                (name.to_string(), dump)
            })
            .collect();
        Self { decls }
    }
}

impl Serialize for EnvDump {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.decls.len()))?;
        for (name, decl) in &self.decls {
            map.serialize_entry(name, decl)?;
        }
        map.end()
    }
}

pub fn dump_env(env: &GlobalEnv) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&EnvDump::from(env))
}
