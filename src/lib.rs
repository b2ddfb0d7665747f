use std::sync::Arc;

use anyhow::Context;

use cmd::Eval;
use lex::Lex;
use parse::Parser;
use tt::GlobalEnv;

pub mod cmd;
pub mod dump;
pub mod elab;
pub mod lex;
pub mod parse;
pub mod tt;

pub use dump::dump_env;
pub use lex::File;

/// Checks every declaration of `file` in order, halting on the first
/// failure, and returns the final global environment.
pub fn process(file: Arc<File>) -> anyhow::Result<GlobalEnv> {
    let mut eval = Eval::default();

    let mut lex = Lex::new(file);

    loop {
        let decl = Parser::new(&mut lex).decl_opt().context("parse error")?;
        let Some(decl) = decl else {
            return Ok(eval.env);
        };
        eval.run_decl(decl).context("command error")?;
    }
}
