use std::fs;
use std::sync::Arc;

use anyhow::Context;

use sutra::File;

const USAGE: &str = "\
Usage: sutra [FILE]

Check a file of declarations and write the final environment to dump.json.
FILE defaults to ./practice.

Options:
  -h, --help     print this help
  -v, --version  print version
";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut input = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{}", USAGE);
                return Ok(());
            }
            "-v" | "--version" => {
                println!("sutra {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            _ if input.is_none() && !arg.starts_with('-') => input = Some(arg),
            _ => anyhow::bail!("unexpected argument '{}'\n{}", arg, USAGE),
        }
    }
    let path = input.unwrap_or_else(|| "practice".to_owned());

    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read `{}`", path))?;
    let file = Arc::new(File::new(path, contents));

    let env = sutra::process(file)?;

    let dumped = sutra::dump_env(&env).context("failed to serialise the environment")?;
    fs::write("dump.json", dumped).context("failed to write `dump.json`")?;
    Ok(())
}
