//! CLI command modules.

pub mod recv;
pub mod send;

use anyhow::{Context, Result};

/// Value following flag `args[*i]`, advancing `i` past it.
fn flag_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}
