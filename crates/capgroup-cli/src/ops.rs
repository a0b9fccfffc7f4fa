//! Operations accepted by `capgroup exec`.

use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use capgroup_plugin_api::abi::{AsCIterator, CountCollect};
use capgroup_plugin_api::group::{KeyValueDumperRef, KeyValueStoreRef};
use capgroup_plugin_api::{FeaturesGroup, KeyValue, KeyValueDumper, KeyValueStore};

/// One step of an `exec` script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `KEY=VALUE`
    Write(String, usize),
    /// `KEY`
    Read(String),
    /// `dump`
    Dump,
    /// `ints N`
    Ints(i32),
    /// `count`
    Count,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Write(key, value) => write!(f, "{key}={value}"),
            Op::Read(key) => write!(f, "{key}"),
            Op::Dump => write!(f, "dump"),
            Op::Ints(n) => write!(f, "ints {n}"),
            Op::Count => write!(f, "count"),
        }
    }
}

/// Parse the argument list of `exec`. `ints` takes the following argument as its count.
pub fn parse_ops<S: AsRef<str>>(args: &[S]) -> Result<Vec<Op>> {
    let mut ops = Vec::new();
    let mut iter = args.iter().map(|s| s.as_ref());

    while let Some(arg) = iter.next() {
        let op = match arg {
            "dump" => Op::Dump,
            "count" => Op::Count,
            "ints" => {
                let n = iter.next().ok_or_else(|| anyhow!("`ints` needs a count"))?;
                let n = n
                    .parse::<i32>()
                    .with_context(|| format!("Invalid count for `ints`: {n:?}"))?;
                if n < 0 {
                    bail!("Count for `ints` must not be negative: {n}");
                }
                Op::Ints(n)
            }
            _ => match arg.split_once('=') {
                Some((key, value)) => {
                    if key.is_empty() {
                        bail!("Missing key in {arg:?}");
                    }
                    let value = value
                        .parse()
                        .with_context(|| format!("Invalid value in {arg:?}"))?;
                    Op::Write(key.to_string(), value)
                }
                None if arg.is_empty() => bail!("Empty operation"),
                None => Op::Read(arg.to_string()),
            },
        };
        ops.push(op);
    }

    Ok(ops)
}

/// Run `op` against `group`, printing results to stdout.
pub fn run_op(group: &mut FeaturesGroup<'_>, op: &Op) -> Result<()> {
    tracing::debug!("exec {}", op);
    match op {
        Op::Write(key, value) => {
            store(group)?.write_key_value(key, *value);
        }
        Op::Read(key) => {
            println!("{key} = {}", store(group)?.get_key_value(key));
        }
        Op::Dump => {
            print_pairs(&dumper(group)?);
        }
        Op::Ints(n) => {
            let mut squares = (0..*n).map(|i| i.wrapping_mul(i));
            dumper(group)?.print_ints(squares.as_citer());
        }
        Op::Count => {
            let mut count = CountCollect::new();
            dumper(group)?.dump_key_values(count.callback());
            println!("count = {}", count.count());
        }
    }
    Ok(())
}

/// Print every pair `obj` dumps.
pub fn print_pairs(obj: &impl KeyValueDumper) {
    let mut sink = |kv: KeyValue<'_>| {
        println!("{} : {}", kv.key(), kv.value());
        true
    };
    obj.dump_key_values((&mut sink).into());
}

fn store<'g, 'a>(group: &'g mut FeaturesGroup<'a>) -> Result<KeyValueStoreRef<'g, 'a>> {
    group
        .as_key_value_store()
        .ok_or_else(|| anyhow!("Plugin object does not implement KeyValueStore"))
}

fn dumper<'g, 'a>(group: &'g FeaturesGroup<'a>) -> Result<KeyValueDumperRef<'g, 'a>> {
    group
        .as_key_value_dumper()
        .ok_or_else(|| anyhow!("Plugin object does not implement KeyValueDumper"))
}
