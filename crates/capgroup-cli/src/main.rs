//! Command-line host for capgroup plugins.

mod ops;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use capgroup_plugin_api::{
    root_layout, KeyValueStore, LoadError, LoadedPlugin, LoaderConfig, MainFeature, PluginLoader,
};
use clap::{ArgAction, Parser, Subcommand};

const DEFAULT_PLUGIN: &str = "capgroup_kvstore";

/// capgroup - load capability-object plugins and call into them.
#[derive(Parser, Debug)]
#[command(name = "capgroup")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Extra plugin directory, searched before all others. Repeatable.
    #[arg(long = "plugin-dir", global = true, value_name = "DIR")]
    plugin_dirs: Vec<PathBuf>,

    /// Loader configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Plugin name or path to the plugin library.
    #[arg(short, long, global = true, default_value = DEFAULT_PLUGIN)]
    plugin: String,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session: use a borrowed view, then the owned object.
    Demo,
    /// Show the layout fingerprint and the capabilities of the plugin.
    Info,
    /// Run operations against the owned object.
    ///
    /// KEY=VALUE writes, KEY reads, `dump` prints all pairs, `ints N` prints the squares below
    /// N, `count` prints the number of pairs.
    Exec {
        #[arg(required = true, value_name = "OP")]
        ops: Vec<String>,
    },
    /// Print the host's interface layout.
    Layout {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<LoadError>() {
            Some(load) => {
                eprintln!("Error (code {}): {:#}", load.code(), e);
                ExitCode::from(u8::try_from(load.code()).unwrap_or(1))
            }
            None => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // Check if JSON logging is requested
    let json_logging = std::env::var("CAPGROUP_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
            .init();
    }
}

fn run(args: Args) -> Result<()> {
    match &args.command {
        Command::Layout { json } => print_layout(*json),
        Command::Demo => run_demo(&loader(&args)?, &args.plugin),
        Command::Info => show_info(&loader(&args)?, &args.plugin),
        Command::Exec { ops } => {
            // Parse first so typos never load the plugin.
            let ops = ops::parse_ops(ops.as_slice())?;
            run_exec(&loader(&args)?, &args.plugin, &ops)
        }
    }
}

/// Config file (explicit or default location), then `CAPGROUP_PLUGIN_DIR`, then `--plugin-dir`.
fn loader(args: &Args) -> Result<PluginLoader> {
    let base = match &args.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match LoaderConfig::default_config_file().filter(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!("Using config file {}", path.display());
                LoaderConfig::from_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?
            }
            None => LoaderConfig::default(),
        },
    };

    let config = args
        .plugin_dirs
        .iter()
        .rev()
        .fold(base.apply_env(), |config, dir| config.with_search_path(dir.clone()));
    tracing::debug!("Plugin search paths: {:?}", config.search_paths);

    Ok(PluginLoader::new(config))
}

fn load(loader: &PluginLoader, name: &str) -> Result<LoadedPlugin> {
    loader
        .load(name)
        .with_context(|| format!("Failed to load plugin {name}"))
}

fn run_demo(loader: &PluginLoader, name: &str) -> Result<()> {
    let LoadedPlugin { path, mut root } = load(loader, name)?;
    println!("Loaded {}", path.display());

    let stdin = io::stdin();
    let mut input = stdin.lock();

    {
        let mut borrowed = root.borrow_features();
        borrowed.print_self();

        if let Some(mut store) = borrowed.as_key_value_store() {
            println!("Using borrowed kvstore:");
            use_kvstore(&mut store, &mut input)?;
        }

        if let Some(dumper) = borrowed.as_key_value_dumper() {
            println!("Dumping borrowed kvstore:");
            ops::print_pairs(&dumper);
        }

        println!("Borrowed done.");
    }

    {
        let mut owned = root.into_features();
        owned.print_self();

        if let Some(mut store) = owned.as_key_value_store() {
            println!("Using owned kvstore:");
            use_kvstore(&mut store, &mut input)?;
        }

        if let Some(mut copy) = owned.try_clone() {
            println!("Cloned owned kvstore.");
            if let Some(both) = copy.as_store_dumper() {
                println!("Dumping cloned kvstore:");
                ops::print_pairs(&both);
                both.print_self();
            }
        }

        println!("Owned done.");
    }

    println!("Quitting");
    Ok(())
}

fn use_kvstore(obj: &mut impl KeyValueStore, input: &mut impl BufRead) -> Result<()> {
    let key = prompt(input, "Enter key:")?;
    println!("Cur val: {}", obj.get_key_value(&key));

    let value = prompt(input, "Enter value:")?;
    let value = value
        .parse::<usize>()
        .with_context(|| format!("Invalid value {value:?}"))?;
    obj.write_key_value(&key, value);

    Ok(())
}

fn prompt(input: &mut impl BufRead, message: &str) -> Result<String> {
    println!("{message}");
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("Unexpected end of input");
    }
    Ok(line.trim().to_string())
}

fn show_info(loader: &PluginLoader, name: &str) -> Result<()> {
    let LoadedPlugin { path, mut root } = load(loader, name)?;
    let layout = root_layout();

    println!("Plugin Information");
    println!("==================\n");
    println!("Path:            {}", path.display());
    println!("ABI version:     {}", layout.abi_version);
    println!("Interface:       {}", layout.crate_version());
    println!("Fingerprint:     {:#018x}", layout.fingerprint);

    let borrowed = root.borrow_features().capabilities();
    println!("Borrowed:        {}", borrowed);

    let owned = root.into_features();
    println!("Owned:           {}", owned.capabilities());
    println!("Entries:         {}", owned.describe());

    Ok(())
}

fn run_exec(loader: &PluginLoader, name: &str, ops: &[ops::Op]) -> Result<()> {
    let LoadedPlugin { root, .. } = load(loader, name)?;
    let mut owned = root.into_features();

    for op in ops {
        ops::run_op(&mut owned, op).with_context(|| format!("Operation `{op}` failed"))?;
    }

    Ok(())
}

fn print_layout(json: bool) -> Result<()> {
    let layout = root_layout();

    if json {
        let entries: Vec<_> = layout
            .entries()
            .iter()
            .map(|e| serde_json::json!({ "name": e.name(), "size": e.size, "align": e.align }))
            .collect();
        let doc = serde_json::json!({
            "abi_version": layout.abi_version,
            "crate_version": layout.crate_version(),
            "fingerprint": format!("{:#018x}", layout.fingerprint),
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("ABI version:     {}", layout.abi_version);
    println!("Interface:       {}", layout.crate_version());
    println!("Fingerprint:     {:#018x}", layout.fingerprint);
    println!();
    println!("{:<48} {:>6} {:>6}", "TYPE", "SIZE", "ALIGN");
    for entry in layout.entries() {
        println!("{:<48} {:>6} {:>6}", entry.name(), entry.size, entry.align);
    }

    Ok(())
}
