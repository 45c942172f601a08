use std::io::Read as _;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Compile a source unit from stdin and print the generated program to
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "nanocc", version, about)]
struct Cli {
  /// Trace compilation and prepend a symbol table dump to the output.
  #[arg(short, long)]
  debug: bool,
}

fn init_tracing(debug: bool) {
  let filter = if debug {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.debug);

  let mut source = String::new();
  if let Err(err) = std::io::stdin().read_to_string(&mut source) {
    eprintln!("error: cannot read stdin: {err}");
    process::exit(1);
  }

  match nanocc::compile_with_symbols(&source) {
    Ok((output, symbols)) => {
      if cli.debug {
        println!("SYMBOL TABLE");
        println!("============");
        for (id, sym) in symbols.iter() {
          println!(
            "{}\t\t0x{:08x}\t\t{}",
            symbols.qualified_name(id),
            sym.kind.addr() as u32,
            sym.kind.tag()
          );
        }
        println!();
      }
      print!("{output}");
    }
    Err(err) => {
      eprintln!("error: {err}");
      process::exit(1);
    }
  }
}
