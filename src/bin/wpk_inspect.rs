//! `wpk-inspect`: a minimal demonstration CLI built directly on
//! `Package::{open, read_file, read_dir}` — proof that the library's
//! stable entry points are sufficient for a front-end, not a
//! reimplementation of a packer/extractor (§5).

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use wpk::{OpenOptions, Package};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one file's bytes to stdout.
    Cat(CatArgs),
    /// List the immediate children of a directory (default: root).
    Ls(LsArgs),
    /// Print the package's root entry count.
    Info(InfoArgs),
}

#[derive(Args)]
struct CatArgs {
    package: PathBuf,
    path: String,
}

#[derive(Args)]
struct LsArgs {
    package: PathBuf,
    #[arg(default_value = "")]
    dir: String,
}

#[derive(Args)]
struct InfoArgs {
    package: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Cat(args) => cat(args),
        Commands::Ls(args) => ls(args),
        Commands::Info(args) => info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("wpk-inspect: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cat(args: CatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pkg = Package::open(&args.package, OpenOptions::default())?;
    let bytes = pkg.read_file(&args.path)?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}

fn ls(args: LsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pkg = Package::open(&args.package, OpenOptions::default())?;
    for entry in pkg.read_dir(&args.dir)? {
        if entry.isdir {
            println!("{}/", entry.name);
        } else {
            println!("{}\t{}", entry.name, entry.size.unwrap_or(0));
        }
    }
    Ok(())
}

fn info(args: InfoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pkg = Package::open(&args.package, OpenOptions::default())?;
    let root = pkg.read_dir("")?;
    println!("entries (root): {}", root.len());
    if let Ok(info) = pkg.stat("") {
        println!("root is directory: {}", info.isdir);
    }
    Ok(())
}
