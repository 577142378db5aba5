// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("pkgtxn")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Package transaction core: locking, provenance and cache maintenance")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (JSON); built-in defaults when omitted"),
        )
        .subcommand(Command::new("init").about("Create the provenance database"))
        .subcommand(
            Command::new("provenance")
                .about("List recorded install provenance")
                .arg(Arg::new("name").help("Only show records for this package name"))
                .arg(
                    Arg::new("reason")
                        .short('r')
                        .long("reason")
                        .value_parser(["user", "dep", "unknown"])
                        .help("Only show records with this reason"),
                ),
        )
        .subcommand(Command::new("clean").about("Remove cached solver indexes"))
        .subcommand(Command::new("groups").about("List package groups from repository comps data"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgtxn.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
