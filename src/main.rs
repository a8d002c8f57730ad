use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use melange::{compile_document, compile_function_names, load_schema_document, CompilerOptions};

/// Melange - compile a ReBAC schema into PL/pgSQL permission functions
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a schema document to SQL
    Compile {
        /// Schema document (.yaml, .yml or .json)
        schema: PathBuf,

        /// Write one file per catalogue into this directory instead of
        /// printing a single script to stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Fail when a relation's list functions cannot be emitted
        #[arg(long)]
        strict: bool,

        /// Skip the _no_wildcard check variants
        #[arg(long)]
        skip_no_wildcard: bool,
    },
    /// Print every function name compilation would emit
    Functions {
        /// Schema document (.yaml, .yml or .json)
        schema: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compile {
            schema,
            out,
            strict,
            skip_no_wildcard,
        } => {
            let document = load_schema_document(&schema)
                .with_context(|| format!("loading schema document {}", schema.display()))?;
            let options = CompilerOptions::default()
                .strict(strict)
                .emit_no_wildcard(!skip_no_wildcard);
            let generated = compile_document(document, &options)?;

            for (object_type, relation, reason) in &generated.summary.skipped_list_relations {
                eprintln!("warning: skipped listing for {}.{}: {}", object_type, relation, reason);
            }

            match out {
                Some(dir) => {
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("creating output directory {}", dir.display()))?;
                    let catalogues = [
                        ("check_functions.sql", generated.check_functions.join("\n")),
                        (
                            "check_functions_no_wildcard.sql",
                            generated.no_wildcard_check_functions.join("\n"),
                        ),
                        (
                            "list_objects_functions.sql",
                            generated.list_object_functions.join("\n"),
                        ),
                        (
                            "list_subjects_functions.sql",
                            generated.list_subject_functions.join("\n"),
                        ),
                        (
                            "dispatchers.sql",
                            [
                                generated.check_dispatcher.clone(),
                                generated.no_wildcard_check_dispatcher.clone(),
                                generated.list_objects_dispatcher.clone(),
                                generated.list_subjects_dispatcher.clone(),
                            ]
                            .join("\n"),
                        ),
                    ];
                    for (file_name, contents) in catalogues {
                        if contents.is_empty() {
                            continue;
                        }
                        let path = dir.join(file_name);
                        fs::write(&path, contents)
                            .with_context(|| format!("writing {}", path.display()))?;
                        println!("wrote {}", path.display());
                    }
                }
                None => {
                    print!("{}", generated.to_script());
                }
            }
            Ok(())
        }
        Command::Functions { schema } => {
            let document = load_schema_document(&schema)
                .with_context(|| format!("loading schema document {}", schema.display()))?;
            for name in compile_function_names(document)? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}
