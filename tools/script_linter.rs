/// Script Linter — checks dialogue scripts for structural problems.
///
/// Usage: script_linter <file.yarn|dir> [--schema <file.ron|file.json>] [--strict]

use dialogue_engine::core::lint::lint;
use dialogue_engine::core::parser::{load_script, ParseOptions};
use dialogue_engine::schema::flag::FlagSchema;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: script_linter <file.yarn|dir> [--schema <file.ron|file.json>] [--strict]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut schema_path = None;
    let mut options = ParseOptions::default();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--schema" if i + 1 < args.len() => {
                i += 1;
                schema_path = Some(args[i].clone());
            }
            "--strict" => options.strict = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let schema = match schema_path {
        Some(ref path) => match FlagSchema::load(Path::new(path)) {
            Ok(schema) => {
                println!("Loaded {} flag definitions", schema.len());
                schema
            }
            Err(e) => {
                eprintln!("ERROR: Failed to load schema: {}", e);
                process::exit(1);
            }
        },
        None => FlagSchema::new(),
    };

    let mut scripts = Vec::new();
    if target.is_file() {
        scripts.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_scripts(target, &mut scripts);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    }
    scripts.sort();

    println!("\n=== Script Lint Report ===\n");

    let mut error_count = 0;
    let mut warning_count = 0;

    for path in &scripts {
        let tree = match load_script(path, options) {
            Ok(tree) => tree,
            Err(e) => {
                println!("ERROR: {}: {}", path.display(), e);
                error_count += 1;
                continue;
            }
        };

        let issues = lint(&tree, &schema);
        println!("{} ({} nodes)", path.display(), tree.nodes.len());
        for issue in &issues {
            if issue.is_error() {
                println!("  ERROR: {}", issue);
                error_count += 1;
            } else {
                println!("  WARNING: {}", issue);
                warning_count += 1;
            }
        }
    }

    if error_count == 0 && warning_count == 0 {
        println!("\nAll checks passed!");
    }

    println!(
        "\nSummary: {} scripts, {} errors, {} warnings",
        scripts.len(),
        error_count,
        warning_count
    );

    if error_count > 0 {
        process::exit(1);
    }
}

fn collect_scripts(dir: &Path, out: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_scripts(&path, out);
            } else if matches!(path.extension().and_then(|s| s.to_str()), Some("yarn") | Some("txt")) {
                out.push(path);
            }
        }
    }
}
