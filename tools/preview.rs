/// Preview — play a dialogue script in the terminal.
///
/// Usage: preview <file.yarn> [--schema <file.ron|file.json>] [--start <node>] [--json]
///
/// During playback:
///   <enter>    continue past an npc line
///   <n>        pick choice n
///   state      show flag values
///   restart    start over
///   quit       exit

use dialogue_engine::core::parser::{load_script, ParseOptions};
use dialogue_engine::core::processor::ProcessedNode;
use dialogue_engine::core::runner::DialogueRunner;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let script_path = &args[1];
    let mut schema_path = None;
    let mut start = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--schema" if i + 1 < args.len() => {
                i += 1;
                schema_path = Some(args[i].clone());
            }
            "--start" if i + 1 < args.len() => {
                i += 1;
                start = Some(args[i].clone());
            }
            "--json" => json = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let tree = match load_script(Path::new(script_path), ParseOptions::default()) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("ERROR: Failed to load script: {}", e);
            process::exit(1);
        }
    };

    if json {
        match tree.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Loaded '{}' ({} nodes)", tree.title, tree.nodes.len());

    let mut builder = DialogueRunner::builder().with_tree(tree);
    if let Some(path) = schema_path {
        builder = builder.schema_file(path);
    }
    if let Some(id) = start {
        builder = builder.start_at(id);
    }
    let mut runner = match builder.build() {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut shown_warnings = 0;

    loop {
        let Some(node) = runner.current().cloned() else {
            println!("\n[end of dialogue]");
            print_state(&runner);
            break;
        };
        print_node(&node);

        for warning in &runner.warnings()[shown_warnings..] {
            println!("  ! {}", warning);
        }
        shown_warnings = runner.warnings().len();

        print!("> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }

        match line.trim() {
            "quit" | "exit" | "q" => break,
            "help" => print_help(),
            "state" => print_state(&runner),
            "restart" => {
                runner.restart();
                shown_warnings = 0;
            }
            "" if !node.is_decision => {
                if let Err(e) = runner.advance() {
                    println!("  {}", e);
                }
            }
            input => match input.parse::<usize>() {
                Ok(n) if n >= 1 => {
                    if let Err(e) = runner.choose(n - 1) {
                        println!("  {}", e);
                    }
                }
                _ => println!("  Unknown command: {}", input),
            },
        }
    }
}

fn print_node(node: &ProcessedNode) {
    let speaker = node.speaker.as_deref().unwrap_or("");
    if !node.content.is_empty() {
        for line in node.content.lines() {
            if speaker.is_empty() {
                println!("{}", line);
            } else {
                println!("{}: {}", speaker, line);
            }
        }
    }
    for (idx, choice) in node.choices.iter().enumerate() {
        println!("  {}. {}", idx + 1, choice.text);
    }
    if node.is_decision && node.choices.is_empty() {
        println!("  (no choices available)");
    }
}

fn print_state(runner: &DialogueRunner) {
    let store = runner.store();
    let mut vars: Vec<_> = store.variables().iter().collect();
    vars.sort_by(|a, b| a.0.cmp(b.0));
    for (id, value) in vars {
        println!("  ${} = {}", id, value);
    }
    let mut memory: Vec<_> = store.memory_flags().iter().collect();
    memory.sort();
    for id in memory {
        println!("  ${} (memory)", id);
    }
}

fn print_help() {
    println!("  <enter>   continue");
    println!("  <n>       pick choice n");
    println!("  state     show flag values");
    println!("  restart   start over");
    println!("  quit      exit");
}

fn print_usage() {
    println!("Usage: preview <file.yarn> [--schema <file.ron|file.json>] [--start <node>] [--json]");
}
