/// Tavern example — plays a small hub-and-spoke dialogue end to end.
///
/// The traveler orders an ale, asks about rumors, returns to the bar hub
/// and leaves. Afterwards the persistent flags are printed, the script is
/// linted, and a node is deleted to show how transitions into it become
/// dangling.
///
/// Run with: cargo run --example tavern

use dialogue_engine::core::integrity::{connect, create_node, delete_node, NodeType};
use dialogue_engine::core::lint::lint;
use dialogue_engine::core::parser::{load_script, ParseOptions};
use dialogue_engine::core::runner::DialogueRunner;
use dialogue_engine::core::serializer::serialize;
use dialogue_engine::schema::flag::FlagSchema;
use std::path::Path;

const SCRIPT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/data/tavern.yarn");
const FLAGS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/data/tavern_flags.ron");

fn main() {
    env_logger::init();

    // --- Load script and flag schema ---
    let tree = load_script(Path::new(SCRIPT), ParseOptions::default()).expect("Failed to load tavern script");
    let schema = FlagSchema::load_from_ron(Path::new(FLAGS)).expect("Failed to load tavern flags");

    println!("=== {} ===", tree.title);
    println!("{} nodes, {} flags\n", tree.nodes.len(), schema.len());

    let mut runner = DialogueRunner::builder()
        .with_tree(tree.clone())
        .with_schema(schema.clone())
        .build()
        .expect("Failed to build runner");

    // --- Scripted playthrough: ale, rumors, leave ---
    let picks = ["Order an ale", "Ask about rumors", "Leave"];
    let mut pick = picks.iter();

    while let Some(node) = runner.current().cloned() {
        let speaker = node.speaker.as_deref().unwrap_or("Narrator");
        for line in node.content.lines() {
            println!("{}: {}", speaker, line);
        }

        if node.is_decision {
            for (idx, choice) in node.choices.iter().enumerate() {
                println!("    {}. {}", idx + 1, choice.text);
            }
            let wanted = pick.next().copied().unwrap_or("Leave");
            let index = node
                .choices
                .iter()
                .position(|c| c.text == wanted)
                .unwrap_or(node.choices.len() - 1);
            println!("  > {}", node.choices[index].text);
            runner.choose(index).expect("choice should be valid");
        } else {
            runner.advance().expect("npc node should advance");
        }
    }

    println!("\n--- Game state ---");
    let mut state: Vec<_> = runner.game_state().into_iter().collect();
    state.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, value) in state {
        println!("  {} = {}", id, value);
    }

    // --- Editing: add an epilogue, then remove the rumors node ---
    let mut edited = tree;
    let epilogue = create_node(&mut edited, NodeType::Npc);
    connect(&mut edited, "ale", &epilogue).expect("ale is an npc node");
    delete_node(&mut edited, "rumors").expect("rumors is not the start node");

    println!("\n--- Lint after edits ---");
    for issue in lint(&edited, &schema) {
        println!("  {}", issue);
    }

    println!("\n--- Edited script ---\n{}", serialize(&edited));
}
