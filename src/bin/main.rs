use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wordpredict::lmid::ModelClass;
use wordpredict::{EngineConfig, PredictOptions, PredictResult, WPEngine};

const SUGGESTIONS: usize = 5;

fn config_path() -> PathBuf {
    if let Some(path) = std::env::args().nth(1) {
        return PathBuf::from(path);
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("wordpredict");
    path.push("config.json");
    path
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let path = config_path();
    let config = match EngineConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERROR] {e}, using defaults");
            EngineConfig::default()
        }
    };

    let mut engine = WPEngine::new(config);
    engine.set_model_ids(&["lm:system:en"], &["lm:user:en"], &["lm:mem:scratch"]);
    engine.load_models();
    engine.start_autosave();

    let mut context = String::new();
    let mut status = String::from("Type text to predict, ':help' for commands.");

    loop {
        let suggestions = engine.predict_scored(&context, Some(SUGGESTIONS), PredictOptions::NONE);
        print_ui(&context, &suggestions, &status);

        let mut input = String::new();
        match stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = input.trim_end_matches(['\n', '\r']);
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        status = match command {
            ":quit" | ":q" => break,
            ":learn" => {
                engine.learn_text(rest, true);
                context.clear();
                format!("Learned '{rest}'.")
            }
            ":scratch" => {
                engine.learn_scratch_text(rest);
                format!("Learned '{rest}' into the scratch model.")
            }
            ":clear" => {
                engine.clear_scratch_models();
                "Scratch model cleared.".to_string()
            }
            ":remove" => {
                let words: Vec<&str> = rest.split_whitespace().collect();
                let removed = engine.remove_context(&words);
                let total: usize = removed.values().map(|changes| changes.len()).sum();
                format!("Removed {total} n-grams.")
            }
            ":save" => {
                engine.save_models("user request", false);
                "Models saved.".to_string()
            }
            ":models" => {
                let system = engine.get_model_names(ModelClass::System);
                let user = engine.get_model_names(ModelClass::User);
                format!("system: {system:?}  user: {user:?}")
            }
            ":help" => {
                ":learn <text>  :scratch <text>  :clear  :remove <words>  :save  :models  :quit"
                    .to_string()
            }
            s if s.starts_with(':') && s[1..].parse::<usize>().is_ok() => {
                // accept suggestion n
                let n = s[1..].parse::<usize>().unwrap_or(0);
                match n.checked_sub(1).and_then(|i| suggestions.get(i)) {
                    Some(choice) => {
                        let fragment = engine.get_last_context_fragment(&context);
                        context.truncate(context.len() - fragment.len());
                        context.push_str(&choice.word);
                        context.push(' ');
                        format!("Inserted '{}'.", choice.word)
                    }
                    None => format!("No suggestion {n}."),
                }
            }
            _ => {
                context.push_str(line);
                String::new()
            }
        };
    }

    engine.stop_autosave();
    println!("\nSaving models...");
    engine.save_models("shell exit", false);
}

fn print_ui(context: &str, suggestions: &[PredictResult], status: &str) {
    let mut out = stdout();
    let _ = execute!(out, Clear(ClearType::All), MoveTo(0, 0));
    println!("Word prediction shell");
    println!("---------------------------------------------------------------");
    println!("Text is appended to the context; select with ':1', ':2'.");
    println!("':learn <text>' learns, ':quit' saves and exits.\n");

    println!("Context: [{context}]");
    if suggestions.is_empty() {
        println!("\nNo suggestions.");
    } else {
        println!("\nSuggestions:");
        for (i, result) in suggestions.iter().enumerate() {
            println!("  :{}: {} (p = {:.4})", i + 1, result.word, result.p);
        }
    }
    if !status.is_empty() {
        println!("\n{status}");
    }
    print!("\n> ");
    let _ = out.flush();
}
