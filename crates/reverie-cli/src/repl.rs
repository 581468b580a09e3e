//! REPL – Read-Eval-Print Loop for the Reverie interactive shell.
//!
//! Supported slash-commands:
//!   /help                      – show this list
//!   /remember <imp> <text>     – append an observation with importance
//!   /recall <query>            – weighted retrieval against the query
//!   /recent [k]                – most recent k memories (default 5)
//!   /important [k]             – most important k memories (default 5)
//!   /provider [name]           – show or switch the active provider
//!   /stats                     – embedding service statistics
//!   /settings                  – interactively edit `~/.reverie/config.toml`
//!   /quit | /exit              – gracefully exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reverie_embed::EmbeddingService;
use reverie_memory::MemoryRetriever;
use reverie_types::ProviderKind;

use crate::config::{self, Config};

/// How many results `/recall`, `/recent` and `/important` show by default.
const DEFAULT_K: usize = 5;

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub async fn run(
    mut retriever: MemoryRetriever,
    service: Arc<EmbeddingService>,
    cfg: Config,
    shutdown: Arc<AtomicBool>,
) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "reverie>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (input, ""),
        };

        match command {
            "/help" => cmd_help(),
            "/remember" => cmd_remember(&mut retriever, rest),
            "/recall" => cmd_recall(&mut retriever, &cfg, rest).await,
            "/recent" => cmd_recent(&retriever, rest),
            "/important" => cmd_important(&retriever, rest),
            "/provider" => cmd_provider(&service, rest),
            "/stats" => cmd_stats(&service),
            "/settings" => cmd_settings(),
            "/quit" | "/exit" => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Reverie Commands".bold().underline());
    println!("  {}  – append an observation",          "/remember <imp> <text>".bold().cyan());
    println!("  {}         – weighted retrieval",      "/recall <query>".bold().cyan());
    println!("  {}             – most recent memories", "/recent [k]".bold().cyan());
    println!("  {}          – most important memories", "/important [k]".bold().cyan());
    println!("  {}        – show / switch provider",   "/provider [name]".bold().cyan());
    println!("  {}                  – service statistics", "/stats".bold().cyan());
    println!("  {}               – edit ~/.reverie/config.toml", "/settings".bold().cyan());
    println!("  {}            – exit the CLI",          "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_remember(retriever: &mut MemoryRetriever, rest: &str) {
    match parse_remember(rest) {
        Ok((importance, text)) => {
            let memory = retriever.observe(text, importance);
            println!(
                "  {} memory {} (importance {})",
                "✓ remembered".green(),
                memory.id.to_string().dimmed(),
                importance
            );
        }
        Err(reason) => {
            println!("{} {}", "Usage: /remember <importance> <text>".red(), reason.dimmed());
        }
    }
}

async fn cmd_recall(retriever: &mut MemoryRetriever, cfg: &Config, query: &str) {
    if query.is_empty() {
        println!("{}", "Usage: /recall <query>".red());
        return;
    }

    // Backfill first so newly-appended memories take part in relevance.
    if let Err(e) = retriever.generate_missing_embeddings().await {
        println!("{}: {}", "Backfill failed".red(), e);
        return;
    }

    match retriever.retrieve_memories(query, DEFAULT_K, cfg.weights).await {
        Ok(hits) if hits.is_empty() => println!("  (no memories yet)"),
        Ok(hits) => {
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "  {}. [{}] {} {}",
                    rank + 1,
                    format!("score {:.3} sim {:+.3}", hit.retrieval_score, hit.similarity).yellow(),
                    hit.memory.content.bold(),
                    format!("(imp {:.1})", hit.memory.importance).dimmed()
                );
            }
        }
        Err(e) => println!("{}: {}", "Retrieval failed".red(), e),
    }
}

fn cmd_recent(retriever: &MemoryRetriever, rest: &str) {
    let k = parse_count(rest, DEFAULT_K);
    let memories = retriever.get_recent_memories(k);
    if memories.is_empty() {
        println!("  (no memories yet)");
        return;
    }
    for memory in memories {
        println!(
            "  {} {} {}",
            memory.created_at.format("%H:%M:%S").to_string().dimmed(),
            memory.content,
            format!("(imp {:.1})", memory.importance).dimmed()
        );
    }
}

fn cmd_important(retriever: &MemoryRetriever, rest: &str) {
    let k = parse_count(rest, DEFAULT_K);
    let memories = retriever.get_important_memories(k);
    if memories.is_empty() {
        println!("  (no memories yet)");
        return;
    }
    for memory in memories {
        println!(
            "  {} {}",
            format!("{:>5.1}", memory.importance).yellow(),
            memory.content
        );
    }
}

fn cmd_provider(service: &Arc<EmbeddingService>, rest: &str) {
    if rest.is_empty() {
        println!(
            "  Active provider : {} (model {})",
            service.current_provider().to_string().yellow(),
            service.current_model().bold()
        );
        return;
    }
    match rest.parse::<ProviderKind>() {
        Ok(kind) => {
            if service.set_provider(kind) {
                println!("{} {}", "✓ Active provider set to".green(), kind.to_string().bold());
            } else {
                println!(
                    "{} '{}' (not registered in this session)",
                    "Cannot switch to".red(),
                    kind
                );
            }
        }
        Err(e) => println!("{}: {}", "Unknown provider".red(), e),
    }
}

fn cmd_stats(service: &Arc<EmbeddingService>) {
    let stats = service.statistics();
    println!();
    println!("{}", "Embedding Service Statistics".bold().underline());
    println!("  Provider        : {} ({})", stats.provider.to_string().yellow(), stats.model);
    println!("  Generated       : {}", stats.total_generated);
    println!("  Cache hits      : {}", stats.cache_hits);
    println!("  Cache misses    : {}", stats.cache_misses);
    println!("  Estimated cost  : ${:.6}", stats.total_cost);
    println!("  Avg latency     : {:?}", stats.avg_latency);
    println!();
}

fn cmd_settings() {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => Config::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    println!(
        "  Provider       : {} (openai / ollama / offline)",
        cfg.provider.to_string().yellow()
    );
    let provider = prompt_str(
        &format!("  Provider       [{}]: ", cfg.provider),
        &cfg.provider.to_string(),
    );
    if let Ok(kind) = provider.parse::<ProviderKind>() {
        cfg.provider = kind;
    }

    println!("  Ollama URL     : {}", cfg.ollama_url.yellow());
    cfg.ollama_url = prompt_str(
        &format!("  Ollama URL     [{}]: ", cfg.ollama_url),
        &cfg.ollama_url,
    );

    println!("  Ollama model   : {}", cfg.ollama_model.yellow());
    cfg.ollama_model = prompt_str(
        &format!("  Ollama model   [{}]: ", cfg.ollama_model),
        &cfg.ollama_model,
    );

    match config::save(&cfg) {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            );
            println!("  (provider wiring is rebuilt on next start)");
        }
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `/remember` arguments: a leading importance number followed by
/// the observation text.
fn parse_remember(rest: &str) -> Result<(f32, &str), String> {
    let (importance_raw, text) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| "expected an importance and some text".to_string())?;
    let importance: f32 = importance_raw
        .parse()
        .map_err(|_| format!("'{importance_raw}' is not a number"))?;
    if importance < 0.0 {
        return Err("importance must be ≥ 0".to_string());
    }
    let text = text.trim();
    if text.is_empty() {
        return Err("observation text is empty".to_string());
    }
    Ok((importance, text))
}

/// Parse an optional count argument, keeping `default` on absence or junk.
fn parse_count(rest: &str, default: usize) -> usize {
    if rest.is_empty() {
        return default;
    }
    rest.parse().unwrap_or(default)
}

/// Prompt for a string value.  Returns `default` when the user presses
/// Enter.
fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}
