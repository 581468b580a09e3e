//! `reverie-cli` – Reverie Command Line Interface
//!
//! This binary is the primary entry point for the Reverie memory engine.
//! It:
//!
//! 1. Checks for `~/.reverie/config.toml`; runs a **First-Run Wizard**
//!    when the file is absent.
//! 2. Probes the local Ollama instance and reports available models.
//! 3. Wires up the embedding service (configured provider first, fallback
//!    chain always terminated by the offline provider) and a memory
//!    retriever over it.
//! 4. Drops the user into an **interactive REPL** with slash-commands
//!    (`/remember`, `/recall`, `/recent`, `/important`, `/provider`,
//!    `/stats`, `/settings`, `/help`).
//! 5. Intercepts **Ctrl-C** to exit cleanly.

mod config;
mod ollama;
mod repl;
mod telemetry;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use reverie_embed::offline::OfflineEmbedder;
use reverie_embed::ollama::OllamaEmbedder;
use reverie_embed::openai::OpenAiEmbedder;
use reverie_embed::EmbeddingService;
use reverie_memory::MemoryRetriever;
use reverie_types::ProviderKind;

#[tokio::main]
async fn main() {
    // Hold the guard for the entire lifetime of the process.
    let _guard = telemetry::init_tracing("reverie");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – exiting Reverie …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(_)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }

    let cfg = config::load().ok().flatten().unwrap_or_default();

    // ── Ollama discovery ──────────────────────────────────────────────────
    print!("\n  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
    match ollama::fetch_models(&cfg.ollama_url).await {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            if !models.iter().any(|m| m.name.starts_with(&cfg.ollama_model)) {
                println!(
                    "  {}  Run `{}` to enable local embeddings.",
                    format!("Model '{}' not found locally.", cfg.ollama_model).dimmed(),
                    format!("ollama pull {}", cfg.ollama_model).bold()
                );
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Run `{}` to start a local AI.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
        }
    }

    // ── Embedding service + retriever ─────────────────────────────────────
    let service = build_service(&cfg);
    println!(
        "\n  Embedding provider: {} (fallback chain ends at {})",
        service.current_provider().to_string().bold(),
        "offline".bold()
    );
    let retriever = MemoryRetriever::new(service.clone());

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(retriever, service, cfg, shutdown).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Service wiring
// ─────────────────────────────────────────────────────────────────────────────

/// Build the embedding service from the user configuration.
///
/// Every usable provider is registered; the chain starts with the
/// configured provider and always terminates with the offline provider so
/// generation is total.
fn build_service(cfg: &config::Config) -> Arc<EmbeddingService> {
    let have_openai = !cfg.openai_api_key.is_empty();
    if cfg.provider == ProviderKind::OpenAi && !have_openai {
        warn!("openai selected but no API key configured; starting from local providers");
    }

    let mut builder = EmbeddingService::builder()
        .cache_capacity(cfg.cache_capacity)
        .requests_per_second(cfg.requests_per_second)
        .register(Box::new(OllamaEmbedder::with_model(
            cfg.ollama_url.clone(),
            cfg.ollama_model.clone(),
            cfg.ollama_dimension,
        )))
        .register(Box::new(OfflineEmbedder::new()));
    if have_openai {
        builder = builder.register(Box::new(OpenAiEmbedder::new(cfg.openai_api_key.clone())));
    }

    let mut chain: Vec<ProviderKind> = Vec::new();
    for kind in [
        cfg.provider,
        ProviderKind::Ollama,
        ProviderKind::Offline,
    ] {
        let registered = kind != ProviderKind::OpenAi || have_openai;
        if registered && !chain.contains(&kind) {
            chain.push(kind);
        }
    }

    match builder.chain(chain).build() {
        Ok(service) => Arc::new(service),
        Err(e) => {
            warn!(error = %e, "invalid embedding configuration; using offline provider only");
            Arc::new(EmbeddingService::offline_only())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Reverie First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Reverie.\n");

    let mut cfg = config::Config::default();

    // Embedding provider
    println!("  Which embedding provider would you like to use?");
    println!("    1) Local embeddings via Ollama  (default, offline-first)");
    println!("    2) Cloud embeddings via OpenAI");
    println!("    3) Deterministic offline vectors (no semantics, CI-friendly)");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    match choice.trim() {
        "2" => cfg.provider = ProviderKind::OpenAi,
        "3" => cfg.provider = ProviderKind::Offline,
        _ => cfg.provider = ProviderKind::Ollama,
    }

    if cfg.provider == ProviderKind::OpenAi {
        cfg.openai_api_key = prompt_line("  OpenAI API key (sk-…): ", "");
        if cfg.openai_api_key.is_empty() {
            println!(
                "  {}",
                "No key entered – the chain will start at Ollama instead.".dimmed()
            );
        }
    }

    let url = prompt_line(
        &format!("  Ollama base URL [{}]: ", cfg.ollama_url),
        &cfg.ollama_url,
    );
    cfg.ollama_url = url;

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                  _     "#.bold().cyan());
    println!("{}", r#"  / _ \___ _  _____ ___(_)__  "#.bold().cyan());
    println!("{}", r#" / , _/ -_) |/ / -_) __/ / -_)"#.bold().cyan());
    println!("{}", r#"/_/|_|\__/|___/\__/_/ /_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Reverie".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Weighted Agent Memory Retrieval Engine");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
