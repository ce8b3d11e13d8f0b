use anyhow::{Context, Result};
use bookchat_core::config::{get_default_config_file, ChatConfig};
use bookchat_core::{ChatWidget, HttpTransport};
use clap::Parser;
use colored::*;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod app;
mod cli;
mod logging;
mod output;

use crate::cli::Args;
use crate::logging::init_logging;
use crate::output::{print_error, print_usage_instructions};

const APP_NAME: &str = "bookchat";

/// Main function - builds the chat widget and runs the requested mode
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables before reading BOOKCHAT_*
    dotenv().ok();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_default_config_file(APP_NAME)
            .unwrap_or_else(|_| PathBuf::from(format!("{}.toml", APP_NAME))),
    };
    let file_config = ChatConfig::load_from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let config = ChatConfig::defaults()
        .merge(&file_config)
        .merge(&ChatConfig::from_env()?)
        .merge(&args.to_config());

    if let Err(e) = init_logging(config.log_level.as_deref(), args.verbose) {
        print_error(&format!("{:#}; continuing without logs", e));
    }
    info!("Loaded configuration from {}", config_path.display());

    if args.save_config {
        // Session ids are per run unless pinned explicitly in the file
        let to_save = ChatConfig {
            session_id: file_config.session_id.clone(),
            ..config.clone()
        };
        to_save.save_to_file(&config_path)?;
        println!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    let transport = HttpTransport::new(config.clone())?;
    let widget = ChatWidget::new(Arc::new(transport), &config);
    if args.context.is_some() {
        widget.set_context(args.context.clone());
    }

    if args.history {
        app::show_history(&widget).await?;
    }

    let mut answered = true;
    if args.interactive {
        if let Err(e) = app::run_interactive_chat(&widget).await {
            print_error(&format!("Interactive chat failed: {}", e));
        }
    } else if let Some(prompt) = args.prompt.as_deref() {
        answered = app::run_single_query(&widget, prompt).await?;
        if args.session.is_none() {
            println!(
                "{}",
                format!("Continue with --session {}", widget.session_id()).dimmed()
            );
        }
    } else if !args.history && !args.end_session {
        print_usage_instructions();
    }

    if args.end_session {
        app::end_session(&widget).await?;
    }

    if !answered {
        std::process::exit(1);
    }
    Ok(())
}
