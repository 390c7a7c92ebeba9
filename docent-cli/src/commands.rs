//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::RunArgs;
use crate::repl;
use docent_core::DocentConfig;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            question,
            run,
            json,
        } => {
            let config = load_with_overrides(workspace, config_file, &run)?;
            repl::run_single_question(&question, config, workspace, run.docs.as_deref(), json)
                .await
        }
        Commands::Chat { run } => {
            let config = load_with_overrides(workspace, config_file, &run)?;
            repl::run_interactive(config, workspace, run.docs.as_deref()).await
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

/// Load layered configuration, then apply command-line flags on top.
fn load_with_overrides(
    workspace: &Path,
    config_file: Option<&Path>,
    run: &RunArgs,
) -> anyhow::Result<DocentConfig> {
    let mut config = docent_core::config::load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    apply_overrides(&mut config, run);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(config)
}

fn apply_overrides(config: &mut DocentConfig, run: &RunArgs) {
    if let Some(model) = &run.model {
        config.llm.model = model.clone();
    }
    if let Some(variant) = run.graph {
        config.graph.variant = variant;
    }
    if let Some(top_k) = run.top_k {
        config.retrieval.top_k = top_k;
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".docent");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&DocentConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", render_config(workspace, config_file)?);
            Ok(())
        }
    }
}

/// The effective configuration as TOML. A leading comment notes when no
/// configuration file was found and only defaults and environment apply.
fn render_config(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<String> {
    let config = docent_core::config::load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let body = toml::to_string_pretty(&config)?;
    if config_file.is_none() && !docent_core::config::config_exists(Some(workspace)) {
        return Ok(format!(
            "# No configuration file found; run `docent config init` to create one.\n{}",
            body
        ));
    }
    Ok(body)
}
