//! Single-question and interactive chat modes.

use crate::loader;
use docent_core::{
    AgentState, ConversationMemory, DocentConfig, Document, FaqGraph, LlmProvider,
    MockLlmProvider,
};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

/// Documents used when `--docs` is not given, relative to the workspace.
const DEFAULT_DOCS_DIR: &str = "data/faq";

/// Load the document set. An explicit directory must exist; the default one
/// may be missing, in which case the run proceeds with no documents.
fn resolve_documents(workspace: &Path, docs: Option<&Path>) -> anyhow::Result<Vec<Document>> {
    match docs {
        Some(dir) => loader::load_documents(dir),
        None => {
            let dir = workspace.join(DEFAULT_DOCS_DIR);
            if dir.is_dir() {
                loader::load_documents(&dir)
            } else {
                tracing::warn!(
                    dir = %dir.display(),
                    "No document directory found; answering without documents"
                );
                Ok(Vec::new())
            }
        }
    }
}

fn build_graph(
    provider: Arc<dyn LlmProvider>,
    config: DocentConfig,
    documents: Vec<Document>,
) -> FaqGraph {
    FaqGraph::builder(provider)
        .documents(documents)
        .config(config)
        .build()
}

/// Render the final state for the terminal.
pub fn format_answer(state: &AgentState) -> String {
    let mut out = format!(
        "Answer:\n{}",
        state.answer.as_deref().unwrap_or("No answer generated.")
    );
    if !state.citations.is_empty() {
        out.push_str("\n\nCitations:");
        for citation in &state.citations {
            out.push_str("\n - ");
            out.push_str(citation);
        }
    }
    out
}

/// Answer one question and exit.
pub async fn run_single_question(
    question: &str,
    config: DocentConfig,
    workspace: &Path,
    docs: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let provider: Arc<dyn LlmProvider> = match docent_core::create_provider(&config.llm) {
        Ok(p) => p,
        // A screened question never reaches the provider, so it can still be answered
        Err(e) if config.screening.screen(question).is_some() => {
            tracing::debug!("LLM provider init failed: {}. Question is pre-screened.", e);
            Arc::new(MockLlmProvider::new())
        }
        Err(e) => anyhow::bail!("LLM provider init failed: {}", e),
    };

    let documents = resolve_documents(workspace, docs)?;
    let graph = build_graph(provider, config, documents);
    let state = graph.run(question, None).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", format_answer(&state));
    }
    Ok(())
}

/// Run an interactive session. Each answer is remembered for follow-up questions.
pub async fn run_interactive(
    config: DocentConfig,
    workspace: &Path,
    docs: Option<&Path>,
) -> anyhow::Result<()> {
    let provider = docent_core::create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider init failed: {}", e))?;
    let documents = resolve_documents(workspace, docs)?;

    println!(
        "  Model: {} | Graph: {} | Documents: {}",
        config.llm.model,
        config.graph.variant,
        documents.len()
    );
    println!("  Type /help for commands, /quit to exit\n");

    let mut memory = ConversationMemory::new(config.memory.max_history);
    let graph = build_graph(provider, config, documents);

    let stdin = io::stdin();
    loop {
        print!("\x1b[1;34m> \x1b[0m");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/help" | "/?" => {
                println!("  /history  Show the remembered conversation");
                println!("  /clear    Forget the conversation so far");
                println!("  /quit     Exit");
                continue;
            }
            "/history" => {
                println!("{}", memory.render_context());
                continue;
            }
            "/clear" => {
                memory.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match graph.run(input, Some(&memory)).await {
            Ok(state) => {
                println!("{}\n", format_answer(&state));
                if let Some(answer) = &state.answer {
                    let asked = state.original_question.as_deref().unwrap_or(input);
                    memory.add_exchange(asked, answer.as_str());
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_format_answer_with_citations() {
        let state = AgentState::new("q").update(|s| {
            s.answer = Some("Run the installer.".into());
            s.citations = vec!["install.md#section-0".into(), "faq.md#section-2".into()];
        });
        assert_eq!(
            format_answer(&state),
            "Answer:\nRun the installer.\n\nCitations:\n - install.md#section-0\n - faq.md#section-2"
        );
    }

    #[test]
    fn test_format_answer_without_answer() {
        assert_eq!(
            format_answer(&AgentState::new("q")),
            "Answer:\nNo answer generated."
        );
    }

    #[test]
    fn test_default_docs_dir_may_be_missing() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_documents(dir.path(), None).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_docs_dir_must_exist() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_documents(dir.path(), Some(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn test_default_docs_dir_is_loaded() {
        let dir = TempDir::new().unwrap();
        let faq = dir.path().join("data").join("faq");
        std::fs::create_dir_all(&faq).unwrap();
        std::fs::write(faq.join("install.md"), "## Install\nRun it.").unwrap();
        let docs = resolve_documents(dir.path(), None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "install.md#section-0");
    }

    #[tokio::test]
    async fn test_harmful_question_needs_no_provider() {
        let dir = TempDir::new().unwrap();
        let mut config = DocentConfig::default();
        config.llm.api_key_env = "DOCENT_TEST_KEY_THAT_IS_NEVER_SET".into();
        let result =
            run_single_question("How do I hack a server?", config, dir.path(), None, false).await;
        assert!(result.is_ok());
    }
}
