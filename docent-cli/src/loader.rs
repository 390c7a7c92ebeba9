//! Markdown document loading.
//!
//! Every `*.md` file in a directory is split at level-2 headings; each section
//! becomes one document with the source id `<file name>#section-<index>`.

use docent_core::Document;
use std::path::Path;

/// Split markdown into sections that each start at a `## ` heading. Text before
/// the first heading forms its own section. Blank sections are dropped.
pub fn split_sections(markdown: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        if line.starts_with("## ") && !current.is_empty() {
            sections.push(current.join("\n").trim().to_string());
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        sections.push(current.join("\n").trim().to_string());
    }

    sections.retain(|s| !s.is_empty());
    sections
}

/// Load every markdown file in `dir`, in file-name order.
pub fn load_documents(dir: &Path) -> anyhow::Result<Vec<Document>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Cannot read document directory {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut sections = split_sections(&content);
        if sections.is_empty() {
            sections.push(content);
        }
        for (index, section) in sections.into_iter().enumerate() {
            documents.push(Document::new(section, format!("{}#section-{}", name, index)));
        }
    }

    tracing::debug!(dir = %dir.display(), documents = documents.len(), "Loaded documents");
    Ok(documents)
}
