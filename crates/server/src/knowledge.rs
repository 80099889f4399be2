//! The staff knowledge base and scheduling reference, both plain Markdown
//! files on disk. The knowledge base is append-only; the reference document
//! is maintained by staff and only read here.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::info;

/// Head of the knowledge base fed back into the judgment prompt so the model
/// can spot entries that are already covered.
pub const KB_HEAD_CHARS: usize = 3000;
/// Head of the scheduling reference attached as drafting grounding.
pub const REFERENCE_HEAD_CHARS: usize = 3500;

const KB_HEADER: &str = "# Staff Knowledge Base\n\nBusiness rules and policies.\n\n";

pub struct KnowledgeStore {
    kb_path: PathBuf,
    reference_path: PathBuf,
}

async fn head_of(path: &Path, chars: usize) -> io::Result<String> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(text.chars().take(chars).collect()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(error) => Err(error),
    }
}

impl KnowledgeStore {
    pub fn new(kb_path: PathBuf, reference_path: PathBuf) -> Self {
        Self { kb_path, reference_path }
    }

    /// Append one timestamped entry, creating the file (with its header) and
    /// any missing parent directories on first write.
    pub async fn append(&self, category: &str, content: &str) -> io::Result<()> {
        if let Some(parent) = self.kb_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M");
        let entry = format!("\n## [{timestamp}] {category}\n\n{content}\n");

        let mut document = match fs::read_to_string(&self.kb_path).await {
            Ok(existing) => existing,
            Err(error) if error.kind() == io::ErrorKind::NotFound => KB_HEADER.to_string(),
            Err(error) => return Err(error),
        };
        document.push_str(&entry);
        fs::write(&self.kb_path, document).await?;

        info!(
            event_name = "knowledge.entry.appended",
            category = %category,
            chars = content.len(),
            "knowledge base entry stored"
        );
        Ok(())
    }

    /// First [`KB_HEAD_CHARS`] of the knowledge base; a missing file reads as
    /// empty.
    pub async fn head(&self) -> io::Result<String> {
        head_of(&self.kb_path, KB_HEAD_CHARS).await
    }

    /// First [`REFERENCE_HEAD_CHARS`] of the scheduling reference document.
    pub async fn reference_head(&self) -> io::Result<String> {
        head_of(&self.reference_path, REFERENCE_HEAD_CHARS).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::KnowledgeStore;

    fn store_in(dir: &TempDir) -> KnowledgeStore {
        KnowledgeStore::new(
            dir.path().join("staff/knowledge_base.md"),
            dir.path().join("staff/scheduling_reference.md"),
        )
    }

    #[tokio::test]
    async fn missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.head().await.unwrap(), "");
        assert_eq!(store.reference_head().await.unwrap(), "");
    }

    #[tokio::test]
    async fn first_append_creates_header_then_entries_accumulate() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append("Pricing", "Handstrips are $120 flat.").await.unwrap();
        store.append("Scheduling", "No new clients after 1:30.").await.unwrap();

        let head = store.head().await.unwrap();
        assert!(head.starts_with("# Staff Knowledge Base"));
        assert!(head.contains("] Pricing\n\nHandstrips are $120 flat."));
        assert!(head.contains("] Scheduling\n"));
    }

    #[tokio::test]
    async fn heads_are_char_capped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append("Other", &"x".repeat(5000)).await.unwrap();

        assert_eq!(store.head().await.unwrap().chars().count(), super::KB_HEAD_CHARS);
    }

    #[tokio::test]
    async fn reference_head_reads_the_staff_document() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("staff")).await.unwrap();
        tokio::fs::write(
            dir.path().join("staff/scheduling_reference.md"),
            "Handstrips go to Kumi.",
        )
        .await
        .unwrap();

        let store = store_in(&dir);
        assert_eq!(store.reference_head().await.unwrap(), "Handstrips go to Kumi.");
    }
}
