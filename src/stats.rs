//! Index statistics.
//!
//! A quick summary of what's indexed: media files, faces (and how many are
//! still unresolved), persons, and documents in the vector store. Used by
//! `hbi stats` and `GET /stats`.

use serde::Serialize;

use crate::error::Result;
use crate::index_store::IndexCounts;
use crate::services::Services;

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub db_path: String,
    pub db_size_bytes: u64,
    #[serde(flatten)]
    pub counts: IndexCounts,
    pub documents: u64,
}

pub async fn collect_stats(services: &Services) -> Result<IndexStats> {
    let counts = services.index.counts().await?;
    let documents = services.vectors.count().await?;
    let db_path = &services.config.db.path;
    let db_size_bytes = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    Ok(IndexStats {
        db_path: db_path.display().to_string(),
        db_size_bytes,
        counts,
        documents,
    })
}

/// Run the stats command: query both stores and print a summary.
pub async fn run_stats(services: &Services) -> Result<()> {
    let stats = collect_stats(services).await?;
    let linked = stats.counts.faces - stats.counts.unresolved_faces;

    println!("Homebase Index: Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", stats.db_path);
    println!("  Size:        {}", format_bytes(stats.db_size_bytes));
    println!();
    println!("  Images:      {}", stats.counts.media_files);
    println!(
        "  Faces:       {} ({} linked, {} unresolved)",
        stats.counts.faces, linked, stats.counts.unresolved_faces
    );
    println!("  Persons:     {}", stats.counts.persons);
    println!("  Documents:   {}", stats.documents);
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
