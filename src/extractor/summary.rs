use std::path::PathBuf;

use colored::Colorize;

/// Outcome of one batch run, accumulated by the orchestrator.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    /// (playlist reference, error message) for every reference that failed
    /// even after retries.
    pub failed: Vec<(String, String)>,
    /// Gem-URL files written during the run, inputs for playlist creation.
    pub urls_files: Vec<PathBuf>,
}

impl BatchResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn print_summary(&self) {
        println!("\n{}", "Batch Summary".bold());
        println!("{}", "=============".bold());
        println!("Playlists queued:  {}", self.total);
        println!("{} {}", "Processed:".green(), self.processed);
        if self.skipped > 0 {
            println!("{} {}", "Skipped (cached):".yellow(), self.skipped);
        }
        if self.failed.is_empty() {
            println!("{}", "All playlists handled successfully".green());
        } else {
            println!("{} {}", "Failed:".red(), self.failed.len());
            for (reference, error) in &self.failed {
                println!("  {} {}", reference.red(), error);
            }
        }
        if !self.urls_files.is_empty() {
            println!("\nGem URL files written:");
            for file in &self.urls_files {
                println!("  {}", file.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_succeeded() {
        let mut result = BatchResult {
            total: 3,
            processed: 2,
            skipped: 1,
            ..BatchResult::default()
        };
        assert!(result.all_succeeded());

        result
            .failed
            .push(("url".to_string(), "boom".to_string()));
        assert!(!result.all_succeeded());
    }
}
