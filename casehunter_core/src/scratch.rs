use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Seed, input and answer files owned by one trial.
///
/// Files are named after the trial's seed and removed when the arena is
/// dropped, on every exit path. Removal failures are logged and otherwise
/// ignored.
#[derive(Debug)]
pub struct TrialScratch {
    seed_file: PathBuf,
    input_file: PathBuf,
    answer_file: PathBuf,
}

impl TrialScratch {
    pub fn new(data_dir: &Path, seed: u64) -> Self {
        Self {
            seed_file: data_dir.join(format!("{seed}.seed")),
            input_file: data_dir.join(format!("{seed}.in")),
            answer_file: data_dir.join(format!("{seed}.ans")),
        }
    }

    pub fn seed_file(&self) -> &Path {
        &self.seed_file
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    pub fn answer_file(&self) -> &Path {
        &self.answer_file
    }

    pub fn write_seed(&self, content: &str) -> std::io::Result<()> {
        fs::write(&self.seed_file, content)
    }

    pub fn write_input(&self, content: &str) -> std::io::Result<()> {
        fs::write(&self.input_file, content)
    }

    pub fn read_seed(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.seed_file)
    }

    pub fn read_input(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.input_file)
    }

    pub fn read_answer(&self) -> std::io::Result<String> {
        fs::read_to_string(&self.answer_file)
    }
}

impl Drop for TrialScratch {
    fn drop(&mut self) {
        for file in [&self.input_file, &self.seed_file, &self.answer_file] {
            match fs::remove_file(file) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove scratch file {:?}: {}", file, e),
            }
        }
    }
}
