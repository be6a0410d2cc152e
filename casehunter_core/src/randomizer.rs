use rand::Rng;
use std::path::Path;
use thiserror::Error;

/// Largest leading integer still read as a case count rather than a seed.
const MAX_TEMPLATE_CASES: i128 = 20;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Incompatible seed file structure: {0}")]
    IncompatibleStructure(String),
    #[error("Failed to read seed template {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a seed template parameterizes its generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStructure {
    /// Line 1 is the case count, line 2 the seed.
    MultipleCases,
    /// The leading integer is the seed itself.
    SingleCase,
}

/// A cleaned seed template: comments, surrounding whitespace and blank lines
/// removed, structure and seed value already detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedTemplate {
    structure: SeedStructure,
    seed: i128,
    /// Lines following the leading integer(s), copied into every randomized seed.
    body: Vec<String>,
}

impl SeedTemplate {
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let content = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SeedError> {
        let lines: Vec<String> = content
            .lines()
            .map(strip_comment)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let structure = detect_structure(&lines).ok_or_else(|| {
            SeedError::IncompatibleStructure(
                "expected a leading case count and seed, or a leading seed".to_string(),
            )
        })?;
        let leading = match structure {
            SeedStructure::MultipleCases => 2,
            SeedStructure::SingleCase => 1,
        };
        let seed_line = &lines[leading - 1];
        let seed = seed_line.parse::<i128>().map_err(|_| {
            SeedError::IncompatibleStructure(format!("seed line {seed_line:?} is not an integer"))
        })?;

        Ok(Self {
            structure,
            seed,
            body: lines[leading..].to_vec(),
        })
    }

    pub fn structure(&self) -> SeedStructure {
        self.structure
    }

    /// The seed value found in the template.
    pub fn seed(&self) -> i128 {
        self.seed
    }

    /// Number of random bits a replacement seed gets: `⌊log2(|seed|)⌋`,
    /// capped at 64.
    pub fn seed_bits(&self) -> u32 {
        match self.seed.unsigned_abs() {
            0 => 0,
            magnitude => magnitude.ilog2().min(u64::BITS),
        }
    }

    /// Draws a non-negative seed below `2^seed_bits()`.
    pub fn draw_seed<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match self.seed_bits() {
            0 => 0,
            bits => rng.random::<u64>() >> (u64::BITS - bits),
        }
    }

    /// Renders the template with its case count replaced by `cases` and its
    /// seed by `seed`. Single-case templates only carry the seed.
    pub fn randomize(&self, cases: usize, seed: u64) -> String {
        let mut out = String::new();
        if self.structure == SeedStructure::MultipleCases {
            out.push_str(&format!("{cases}\n"));
        }
        out.push_str(&format!("{seed}\n"));
        for line in &self.body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => line[..index].trim(),
        None => line.trim(),
    }
}

/// The first integer line is a candidate case count. A later integer line
/// while the candidate lies in `(0, 20]` means a multi-case seed; a
/// non-integer line after a candidate means a single-case seed.
fn detect_structure(lines: &[String]) -> Option<SeedStructure> {
    let mut candidate: Option<i128> = None;
    for line in lines {
        let Ok(value) = line.parse::<i128>() else {
            return candidate.map(|_| SeedStructure::SingleCase);
        };
        match candidate {
            None => candidate = Some(value),
            Some(cases) if cases > 0 && cases <= MAX_TEMPLATE_CASES => {
                return Some(SeedStructure::MultipleCases);
            }
            Some(_) => {}
        }
    }
    None
}
