//! Experience table: EXP required to go from 0% to 100% at each level.
//!
//! Loaded once at startup and read-only afterwards. Levels outside the table
//! are "unknown"; callers skip whatever needed them instead of guessing.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpTable {
    required: BTreeMap<u32, u64>,
}

impl ExpTable {
    /// Builds a table from `(level, required_exp)` pairs.
    ///
    /// Zero requirements are rejected: they would divide by zero in the
    /// percent/value check.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, u64)>) -> Result<Self> {
        let mut required = BTreeMap::new();
        for (level, exp) in pairs {
            if exp == 0 {
                return Err(anyhow!("Level {} has zero required EXP", level));
            }
            required.insert(level, exp);
        }
        let table = Self { required };
        table.log_gaps();
        Ok(table)
    }

    /// Loads `level,required_exp` rows.
    ///
    /// A non-numeric first row is treated as the header; `#` lines and blank
    /// lines are skipped, malformed rows are skipped with a warning.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path).context(format!("Failed to open EXP table: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut pairs = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from EXP table")?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match Self::parse_line(line) {
                Ok(pair) => pairs.push(pair),
                Err(_) if line_num == 0 => {} // header
                Err(e) => {
                    log::warn!("Skipping malformed EXP table row {}: {}", line_num + 1, e);
                }
            }
        }

        if pairs.is_empty() {
            return Err(anyhow!("EXP table {} has no rows", path.display()));
        }

        Self::from_pairs(pairs)
    }

    /// Loads a JSON object `{"1": 1000, "2": 1500, ...}`.
    pub fn from_json(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read EXP table: {}", path.display()))?;
        let raw: BTreeMap<String, u64> =
            serde_json::from_str(&contents).context("Failed to parse EXP table JSON")?;

        let pairs = raw
            .into_iter()
            .map(|(k, v)| {
                k.trim()
                    .parse::<u32>()
                    .map(|level| (level, v))
                    .map_err(|e| anyhow!("Invalid level key '{}': {}", k, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_pairs(pairs)
    }

    /// Picks the loader from the file extension (`.json`, anything else is CSV).
    pub fn load(path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let table = if is_json {
            Self::from_json(path)?
        } else {
            Self::from_csv(path)?
        };
        log::info!(
            "EXP table loaded: {} levels ({:?}..={:?})",
            table.len(),
            table.min_level(),
            table.max_level()
        );
        Ok(table)
    }

    fn parse_line(line: &str) -> Result<(u32, u64)> {
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(anyhow!("Expected 2 columns, got {}", parts.len()));
        }
        let level = parts[0].parse::<u32>().context("Invalid level")?;
        let exp = parts[1].parse::<u64>().context("Invalid required EXP")?;
        Ok((level, exp))
    }

    /// EXP at 100% for `level`, or `None` if the level is not in the table.
    pub fn required(&self, level: u32) -> Option<u64> {
        self.required.get(&level).copied()
    }

    /// Sum of required EXP for every level strictly between `from` and `to`.
    /// `None` if any of those levels is missing.
    pub fn span_between(&self, from: u32, to: u32) -> Option<u64> {
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        (lo.saturating_add(1)..hi).try_fold(0u64, |acc, level| Some(acc + self.required(level)?))
    }

    pub fn min_level(&self) -> Option<u32> {
        self.required.keys().next().copied()
    }

    pub fn max_level(&self) -> Option<u32> {
        self.required.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    fn log_gaps(&self) {
        let mut prev: Option<u32> = None;
        for &level in self.required.keys() {
            if let Some(p) = prev {
                if level != p + 1 {
                    log::warn!("EXP table has no entries for levels {}..{}", p + 1, level);
                }
            }
            prev = Some(level);
        }
    }
}
