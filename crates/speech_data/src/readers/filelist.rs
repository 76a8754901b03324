use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// One line of a training filelist: `wav_path|text_path|tone_path`.
///
/// `text` and `tone` point at symbol arrays that the feature extractor loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilelistEntry {
    pub wav: PathBuf,
    pub text: String,
    pub tone: String,
}

impl FilelistEntry {
    /// Parses a `|`-separated line. Surrounding whitespace of each field is trimmed.
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        if fields.len() != 3 {
            bail!(
                "Expected 3 '|'-separated fields (wav|text|tone), found {}",
                fields.len()
            );
        }
        if fields.iter().any(|f| f.is_empty()) {
            bail!("Empty field in filelist line '{}'", line);
        }
        Ok(Self {
            wav: PathBuf::from(fields[0]),
            text: fields[1].to_string(),
            tone: fields[2].to_string(),
        })
    }
}

/// Reads a filelist line by line. Skips blank lines.
///
/// # Example
/// ```ignore
/// let source = FilelistSource::new("filelists/train.txt");
/// for entry in source.stream()? {
///     let entry = entry?;
/// }
/// ```
pub struct FilelistSource {
    path: PathBuf,
}

impl FilelistSource {
    /// Creates a new filelist reader
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<FilelistEntry>> + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open filelist: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let iter = reader
            .lines()
            .enumerate()
            .filter_map(move |(line_num, line)| match line {
                Ok(text) if text.trim().is_empty() => None, // Skip blank lines
                Ok(text) => Some(
                    FilelistEntry::parse(&text)
                        .with_context(|| format!("Malformed filelist line {}", line_num + 1)),
                ),
                Err(e) => {
                    Some(Err(e).with_context(|| format!("Error reading line {}", line_num + 1)))
                }
            });
        Ok(Box::new(iter))
    }

    /// Reads every entry, failing on the first malformed line.
    pub fn read_all(&self) -> Result<Vec<FilelistEntry>> {
        self.stream()?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_filelist_streaming() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "wavs/a.wav|phones/a.npy|tones/a.npy")?;
        writeln!(file, "")?; // Blank line (skipped)
        writeln!(file, " wavs/b.wav | phones/b.npy | tones/b.npy ")?;

        let entries = FilelistSource::new(file.path()).read_all()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].wav, PathBuf::from("wavs/a.wav"));
        assert_eq!(entries[1].text, "phones/b.npy");
        assert_eq!(entries[1].tone, "tones/b.npy");
        Ok(())
    }

    #[test]
    fn test_malformed_line_reports_position() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "wavs/a.wav|phones/a.npy|tones/a.npy")?;
        writeln!(file, "wavs/b.wav|phones/b.npy")?;

        let err = FilelistSource::new(file.path())
            .read_all()
            .expect_err("second line has two fields");
        assert!(format!("{err:#}").contains("line 2"));
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        assert!(FilelistSource::new("/nonexistent/filelist.txt").stream().is_err());
    }
}
