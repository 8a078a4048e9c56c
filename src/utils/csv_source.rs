//! Streaming CSV source
//!
//! The scraped dumps are one record per line with quoted fields (embedded
//! newlines arrive as literal `\n` escapes, which the parser fixes later).
//! Entries are streamed line by line so multi-gigabyte dumps never load into
//! memory; entry numbers are 1-based, counting from the first row after the
//! header.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncBufReadExt;

/// Parse one CSV line into fields, honoring quotes and doubled quotes.
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

async fn open_reader(path: &Path) -> Result<tokio::io::BufReader<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::NotFound(format!("CSV file {}: {}", path.display(), e)))?;
    Ok(tokio::io::BufReader::new(file))
}

/// Fetch one entry by number (1-based, header excluded).
pub async fn read_entry(path: &Path, entry_number: u64) -> Result<Option<HashMap<String, String>>> {
    let mut entries = read_range(path, entry_number, entry_number).await?;
    Ok(entries.pop())
}

/// Fetch an inclusive range of entries.
pub async fn read_range(
    path: &Path,
    start: u64,
    end: u64,
) -> Result<Vec<HashMap<String, String>>> {
    if start == 0 || end < start {
        return Err(Error::Validation(format!(
            "invalid entry range {}..{}",
            start, end
        )));
    }

    let reader = open_reader(path).await?;
    let mut lines = reader.lines();

    let header_line = match lines.next_line().await? {
        Some(line) => line,
        None => return Ok(Vec::new()),
    };
    let headers = parse_line(&header_line);

    let mut out = Vec::new();
    let mut row = 0u64;
    while let Some(line) = lines.next_line().await? {
        row += 1;
        if row < start {
            continue;
        }
        if row > end {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let values = parse_line(&line);
        let entry: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(values.into_iter())
            .collect();
        out.push(entry);
    }
    Ok(out)
}

/// Count data rows without loading the file.
pub async fn count_entries(path: &Path) -> Result<u64> {
    let reader = open_reader(path).await?;
    let mut lines = reader.lines();
    if lines.next_line().await?.is_none() {
        return Ok(0);
    }
    let mut count = 0u64;
    while lines.next_line().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "date,num_comments,title,user,comment,n_char").unwrap();
        writeln!(
            f,
            r#""2024-01-01","5","Goulash","cook_a","Ingredients:\n- 1 lb beef","25""#
        )
        .unwrap();
        writeln!(
            f,
            r#""2024-01-02","2","Quote ""Special"" Pie","cook_b","text, with comma","17""#
        )
        .unwrap();
        writeln!(f, r#""2024-01-03","0","Plain","cook_c","no quoting here","15""#).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn quoted_fields_with_commas_and_doubled_quotes() {
        let fields = parse_line(r#""a","b,c","say ""hi""",plain"#);
        assert_eq!(fields, vec!["a", "b,c", "say \"hi\"", "plain"]);
    }

    #[tokio::test]
    async fn entry_lookup_is_one_based() {
        let f = fixture();
        let entry = read_entry(f.path(), 1).await.unwrap().unwrap();
        assert_eq!(entry["title"], "Goulash");
        assert_eq!(entry["user"], "cook_a");
        assert_eq!(entry["comment"], r"Ingredients:\n- 1 lb beef");

        let entry = read_entry(f.path(), 2).await.unwrap().unwrap();
        assert_eq!(entry["title"], "Quote \"Special\" Pie");
        assert_eq!(entry["comment"], "text, with comma");

        assert!(read_entry(f.path(), 9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn range_reads_are_inclusive() {
        let f = fixture();
        let entries = read_range(f.path(), 2, 3).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["user"], "cook_b");
        assert_eq!(entries[1]["user"], "cook_c");
    }

    #[tokio::test]
    async fn count_skips_the_header() {
        let f = fixture();
        assert_eq!(count_entries(f.path()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn zero_start_is_rejected() {
        let f = fixture();
        assert!(matches!(
            read_range(f.path(), 0, 5).await,
            Err(Error::Validation(_))
        ));
    }
}
