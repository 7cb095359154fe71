use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

const BLOCK_SIZE: u64 = 8 * 1024;

/// Which of a program's two log files to read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Last `max_lines` lines of the file at `path`, oldest first.
///
/// The file is read backwards in blocks until enough line breaks have been
/// seen, so tailing a large log does not read it in full. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn tail(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(vec![]);
    }

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut buffer: Vec<u8> = Vec::new();
    let mut position = len;
    let mut trailing_newline = None;

    while position > 0 {
        let size = BLOCK_SIZE.min(position);
        position -= size;

        let mut block = vec![0u8; size as usize];
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(&mut block)?;

        if trailing_newline.is_none() {
            trailing_newline = Some(block.last() == Some(&b'\n'));
        }

        block.extend_from_slice(&buffer);
        buffer = block;

        let breaks = bytecount(&buffer) - usize::from(trailing_newline == Some(true));
        // one extra break guarantees the oldest kept line is complete
        if breaks > max_lines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buffer);
    let mut lines: Vec<&str> = text.lines().collect();

    if position > 0 && !lines.is_empty() {
        // the first line started before the block we stopped at
        lines.remove(0);
    }

    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}

fn bytecount(buffer: &[u8]) -> usize { buffer.iter().filter(|&&byte| byte == b'\n').count() }

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn numbered(count: usize) -> String { (1..=count).map(|n| format!("line {n}\n")).collect() }

    #[test]
    fn test_last_five_of_two_hundred() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_a.log");
        fs::write(&path, numbered(200)).unwrap();

        let lines = tail(&path, 5).unwrap();
        assert_eq!(lines, vec!["line 196", "line 197", "line 198", "line 199", "line 200"]);
    }

    #[test]
    fn test_fewer_lines_than_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.log");
        fs::write(&path, "only\ntwo").unwrap();

        assert_eq!(tail(&path, 50).unwrap(), vec!["only", "two"]);
    }

    #[test]
    fn test_empty_and_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        fs::write(&path, "").unwrap();

        assert!(tail(&path, 10).unwrap().is_empty());
        fs::write(&path, numbered(3)).unwrap();
        assert!(tail(&path, 0).unwrap().is_empty());
    }

    #[test]
    fn test_spans_many_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        // long lines so the requested tail crosses several blocks
        let body: String = (1..=400).map(|n| format!("{n:04} {}\n", "x".repeat(300))).collect();
        fs::write(&path, &body).unwrap();

        let lines = tail(&path, 60).unwrap();
        let expected: Vec<String> = body.lines().skip(340).map(str::to_string).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_line_ending_exactly_on_block_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.log");
        // every line is 16 bytes, so block edges fall right after a newline
        let body: String = (0..2048).map(|n| format!("{n:015}\n")).collect();
        fs::write(&path, &body).unwrap();

        let lines = tail(&path, 512).unwrap();
        assert_eq!(lines.len(), 512);
        assert_eq!(lines.first().map(String::as_str), Some("000000000001536"));
        assert_eq!(lines.last().map(String::as_str), Some("000000000002047"));
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(tail(&dir.path().join("nope.log"), 5).unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
