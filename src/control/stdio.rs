//! Stdout side of the control plane.
//!
//! - **stdout**: JSON-RPC messages, one per line
//! - **stderr**: logs
//!
//! Lines end in a bare `\n` on every platform, so nothing here goes through
//! `println!`.

use std::io::Write;

/// Write one line and flush.
pub fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Write a line to stdout. The parent blocks until it sees the newline.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_line(&mut handle, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_appends_single_newline() {
        let mut out = Vec::new();
        write_line(&mut out, r#"{"test":true}"#).unwrap();
        write_line(&mut out, "second").unwrap();

        assert_eq!(out, b"{\"test\":true}\nsecond\n");
    }
}
