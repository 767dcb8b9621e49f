//! Plain-text rendering of raw shell output

use vte::{Parser, Perform};

#[derive(Default)]
struct Collector {
    text: String,
}

impl Perform for Collector {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.text.push('\n'),
            b'\t' => self.text.push('\t'),
            0x08 => {
                if !self.text.ends_with('\n') {
                    self.text.pop();
                }
            }
            _ => {}
        }
    }
}

/// Drop escape sequences and control bytes, keeping printable text.
///
/// Carriage returns are removed, backspaces erase the previous character on
/// the same line, and trailing whitespace is trimmed from every line.
pub fn strip_controls(bytes: &[u8]) -> String {
    let mut parser = Parser::new();
    let mut collector = Collector::default();
    for byte in bytes {
        parser.advance(&mut collector, *byte);
    }

    let mut out = String::with_capacity(collector.text.len());
    for (i, line) in collector.text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_colors_and_carriage_returns() {
        let raw = b"\x1b[1;32muser@host\x1b[0m:~$ ls\r\nfile1  file2\r\n";
        assert_eq!(strip_controls(raw), "user@host:~$ ls\nfile1  file2\n");
    }

    #[test]
    fn test_backspace_erases() {
        assert_eq!(strip_controls(b"abcd\x08\x08ef"), "abef");
        assert_eq!(strip_controls(b"a\n\x08b"), "a\nb");
    }

    #[test]
    fn test_osc_and_utf8() {
        assert_eq!(strip_controls("\x1b]0;title\x07ação".as_bytes()), "ação");
    }
}
