//! Binary-safe helpers over raw byte buffers. Offsets are byte offsets, never
//! character offsets.

/// Returns at most `len` bytes of `buf` starting at `start`, clamped to the
/// buffer bounds.
pub fn byte_substr(buf: &[u8], start: usize, len: usize) -> &[u8] {
    let start = start.min(buf.len());
    let end = start.saturating_add(len).min(buf.len());
    &buf[start..end]
}

/// Drops the first `n` bytes of `buf`.
pub fn consume(buf: &mut Vec<u8>, n: usize) {
    let n = n.min(buf.len());
    buf.drain(..n);
}

/// Removes the first complete `\n`-terminated line from `buf` and returns it
/// without the terminator.
pub fn take_line(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buf.drain(..=pos).collect();
    line.pop();
    Some(line)
}

/// Largest index `<= max` that lies on a UTF-8 character boundary of `s`.
pub fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn substr_is_clamped() {
        let buf = b"hello world";
        assert_eq!(byte_substr(buf, 0, 5), b"hello");
        assert_eq!(byte_substr(buf, 6, 100), b"world");
        assert_eq!(byte_substr(buf, 50, 3), b"");
        assert_eq!(byte_substr(buf, 3, usize::MAX), b"lo world");
    }

    #[test]
    fn substr_does_not_respect_characters() {
        let buf = "é".as_bytes();
        assert_eq!(byte_substr(buf, 0, 1), &[0xC3]);
    }

    #[test]
    fn take_line_keeps_partial_tail() {
        let mut buf = b"first\nsecond\nthi".to_vec();
        assert_eq!(take_line(&mut buf), Some(b"first".to_vec()));
        assert_eq!(take_line(&mut buf), Some(b"second".to_vec()));
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(buf, b"thi".to_vec());
    }

    #[test]
    fn consume_past_end_empties() {
        let mut buf = b"abc".to_vec();
        consume(&mut buf, 2);
        assert_eq!(buf, b"c".to_vec());
        consume(&mut buf, 10);
        assert!(buf.is_empty());
    }

    #[test]
    fn char_boundary_backs_off() {
        let s = "aé";
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 3), 3);
        assert_eq!(floor_char_boundary(s, 10), 3);
    }
}
