use crate::util::bytes::floor_char_boundary;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Percent-escapes everything except unreserved characters
/// (`A-Z a-z 0-9 - _ . ~`).
pub fn percent_encode(input: &[u8]) -> String {
    let mut encoded = String::with_capacity(input.len());
    for &byte in input {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => {
                encoded.push('%');
                encoded.push(HEX[(byte >> 4) as usize] as char);
                encoded.push(HEX[(byte & 0x0F) as usize] as char);
            }
        }
    }
    encoded
}

/// Decodes `%XX` sequences. Malformed sequences are kept verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Longest payload that fits a single line after the `D ` marker.
pub const MAX_LINE_PAYLOAD: usize = 997;

/// Splits `data` into `<prefix> <segment>\n` lines. Every non-final segment is
/// cut at most `MAX_LINE_PAYLOAD - 1` bytes in and ends with a `\` marker. A
/// cut never lands inside a UTF-8 sequence or a `%XX` escape.
pub fn wrap_lines(prefix: &str, data: &str) -> String {
    let mut lines = String::with_capacity(data.len() + prefix.len() + 3);
    let mut rest = data;
    loop {
        if rest.len() > MAX_LINE_PAYLOAD {
            let mut cut = floor_char_boundary(rest, MAX_LINE_PAYLOAD - 1);
            let bytes = rest.as_bytes();
            if cut >= 1 && bytes[cut - 1] == b'%' {
                cut -= 1;
            } else if cut >= 2 && bytes[cut - 2] == b'%' {
                cut -= 2;
            }
            lines.push_str(prefix);
            lines.push(' ');
            lines.push_str(&rest[..cut]);
            lines.push_str("\\\n");
            rest = &rest[cut..];
        } else {
            lines.push_str(prefix);
            lines.push(' ');
            lines.push_str(rest);
            lines.push('\n');
            return lines;
        }
    }
}
