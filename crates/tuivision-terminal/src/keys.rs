//! Named keys and the byte sequences an xterm-compatible terminal sends for them.

/// Every accepted base key name, lowercase. Modifier forms (`ctrl+<letter>`,
/// `alt+<key>`, `shift+tab`) are accepted in addition.
pub const KEY_NAMES: &[&str] = &[
    "enter",
    "return",
    "tab",
    "escape",
    "esc",
    "backspace",
    "delete",
    "up",
    "down",
    "right",
    "left",
    "home",
    "end",
    "pageup",
    "pagedown",
    "insert",
    "f1",
    "f2",
    "f3",
    "f4",
    "f5",
    "f6",
    "f7",
    "f8",
    "f9",
    "f10",
    "f11",
    "f12",
    "space",
];

/// Maps a key name to its byte sequence. Lookup is case-insensitive;
/// `None` means the name is not a known key.
pub fn key_to_escape_sequence(key: &str) -> Option<Vec<u8>> {
    let key = key.trim().to_ascii_lowercase();

    if let Some((modifier, base_key)) = key.split_once('+') {
        if base_key.is_empty() {
            return None;
        }
        return match modifier {
            "ctrl" | "control" => {
                let mut chars = base_key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_lowercase() => Some(vec![c as u8 - b'a' + 1]),
                    _ => None,
                }
            }
            "alt" | "meta" => {
                let base = key_to_escape_sequence(base_key).or_else(|| {
                    let mut chars = base_key.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some(c.to_string().into_bytes()),
                        _ => None,
                    }
                })?;
                let mut result = vec![0x1b];
                result.extend(base);
                Some(result)
            }
            "shift" if base_key == "tab" => Some(b"\x1b[Z".to_vec()),
            _ => None,
        };
    }

    let seq: &[u8] = match key.as_str() {
        "enter" | "return" => b"\r",
        "tab" => b"\t",
        "escape" | "esc" => b"\x1b",
        "backspace" => b"\x7f",
        "delete" => b"\x1b[3~",
        "space" => b" ",

        "up" => b"\x1b[A",
        "down" => b"\x1b[B",
        "right" => b"\x1b[C",
        "left" => b"\x1b[D",

        "home" => b"\x1b[H",
        "end" => b"\x1b[F",
        "pageup" => b"\x1b[5~",
        "pagedown" => b"\x1b[6~",
        "insert" => b"\x1b[2~",

        "f1" => b"\x1bOP",
        "f2" => b"\x1bOQ",
        "f3" => b"\x1bOR",
        "f4" => b"\x1bOS",
        "f5" => b"\x1b[15~",
        "f6" => b"\x1b[17~",
        "f7" => b"\x1b[18~",
        "f8" => b"\x1b[19~",
        "f9" => b"\x1b[20~",
        "f10" => b"\x1b[21~",
        "f11" => b"\x1b[23~",
        "f12" => b"\x1b[24~",

        _ => return None,
    };
    Some(seq.to_vec())
}
