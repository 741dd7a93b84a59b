//! Answers the device queries TUI frameworks send at startup.
//!
//! Many applications block until a real terminal replies to cursor-position,
//! device-attribute or colour queries. [`QueryResponder`] scans the child's
//! output as it streams past and synthesises the replies an xterm-like
//! terminal would send. Scanning is resumable: a query split across any number
//! of chunks is answered once, when its final byte arrives.
//!
//! Any byte that cannot continue the current escape, ESC included, drops the
//! scanner back to ground; the bytes after it are read as plain text.

use tracing::debug;

use crate::vterm::CursorPosition;

const MAX_BUFFER: usize = 8192;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

const PRIMARY_DA_REPLY: &[u8] = b"\x1b[?62;c";
const SECONDARY_DA_REPLY: &[u8] = b"\x1b[>41;354;0c";
const TERTIARY_DA_REPLY: &[u8] = b"\x1bP!|00000000\x1b\\";
const KITTY_KEYBOARD_REPLY: &[u8] = b"\x1b[?0u";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Ground,
    Escape,
    CsiParam,
    CsiIntermediate,
    Osc,
    Dcs,
}

type CursorAccessor = Box<dyn Fn() -> CursorPosition + Send>;

pub struct QueryResponder {
    cursor: CursorAccessor,
    state: ScanState,
    params: Vec<u8>,
    intermediates: Vec<u8>,
    payload: Vec<u8>,
    esc_pending: bool,
}

impl std::fmt::Debug for QueryResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResponder")
            .field("state", &self.state)
            .field("params", &self.params.len())
            .field("intermediates", &self.intermediates.len())
            .field("payload", &self.payload.len())
            .field("esc_pending", &self.esc_pending)
            .finish()
    }
}

impl QueryResponder {
    /// `cursor` is consulted when a cursor-position report is requested and
    /// must return the zero-based cursor cell.
    pub fn new<F>(cursor: F) -> Self
    where
        F: Fn() -> CursorPosition + Send + 'static,
    {
        Self {
            cursor: Box::new(cursor),
            state: ScanState::Ground,
            params: Vec::new(),
            intermediates: Vec::new(),
            payload: Vec::new(),
            esc_pending: false,
        }
    }

    /// Scans one chunk of output and returns the replies it completes, in the
    /// order their queries ended.
    pub fn scan(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut replies = Vec::new();

        for &byte in data {
            match self.state {
                ScanState::Ground => {
                    if byte == ESC {
                        self.state = ScanState::Escape;
                    }
                }
                ScanState::Escape => match byte {
                    b'[' => {
                        self.params.clear();
                        self.intermediates.clear();
                        self.state = ScanState::CsiParam;
                    }
                    b']' => self.enter_string(ScanState::Osc),
                    b'P' => self.enter_string(ScanState::Dcs),
                    _ => self.state = ScanState::Ground,
                },
                ScanState::CsiParam => match byte {
                    0x30..=0x3f => self.params.push(byte),
                    0x20..=0x2f => {
                        self.intermediates.push(byte);
                        self.state = ScanState::CsiIntermediate;
                    }
                    0x40..=0x7e => {
                        replies.extend(self.dispatch_csi(byte));
                        self.state = ScanState::Ground;
                    }
                    _ => self.abort_csi(),
                },
                ScanState::CsiIntermediate => match byte {
                    0x20..=0x2f => self.intermediates.push(byte),
                    0x40..=0x7e => {
                        replies.extend(self.dispatch_csi(byte));
                        self.state = ScanState::Ground;
                    }
                    _ => self.abort_csi(),
                },
                ScanState::Osc | ScanState::Dcs => {
                    if let Some(reply) = self.scan_string_byte(byte) {
                        replies.push(reply);
                    }
                }
            }

            if self.params.len() > MAX_BUFFER
                || self.intermediates.len() > MAX_BUFFER
                || self.payload.len() > MAX_BUFFER
            {
                debug!(state = ?self.state, "Escape sequence exceeded buffer cap, resetting");
                self.reset();
            }
        }

        replies
    }

    fn enter_string(&mut self, state: ScanState) {
        self.payload.clear();
        self.esc_pending = false;
        self.state = state;
    }

    fn abort_csi(&mut self) {
        self.params.clear();
        self.intermediates.clear();
        self.state = ScanState::Ground;
    }

    fn scan_string_byte(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.esc_pending {
            self.esc_pending = false;
            if byte == b'\\' {
                return self.finish_string();
            }
            self.payload.push(ESC);
            self.payload.push(byte);
            return None;
        }

        match byte {
            ESC => {
                self.esc_pending = true;
                None
            }
            BEL => self.finish_string(),
            _ => {
                self.payload.push(byte);
                None
            }
        }
    }

    fn finish_string(&mut self) -> Option<Vec<u8>> {
        let reply = match self.state {
            ScanState::Osc => osc_reply(&self.payload),
            _ => None,
        };
        self.payload.clear();
        self.state = ScanState::Ground;
        reply
    }

    fn dispatch_csi(&self, final_byte: u8) -> Option<Vec<u8>> {
        let params = self.params.as_slice();
        let intermediates = self.intermediates.as_slice();

        match (final_byte, intermediates) {
            (b'n', []) if params == b"6" => {
                let cursor = (self.cursor)();
                let row = u32::from(cursor.row) + 1;
                let col = u32::from(cursor.col) + 1;
                Some(format!("\x1b[{row};{col}R").into_bytes())
            }
            (b'c', []) => match params {
                b"" | b"0" => Some(PRIMARY_DA_REPLY.to_vec()),
                b">" | b">0" => Some(SECONDARY_DA_REPLY.to_vec()),
                b"=" => Some(TERTIARY_DA_REPLY.to_vec()),
                _ => None,
            },
            (b'u', []) if params.starts_with(b"?") => Some(KITTY_KEYBOARD_REPLY.to_vec()),
            (b'q', []) if params == b">0" => Some(xtversion_reply()),
            (b'p', b"$") => {
                let mode = params.strip_prefix(b"?")?;
                if mode.is_empty() || !mode.iter().all(u8::is_ascii_digit) {
                    return None;
                }
                let mut reply = b"\x1b[?".to_vec();
                reply.extend_from_slice(mode);
                // 2: mode is reset.
                reply.extend_from_slice(b";2$y");
                Some(reply)
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.state = ScanState::Ground;
        self.params.clear();
        self.intermediates.clear();
        self.payload.clear();
        self.esc_pending = false;
    }
}

fn xtversion_reply() -> Vec<u8> {
    format!("\x1bP>|tuivision({})\x1b\\", env!("CARGO_PKG_VERSION")).into_bytes()
}

fn osc_reply(payload: &[u8]) -> Option<Vec<u8>> {
    let reply: &[u8] = match payload {
        b"10;?" => b"\x1b]10;rgb:ffff/ffff/ffff\x1b\\",
        b"11;?" => b"\x1b]11;rgb:0000/0000/0000\x1b\\",
        b"12;?" => b"\x1b]12;rgb:ffff/ffff/ffff\x1b\\",
        _ => return None,
    };
    Some(reply.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn responder_at(row: u16, col: u16) -> QueryResponder {
        QueryResponder::new(move || CursorPosition {
            row,
            col,
            visible: true,
        })
    }

    fn responder() -> QueryResponder {
        responder_at(0, 0)
    }

    #[test]
    fn test_cursor_position_report_is_one_based() {
        let mut r = responder_at(4, 9);
        assert_eq!(r.scan(b"\x1b[6n"), vec![b"\x1b[5;10R".to_vec()]);
    }

    #[test]
    fn test_device_attributes() {
        let mut r = responder();
        assert_eq!(r.scan(b"\x1b[c"), vec![PRIMARY_DA_REPLY.to_vec()]);
        assert_eq!(r.scan(b"\x1b[0c"), vec![PRIMARY_DA_REPLY.to_vec()]);
        assert_eq!(r.scan(b"\x1b[>c"), vec![SECONDARY_DA_REPLY.to_vec()]);
        assert_eq!(r.scan(b"\x1b[>0c"), vec![SECONDARY_DA_REPLY.to_vec()]);
        assert_eq!(r.scan(b"\x1b[=c"), vec![TERTIARY_DA_REPLY.to_vec()]);
        assert!(r.scan(b"\x1b[1c").is_empty());
    }

    #[test]
    fn test_kitty_keyboard_query() {
        let mut r = responder();
        assert_eq!(r.scan(b"\x1b[?u"), vec![b"\x1b[?0u".to_vec()]);
        assert_eq!(r.scan(b"\x1b[?1u"), vec![b"\x1b[?0u".to_vec()]);
        assert!(r.scan(b"\x1b[1u").is_empty());
    }

    #[test]
    fn test_xtversion() {
        let mut r = responder();
        let replies = r.scan(b"\x1b[>0q");
        assert_eq!(replies.len(), 1);
        let reply = String::from_utf8(replies[0].clone()).unwrap();
        assert!(reply.starts_with("\x1bP>|tuivision("));
        assert!(reply.ends_with(")\x1b\\"));
    }

    #[test]
    fn test_decrqm_reports_mode_reset() {
        let mut r = responder();
        assert_eq!(r.scan(b"\x1b[?25$p"), vec![b"\x1b[?25;2$y".to_vec()]);
        assert!(r.scan(b"\x1b[25$p").is_empty());
        assert!(r.scan(b"\x1b[?$p").is_empty());
    }

    #[test]
    fn test_osc_colour_queries_with_either_terminator() {
        let mut r = responder();
        assert_eq!(
            r.scan(b"\x1b]10;?\x07"),
            vec![b"\x1b]10;rgb:ffff/ffff/ffff\x1b\\".to_vec()]
        );
        assert_eq!(
            r.scan(b"\x1b]11;?\x1b\\"),
            vec![b"\x1b]11;rgb:0000/0000/0000\x1b\\".to_vec()]
        );
        assert_eq!(
            r.scan(b"\x1b]12;?\x07"),
            vec![b"\x1b]12;rgb:ffff/ffff/ffff\x1b\\".to_vec()]
        );
        assert!(r.scan(b"\x1b]0;window title\x07").is_empty());
    }

    #[test]
    fn test_plain_text_and_unrelated_sequences_get_no_reply() {
        let mut r = responder();
        assert!(r.scan(b"hello world\r\n").is_empty());
        assert!(r.scan(b"\x1b[1;31mred\x1b[0m\x1b[2J\x1b[H").is_empty());
        assert!(r.scan(b"\x1b(B\x1b=").is_empty());
    }

    #[test]
    fn test_multiple_queries_in_one_chunk_are_answered_in_order() {
        let mut r = responder_at(1, 1);
        let replies = r.scan(b"abc\x1b[6nxyz\x1b[c\x1b]11;?\x07");
        assert_eq!(
            replies,
            vec![
                b"\x1b[2;2R".to_vec(),
                PRIMARY_DA_REPLY.to_vec(),
                b"\x1b]11;rgb:0000/0000/0000\x1b\\".to_vec(),
            ]
        );
    }

    #[test]
    fn test_query_split_across_calls() {
        let mut r = responder_at(2, 3);
        assert!(r.scan(b"\x1b").is_empty());
        assert!(r.scan(b"[").is_empty());
        assert!(r.scan(b"6").is_empty());
        assert_eq!(r.scan(b"n"), vec![b"\x1b[3;4R".to_vec()]);
    }

    #[test]
    fn test_string_terminator_split_across_calls() {
        let mut r = responder();
        assert!(r.scan(b"\x1b]10;?\x1b").is_empty());
        assert_eq!(r.scan(b"\\").len(), 1);
    }

    #[test]
    fn test_embedded_escape_stays_in_payload() {
        let mut r = responder();
        assert!(r.scan(b"\x1b]10;\x1bx?\x07").is_empty());
        assert!(r.scan(b"\x1b[c").len() == 1);
    }

    #[test]
    fn test_dcs_is_consumed_without_reply() {
        let mut r = responder();
        assert!(r.scan(b"\x1bP+q544e\x1b\\").is_empty());
        assert!(r.scan(b"\x1bPpayload\x07").is_empty());
        assert_eq!(r.scan(b"\x1b[c"), vec![PRIMARY_DA_REPLY.to_vec()]);
    }

    #[test]
    fn test_unexpected_byte_discards_csi() {
        let mut r = responder();
        assert!(r.scan(b"\x1b[6\nn").is_empty());
        assert_eq!(r.state, ScanState::Ground);
    }

    #[test]
    fn test_escape_inside_sequence_returns_to_ground() {
        let mut r = responder();
        // The second ESC aborts the CSI; "[6n" that follows is plain text.
        assert!(r.scan(b"\x1b[6\x1b[6n").is_empty());
        assert_eq!(r.state, ScanState::Ground);

        assert!(r.scan(b"\x1b\x1b[6n").is_empty());
        assert_eq!(r.state, ScanState::Ground);

        assert_eq!(r.scan(b"\x1b[6n").len(), 1);
    }

    #[test]
    fn test_overflow_resets_without_reply() {
        let mut r = responder();
        let mut data = b"\x1b]".to_vec();
        data.extend(std::iter::repeat_n(b'a', MAX_BUFFER + 10));
        data.push(BEL);
        assert!(r.scan(&data).is_empty());
        assert_eq!(r.state, ScanState::Ground);

        let mut csi = b"\x1b[".to_vec();
        csi.extend(std::iter::repeat_n(b'1', MAX_BUFFER + 1));
        csi.push(b'c');
        assert!(r.scan(&csi).is_empty());

        assert_eq!(r.scan(b"\x1b[6n").len(), 1);
    }

    #[test]
    fn test_cursor_accessor_is_read_at_dispatch_time() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU16, Ordering};

        let col = Arc::new(AtomicU16::new(0));
        let col_for_cursor = Arc::clone(&col);
        let mut r = QueryResponder::new(move || CursorPosition {
            row: 0,
            col: col_for_cursor.load(Ordering::SeqCst),
            visible: true,
        });

        assert!(r.scan(b"\x1b[6").is_empty());
        col.store(7, Ordering::SeqCst);
        assert_eq!(r.scan(b"n"), vec![b"\x1b[1;8R".to_vec()]);
    }

    fn scan_in_chunks(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let mut r = responder_at(3, 5);
        let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
        cuts.sort_unstable();
        let mut replies = Vec::new();
        let mut start = 0;
        for cut in cuts {
            replies.extend(r.scan(&data[start..cut]));
            start = cut;
        }
        replies.extend(r.scan(&data[start..]));
        replies
    }

    proptest! {
        #[test]
        fn prop_chunking_never_changes_replies(
            cuts in proptest::collection::vec(0usize..256, 0..12),
            filler in "[a-z \r\n]{0,16}",
        ) {
            let mut data = filler.as_bytes().to_vec();
            data.extend_from_slice(b"\x1b[6n\x1b[1mX\x1b]11;?\x1b\\\x1b[?25$p\x1b]0;t\x07\x1b[>0c");
            data.extend_from_slice(filler.as_bytes());

            let whole = responder_at(3, 5).scan(&data);
            prop_assert_eq!(whole.len(), 4);
            prop_assert_eq!(scan_in_chunks(&data, &cuts), whole);
        }

        #[test]
        fn prop_decrqm_echoes_any_mode(mode in 0u32..100_000) {
            let mut r = responder();
            let replies = r.scan(format!("\x1b[?{mode}$p").as_bytes());
            prop_assert_eq!(replies, vec![format!("\x1b[?{mode};2$y").into_bytes()]);
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut r = responder();
            let _ = r.scan(&data);
            prop_assert!(r.payload.len() <= MAX_BUFFER);
        }
    }
}
