//! Plain-text rendering of RTF documents.
//!
//! Handles groups, paragraph/line/tab control words, `\'hh` escapes
//! (Windows-1252), `\uN` Unicode escapes with `\ucN` fallback skipping, and
//! drops ignorable destinations (`\*`, font/colour/style tables, metadata,
//! pictures, fields instructions).

use super::ExtractError;

/// Destinations whose contents are never document text.
const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "object",
    "listtable",
    "listoverridetable",
    "revtbl",
    "rsidtbl",
    "generator",
    "xmlnstbl",
    "themedata",
    "colorschememapping",
    "datastore",
    "latentstyles",
    "fldinst",
    "filetbl",
    "header",
    "headerl",
    "headerr",
    "headerf",
    "footer",
    "footerl",
    "footerr",
    "footerf",
];

#[derive(Clone, Copy)]
struct GroupState {
    skip: bool,
    /// Fallback characters following a `\uN` escape.
    uc: usize,
}

/// Converts RTF source into plain text.
pub fn rtf_to_text(src: &str) -> Result<String, ExtractError> {
    if !src.trim_start().starts_with("{\\rtf") {
        return Err(ExtractError::Rtf("missing {\\rtf header".to_string()));
    }

    let mut out = String::new();
    let mut stack: Vec<GroupState> = Vec::new();
    let mut state = GroupState { skip: false, uc: 1 };
    let mut pending_skip = 0usize;
    let mut chars = src.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                stack.push(state);
            }
            '}' => match stack.pop() {
                Some(prev) => state = prev,
                None => return Err(ExtractError::Rtf("unbalanced closing brace".to_string())),
            },
            '\\' => {
                let Some(&next) = chars.peek() else { break };
                if next.is_ascii_alphabetic() {
                    let mut word = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphabetic() {
                            word.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let mut param = String::new();
                    if chars.peek() == Some(&'-') {
                        param.push('-');
                        chars.next();
                    }
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_digit() {
                            param.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if chars.peek() == Some(&' ') {
                        chars.next();
                    }
                    let param = param.parse::<i32>().ok();
                    apply_control_word(&word, param, &mut state, &mut pending_skip, &mut out);
                } else {
                    chars.next();
                    match next {
                        '*' => state.skip = true,
                        '\'' => {
                            let hex: String = chars.by_ref().take(2).collect();
                            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                                emit(decode_cp1252(byte), &state, &mut pending_skip, &mut out);
                            }
                        }
                        '\\' | '{' | '}' => emit(next, &state, &mut pending_skip, &mut out),
                        '~' => emit('\u{a0}', &state, &mut pending_skip, &mut out),
                        '_' => emit('-', &state, &mut pending_skip, &mut out),
                        '\n' | '\r' => emit('\n', &state, &mut pending_skip, &mut out),
                        _ => {}
                    }
                }
            }
            '\n' | '\r' => {}
            other => emit(other, &state, &mut pending_skip, &mut out),
        }
    }

    Ok(out)
}

fn emit(ch: char, state: &GroupState, pending_skip: &mut usize, out: &mut String) {
    if *pending_skip > 0 {
        *pending_skip -= 1;
        return;
    }
    if !state.skip {
        out.push(ch);
    }
}

fn apply_control_word(
    word: &str,
    param: Option<i32>,
    state: &mut GroupState,
    pending_skip: &mut usize,
    out: &mut String,
) {
    if SKIPPED_DESTINATIONS.contains(&word) {
        state.skip = true;
        return;
    }
    let literal = match word {
        "par" | "line" | "sect" | "page" | "row" => Some('\n'),
        "tab" | "cell" => Some('\t'),
        "emdash" => Some('\u{2014}'),
        "endash" => Some('\u{2013}'),
        "bullet" => Some('\u{2022}'),
        "lquote" => Some('\u{2018}'),
        "rquote" => Some('\u{2019}'),
        "ldblquote" => Some('\u{201c}'),
        "rdblquote" => Some('\u{201d}'),
        "emspace" | "enspace" | "qmspace" => Some(' '),
        "uc" => {
            state.uc = param.unwrap_or(1).max(0) as usize;
            None
        }
        "u" => {
            if let Some(code) = param {
                // values above 32767 are written as negative 16-bit numbers
                let code = if code < 0 { code + 65_536 } else { code };
                let ch = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\u{fffd}');
                if !state.skip {
                    out.push(ch);
                }
                *pending_skip = state.uc;
            }
            None
        }
        _ => None,
    };
    if let Some(ch) = literal {
        if !state.skip {
            out.push(ch);
        }
    }
}

fn decode_cp1252(byte: u8) -> char {
    const HIGH: [char; 32] = [
        '\u{20ac}', '\u{fffd}', '\u{201a}', '\u{0192}', '\u{201e}', '\u{2026}', '\u{2020}',
        '\u{2021}', '\u{02c6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{fffd}',
        '\u{017d}', '\u{fffd}', '\u{fffd}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}',
        '\u{2022}', '\u{2013}', '\u{2014}', '\u{02dc}', '\u{2122}', '\u{0161}', '\u{203a}',
        '\u{0153}', '\u{fffd}', '\u{017e}', '\u{0178}',
    ];
    match byte {
        0x80..=0x9f => HIGH[(byte - 0x80) as usize],
        other => other as char,
    }
}
