//! Token filter that hides `<think>...</think>` reasoning from streamed replies.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Filter state carried from one token to the next within a single reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskingState {
    pub in_think: bool,
    /// Tail of the previous token that may be the start of a marker split
    /// across tokens (e.g. `"<thi"`). Empty unless such a fragment is pending.
    pub carry: String,
}

impl MaskingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn masked() -> Self {
        Self {
            in_think: true,
            carry: String::new(),
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| text.ends_with(&marker[..k]))
        .unwrap_or(0)
}

/// Split `text` into what can be released now and a held-back partial marker
fn hold_back(text: &str, marker: &str) -> (String, String) {
    let cut = text.len() - partial_marker_len(text, marker);
    (text[..cut].to_string(), text[cut..].to_string())
}

/// Map one raw token to its visible part and the next state.
///
/// A token may open and close any number of regions. Opening markers met
/// while already masked are ignored until a close is seen.
pub fn filter(token: &str, state: &MaskingState) -> (String, MaskingState) {
    let text = format!("{}{}", state.carry, token);
    scan(&text, state.in_think)
}

fn scan(text: &str, in_think: bool) -> (String, MaskingState) {
    if in_think {
        return match text.find(THINK_CLOSE) {
            Some(pos) => scan(&text[pos + THINK_CLOSE.len()..], false),
            None => {
                let (_, carry) = hold_back(text, THINK_CLOSE);
                (
                    String::new(),
                    MaskingState {
                        in_think: true,
                        carry,
                    },
                )
            }
        };
    }

    match text.find(THINK_OPEN) {
        Some(pos) => {
            let (rest, state) = scan(&text[pos + THINK_OPEN.len()..], true);
            (format!("{}{}", &text[..pos], rest), state)
        }
        None => {
            let (visible, carry) = hold_back(text, THINK_OPEN);
            (
                visible,
                MaskingState {
                    in_think: false,
                    carry,
                },
            )
        }
    }
}

/// Release whatever is still held back once the stream has ended.
/// A pending fragment inside a masked region stays hidden.
pub fn finish(state: &MaskingState) -> String {
    if state.in_think {
        String::new()
    } else {
        state.carry.clone()
    }
}
