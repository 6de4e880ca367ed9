//! Text clean-up before synthesis
//!
//! These helpers only change what gets spoken, never what is displayed.

/// Characters that render as nothing but confuse the backend
const INVISIBLE: [char; 5] = ['\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}'];

/// Normalize text for synthesis
///
/// Removes zero-width characters, maps the ideographic space to a regular
/// one, collapses whitespace runs and trims both ends.
///
/// ```
/// use application::speakable_text::normalize_text;
///
/// assert_eq!(normalize_text("  你好\u{200b}，\u{3000}世界 \n "), "你好， 世界");
/// ```
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if INVISIBLE.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}

/// Remove bracketed stage directions such as `（微笑）` or `(sighs)`
///
/// Only complete pairs are removed, so a bracket left open by a partial
/// stream does not swallow the rest of the text. Nested pairs are removed
/// together with their outer pair.
///
/// ```
/// use application::speakable_text::strip_stage_directions;
///
/// assert_eq!(strip_stage_directions("（轻声）晚安(yawns)。"), "晚安。");
/// assert_eq!(strip_stage_directions("我想说（还没说完"), "我想说（还没说完");
/// ```
pub fn strip_stage_directions(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut removed = vec![false; chars.len()];
    let mut open: Vec<(char, usize)> = Vec::new();

    for (idx, &ch) in chars.iter().enumerate() {
        match ch {
            '（' | '(' => open.push((ch, idx)),
            '）' | ')' => {
                let expected = if ch == '）' { '（' } else { '(' };
                if let Some(pos) = open.iter().rposition(|&(c, _)| c == expected) {
                    let (_, start) = open[pos];
                    open.truncate(pos);
                    removed[start..=idx].iter_mut().for_each(|r| *r = true);
                }
            },
            _ => {},
        }
    }

    chars
        .into_iter()
        .zip(removed)
        .filter_map(|(ch, gone)| (!gone).then_some(ch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_removes_zero_width_characters() {
        assert_eq!(normalize_text("a\u{200b}b\u{200c}c\u{200d}d\u{feff}"), "abcd");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("a \t\n b\u{3000}\u{3000}c"), "a b c");
    }

    #[test]
    fn normalize_of_blank_text_is_empty() {
        assert_eq!(normalize_text(" \u{3000}\u{200b}\n"), "");
    }

    #[test]
    fn strip_removes_both_bracket_styles() {
        assert_eq!(
            strip_stage_directions("(smiles) Hello（挥手）！"),
            " Hello！"
        );
    }

    #[test]
    fn strip_handles_nesting() {
        assert_eq!(strip_stage_directions("好（（笑）（笑））的"), "好的");
        assert_eq!(strip_stage_directions("a(b(c)d)e"), "ae");
    }

    #[test]
    fn strip_keeps_unbalanced_brackets() {
        assert_eq!(strip_stage_directions("右括号）在这"), "右括号）在这");
        assert_eq!(strip_stage_directions("(open"), "(open");
    }

    #[test]
    fn strip_of_plain_text_is_identity() {
        assert_eq!(strip_stage_directions("今天天气真好。"), "今天天气真好。");
    }
}
