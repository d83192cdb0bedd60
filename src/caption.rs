/// Greedy word wrap by character count. Words longer than `width` (or text
/// without spaces, as in CJK) are broken at the column limit.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while !chars.is_empty() {
            let sep = usize::from(current_len > 0);
            let room = width.saturating_sub(current_len + sep);
            if chars.len() <= room {
                if sep == 1 {
                    current.push(' ');
                }
                current.extend(chars.iter());
                current_len += sep + chars.len();
                chars.clear();
            } else if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            } else {
                let rest = chars.split_off(width);
                current.extend(chars.iter());
                lines.push(std::mem::take(&mut current));
                chars = rest;
            }
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(
            wrap("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
    }

    #[test]
    fn breaks_long_runs_without_spaces() {
        assert_eq!(wrap("一二三四五六七", 3), vec!["一二三", "四五六", "七"]);
        assert_eq!(wrap("ab abcdefg", 4), vec!["ab", "abcd", "efg"]);
    }

    #[test]
    fn blank_text_has_no_lines() {
        assert!(wrap("   \n ", 8).is_empty());
    }
}
