use crate::language::LanguageFamily;

/// Single characters that never count as a line of code on their own
pub const TRIVIAL_PUNCTUATION: &[char] = &['{', '}', '[', ']', '(', ')', ';', ','];

/// Decide whether a raw line counts toward the meaningful-lines metric.
///
/// Unknown language tags get no comment filtering.
pub fn is_meaningful(line: &str, language_tag: &str) -> bool {
    is_meaningful_in(line, LanguageFamily::from_tag(language_tag))
}

fn is_meaningful_in(line: &str, family: LanguageFamily) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    let mut chars = trimmed.chars();
    if let (Some(only), None) = (chars.next(), chars.next()) {
        if TRIVIAL_PUNCTUATION.contains(&only) {
            return false;
        }
    }

    !family
        .comment_prefixes()
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

/// Split text into lines the way editors report line counts.
///
/// A trailing newline yields a final empty line, so `"a\n"` has two lines.
pub fn split_lines(text: &str) -> std::str::Split<'_, char> {
    text.split('\n')
}

/// Count meaningful lines in a full text snapshot
pub fn count_meaningful_lines(text: &str, language_tag: &str) -> usize {
    let family = LanguageFamily::from_tag(language_tag);
    split_lines(text)
        .filter(|line| is_meaningful_in(line, family))
        .count()
}
