use unicode_script::{Script, UnicodeScript};

pub fn is_cjk_char(ch: char) -> bool {
	matches!(ch.script(), Script::Han | Script::Hiragana | Script::Katakana | Script::Hangul)
}

pub fn contains_cjk(input: &str) -> bool {
	input.chars().any(is_cjk_char)
}
