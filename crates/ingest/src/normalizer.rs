use regex::Regex;

/// Clean raw extracted text: collapse whitespace runs to a single space,
/// strip non-printable characters, trim the ends.
///
/// Total and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let printable: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    let whitespace = Regex::new(r"\s+").unwrap();
    whitespace.replace_all(&printable, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("a  b\t\tc\n\nd"), "a b c d");
    }

    #[test]
    fn strips_non_printable_characters() {
        assert_eq!(normalize("he\u{0}llo\u{7} world"), "hello world");
    }

    #[test]
    fn trims_ends() {
        assert_eq!(normalize("   padded   "), "padded");
    }

    #[test]
    fn is_idempotent() {
        let inputs = ["", "   ", "plain text", "a\u{1}\u{2}  b\r\nc", "¡unicode · text!"];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("\u{0}\u{1}"), "");
    }
}
