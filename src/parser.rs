/// One command segment of an input line, as split on `;` and `&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment text with surrounding whitespace trimmed.
    pub text: String,
    /// True when the segment was terminated by `&`.
    pub background: bool,
}

/// Checks an input line against the shell grammar:
///
/// ```text
/// shell_cmd := group (('&' | ';') group)* '&'?
/// group     := atomic ('|' atomic)*
/// atomic    := name (name | '<' name | ('>' | '>>') name)*
/// name      := [^ whitespace | & > < ;]+
/// ```
///
/// An empty (or all-whitespace) line is valid.
pub fn is_valid(line: &str) -> bool {
    let mut checker = Checker {
        input: line.as_bytes(),
        pos: 0,
    };
    checker.skip_whitespace();
    if checker.at_end() {
        return true;
    }
    let ok = checker.shell_cmd();
    checker.skip_whitespace();
    ok && checker.at_end()
}

struct Checker<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Checker<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn shell_cmd(&mut self) -> bool {
        if !self.group() {
            return false;
        }
        self.skip_whitespace();
        while let Some(sep @ (b'&' | b';')) = self.peek() {
            self.pos += 1;
            self.skip_whitespace();
            if sep == b'&' && self.at_end() {
                return true;
            }
            if !self.group() {
                return false;
            }
            self.skip_whitespace();
        }
        true
    }

    fn group(&mut self) -> bool {
        if !self.atomic() {
            return false;
        }
        self.skip_whitespace();
        while self.peek() == Some(b'|') {
            self.pos += 1;
            self.skip_whitespace();
            if !self.atomic() {
                return false;
            }
            self.skip_whitespace();
        }
        true
    }

    fn atomic(&mut self) -> bool {
        if !self.name() {
            return false;
        }
        self.skip_whitespace();
        while !matches!(self.peek(), None | Some(b'|' | b'&' | b';')) {
            let start = self.pos;
            if self.name() || self.input_redirect() || self.output_redirect() {
                self.skip_whitespace();
            } else {
                self.pos = start;
                break;
            }
        }
        true
    }

    fn input_redirect(&mut self) -> bool {
        if self.peek() != Some(b'<') {
            return false;
        }
        self.pos += 1;
        self.skip_whitespace();
        self.name()
    }

    fn output_redirect(&mut self) -> bool {
        if self.peek() != Some(b'>') {
            return false;
        }
        self.pos += 1;
        if self.peek() == Some(b'>') {
            self.pos += 1;
        }
        self.skip_whitespace();
        self.name()
    }

    fn name(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if !is_special(c) && !c.is_ascii_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }
}

fn is_special(c: u8) -> bool {
    matches!(c, b'|' | b'&' | b'>' | b'<' | b';')
}

/// Splits `text` on every character accepted by `is_sep` that is not inside
/// single or double quotes. Each piece is returned with the separator that
/// ended it (`None` for the final piece).
fn split_unquoted(text: &str, is_sep: impl Fn(char) -> bool) -> Vec<(&str, Option<char>)> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if is_sep(ch) => {
                pieces.push((&text[start..i], Some(ch)));
                start = i + ch.len_utf8();
            }
            None => {}
        }
    }
    pieces.push((&text[start..], None));
    pieces
}

/// Splits an input line into command segments on unquoted `;` and `&`.
/// Empty segments (for example after a trailing `&`) are dropped.
pub fn split_segments(line: &str) -> Vec<Segment> {
    split_unquoted(line, |c| c == ';' || c == '&')
        .into_iter()
        .filter_map(|(text, sep)| {
            let text = text.trim();
            (!text.is_empty()).then(|| Segment {
                text: text.to_string(),
                background: sep == Some('&'),
            })
        })
        .collect()
}

/// Splits a segment into its pipeline stages on unquoted `|`.
pub fn split_stages(segment: &str) -> Vec<&str> {
    split_unquoted(segment, |c| c == '|')
        .into_iter()
        .map(|(text, _)| text.trim())
        .collect()
}

/// Splits a command into whitespace-separated words. Quotes are not
/// interpreted here.
pub fn split_words(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seg(text: &str, background: bool) -> Segment {
        Segment {
            text: text.to_string(),
            background,
        }
    }

    #[test]
    fn accepts_grammar() {
        for line in [
            "",
            "   ",
            "ls -l",
            "echo hi > out.txt; cat out.txt",
            "sleep 5 &",
            "cat <in.txt | sort | uniq >>log.txt & ls",
            "a | b | c | d | e",
            "sort < in > out",
        ] {
            assert!(is_valid(line), "rejected {:?}", line);
        }
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in [
            "| ls",
            "ls |",
            "ls | | wc",
            "cat <",
            "echo >",
            "; ls",
            "ls ;",
            "ls && pwd",
            "ls & &",
            "echo > > out",
        ] {
            assert!(!is_valid(line), "accepted {:?}", line);
        }
    }

    #[test]
    fn splits_on_separators() {
        assert_eq!(
            split_segments("echo hi > out.txt; cat out.txt"),
            vec![seg("echo hi > out.txt", false), seg("cat out.txt", false)]
        );
        assert_eq!(
            split_segments("sleep 5 & ls ; pwd &"),
            vec![seg("sleep 5", true), seg("ls", false), seg("pwd", true)]
        );
    }

    #[test]
    fn trailing_ampersand_is_not_an_extra_segment() {
        assert_eq!(split_segments("sleep 5 &"), vec![seg("sleep 5", true)]);
        assert!(split_segments("   ").is_empty());
    }

    #[test]
    fn quoted_separators_do_not_split() {
        assert_eq!(
            split_segments("echo 'a;b' & echo \"c&d\"; x"),
            vec![
                seg("echo 'a;b'", true),
                seg("echo \"c&d\"", false),
                seg("x", false),
            ]
        );
        assert_eq!(split_stages("grep '|' f | wc -l"), vec!["grep '|' f", "wc -l"]);
    }

    #[test]
    fn stages_and_words() {
        assert_eq!(split_stages("cat f|sort | uniq"), vec!["cat f", "sort", "uniq"]);
        assert_eq!(split_stages("ls"), vec!["ls"]);
        assert_eq!(split_words("  grep\t-n  foo "), vec!["grep", "-n", "foo"]);
        assert!(split_words("").is_empty());
    }
}
