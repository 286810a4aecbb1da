//! Counter protocol parser.

/// Parsed counter command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Report the current value to the sender.
    Output,
    /// Add a delta and broadcast.
    Incr(i64),
    /// Subtract a delta and broadcast.
    Decr(i64),
}

const OUTPUT: &[u8] = b"OUTPUT\r\n";
const INCR_PREFIX: &[u8] = b"INCR ";
const DECR_PREFIX: &[u8] = b"DECR ";
const CRLF: &[u8] = b"\r\n";

/// Parse one complete line, terminator included.
///
/// Matching is exact: case-sensitive verbs, a single space before the
/// argument, and a `\r\n` terminator. Returns `None` for anything else.
pub fn parse(line: &[u8]) -> Option<Command> {
    if line == OUTPUT {
        return Some(Command::Output);
    }
    if let Some(delta) = parse_delta(line, INCR_PREFIX) {
        return Some(Command::Incr(delta));
    }
    if let Some(delta) = parse_delta(line, DECR_PREFIX) {
        return Some(Command::Decr(delta));
    }
    None
}

/// Parse `<prefix><signed-integer>\r\n`.
fn parse_delta(line: &[u8], prefix: &[u8]) -> Option<i64> {
    let arg = line.strip_prefix(prefix)?.strip_suffix(CRLF)?;
    // str::parse accepts an optional sign followed by digits only
    std::str::from_utf8(arg).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        assert_eq!(parse(b"OUTPUT\r\n"), Some(Command::Output));
    }

    #[test]
    fn test_parse_incr_decr() {
        assert_eq!(parse(b"INCR 5\r\n"), Some(Command::Incr(5)));
        assert_eq!(parse(b"INCR -12\r\n"), Some(Command::Incr(-12)));
        assert_eq!(parse(b"INCR +7\r\n"), Some(Command::Incr(7)));
        assert_eq!(parse(b"DECR 2\r\n"), Some(Command::Decr(2)));
        assert_eq!(
            parse(b"DECR -9223372036854775808\r\n"),
            Some(Command::Decr(i64::MIN))
        );
    }

    #[test]
    fn test_terminator_must_be_crlf() {
        assert_eq!(parse(b"OUTPUT\n"), None);
        assert_eq!(parse(b"OUTPUT"), None);
        assert_eq!(parse(b"INCR 5\n"), None);
        assert_eq!(parse(b"INCR 5"), None);
    }

    #[test]
    fn test_whitespace_is_exact() {
        assert_eq!(parse(b"INCR  5\r\n"), None);
        assert_eq!(parse(b"INCR 5 \r\n"), None);
        assert_eq!(parse(b" OUTPUT\r\n"), None);
        assert_eq!(parse(b"INCR5\r\n"), None);
    }

    #[test]
    fn test_unrecognized_lines() {
        assert_eq!(parse(b"PING\r\n"), None);
        assert_eq!(parse(b"output\r\n"), None);
        assert_eq!(parse(b"incr 5\r\n"), None);
        assert_eq!(parse(b"INCR\r\n"), None);
        assert_eq!(parse(b"INCR abc\r\n"), None);
        assert_eq!(parse(b"INCR 1x\r\n"), None);
        assert_eq!(parse(b"\r\n"), None);
        assert_eq!(parse(b""), None);
    }

    #[test]
    fn test_out_of_range_delta_is_ignored() {
        assert_eq!(parse(b"INCR 9223372036854775808\r\n"), None);
        assert_eq!(
            parse(b"INCR 9223372036854775807\r\n"),
            Some(Command::Incr(i64::MAX))
        );
    }
}
