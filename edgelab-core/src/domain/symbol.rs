//! Ticker symbol validation.

/// Longest accepted ticker.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Whether `symbol` is safe to use as a ticker and as a file-name component.
///
/// Accepts ASCII letters, digits and `. - _ ^ =` (index and futures tickers
/// such as `^GSPC` or `ES=F`). Rejects anything that could name a path:
/// separators, a leading dot, or `..`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && !symbol.starts_with('.')
        && !symbol.contains("..")
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_tickers() {
        for s in ["SPY", "BRK.B", "^GSPC", "ES=F", "BTC-USD", "msft"] {
            assert!(is_valid_symbol(s), "{s}");
        }
    }

    #[test]
    fn rejects_path_like_input() {
        for s in ["", "../etc/passwd", "..", ".hidden", "a/b", "a\\b", "SPY\0", "A B", "C:"] {
            assert!(!is_valid_symbol(s), "{s:?}");
        }
        assert!(!is_valid_symbol(&"X".repeat(MAX_SYMBOL_LEN + 1)));
    }
}
