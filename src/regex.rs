//! # Regex
//!
//! Lazily compiled regular expressions for the wire grammar

use lazy_regex::{lazy_regex, Lazy, Regex};

/// Control channel reply line: `DDD-text` (continuation follows) or `DDD text` (final line)
pub static REPLY_LINE_RE: Lazy<Regex> = lazy_regex!(r"^(\d{3})([ -])(.*)$");

/// Six comma-separated decimal octets anywhere in a `227` reply
pub static PASV_PORT_RE: Lazy<Regex> =
    lazy_regex!(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})");

/// `213 YYYYMMDDhhmmss`
pub static MDTM_RE: Lazy<Regex> = lazy_regex!(r"\b(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})\b");

/// `213 <bytes>`
pub static SIZE_RE: Lazy<Regex> = lazy_regex!(r"^\s*(\d+)\s*$");

/// `PERM LINKS USER GROUP SIZE MON DAY (HH:MM|YEAR) NAME`; exactly one space precedes the name
pub static LS_LINE_RE: Lazy<Regex> = lazy_regex!(
    r"^([d-])(\S{9})\S*\s+(\d+)\s+(\S+)\s+(\S+)\s+(\d+)\s+([A-Za-z]{3})\s+(\d{1,2})\s+(\d{1,2}:\d{2}|\d{4})\s(.+)$"
);
