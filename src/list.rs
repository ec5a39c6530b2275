//! # List
//!
//! Parser and renderer for the UNIX `ls -l` style lines returned by `LIST`.
//!
//! ```rust
//! use ftpgate::list::DirEntry;
//!
//! let entry: DirEntry = "drwxr-x---  35 ftp      ftp          8192 Mar 11 22:14 .."
//!     .parse()
//!     .unwrap();
//! assert!(entry.is_dir());
//! assert_eq!(entry.name(), "..");
//! assert_eq!(entry.length(), 8192);
//! ```
//!
//! Listings print a clock time instead of a year for recently modified entries;
//! such lines are assigned the current year when parsed, and entries of the current
//! year are rendered with a clock time. Rendering then parsing an entry of another
//! year therefore loses its time of day, and parsing then rendering a line whose
//! year differs from the current one changes its layout.
//!
//! Columns are separated by whitespace, so an entry only renders to a parsable line when
//! its user and group are non-empty and contain no whitespace, and its name is non-empty.
//! Names keep inner and leading spaces but lose trailing whitespace.

use crate::regex::LS_LINE_RE;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Owner and group columns are cut to this many characters when rendering
const NAME_COLUMN_WIDTH: usize = 8;

/// Errors raised while parsing a listing line
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Syntax error: invalid line")]
    SyntaxError,
    #[error("Invalid date")]
    InvalidDate,
    #[error("Bad file size")]
    BadSize,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    is_dir: bool,
    user: String,
    group: String,
    length: u64,
    mtime: NaiveDateTime,
    name: String,
}

impl DirEntry {
    pub fn new(
        is_dir: bool,
        user: impl Into<String>,
        group: impl Into<String>,
        length: u64,
        mtime: NaiveDateTime,
        name: impl Into<String>,
    ) -> Self {
        Self {
            is_dir,
            user: user.into(),
            group: group.into(),
            length,
            mtime,
            name: name.into(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn mtime(&self) -> NaiveDateTime {
        self.mtime
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse a listing line, resolving lines without a year to the current local year
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        Self::parse_in_year(line, Local::now().year())
    }

    /// Render the entry as a fixed-column listing line
    pub fn to_line(&self) -> String {
        self.to_line_in_year(Local::now().year())
    }

    pub(crate) fn parse_in_year(line: &str, current_year: i32) -> Result<Self, ParseError> {
        let caps = LS_LINE_RE
            .captures(line.trim_end())
            .ok_or(ParseError::SyntaxError)?;

        let is_dir = &caps[1] == "d";
        let length = caps[6].parse::<u64>().map_err(|_| ParseError::BadSize)?;

        let month = MONTHS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(&caps[7]))
            .ok_or(ParseError::InvalidDate)? as u32
            + 1;
        let day = caps[8].parse::<u32>().map_err(|_| ParseError::InvalidDate)?;

        let year_or_time = &caps[9];
        let (year, time) = match year_or_time.split_once(':') {
            Some((hour, minute)) => {
                let hour = hour.parse::<u32>().map_err(|_| ParseError::InvalidDate)?;
                let minute = minute.parse::<u32>().map_err(|_| ParseError::InvalidDate)?;
                let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or(ParseError::InvalidDate)?;
                (current_year, time)
            }
            None => {
                let year = year_or_time.parse::<i32>().map_err(|_| ParseError::InvalidDate)?;
                (year, NaiveTime::MIN)
            }
        };

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or(ParseError::InvalidDate)?;

        Ok(Self {
            is_dir,
            user: caps[4].to_string(),
            group: caps[5].to_string(),
            length,
            mtime: NaiveDateTime::new(date, time),
            name: caps[10].to_string(),
        })
    }

    pub(crate) fn to_line_in_year(&self, current_year: i32) -> String {
        let perms = if self.is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
        let month = MONTHS[self.mtime.month0() as usize];
        let year_or_time = if self.mtime.year() == current_year {
            format!("{:02}:{:02}", self.mtime.hour(), self.mtime.minute())
        } else {
            self.mtime.year().to_string()
        };

        format!(
            "{perms} {:>3} {:<w$} {:<w$} {:>12} {month} {:>2} {year_or_time:>5} {}",
            1,
            truncate(&self.user),
            truncate(&self.group),
            self.length,
            self.mtime.day(),
            self.name,
            w = NAME_COLUMN_WIDTH,
        )
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(NAME_COLUMN_WIDTH).collect()
}

impl FromStr for DirEntry {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}
