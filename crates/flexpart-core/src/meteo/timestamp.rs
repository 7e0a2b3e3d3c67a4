//! Timestamp parsing for product file names.
//!
//! Product names are `<prefix><digits>`; the digits follow one of six compact
//! layouts. Layouts are tried in [`SuffixFormat::PARSE_ORDER`] and the first
//! one that yields a valid calendar date wins. Two layouts share each width
//! (8 and 10 digits), so the order is significant: `24010112` reads as
//! `YYYYMMDD` (year 2401) before `YYMMDDHH` is tried.

use chrono::{NaiveDate, NaiveDateTime};

/// Two-digit years below this map to 20YY, the rest to 19YY.
pub const TWO_DIGIT_YEAR_PIVOT: u32 = 50;

/// Layout of a compact timestamp suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuffixFormat {
    /// `YYYYMMDDHH`
    FullYearHour,
    /// `YYYYMMDD`
    FullYearDay,
    /// `YYYYMMDDHHMM`
    FullYearMinute,
    /// `YYMMDDHH`
    ShortYearHour,
    /// `YYMMDD`
    ShortYearDay,
    /// `YYMMDDHHMM`
    ShortYearMinute,
}

impl SuffixFormat {
    pub const PARSE_ORDER: [SuffixFormat; 6] = [
        SuffixFormat::FullYearHour,
        SuffixFormat::FullYearDay,
        SuffixFormat::FullYearMinute,
        SuffixFormat::ShortYearHour,
        SuffixFormat::ShortYearDay,
        SuffixFormat::ShortYearMinute,
    ];

    pub fn pattern(&self) -> &'static str {
        match self {
            SuffixFormat::FullYearHour => "YYYYMMDDHH",
            SuffixFormat::FullYearDay => "YYYYMMDD",
            SuffixFormat::FullYearMinute => "YYYYMMDDHHMM",
            SuffixFormat::ShortYearHour => "YYMMDDHH",
            SuffixFormat::ShortYearDay => "YYMMDD",
            SuffixFormat::ShortYearMinute => "YYMMDDHHMM",
        }
    }

    fn year_digits(&self) -> usize {
        match self {
            SuffixFormat::FullYearHour
            | SuffixFormat::FullYearDay
            | SuffixFormat::FullYearMinute => 4,
            _ => 2,
        }
    }

    fn has_hour(&self) -> bool {
        !matches!(self, SuffixFormat::FullYearDay | SuffixFormat::ShortYearDay)
    }

    fn has_minute(&self) -> bool {
        matches!(
            self,
            SuffixFormat::FullYearMinute | SuffixFormat::ShortYearMinute
        )
    }

    /// Parse `suffix` strictly against this layout.
    ///
    /// The suffix must be exactly as long as the layout and all ASCII digits,
    /// and the fields must form a real calendar date and time.
    pub fn parse(&self, suffix: &str) -> Option<NaiveDateTime> {
        if suffix.len() != self.pattern().len() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let field = |from: usize| suffix[from..from + 2].parse::<u32>().ok();

        let year_end = self.year_digits();
        let year = if year_end == 4 {
            suffix[..4].parse::<i32>().ok()?
        } else {
            window_two_digit_year(field(0)?)
        };
        let month = field(year_end)?;
        let day = field(year_end + 2)?;
        let hour = if self.has_hour() { field(year_end + 4)? } else { 0 };
        let minute = if self.has_minute() {
            field(year_end + 6)?
        } else {
            0
        };

        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
    }
}

/// Map a two-digit year onto a century: `00..=49` → 2000s, `50..=99` → 1900s.
pub fn window_two_digit_year(yy: u32) -> i32 {
    if yy < TWO_DIGIT_YEAR_PIVOT {
        2000 + yy as i32
    } else {
        1900 + yy as i32
    }
}

/// Try every layout in order and return the first match.
pub fn parse_suffix(suffix: &str) -> Option<(NaiveDateTime, SuffixFormat)> {
    SuffixFormat::PARSE_ORDER
        .iter()
        .find_map(|format| format.parse(suffix).map(|ts| (ts, *format)))
}

/// Timestamp encoded in `name` after `prefix`, if any layout matches.
pub fn parse_product_timestamp(name: &str, prefix: &str) -> Option<NaiveDateTime> {
    let suffix = name.strip_prefix(prefix)?;
    parse_suffix(suffix).map(|(ts, _)| ts)
}
