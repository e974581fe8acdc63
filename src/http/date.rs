use std::time::{SystemTime, UNIX_EPOCH};

const DAY_NAMES: [&[u8; 3]; 7] = [b"Sun", b"Mon", b"Tue", b"Wed", b"Thu", b"Fri", b"Sat"];

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// A calendar instant in GMT, as carried by the [HTTP-date][rfc] grammar.
///
/// [rfc]: <https://datatracker.ietf.org/doc/html/rfc9110#section-5.6.7>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpDate {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

/// Error when parsing an HTTP-date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateError(&'static str);

impl std::error::Error for DateError {}

impl std::fmt::Display for DateError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl HttpDate {
    /// Create a date from calendar fields, returns `None` if any field is out of range.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<HttpDate> {
        let valid = (1..=9999).contains(&year)
            && (1..=12).contains(&month)
            && day >= 1
            && day <= days_in_month(year, month)
            && hour < 24
            && minute < 60
            && second < 60;
        valid.then_some(HttpDate { year, month, day, hour, minute, second })
    }

    /// Current time.
    #[inline]
    pub fn now() -> HttpDate {
        HttpDate::from_system_time(SystemTime::now())
    }

    /// Convert system time, times before the epoch clamp to the epoch and times after year 9999
    /// clamp to its last second.
    pub fn from_system_time(time: SystemTime) -> HttpDate {
        const MAX_SECS: u64 = 253402300799;

        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_secs())
            .unwrap_or(0)
            .min(MAX_SECS);

        let days = (secs / 86400) as i64;
        let secs_of_day = secs % 86400;
        let (year, month, day) = civil_from_days(days);

        HttpDate {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (secs_of_day / 3600) as u8,
            minute: (secs_of_day % 3600 / 60) as u8,
            second: (secs_of_day % 60) as u8,
        }
    }

    /// Seconds since the unix epoch, negative for earlier dates.
    pub fn unix_timestamp(&self) -> i64 {
        let days = days_from_civil(self.year as i64, self.month as i64, self.day as i64);
        days * 86400 + self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn second(&self) -> u8 {
        self.second
    }

    /// Parse any of the three HTTP-date formats:
    ///
    /// - IMF-fixdate: `Sun, 06 Nov 1994 08:49:37 GMT`
    /// - RFC 850: `Sunday, 06-Nov-94 08:49:37 GMT`
    /// - asctime: `Sun Nov  6 08:49:37 1994`
    ///
    /// The day name is not checked against the date.
    pub fn parse(value: &str) -> Result<HttpDate, DateError> {
        let value = value.trim();

        let Some((_, after_comma)) = value.split_once(',') else {
            return parse_asctime(value);
        };

        let parts = after_comma.split_whitespace().collect::<Vec<_>>();

        match parts[..] {
            [date, time, gmt] if gmt.eq_ignore_ascii_case("GMT") && date.contains('-') => {
                let mut pieces = date.split('-');
                let (Some(day), Some(month), Some(year), None) =
                    (pieces.next(), pieces.next(), pieces.next(), pieces.next())
                else {
                    return Err(DateError("invalid date component"));
                };
                let year = number(year)?;
                let year = match year {
                    0..=49 => year + 2000,
                    50..=99 => year + 1900,
                    _ => year,
                };
                build(year, month, number(day)?, time)
            }
            [day, month, year, time, gmt] if gmt.eq_ignore_ascii_case("GMT") => {
                build(number(year)?, month, number(day)?, time)
            }
            _ => Err(DateError("unrecognized date format")),
        }
    }

    /// Format as IMF-fixdate, e.g: `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn to_bytes(&self) -> [u8; 29] {
        let mut buf: [u8; 29] = *b"ddd, 00 mmm 0000 00:00:00 GMT";

        let days = days_from_civil(self.year as i64, self.month as i64, self.day as i64);
        let wday = (days + 4).rem_euclid(7) as usize;
        buf[..3].copy_from_slice(DAY_NAMES[wday]);

        put2(&mut buf[5..7], self.day);

        let month = MONTH_NAMES[self.month as usize - 1].as_bytes();
        buf[8] = month[0].to_ascii_uppercase();
        buf[9..11].copy_from_slice(&month[1..]);

        let year = self.year;
        buf[12] = b'0' + (year / 1000) as u8;
        buf[13] = b'0' + (year / 100 % 10) as u8;
        buf[14] = b'0' + (year / 10 % 10) as u8;
        buf[15] = b'0' + (year % 10) as u8;

        put2(&mut buf[17..19], self.hour);
        put2(&mut buf[20..22], self.minute);
        put2(&mut buf[23..25], self.second);

        buf
    }
}

impl std::fmt::Display for HttpDate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let bytes = self.to_bytes();
        // the buffer is built from ASCII only
        f.write_str(str::from_utf8(&bytes).map_err(|_| std::fmt::Error)?)
    }
}

// ===== Parsing =====

fn parse_asctime(value: &str) -> Result<HttpDate, DateError> {
    // Sun Nov  6 08:49:37 1994
    if value.len() != 24 || !value.is_ascii() {
        return Err(DateError("invalid asctime length"));
    }
    let day = value[8..10].replace(' ', "0");
    let year = number(&value[20..24])?;
    build(year, &value[4..7], number(&day)?, &value[11..19])
}

fn build(year: u32, month: &str, day: u32, time: &str) -> Result<HttpDate, DateError> {
    let mut pieces = time.split(':');
    let (Some(hour), Some(minute), Some(second), None) =
        (pieces.next(), pieces.next(), pieces.next(), pieces.next())
    else {
        return Err(DateError("invalid time component"));
    };

    let month = MONTH_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(month))
        .ok_or(DateError("invalid month"))?;

    let narrow = |n: u32| u8::try_from(n).map_err(|_| DateError("date field out of range"));

    HttpDate::new(
        u16::try_from(year).map_err(|_| DateError("year out of range"))?,
        month as u8 + 1,
        narrow(day)?,
        narrow(number(hour)?)?,
        narrow(number(minute)?)?,
        narrow(number(second)?)?,
    )
    .ok_or(DateError("date field out of range"))
}

fn number(digits: &str) -> Result<u32, DateError> {
    if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError("invalid number"));
    }
    digits.parse().map_err(|_| DateError("invalid number"))
}

// ===== Calendar =====

fn put2(buf: &mut [u8], value: u8) {
    buf[0] = b'0' + value / 10;
    buf[1] = b'0' + value % 10;
}

fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 in the proleptic gregorian calendar.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};
    use super::HttpDate;

    fn httpdate(time: std::time::SystemTime) -> [u8; 29] {
        HttpDate::from_system_time(time).to_bytes()
    }

    #[test]
    fn test_httpdate() {
        let d = UNIX_EPOCH;
        assert_eq!(str::from_utf8(&httpdate(d)), Ok("Thu, 01 Jan 1970 00:00:00 GMT"));
        let d = UNIX_EPOCH + Duration::from_secs(1475419451);
        assert_eq!(str::from_utf8(&httpdate(d)), Ok("Sun, 02 Oct 2016 14:44:11 GMT"));
        let d = UNIX_EPOCH + Duration::from_secs(951782400);
        assert_eq!(str::from_utf8(&httpdate(d)), Ok("Tue, 29 Feb 2000 00:00:00 GMT"));
    }

    #[test]
    fn test_parse_formats() {
        let imf = HttpDate::parse("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        let rfc850 = HttpDate::parse("Sunday, 06-Nov-94 08:49:37 GMT").unwrap();
        let asctime = HttpDate::parse("Sun Nov  6 08:49:37 1994").unwrap();

        assert_eq!(imf.unix_timestamp(), 784111777);
        assert_eq!(imf, rfc850);
        assert_eq!(imf, asctime);
        assert_eq!(imf.to_string(), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_parse_two_digit_year() {
        let d = HttpDate::parse("Friday, 01-Jan-49 00:00:00 GMT").unwrap();
        assert_eq!(d.year(), 2049);
        assert_eq!(d.unix_timestamp(), 2493072000);
        let d = HttpDate::parse("Sunday, 01-Jan-50 00:00:00 GMT").unwrap();
        assert_eq!(d.year(), 1950);
        assert_eq!(d.unix_timestamp(), -631152000);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(HttpDate::parse("").is_err());
        assert!(HttpDate::parse("yesterday").is_err());
        assert!(HttpDate::parse("Sun, 06 Foo 1994 08:49:37 GMT").is_err());
        assert!(HttpDate::parse("Sun, 31 Feb 1994 08:49:37 GMT").is_err());
        assert!(HttpDate::parse("Sun, 06 Nov 1994 25:49:37 GMT").is_err());
        assert!(HttpDate::parse("Sun, 06 Nov 1994 08:49 GMT").is_err());
        assert!(HttpDate::parse("Sun, 06 Nov 1994 08:49:37 UTC").is_err());
        assert!(HttpDate::parse("Sun Nov 6 08:49:37 1994").is_err());
    }
}
