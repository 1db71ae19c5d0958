//! Dutch collection calendar.
//!
//! SEPA collections must land on bank business days. Weekends and Dutch
//! public holidays roll forward to the next business day before a batch is
//! created.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Easter Sunday (Gregorian) via the Anonymous Gregorian algorithm.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap()
}

/// Dutch public holidays observed for bank processing in `year`.
///
/// King's Day shifts to April 26 when April 27 falls on a Sunday.
/// Liberation Day is treated as a bank holiday every year.
pub fn dutch_holidays(year: i32) -> Vec<NaiveDate> {
    let ymd = |m: u32, d: u32| NaiveDate::from_ymd_opt(year, m, d).unwrap();

    let kings_day = {
        let april_27 = ymd(4, 27);
        if april_27.weekday() == Weekday::Sun {
            ymd(4, 26)
        } else {
            april_27
        }
    };

    let easter = easter_sunday(year);

    vec![
        ymd(1, 1),                     // New Year
        easter - Duration::days(2),    // Good Friday
        easter + Duration::days(1),    // Easter Monday
        kings_day,                     // King's Day
        ymd(5, 5),                     // Liberation Day
        easter + Duration::days(39),   // Ascension Day
        easter + Duration::days(50),   // Whit Monday
        ymd(12, 25),                   // Christmas Day
        ymd(12, 26),                   // Boxing Day
    ]
}

/// Whether `date` is a bank business day in the Netherlands.
pub fn is_business_day(date: NaiveDate) -> bool {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    !dutch_holidays(date.year()).contains(&date)
}

/// Roll a requested collection date forward to the next business day.
///
/// Returns `date` unchanged when it already is one.
pub fn next_collection_date(date: NaiveDate) -> NaiveDate {
    let mut d = date;
    while !is_business_day(d) {
        d = d.succ_opt().unwrap();
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn easter_2025_is_april_20() {
        assert_eq!(easter_sunday(2025), ymd(2025, 4, 20));
    }

    #[test]
    fn holidays_2025_match_published_calendar() {
        let holidays = dutch_holidays(2025);
        assert!(holidays.contains(&ymd(2025, 4, 18))); // Good Friday
        assert!(holidays.contains(&ymd(2025, 4, 21))); // Easter Monday
        assert!(holidays.contains(&ymd(2025, 4, 26))); // King's Day (27th is a Sunday)
        assert!(holidays.contains(&ymd(2025, 5, 29))); // Ascension
        assert!(holidays.contains(&ymd(2025, 6, 9))); // Whit Monday
    }

    #[test]
    fn kings_day_stays_put_on_weekdays() {
        // 2026: April 27 is a Monday → observed as-is.
        assert_eq!(ymd(2026, 4, 27).weekday(), chrono::Weekday::Mon);
        let holidays = dutch_holidays(2026);
        assert!(holidays.contains(&ymd(2026, 4, 27)));
        assert!(!holidays.contains(&ymd(2026, 4, 26)));
    }

    #[test]
    fn weekend_rolls_to_monday() {
        // 2025-08-09 is a Saturday.
        assert_eq!(next_collection_date(ymd(2025, 8, 9)), ymd(2025, 8, 11));
    }

    #[test]
    fn holiday_rolls_past_clustered_days_off() {
        // Christmas 2025: Thu 25th and Fri 26th are holidays, then a weekend.
        assert_eq!(next_collection_date(ymd(2025, 12, 25)), ymd(2025, 12, 29));
    }

    #[test]
    fn business_day_is_unchanged() {
        assert_eq!(next_collection_date(ymd(2025, 8, 6)), ymd(2025, 8, 6));
    }
}
