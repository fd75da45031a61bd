use chrono::{Datelike, NaiveDate};

/// English ordinal suffix for `n`.
pub fn ordinal_suffix(n: u64) -> &'static str {
    match (n % 10, n % 100) {
        (1, r) if r != 11 => "st",
        (2, r) if r != 12 => "nd",
        (3, r) if r != 13 => "rd",
        _ => "th",
    }
}

/// `"{name}'s {age}{suffix} Birthday!"` where `age = target_year - birth year`.
///
/// Years before the birth year produce a negative age, rendered with the
/// suffix of its absolute value.
pub fn title_for(name: &str, birth_date: NaiveDate, target_year: i32) -> String {
    let age = i64::from(target_year) - i64::from(birth_date.year());
    format!("{}'s {}{} Birthday!", name, age, ordinal_suffix(age.unsigned_abs()))
}
