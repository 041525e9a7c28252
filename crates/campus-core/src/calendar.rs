//! Academic years, semesters and class grades.
//!
//! An academic year is identified by the calendar year in which it starts:
//! `2024` is the 2024-2025 academic year. The boundary between academic years
//! is September 1st.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Highest class grade taught in any school category.
pub const MAX_CLASS_GRADE: u8 = 12;

/// Grades up to and including this one are taught mostly by the class master.
pub const LAST_EARLY_GRADE: u8 = 4;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Semester {
  First,
  Second,
}

impl Semester {
  pub fn number(self) -> u8 {
    match self {
      Self::First => 1,
      Self::Second => 2,
    }
  }
}

/// A closed date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
  pub starts_on: NaiveDate,
  pub ends_on:   NaiveDate,
}

impl Term {
  pub fn contains(&self, date: NaiveDate) -> bool {
    self.starts_on <= date && date <= self.ends_on
  }
}

/// The semester dates of one academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicCalendar {
  pub academic_year:   i32,
  pub first_semester:  Term,
  pub second_semester: Term,
}

impl AcademicCalendar {
  /// Check term ordering and that both terms fall inside the academic year.
  pub fn validate(&self) -> Result<()> {
    let (year_start, year_end) = academic_year_bounds(self.academic_year)?;

    for (label, term) in [
      ("first semester", &self.first_semester),
      ("second semester", &self.second_semester),
    ] {
      if term.starts_on > term.ends_on {
        return Err(Error::validation(format!(
          "{label} starts after it ends"
        )));
      }
      if term.starts_on < year_start || term.ends_on > year_end {
        return Err(Error::validation(format!(
          "{label} must fall between {year_start} and {year_end}"
        )));
      }
    }

    if self.first_semester.ends_on >= self.second_semester.starts_on {
      return Err(Error::validation(
        "first semester must end before the second one starts",
      ));
    }
    Ok(())
  }

  /// The semester containing `date`, or `None` during holidays.
  pub fn semester_of(&self, date: NaiveDate) -> Option<Semester> {
    if self.first_semester.contains(date) {
      Some(Semester::First)
    } else if self.second_semester.contains(date) {
      Some(Semester::Second)
    } else {
      None
    }
  }
}

/// The academic year a date belongs to.
pub fn academic_year_for(date: NaiveDate) -> i32 {
  if date.month() >= 9 { date.year() } else { date.year() - 1 }
}

/// First and last day of an academic year.
pub fn academic_year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
  let start = NaiveDate::from_ymd_opt(year, 9, 1);
  let end = NaiveDate::from_ymd_opt(year + 1, 8, 31);
  match (start, end) {
    (Some(start), Some(end)) => Ok((start, end)),
    _ => Err(Error::validation(format!("invalid academic year {year}"))),
  }
}

/// Roman-numeral label of a class grade; the preparatory grade is `P`.
pub fn grade_label(grade: u8) -> &'static str {
  const LABELS: [&str; 13] = [
    "P", "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI",
    "XII",
  ];
  LABELS.get(usize::from(grade)).copied().unwrap_or("?")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn calendar() -> AcademicCalendar {
    AcademicCalendar {
      academic_year:   2024,
      first_semester:  Term {
        starts_on: date(2024, 9, 9),
        ends_on:   date(2025, 1, 31),
      },
      second_semester: Term {
        starts_on: date(2025, 2, 10),
        ends_on:   date(2025, 6, 20),
      },
    }
  }

  #[test]
  fn academic_year_boundary_is_september_first() {
    assert_eq!(academic_year_for(date(2024, 8, 31)), 2023);
    assert_eq!(academic_year_for(date(2024, 9, 1)), 2024);
    assert_eq!(academic_year_for(date(2025, 3, 15)), 2024);
  }

  #[test]
  fn semester_lookup() {
    let cal = calendar();
    assert_eq!(cal.semester_of(date(2024, 10, 1)), Some(Semester::First));
    assert_eq!(cal.semester_of(date(2025, 2, 10)), Some(Semester::Second));
    assert_eq!(cal.semester_of(date(2025, 2, 5)), None);
    assert_eq!(cal.semester_of(date(2025, 7, 1)), None);
  }

  #[test]
  fn valid_calendar_passes() {
    assert!(calendar().validate().is_ok());
  }

  #[test]
  fn overlapping_semesters_rejected() {
    let mut cal = calendar();
    cal.second_semester.starts_on = date(2025, 1, 20);
    assert!(matches!(cal.validate(), Err(Error::Validation(_))));
  }

  #[test]
  fn term_outside_year_rejected() {
    let mut cal = calendar();
    cal.second_semester.ends_on = date(2025, 9, 5);
    assert!(matches!(cal.validate(), Err(Error::Validation(_))));
  }

  #[test]
  fn grade_labels() {
    assert_eq!(grade_label(0), "P");
    assert_eq!(grade_label(9), "IX");
    assert_eq!(grade_label(12), "XII");
    assert_eq!(grade_label(13), "?");
  }
}
