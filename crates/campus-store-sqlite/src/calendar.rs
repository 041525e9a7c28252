//! Academic calendars.

use campus_core::{
  calendar::{AcademicCalendar, Term},
  store::CalendarStore,
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::info;

use crate::{
  Result, SqliteStore,
  encode::{decode_date, encode_date},
};

pub(crate) fn load_calendar(conn: &Connection, year: i32) -> Result<Option<AcademicCalendar>> {
  let row = conn
    .query_row(
      "SELECT first_starts_on, first_ends_on, second_starts_on, second_ends_on
       FROM calendars WHERE academic_year = ?1",
      rusqlite::params![year],
      |r| {
        Ok([
          r.get::<_, String>(0)?,
          r.get::<_, String>(1)?,
          r.get::<_, String>(2)?,
          r.get::<_, String>(3)?,
        ])
      },
    )
    .optional()?;
  let Some([first_start, first_end, second_start, second_end]) = row else {
    return Ok(None);
  };
  Ok(Some(AcademicCalendar {
    academic_year:   year,
    first_semester:  Term {
      starts_on: decode_date(&first_start)?,
      ends_on:   decode_date(&first_end)?,
    },
    second_semester: Term {
      starts_on: decode_date(&second_start)?,
      ends_on:   decode_date(&second_end)?,
    },
  }))
}

fn set_calendar(conn: &Connection, calendar: &AcademicCalendar) -> Result<()> {
  calendar.validate()?;
  conn.execute(
    "INSERT INTO calendars (
       academic_year, first_starts_on, first_ends_on, second_starts_on, second_ends_on
     ) VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (academic_year) DO UPDATE SET
       first_starts_on  = excluded.first_starts_on,
       first_ends_on    = excluded.first_ends_on,
       second_starts_on = excluded.second_starts_on,
       second_ends_on   = excluded.second_ends_on",
    rusqlite::params![
      calendar.academic_year,
      encode_date(calendar.first_semester.starts_on),
      encode_date(calendar.first_semester.ends_on),
      encode_date(calendar.second_semester.starts_on),
      encode_date(calendar.second_semester.ends_on),
    ],
  )?;
  Ok(())
}

impl CalendarStore for SqliteStore {
  async fn set_calendar(&self, calendar: AcademicCalendar) -> Result<AcademicCalendar> {
    let stored = calendar.clone();
    self.write(move |conn| set_calendar(conn, &stored)).await?;
    info!(academic_year = calendar.academic_year, "stored academic calendar");
    Ok(calendar)
  }

  async fn get_calendar(&self, academic_year: i32) -> Result<Option<AcademicCalendar>> {
    self.read(move |conn| load_calendar(conn, academic_year)).await
  }
}
