//! Average and absence-count computation for catalogs.
//!
//! # Rules
//! - A semester average is the mean of the regular grades of that semester.
//!   With a thesis it becomes `(3 * mean + thesis) / 4`; a catalog that wants
//!   a thesis has no average until the thesis grade exists.
//! - The annual average is the mean of both semester averages.
//! - Second-examination grades produce `avg_after_2nd_examination`.
//! - Per-year averages take the mean of every counted subject's average plus
//!   the behavior grade, and only exist once every counted subject has one.
//! - All averages are rounded to two decimals.

use crate::{
  calendar::Semester,
  catalog::{
    AbsenceCounts, CatalogPerSubject, CatalogPerYear, GradeType, SubjectAbsence,
    SubjectGrade,
  },
};

pub fn round2(value: f64) -> f64 { (value * 100.0).round() / 100.0 }

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
  let (sum, count) = values
    .into_iter()
    .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
  (count > 0).then(|| sum / f64::from(count))
}

pub fn semester_average(
  grades: &[SubjectGrade],
  semester: Semester,
  wants_thesis: bool,
) -> Option<f64> {
  let in_semester = || grades.iter().filter(move |g| g.semester == semester);

  let regular = mean(
    in_semester()
      .filter(|g| g.grade_type == GradeType::Regular)
      .map(|g| f64::from(g.grade)),
  )?;

  if !wants_thesis {
    return Some(round2(regular));
  }
  let thesis = in_semester().find(|g| g.grade_type == GradeType::Thesis)?;
  Some(round2((3.0 * regular + f64::from(thesis.grade)) / 4.0))
}

pub fn annual_average(sem1: Option<f64>, sem2: Option<f64>) -> Option<f64> {
  Some(round2((sem1? + sem2?) / 2.0))
}

pub fn second_examination_average(grades: &[SubjectGrade]) -> Option<f64> {
  mean(
    grades
      .iter()
      .filter(|g| g.grade_type == GradeType::SecondExamination)
      .map(|g| f64::from(g.grade)),
  )
  .map(round2)
}

pub fn absence_counts(absences: &[SubjectAbsence]) -> AbsenceCounts {
  let mut counts = AbsenceCounts::default();
  for absence in absences {
    let slot = match (absence.semester, absence.is_founded) {
      (Semester::First, true) => &mut counts.founded_sem1,
      (Semester::Second, true) => &mut counts.founded_sem2,
      (Semester::First, false) => &mut counts.unfounded_sem1,
      (Semester::Second, false) => &mut counts.unfounded_sem2,
    };
    *slot += 1;
  }
  counts
}

/// Recompute every derived field of a subject catalog from its records.
pub fn recompute_subject(
  catalog: &mut CatalogPerSubject,
  grades: &[SubjectGrade],
  absences: &[SubjectAbsence],
) {
  catalog.avg_sem1 = semester_average(grades, Semester::First, catalog.wants_thesis);
  catalog.avg_sem2 = semester_average(grades, Semester::Second, catalog.wants_thesis);
  catalog.avg_annual = annual_average(catalog.avg_sem1, catalog.avg_sem2);
  catalog.avg_after_2nd_examination = if catalog.needs_second_examination() {
    second_examination_average(grades)
  } else {
    None
  };
  catalog.absences = absence_counts(absences);
}

/// Recompute a per-year catalog from the student's subject catalogs of the
/// same year. Catalogs of other students or years are ignored.
pub fn recompute_year(year: &mut CatalogPerYear, subjects: &[CatalogPerSubject]) {
  let own: Vec<&CatalogPerSubject> = subjects
    .iter()
    .filter(|c| {
      c.student_id == year.student_id
        && c.academic_year == year.academic_year
        && c.is_enrolled
    })
    .collect();
  let counted: Vec<&CatalogPerSubject> =
    own.iter().copied().filter(|c| c.counts_for_averages()).collect();

  year.behavior_grade_annual = round2(
    (f64::from(year.behavior_grade_sem1) + f64::from(year.behavior_grade_sem2))
      / 2.0,
  );
  year.avg_sem1 = general_average(
    counted.iter().map(|c| c.avg_sem1),
    f64::from(year.behavior_grade_sem1),
  );
  year.avg_sem2 = general_average(
    counted.iter().map(|c| c.avg_sem2),
    f64::from(year.behavior_grade_sem2),
  );
  year.avg_annual = general_average(
    counted.iter().map(|c| c.final_average()),
    year.behavior_grade_annual,
  );

  year.absences = AbsenceCounts::default();
  for catalog in &own {
    year.absences.add(&catalog.absences);
  }
  year.second_examinations_count = counted
    .iter()
    .filter(|c| c.needs_second_examination())
    .count() as u32;
}

/// Mean of all subject averages and the behavior grade; `None` unless every
/// subject has an average.
fn general_average(
  subject_averages: impl Iterator<Item = Option<f64>>,
  behavior: f64,
) -> Option<f64> {
  let averages: Option<Vec<f64>> = subject_averages.collect();
  let averages = averages?;
  if averages.is_empty() {
    return None;
  }
  mean(averages.into_iter().chain(std::iter::once(behavior))).map(round2)
}
