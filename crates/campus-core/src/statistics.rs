//! Statistics snapshots computed from per-year catalogs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  catalog::CatalogPerYear,
  grading::round2,
  profile::UserProfile,
  school::SchoolUnit,
  study_class::StudyClass,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyClassStatistics {
  pub study_class_id:         Uuid,
  pub school_unit_id:         Uuid,
  pub academic_year:          i32,
  pub class_grade:            u8,
  pub class_letter:           String,
  pub students_count:         u32,
  pub avg_sem1:               Option<f64>,
  pub avg_sem2:               Option<f64>,
  pub avg_annual:             Option<f64>,
  pub unfounded_absences_avg: f64,
  pub failing_students:       u32,
  pub computed_at:            DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolStatistics {
  pub school_unit_id:   Uuid,
  pub school_name:      String,
  pub academic_year:    i32,
  pub students_count:   u32,
  pub avg_sem1:         Option<f64>,
  pub avg_sem2:         Option<f64>,
  pub avg_annual:       Option<f64>,
  pub failing_students: u32,
  pub computed_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtRiskStudent {
  pub student_id:         Uuid,
  pub full_name:          String,
  pub study_class_id:     Uuid,
  pub class_name:         String,
  pub unfounded_absences: u32,
  pub behavior_grade:     f64,
  pub failing_subjects:   u32,
}

/// Limits that flag a student as at risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
  /// Annual unfounded absences at or above this count.
  pub unfounded_absences: u32,
  /// Annual behavior grade strictly below this value.
  pub behavior_grade:     u8,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self { unfounded_absences: 20, behavior_grade: 8 }
  }
}

/// Result of a statistics run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSummary {
  pub academic_year: i32,
  pub schools:       u32,
  pub study_classes: u32,
}

/// Mean of the values that exist, `None` if none do.
fn mean_of_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
  let present: Vec<f64> = values.flatten().collect();
  if present.is_empty() {
    return None;
  }
  Some(round2(present.iter().sum::<f64>() / present.len() as f64))
}

fn failing(years: &[CatalogPerYear]) -> u32 {
  years.iter().filter(|y| y.second_examinations_count > 0).count() as u32
}

/// `years` are the per-year catalogs attached to `class`.
pub fn class_statistics(
  class: &StudyClass,
  years: &[CatalogPerYear],
  computed_at: DateTime<Utc>,
) -> StudyClassStatistics {
  let unfounded_absences_avg = if years.is_empty() {
    0.0
  } else {
    let total: u32 = years.iter().map(|y| y.absences.unfounded_annual()).sum();
    round2(f64::from(total) / years.len() as f64)
  };

  StudyClassStatistics {
    study_class_id: class.study_class_id,
    school_unit_id: class.school_unit_id,
    academic_year: class.academic_year,
    class_grade: class.class_grade,
    class_letter: class.class_letter.clone(),
    students_count: years.len() as u32,
    avg_sem1: mean_of_present(years.iter().map(|y| y.avg_sem1)),
    avg_sem2: mean_of_present(years.iter().map(|y| y.avg_sem2)),
    avg_annual: mean_of_present(years.iter().map(|y| y.avg_annual)),
    unfounded_absences_avg,
    failing_students: failing(years),
    computed_at,
  }
}

/// `years` are the per-year catalogs of every class of `school` in
/// `academic_year`.
pub fn school_statistics(
  school: &SchoolUnit,
  academic_year: i32,
  years: &[CatalogPerYear],
  computed_at: DateTime<Utc>,
) -> SchoolStatistics {
  SchoolStatistics {
    school_unit_id: school.school_unit_id,
    school_name: school.name.clone(),
    academic_year,
    students_count: years.len() as u32,
    avg_sem1: mean_of_present(years.iter().map(|y| y.avg_sem1)),
    avg_sem2: mean_of_present(years.iter().map(|y| y.avg_sem2)),
    avg_annual: mean_of_present(years.iter().map(|y| y.avg_annual)),
    failing_students: failing(years),
    computed_at,
  }
}

/// Flag `student` if any threshold is crossed or a subject is failing.
pub fn at_risk(
  student: &UserProfile,
  class: &StudyClass,
  year: &CatalogPerYear,
  thresholds: Thresholds,
) -> Option<AtRiskStudent> {
  let unfounded_absences = year.absences.unfounded_annual();
  let flagged = unfounded_absences >= thresholds.unfounded_absences
    || year.behavior_grade_annual < f64::from(thresholds.behavior_grade)
    || year.second_examinations_count > 0;

  flagged.then(|| AtRiskStudent {
    student_id: student.profile_id,
    full_name: student.full_name.clone(),
    study_class_id: class.study_class_id,
    class_name: class.name(),
    unfounded_absences,
    behavior_grade: year.behavior_grade_annual,
    failing_subjects: year.second_examinations_count,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::UserRole;

  fn class() -> StudyClass {
    StudyClass {
      study_class_id:  Uuid::new_v4(),
      school_unit_id:  Uuid::new_v4(),
      program_id:      Uuid::new_v4(),
      program_name:    "Program".into(),
      class_grade:     10,
      class_letter:    "A".into(),
      academic_year:   2024,
      class_master_id: Uuid::new_v4(),
      teachers:        Vec::new(),
      student_ids:     Vec::new(),
    }
  }

  fn year(class: &StudyClass, avg: Option<f64>, unfounded: u32) -> CatalogPerYear {
    let mut y = CatalogPerYear::new(Uuid::new_v4(), class.study_class_id, 2024);
    y.avg_annual = avg;
    y.absences.unfounded_sem1 = unfounded;
    y
  }

  #[test]
  fn class_averages_skip_missing_values() {
    let c = class();
    let mut failing = year(&c, Some(6.0), 3);
    failing.second_examinations_count = 1;
    let years = [year(&c, Some(9.0), 1), year(&c, None, 2), failing];

    let stats = class_statistics(&c, &years, Utc::now());
    assert_eq!(stats.students_count, 3);
    assert_eq!(stats.avg_annual, Some(7.5));
    assert_eq!(stats.avg_sem1, None);
    assert_eq!(stats.unfounded_absences_avg, 2.0);
    assert_eq!(stats.failing_students, 1);
  }

  #[test]
  fn at_risk_thresholds() {
    let c = class();
    let student = UserProfile {
      profile_id: Uuid::new_v4(),
      school_unit_id: Some(c.school_unit_id),
      full_name: "Elev".into(),
      username: "elev".into(),
      email: None,
      phone_number: None,
      role: UserRole::Student,
      is_active: true,
      created_at: Utc::now(),
      last_online: None,
      birth_date: None,
      address: None,
      personal_id_number: None,
      email_notifications_enabled: false,
      sms_notifications_enabled: false,
      taught_subject_ids: Vec::new(),
      parent_ids: Vec::new(),
      student_in_class_id: Some(c.study_class_id),
    };
    let thresholds = Thresholds::default();

    assert!(at_risk(&student, &c, &year(&c, Some(8.0), 5), thresholds).is_none());
    let flagged = at_risk(&student, &c, &year(&c, Some(8.0), 20), thresholds).unwrap();
    assert_eq!(flagged.unfounded_absences, 20);
    assert_eq!(flagged.class_name, "X A");

    let mut rude = year(&c, Some(8.0), 0);
    rude.behavior_grade_annual = 7.5;
    assert!(at_risk(&student, &c, &rude, thresholds).is_some());
  }
}
