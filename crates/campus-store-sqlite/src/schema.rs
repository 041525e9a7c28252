//! SQL schema for the Campus SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS calendars (
    academic_year    INTEGER PRIMARY KEY,
    first_starts_on  TEXT NOT NULL,
    first_ends_on    TEXT NOT NULL,
    second_starts_on TEXT NOT NULL,
    second_ends_on   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subjects (
    subject_id      TEXT PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE COLLATE NOCASE,
    is_coordination INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS school_units (
    school_unit_id   TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    address          TEXT NOT NULL,
    phone_number     TEXT NOT NULL,
    email            TEXT NOT NULL,
    district         TEXT NOT NULL,
    city             TEXT NOT NULL,
    categories       TEXT NOT NULL,    -- JSON array of category names
    academic_profile TEXT,
    principal_id     TEXT NOT NULL REFERENCES profiles(profile_id),
    is_active        INTEGER NOT NULL DEFAULT 1,
    created_at       TEXT NOT NULL,
    UNIQUE (city, name)
);

CREATE TABLE IF NOT EXISTS profiles (
    profile_id                  TEXT PRIMARY KEY,
    school_unit_id              TEXT REFERENCES school_units(school_unit_id),
    full_name                   TEXT NOT NULL,
    username                    TEXT NOT NULL UNIQUE,
    email                       TEXT,
    phone_number                TEXT,
    role                        TEXT NOT NULL,
    is_active                   INTEGER NOT NULL DEFAULT 1,
    created_at                  TEXT NOT NULL,
    last_online                 TEXT,
    birth_date                  TEXT,
    address                     TEXT,
    personal_id_number          TEXT,
    email_notifications_enabled INTEGER NOT NULL DEFAULT 1,
    sms_notifications_enabled   INTEGER NOT NULL DEFAULT 0,
    student_in_class_id         TEXT REFERENCES study_classes(study_class_id),
    password_hash               TEXT   -- argon2 PHC string
);

CREATE TABLE IF NOT EXISTS teacher_subjects (
    teacher_id TEXT NOT NULL REFERENCES profiles(profile_id) ON DELETE CASCADE,
    subject_id TEXT NOT NULL REFERENCES subjects(subject_id),
    PRIMARY KEY (teacher_id, subject_id)
);

CREATE TABLE IF NOT EXISTS student_parents (
    student_id TEXT NOT NULL REFERENCES profiles(profile_id) ON DELETE CASCADE,
    parent_id  TEXT NOT NULL REFERENCES profiles(profile_id),
    PRIMARY KEY (student_id, parent_id)
);

CREATE TABLE IF NOT EXISTS generic_programs (
    generic_program_id TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    category           TEXT NOT NULL,
    academic_profile   TEXT,
    optional_hours     TEXT NOT NULL   -- JSON object: grade -> weekly hours
);

CREATE TABLE IF NOT EXISTS generic_program_subjects (
    generic_program_id TEXT NOT NULL REFERENCES generic_programs(generic_program_id) ON DELETE CASCADE,
    subject_id         TEXT NOT NULL REFERENCES subjects(subject_id),
    class_grade        INTEGER NOT NULL,
    weekly_hours       INTEGER NOT NULL,
    PRIMARY KEY (generic_program_id, subject_id, class_grade)
);

CREATE TABLE IF NOT EXISTS academic_programs (
    program_id         TEXT PRIMARY KEY,
    school_unit_id     TEXT NOT NULL REFERENCES school_units(school_unit_id),
    generic_program_id TEXT NOT NULL REFERENCES generic_programs(generic_program_id),
    name               TEXT NOT NULL,
    category           TEXT NOT NULL,
    academic_year      INTEGER NOT NULL,
    core_subject_id    TEXT REFERENCES subjects(subject_id),
    UNIQUE (school_unit_id, generic_program_id, academic_year)
);

CREATE TABLE IF NOT EXISTS program_subjects (
    program_id   TEXT NOT NULL REFERENCES academic_programs(program_id) ON DELETE CASCADE,
    subject_id   TEXT NOT NULL REFERENCES subjects(subject_id),
    class_grade  INTEGER NOT NULL,
    weekly_hours INTEGER NOT NULL,
    is_mandatory INTEGER NOT NULL,
    PRIMARY KEY (program_id, subject_id, class_grade)
);

CREATE TABLE IF NOT EXISTS study_classes (
    study_class_id  TEXT PRIMARY KEY,
    school_unit_id  TEXT NOT NULL REFERENCES school_units(school_unit_id),
    program_id      TEXT NOT NULL REFERENCES academic_programs(program_id),
    class_grade     INTEGER NOT NULL,
    class_letter    TEXT NOT NULL,
    academic_year   INTEGER NOT NULL,
    class_master_id TEXT NOT NULL REFERENCES profiles(profile_id),
    UNIQUE (school_unit_id, academic_year, class_grade, class_letter),
    UNIQUE (class_master_id, academic_year)
);

CREATE TABLE IF NOT EXISTS class_teachers (
    study_class_id      TEXT NOT NULL REFERENCES study_classes(study_class_id) ON DELETE CASCADE,
    subject_id          TEXT NOT NULL REFERENCES subjects(subject_id),
    teacher_id          TEXT NOT NULL REFERENCES profiles(profile_id),
    is_optional_subject INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (study_class_id, subject_id)
);

CREATE TABLE IF NOT EXISTS class_students (
    study_class_id TEXT NOT NULL REFERENCES study_classes(study_class_id) ON DELETE CASCADE,
    student_id     TEXT NOT NULL REFERENCES profiles(profile_id),
    academic_year  INTEGER NOT NULL,
    PRIMARY KEY (study_class_id, student_id),
    UNIQUE (student_id, academic_year)
);

CREATE TABLE IF NOT EXISTS catalogs_per_year (
    catalog_id                TEXT PRIMARY KEY,
    student_id                TEXT NOT NULL REFERENCES profiles(profile_id),
    study_class_id            TEXT NOT NULL REFERENCES study_classes(study_class_id),
    academic_year             INTEGER NOT NULL,
    avg_sem1                  REAL,
    avg_sem2                  REAL,
    avg_annual                REAL,
    founded_sem1              INTEGER NOT NULL DEFAULT 0,
    founded_sem2              INTEGER NOT NULL DEFAULT 0,
    unfounded_sem1            INTEGER NOT NULL DEFAULT 0,
    unfounded_sem2            INTEGER NOT NULL DEFAULT 0,
    behavior_grade_sem1       INTEGER NOT NULL DEFAULT 10,
    behavior_grade_sem2       INTEGER NOT NULL DEFAULT 10,
    behavior_grade_annual     REAL NOT NULL DEFAULT 10,
    second_examinations_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (student_id, academic_year)
);

CREATE TABLE IF NOT EXISTS catalogs_per_subject (
    catalog_id                TEXT PRIMARY KEY,
    student_id                TEXT NOT NULL REFERENCES profiles(profile_id),
    study_class_id            TEXT NOT NULL REFERENCES study_classes(study_class_id),
    subject_id                TEXT NOT NULL REFERENCES subjects(subject_id),
    subject_name              TEXT NOT NULL,
    teacher_id                TEXT NOT NULL REFERENCES profiles(profile_id),
    academic_year             INTEGER NOT NULL,
    is_coordination_subject   INTEGER NOT NULL DEFAULT 0,
    is_enrolled               INTEGER NOT NULL DEFAULT 1,
    is_exempted               INTEGER NOT NULL DEFAULT 0,
    wants_thesis              INTEGER NOT NULL DEFAULT 0,
    avg_sem1                  REAL,
    avg_sem2                  REAL,
    avg_annual                REAL,
    avg_after_2nd_examination REAL,
    avg_limit                 REAL NOT NULL DEFAULT 5,
    founded_sem1              INTEGER NOT NULL DEFAULT 0,
    founded_sem2              INTEGER NOT NULL DEFAULT 0,
    unfounded_sem1            INTEGER NOT NULL DEFAULT 0,
    unfounded_sem2            INTEGER NOT NULL DEFAULT 0,
    UNIQUE (student_id, subject_id, academic_year)
);

CREATE TABLE IF NOT EXISTS subject_grades (
    grade_id   TEXT PRIMARY KEY,
    catalog_id TEXT NOT NULL REFERENCES catalogs_per_subject(catalog_id) ON DELETE CASCADE,
    student_id TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    semester   INTEGER NOT NULL,   -- 1 | 2
    grade      INTEGER NOT NULL CHECK (grade BETWEEN 1 AND 10),
    taken_at   TEXT NOT NULL,
    grade_type TEXT NOT NULL,      -- 'regular' | 'thesis' | 'second_examination'
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subject_absences (
    absence_id TEXT PRIMARY KEY,
    catalog_id TEXT NOT NULL REFERENCES catalogs_per_subject(catalog_id) ON DELETE CASCADE,
    student_id TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    semester   INTEGER NOT NULL,
    taken_at   TEXT NOT NULL,
    is_founded INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id     TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    body                TEXT NOT NULL,
    send_sms            INTEGER NOT NULL DEFAULT 0,
    from_user_id        TEXT NOT NULL REFERENCES profiles(profile_id),
    from_user_full_name TEXT NOT NULL,
    from_user_role      TEXT NOT NULL,
    target              TEXT NOT NULL,   -- JSON-encoded NotificationTarget
    recipients_count    INTEGER NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notification_recipients (
    notification_id TEXT NOT NULL REFERENCES notifications(notification_id) ON DELETE CASCADE,
    user_id         TEXT NOT NULL REFERENCES profiles(profile_id),
    user_role       TEXT NOT NULL,
    is_read         INTEGER NOT NULL DEFAULT 0,
    sent_at_email   TEXT,
    sent_at_phone   TEXT,
    PRIMARY KEY (notification_id, user_id)
);

CREATE TABLE IF NOT EXISTS study_class_statistics (
    study_class_id         TEXT PRIMARY KEY REFERENCES study_classes(study_class_id) ON DELETE CASCADE,
    school_unit_id         TEXT NOT NULL,
    academic_year          INTEGER NOT NULL,
    class_grade            INTEGER NOT NULL,
    class_letter           TEXT NOT NULL,
    students_count         INTEGER NOT NULL,
    avg_sem1               REAL,
    avg_sem2               REAL,
    avg_annual             REAL,
    unfounded_absences_avg REAL NOT NULL,
    failing_students       INTEGER NOT NULL,
    computed_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS school_statistics (
    school_unit_id   TEXT NOT NULL REFERENCES school_units(school_unit_id),
    academic_year    INTEGER NOT NULL,
    school_name      TEXT NOT NULL,
    students_count   INTEGER NOT NULL,
    avg_sem1         REAL,
    avg_sem2         REAL,
    avg_annual       REAL,
    failing_students INTEGER NOT NULL,
    computed_at      TEXT NOT NULL,
    PRIMARY KEY (school_unit_id, academic_year)
);

CREATE INDEX IF NOT EXISTS profiles_school_idx       ON profiles(school_unit_id, role);
CREATE INDEX IF NOT EXISTS classes_school_year_idx   ON study_classes(school_unit_id, academic_year);
CREATE INDEX IF NOT EXISTS catalogs_year_class_idx   ON catalogs_per_year(study_class_id);
CREATE INDEX IF NOT EXISTS catalogs_subject_class_idx ON catalogs_per_subject(study_class_id, subject_id);
CREATE INDEX IF NOT EXISTS grades_catalog_idx        ON subject_grades(catalog_id);
CREATE INDEX IF NOT EXISTS absences_catalog_idx      ON subject_absences(catalog_id);
CREATE INDEX IF NOT EXISTS recipients_user_idx       ON notification_recipients(user_id);

PRAGMA user_version = 1;
";

/// Seeds the coordination subject unless one exists. Takes the new subject's
/// id and name.
pub const SEED_COORDINATION: &str = "
INSERT INTO subjects (subject_id, name, is_coordination)
SELECT ?1, ?2, 1
WHERE NOT EXISTS (SELECT 1 FROM subjects WHERE is_coordination = 1)
";
