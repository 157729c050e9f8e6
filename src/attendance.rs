use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use tracing::info;

use crate::error::AttendanceError;
use crate::models::{
    AttendanceRecord, AttendanceReport, DailyAttendance, DayCount, StudentStatus, StudentSummary,
};

const UNKNOWN_NAME: &str = "Unknown";

/// Keeps the first check-in per student per day.
///
/// The result is ordered by class date, then student key, then submission
/// time.
pub fn dedupe_daily(records: &[AttendanceRecord]) -> Vec<AttendanceRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        a.class_date
            .cmp(&b.class_date)
            .then_with(|| a.student_key.cmp(&b.student_key))
            .then_with(|| a.submitted_at.cmp(&b.submitted_at))
    });
    sorted.dedup_by(|later, earlier| {
        later.class_date == earlier.class_date && later.student_key == earlier.student_key
    });
    sorted
}

pub fn total_class_days(daily: &[AttendanceRecord]) -> usize {
    daily
        .iter()
        .map(|record| record.class_date)
        .collect::<BTreeSet<_>>()
        .len()
}

/// Most frequent non-blank value; ties go to the value seen first.
fn mode_nonblank<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values.filter(|value| !value.trim().is_empty()) {
        match counts.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

/// Stable display name and email for each student key.
#[derive(Debug, Default)]
pub struct IdentityMap {
    names: HashMap<String, String>,
    emails: HashMap<String, String>,
}

impl IdentityMap {
    pub fn from_daily(daily: &[AttendanceRecord]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<&AttendanceRecord>> = BTreeMap::new();
        for record in daily {
            grouped.entry(&record.student_key).or_default().push(record);
        }

        let mut map = IdentityMap::default();
        for (key, records) in grouped {
            let name = mode_nonblank(records.iter().map(|r| r.display_name.as_str()))
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            let email = mode_nonblank(records.iter().map(|r| r.email.as_str())).unwrap_or_default();
            map.names.insert(key.to_string(), name);
            map.emails.insert(key.to_string(), email);
        }
        map
    }

    pub fn name(&self, key: &str) -> &str {
        self.names.get(key).map(String::as_str).unwrap_or(UNKNOWN_NAME)
    }

    pub fn email(&self, key: &str) -> &str {
        self.emails.get(key).map(String::as_str).unwrap_or("")
    }
}

pub fn attendance_percent(days_present: usize, total_class_days: usize) -> f64 {
    if total_class_days == 0 {
        return 0.0;
    }
    let percent = days_present as f64 / total_class_days as f64 * 100.0;
    (percent * 10.0).round_ties_even() / 10.0
}

/// One row per student, ordered by student key.
pub fn student_summary(
    daily: &[AttendanceRecord],
    identities: &IdentityMap,
    total_class_days: usize,
) -> Vec<StudentSummary> {
    let mut dates: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for record in daily {
        dates
            .entry(&record.student_key)
            .or_default()
            .insert(record.class_date);
    }

    dates
        .into_iter()
        .filter_map(|(key, days)| {
            let last_seen = *days.iter().next_back()?;
            Some(StudentSummary {
                student_key: key.to_string(),
                display_name: identities.name(key).to_string(),
                email: identities.email(key).to_string(),
                days_present: days.len(),
                total_class_days,
                attendance_percent: attendance_percent(days.len(), total_class_days),
                last_seen,
            })
        })
        .collect()
}

fn to_daily_row(record: &AttendanceRecord, identities: &IdentityMap) -> DailyAttendance {
    DailyAttendance {
        student_key: record.student_key.clone(),
        class_date: record.class_date,
        email: identities.email(&record.student_key).to_string(),
        display_name: identities.name(&record.student_key).to_string(),
        submitted_at: record.submitted_at,
    }
}

pub fn daily_attendance(
    daily: &[AttendanceRecord],
    identities: &IdentityMap,
) -> Vec<DailyAttendance> {
    daily
        .iter()
        .map(|record| to_daily_row(record, identities))
        .collect()
}

/// Unique students present on each class date, ascending by date.
pub fn per_day_counts(daily: &[AttendanceRecord]) -> Vec<DayCount> {
    let mut students: BTreeMap<NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    for record in daily {
        students
            .entry(record.class_date)
            .or_default()
            .insert(&record.student_key);
    }

    students
        .into_iter()
        .map(|(class_date, keys)| DayCount {
            class_date,
            present_count: keys.len(),
        })
        .collect()
}

/// Each student's record from their latest class date, ordered by that date.
pub fn most_recent_by_student(
    daily: &[AttendanceRecord],
    identities: &IdentityMap,
) -> Vec<DailyAttendance> {
    let mut latest: HashMap<&str, &AttendanceRecord> = HashMap::new();
    for record in daily {
        let entry = latest.entry(&record.student_key).or_insert(record);
        if record.class_date >= entry.class_date {
            *entry = record;
        }
    }

    let mut rows: Vec<DailyAttendance> = latest
        .into_values()
        .map(|record| to_daily_row(record, identities))
        .collect();
    rows.sort_by(|a, b| {
        a.class_date
            .cmp(&b.class_date)
            .then_with(|| a.student_key.cmp(&b.student_key))
    });
    rows
}

/// Ranks students by recency of their last attendance, most recent first.
pub fn status_report(
    most_recent: &[DailyAttendance],
    summaries: &[StudentSummary],
) -> Vec<StudentStatus> {
    let totals: HashMap<&str, &StudentSummary> = summaries
        .iter()
        .map(|summary| (summary.student_key.as_str(), summary))
        .collect();

    let mut rows: Vec<StudentStatus> = most_recent
        .iter()
        .map(|recent| {
            let summary = totals.get(recent.student_key.as_str());
            StudentStatus {
                class_date: recent.class_date,
                email: recent.email.clone(),
                display_name: recent.display_name.clone(),
                submitted_at: recent.submitted_at,
                days_present: summary.map_or(0, |s| s.days_present),
                total_class_days: summary.map_or(0, |s| s.total_class_days),
                attendance_percent: summary.map_or(0.0, |s| s.attendance_percent),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.class_date.cmp(&a.class_date));
    rows
}

/// Runs every aggregation pass over the combined records of one run.
pub fn build(records: &[AttendanceRecord]) -> Result<AttendanceReport, AttendanceError> {
    if records.is_empty() {
        return Err(AttendanceError::NoValidRecords);
    }

    let daily = dedupe_daily(records);
    let total = total_class_days(&daily);
    if total == 0 {
        return Err(AttendanceError::NoClassDays);
    }

    let identities = IdentityMap::from_daily(&daily);
    let summaries = student_summary(&daily, &identities, total);
    let most_recent = most_recent_by_student(&daily, &identities);
    let status = status_report(&most_recent, &summaries);

    let files = records
        .iter()
        .map(|record| record.source_file.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    info!(
        files,
        submissions = records.len(),
        check_ins = daily.len(),
        students = summaries.len(),
        class_days = total,
        "Aggregated attendance"
    );

    Ok(AttendanceReport {
        total_class_days: total,
        daily_attendance: daily_attendance(&daily, &identities),
        per_day_counts: per_day_counts(&daily),
        student_summary: summaries,
        most_recent,
        status_report: status,
    })
}
