use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("[{file}] Missing timestamp column. Expected 'Start time' (Microsoft) or 'Timestamp' (Google).")]
    MissingTimestampColumn { file: String },

    #[error(
        "[{file}] Missing email column. Expected 'Email' (Microsoft) or 'Email Address' (Google). \
         Pass --allow-name-fallback to proceed without email."
    )]
    MissingEmailColumn { file: String },

    #[error("[{file}] Rows {rows:?} have no usable identifier. Ensure Email is collected or names are filled in.")]
    BlankIdentifier { file: String, rows: Vec<usize> },

    #[error("[{file}] Unsupported file type. Expected .xlsx, .xlsm, .xls, .ods or .csv.")]
    UnsupportedFormat { file: String },

    #[error("[{file}] File has no header row.")]
    EmptyFile { file: String },

    #[error("No valid attendance records found after parsing timestamps.")]
    NoValidRecords,

    #[error("No class days detected after deduplication.")]
    NoClassDays,
}
