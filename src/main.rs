use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod attendance;
mod config;
mod error;
mod ingest;
mod models;
mod normalize;
mod report;
mod workbook;

use config::{ColumnAliases, ReportOptions};
use models::{AttendanceRecord, FileReport};

#[derive(Parser)]
#[command(name = "attendance-summary")]
#[command(about = "Combine Microsoft Forms and Google Forms attendance exports into a summary workbook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Attendance exports (.xlsx, .xls, .ods or .csv)
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Use the student's name when Email is missing or blank (less reliable)
    #[arg(long, default_value_t = false)]
    allow_name_fallback: bool,

    /// JSON file overriding the recognised column names
    #[arg(long)]
    aliases: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the attendance summary workbook
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "Attendance_Summary.xlsx")]
        out: PathBuf,
        /// Leave out the Diagnostics sheet
        #[arg(long, default_value_t = false)]
        no_diagnostics: bool,
    },
    /// Show which columns were detected in each file
    Inspect {
        #[command(flatten)]
        input: InputArgs,
        /// Print the detection report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print students ranked by their last attendance
    Status {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

/// Reads and normalizes every file, failing on the first invalid one.
fn load_records(
    files: &[PathBuf],
    aliases: &ColumnAliases,
    allow_name_fallback: bool,
) -> anyhow::Result<(Vec<AttendanceRecord>, Vec<FileReport>)> {
    let mut records = Vec::new();
    let mut reports = Vec::with_capacity(files.len());

    for path in files {
        let table = ingest::load_table(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        let (rows, file_report) = normalize::standardize(&table, aliases, allow_name_fallback)?;
        records.extend(normalize::to_records(&table.source, rows));
        reports.push(file_report);
    }

    Ok((records, reports))
}

fn load_inputs(input: &InputArgs) -> anyhow::Result<(Vec<AttendanceRecord>, Vec<FileReport>)> {
    let aliases = ColumnAliases::load_or_default(input.aliases.as_deref())?;
    load_records(&input.files, &aliases, input.allow_name_fallback)
}

fn warn_name_fallback(enabled: bool) {
    if enabled {
        warn!(
            "Name fallback is enabled. Students sharing a name, or with inconsistent spelling, \
             may be miscounted. Collecting emails is strongly recommended."
        );
    }
}

fn run_report(input: &InputArgs, options: &ReportOptions) -> anyhow::Result<()> {
    let (records, file_reports) = load_inputs(input)?;
    print!("{}", report::format_detection(&file_reports));

    let summary = attendance::build(&records)?;
    let diagnostics = options.include_diagnostics.then_some(file_reports.as_slice());
    let sheets = report::build_sheets(&summary, diagnostics);
    workbook::write_workbook(&options.out, &sheets)?;

    warn_name_fallback(options.allow_name_fallback);
    println!(
        "Report written to {} ({} students, {} class days).",
        options.out.display(),
        summary.student_summary.len(),
        summary.total_class_days
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            input,
            out,
            no_diagnostics,
        } => {
            let options = ReportOptions {
                allow_name_fallback: input.allow_name_fallback,
                include_diagnostics: !no_diagnostics,
                out,
            };
            info!(files = input.files.len(), out = %options.out.display(), "Generating report");
            run_report(&input, &options)?;
        }
        Commands::Inspect { input, json } => {
            let (records, file_reports) = load_inputs(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&file_reports)?);
                return Ok(());
            }
            print!("{}", report::format_detection(&file_reports));
            println!("{} submissions with valid timestamps.", records.len());
        }
        Commands::Status { input, limit } => {
            let (records, _) = load_inputs(&input)?;
            let summary = attendance::build(&records)?;
            warn_name_fallback(input.allow_name_fallback);
            print!("{}", report::format_status(&summary, limit));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Reader};
    use chrono::NaiveDate;
    use std::path::Path;
    use rust_xlsxwriter::{Format, Workbook};

    fn write_microsoft_export(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let datetime = Format::new().set_num_format("m/d/yy h:mm");
        for (col, header) in ["ID", "Start time", "Completion time", "Email", "Name"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        let rows = [
            (3, 9, 2, "avery.lee@school.org", "Avery Lee"),
            (3, 9, 40, "AVERY.LEE@school.org", "Avery Lee"),
            (4, 9, 5, "avery.lee@school.org", "Avery  Lee"),
        ];
        for (i, (day, hour, minute, email, name)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            let at = NaiveDate::from_ymd_opt(2024, 9, *day)
                .unwrap()
                .and_hms_opt(*hour, *minute, 0)
                .unwrap();
            sheet.write_number(row, 0, row as f64).unwrap();
            sheet.write_datetime_with_format(row, 1, &at, &datetime).unwrap();
            sheet.write_datetime_with_format(row, 2, &at, &datetime).unwrap();
            sheet.write_string(row, 3, *email).unwrap();
            sheet.write_string(row, 4, *name).unwrap();
        }
        workbook.save(path).unwrap();
    }

    fn write_google_export(path: &Path) {
        std::fs::write(
            path,
            "Timestamp,Email Address,Full Name\n\
             2024/09/03 8:59:00 AM EST,jules@school.org,Jules Moreno\n\
             2024/09/04 9:10:00 AM EST,kiara@school.org,Kiara Patel\n\
             not recorded,kiara@school.org,Kiara Patel\n",
        )
        .unwrap();
    }

    #[test]
    fn both_platforms_combine_into_one_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let microsoft = dir.path().join("microsoft.xlsx");
        let google = dir.path().join("google.csv");
        let out = dir.path().join("Attendance_Summary.xlsx");
        write_microsoft_export(&microsoft);
        write_google_export(&google);

        let input = InputArgs {
            files: vec![microsoft, google],
            allow_name_fallback: false,
            aliases: None,
        };
        let (records, file_reports) = load_inputs(&input).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(file_reports[0].detected_time_column, "Start time");
        assert_eq!(file_reports[1].detected_email_column, "Email Address");

        let summary = attendance::build(&records).unwrap();
        assert_eq!(summary.total_class_days, 2);
        let avery = summary
            .student_summary
            .iter()
            .find(|s| s.email == "avery.lee@school.org")
            .unwrap();
        assert_eq!(avery.days_present, 2);
        assert_eq!(avery.attendance_percent, 100.0);
        assert_eq!(avery.display_name, "Avery Lee");

        let options = ReportOptions {
            allow_name_fallback: false,
            include_diagnostics: true,
            out: out.clone(),
        };
        run_report(&input, &options).unwrap();

        let workbook = open_workbook_auto(&out).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec![
                "Student_Summary",
                "Daily_Attendance",
                "Per_Day_Counts",
                "Most_Recent_By_Student",
                "Student_Status_Report",
                "Diagnostics",
            ]
        );
    }

    #[test]
    fn invalid_file_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("google.csv");
        let bad = dir.path().join("bad.csv");
        write_google_export(&good);
        std::fs::write(&bad, "When,Email\n2024-09-03,a@b.org\n").unwrap();

        let input = InputArgs {
            files: vec![good, bad],
            allow_name_fallback: false,
            aliases: None,
        };
        let err = load_inputs(&input).unwrap_err();
        assert!(err.to_string().contains("bad.csv"));
    }
}
