use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark attendance from a photo
    Recognize {
        /// Subject to mark attendance for (e.g., "Math")
        #[arg(short, long)]
        subject: String,
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
    },
    /// List attendance records with their indices
    List,
    /// Show present/absent summary
    Report,
    /// Delete an attendance record by index (see `list`)
    Delete {
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn recognize(&self, subject: &str, image: &[u8]) -> zbus::Result<String>;
    fn list_records(&self) -> zbus::Result<String>;
    fn report(&self) -> zbus::Result<String>;
    fn delete_record(&self, index: i64) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Deserialize)]
struct RecordRow {
    index: usize,
    identity: String,
    time: String,
    subject: String,
}

#[derive(Deserialize)]
struct Report {
    total: usize,
    present: usize,
    absent: usize,
    absent_list: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;

    match cli.command {
        Commands::Recognize { subject, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            tracing::debug!(path = %image.display(), bytes = bytes.len(), "sending image");

            let names: Vec<String> = serde_json::from_str(&proxy.recognize(&subject, &bytes).await?)?;
            if names.is_empty() {
                println!("No new attendance marked for {subject}");
            } else {
                println!("Marked present for {subject}: {}", names.join(", "));
            }
        }
        Commands::List => {
            let rows: Vec<RecordRow> = serde_json::from_str(&proxy.list_records().await?)?;
            if rows.is_empty() {
                println!("No attendance records");
            }
            for row in rows {
                println!("{:>4}  {:<19}  {:<12}  {}", row.index, row.time, row.subject, row.identity);
            }
        }
        Commands::Report => {
            let report: Report = serde_json::from_str(&proxy.report().await?)?;
            println!("Enrolled: {}", report.total);
            println!("Present:  {}", report.present);
            println!("Absent:   {}", report.absent);
            for name in &report.absent_list {
                println!("  - {name}");
            }
        }
        Commands::Delete { index } => {
            if proxy.delete_record(index).await? {
                println!("Deleted record {index}");
            } else {
                anyhow::bail!("delete failed: no record at index {index}");
            }
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_delete_accepts_negative_index() {
        let cli = Cli::try_parse_from(["rollcall", "delete", "-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Delete { index: -1 }));
    }

    #[test]
    fn test_recognize_requires_subject() {
        assert!(Cli::try_parse_from(["rollcall", "recognize", "photo.jpg"]).is_err());
        let cli = Cli::try_parse_from(["rollcall", "--system", "recognize", "-s", "Math", "photo.jpg"]).unwrap();
        assert!(cli.system);
        assert!(matches!(cli.command, Commands::Recognize { ref subject, .. } if subject == "Math"));
    }
}
