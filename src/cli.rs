use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Read as _;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use rxledger::backup;
use rxledger::config::AppConfig;
use rxledger::gateway::{ExportResponse, Gateway};

/// Runs one named operation against the data directory and prints the JSON
/// response on stdout. Operation failures are in-band `success: false`
/// responses; a nonzero exit code means the invocation itself was unusable.
pub(crate) fn run() -> i32 {
    let cli = Cli::parse();

    let config = AppConfig {
        data_dir: cli.data_dir,
    };
    let gateway = match Gateway::open(&config) {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!(
                "error: failed to create data directory {}: {err}",
                config.data_dir.display()
            );
            return 1;
        }
    };

    match cli.command {
        Command::CheckAdminExists => print_response(&gateway.check_admin_exists()),
        Command::RegisterAdmin(args) => {
            print_response(&gateway.register_admin(credentials_payload(&args)))
        }
        Command::Login(args) => print_response(&gateway.login(credentials_payload(&args))),
        Command::CreateModerator(args) => print_response(&gateway.create_moderator(json!({
            "username": args.username,
            "password": args.password,
            "createdBy": args.created_by,
        }))),
        Command::GetUsers => print_response(&gateway.get_users()),
        Command::DeleteModerator { username } => {
            print_response(&gateway.delete_moderator(&username))
        }
        Command::GetPrescriptions => print_response(&gateway.get_prescriptions()),
        Command::SavePrescription { input } => {
            let payload = match read_json_input(&input) {
                Ok(payload) => payload,
                Err(err) => {
                    eprintln!("error: failed to read prescription input: {err}");
                    return 2;
                }
            };
            print_response(&gateway.save_prescription(payload))
        }
        Command::ImportBackup { file } => {
            let raw = match std::fs::read_to_string(&file) {
                Ok(raw) => raw,
                Err(err) => {
                    eprintln!("error: failed to read backup file {}: {err}", file.display());
                    return 2;
                }
            };
            print_response(&gateway.import_backup(&raw))
        }
        Command::ExportBackup { out } => run_export(&gateway, out),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rxledger",
    version,
    about = "Prescription records core: local persistence and identity operations"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[arg(long, env = "RXLEDGER_DATA_DIR", default_value = "rxledger-data")]
    data_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether an admin account has been registered yet.
    CheckAdminExists,
    /// One-time admin registration.
    RegisterAdmin(CredentialArgs),
    /// Verify credentials and print the role-bearing identity.
    Login(CredentialArgs),
    /// Create a moderator account.
    CreateModerator(ModeratorArgs),
    /// List all user records (password hashes included).
    GetUsers,
    /// Delete a moderator by username. Admin accounts are protected.
    DeleteModerator { username: String },
    /// List all prescription records.
    GetPrescriptions,
    /// Validate and store a prescription from a JSON file, or `-` for stdin.
    SavePrescription { input: PathBuf },
    /// Merge a backup snapshot's prescriptions into the live set.
    ImportBackup { file: PathBuf },
    /// Write a backup snapshot to a file, or print it when no path is given.
    ExportBackup {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[derive(Args, Debug)]
struct ModeratorArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    created_by: String,
}

fn credentials_payload(args: &CredentialArgs) -> Value {
    json!({
        "username": args.username,
        "password": args.password,
    })
}

fn read_json_input(input: &Path) -> std::io::Result<Value> {
    let raw = if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(input)?
    };
    serde_json::from_str(&raw).map_err(std::io::Error::other)
}

fn run_export(gateway: &Gateway, out: Option<PathBuf>) -> i32 {
    let response = gateway.export_backup();
    let ExportResponse::Snapshot(snapshot) = &response else {
        return print_response(&response);
    };

    let Some(out) = out else {
        return print_response(&response);
    };
    let target = if out.is_dir() {
        out.join(backup::default_export_file_name(OffsetDateTime::now_utc()))
    } else {
        out
    };

    let raw = match backup::serialize(snapshot) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    if let Err(err) = std::fs::write(&target, raw) {
        eprintln!("error: failed to write backup to {}: {err}", target.display());
        return 1;
    }

    print_response(&json!({
        "success": true,
        "message": format!("Backup exported to {}", target.display()),
    }))
}

fn print_response<T: Serialize>(response: &T) -> i32 {
    match serde_json::to_string_pretty(response) {
        Ok(body) => {
            println!("{body}");
            0
        }
        Err(err) => {
            eprintln!("error: failed to encode response: {err}");
            1
        }
    }
}
