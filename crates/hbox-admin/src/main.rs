// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// hbox-admin — operator tool for the HBox device registry and firmware
// catalog.
//
// Entry point. Initialises logging, parses the command line and prints every
// result as pretty JSON on stdout. Failures go to stderr as a wire error.

mod services;

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use hbox_core::codes::wire_error;
use hbox_core::config::AuthSource;
use hbox_core::error::Result;
use hbox_core::types::{FirmwareId, Slot};
use hbox_registry::RegistrationRequest;
use hbox_security::{AuthEnvelope, identity, signature};
use serde::Serialize;
use serde_json::json;

use services::data_dir;
use services::registry_services::{FirmwareChange, FirmwareUpload, RegistryServices, SlotChange};

#[derive(Debug, Parser)]
#[command(name = "hbox-admin", version, about = "Manage HBox devices and firmware")]
struct Cli {
    /// Registry data directory (defaults to $XDG_DATA_HOME/hbox-registry).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Settings file (defaults to <data-dir>/hbox.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Derive the device id for a raw hardware id.
    DeviceId { raw_unique_id: String },

    /// Sign a challenge the way a device does and print the envelope.
    Sign {
        device_id: String,
        challenge: String,
        timestamp: i64,
    },

    /// Register a device.
    Register {
        raw_unique_id: String,
        device_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ip: Option<IpAddr>,
    },

    /// List registered devices.
    Devices,

    /// Check an auth envelope against the registry.
    Authenticate {
        envelope: String,
        /// Carrier the envelope arrived in (defaults to the configured one).
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
    },

    /// Firmware catalog operations.
    Firmware {
        #[command(subcommand)]
        command: FirmwareCommand,
    },

    /// Show audit log entries.
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only entries for this device id, firmware id or version.
        #[arg(long)]
        subject: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum FirmwareCommand {
    List,
    Show {
        id: String,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        slot_a: Option<PathBuf>,
        #[arg(long)]
        slot_b: Option<PathBuf>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_slot_a")]
        slot_a: Option<PathBuf>,
        #[arg(long, conflicts_with = "clear_slot_b")]
        slot_b: Option<PathBuf>,
        #[arg(long)]
        clear_slot_a: bool,
        #[arg(long)]
        clear_slot_b: bool,
    },
    Delete {
        id: String,
    },
    /// Delete every entry at or below VERSION, with its images.
    ClearUpTo {
        version: String,
    },
    /// Newest entry strictly above CURRENT, if any.
    CheckUpdate {
        current: String,
    },
    /// Re-hash a slot image against its recorded SHA-256.
    Verify {
        id: String,
        #[arg(value_enum)]
        slot: SlotArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Header,
    Body,
    Query,
}

impl From<SourceArg> for AuthSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Header => AuthSource::Header,
            SourceArg::Body => AuthSource::Body,
            SourceArg::Query => AuthSource::Query,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SlotArg {
    A,
    B,
}

impl From<SlotArg> for Slot {
    fn from(value: SlotArg) -> Self {
        match value {
            SlotArg::A => Slot::A,
            SlotArg::B => Slot::B,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let wire = wire_error(&e);
            tracing::error!(code = wire.code, error = %e, "command failed");
            eprintln!(
                "{}",
                json!({ "code": wire.code, "status": wire.status, "message": wire.message })
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // Pure computations need no data directory.
    match &cli.command {
        Command::DeviceId { raw_unique_id } => {
            let device_id = identity::device_id_for(raw_unique_id.trim())?;
            return print_json(&json!({
                "rawUniqueId": raw_unique_id.trim(),
                "deviceId": device_id,
            }));
        }
        Command::Sign {
            device_id,
            challenge,
            timestamp,
        } => {
            let envelope = AuthEnvelope::signed(device_id, challenge, *timestamp);
            return print_json(&json!({
                "signature": signature::sign(device_id, challenge, *timestamp),
                "envelope": envelope,
                "encoded": envelope.to_encoded()?,
            }));
        }
        _ => {}
    }

    let svc = RegistryServices::init(data_dir::resolve(cli.data_dir), cli.config.as_deref())?;

    match cli.command {
        Command::DeviceId { .. } | Command::Sign { .. } => Ok(()),

        Command::Register {
            raw_unique_id,
            device_id,
            name,
            ip,
        } => {
            let mut request = RegistrationRequest::new(raw_unique_id, device_id);
            request.device_name = name;
            request.register_ip = ip;
            print_json(&svc.register(request)?)
        }

        Command::Devices => print_json(&svc.devices()),

        Command::Authenticate { envelope, source } => {
            let source = source.map_or(svc.config().auth.source, AuthSource::from);
            let auth = svc.authenticate(&envelope, source)?;
            print_json(&json!({
                "device": auth.device,
                "challenge": auth.challenge,
                "admission": format!("{:?}", auth.admission),
            }))
        }

        Command::Firmware { command } => run_firmware(&svc, command),

        Command::Audit { limit, subject } => match subject {
            Some(subject) => print_json(&svc.audit_entries_for_subject(&subject)?),
            None => print_json(&svc.recent_audit_entries(limit)?),
        },
    }
}

fn run_firmware(svc: &RegistryServices, command: FirmwareCommand) -> Result<()> {
    match command {
        FirmwareCommand::List => print_json(&svc.firmware()),

        FirmwareCommand::Show { id } => print_json(&svc.find_firmware(&FirmwareId(id))?),

        FirmwareCommand::Add {
            name,
            version,
            description,
            slot_a,
            slot_b,
        } => print_json(&svc.add_firmware(FirmwareUpload {
            name,
            version,
            description,
            slot_a: slot_a.as_deref(),
            slot_b: slot_b.as_deref(),
        })?),

        FirmwareCommand::Update {
            id,
            name,
            version,
            description,
            slot_a,
            slot_b,
            clear_slot_a,
            clear_slot_b,
        } => {
            let change = FirmwareChange {
                name,
                version,
                description,
                slot_a: slot_change(slot_a.as_deref(), clear_slot_a),
                slot_b: slot_change(slot_b.as_deref(), clear_slot_b),
            };
            print_json(&svc.update_firmware(&FirmwareId(id), change)?)
        }

        FirmwareCommand::Delete { id } => print_json(&svc.delete_firmware(&FirmwareId(id))?),

        FirmwareCommand::ClearUpTo { version } => print_json(&svc.clear_up_to_version(&version)?),

        FirmwareCommand::CheckUpdate { current } => {
            let latest = svc.check_update(&current)?;
            print_json(&json!({
                "hasUpdate": latest.is_some(),
                "firmware": latest,
            }))
        }

        FirmwareCommand::Verify { id, slot } => {
            let slot = Slot::from(slot);
            svc.verify_slot(&FirmwareId(id.clone()), slot)?;
            print_json(&json!({ "id": id, "slot": slot, "verified": true }))
        }
    }
}

fn slot_change(replacement: Option<&std::path::Path>, clear: bool) -> SlotChange<'_> {
    match (replacement, clear) {
        (Some(path), _) => SlotChange::Replace(path),
        (None, true) => SlotChange::Clear,
        (None, false) => SlotChange::Keep,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_firmware_update_flags() {
        let cli = Cli::try_parse_from([
            "hbox-admin",
            "--data-dir",
            "/srv/hbox",
            "firmware",
            "update",
            "abc123",
            "--version",
            "1.2.3",
            "--clear-slot-b",
        ])
        .expect("parse");

        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/hbox")));
        match cli.command {
            Command::Firmware {
                command:
                    FirmwareCommand::Update {
                        id,
                        version,
                        clear_slot_b,
                        slot_b,
                        ..
                    },
            } => {
                assert_eq!(id, "abc123");
                assert_eq!(version.as_deref(), Some("1.2.3"));
                assert!(clear_slot_b);
                assert_eq!(slot_change(slot_b.as_deref(), clear_slot_b), SlotChange::Clear);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn replacing_and_clearing_a_slot_conflict() {
        let result = Cli::try_parse_from([
            "hbox-admin",
            "firmware",
            "update",
            "abc123",
            "--slot-a",
            "a.zip",
            "--clear-slot-a",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn register_then_authenticate_through_services() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().to_str().expect("utf-8 tempdir");
        let raw = "AABBCCDD-11223344-55667788";
        let id = "29ABFA67DB7B6F85";

        let register = Cli::try_parse_from(["hbox-admin", "--data-dir", data, "register", raw, id])
            .expect("parse register");
        run(register).expect("register");

        let encoded = AuthEnvelope::signed(id, "ch1", 1_000_000)
            .to_encoded()
            .expect("encode");
        let authenticate = Cli::try_parse_from([
            "hbox-admin",
            "authenticate",
            encoded.as_str(),
            "--data-dir",
            data,
        ])
        .expect("parse authenticate");
        run(authenticate).expect("authenticate");

        let svc = RegistryServices::init(dir.path().to_path_buf(), None).expect("init");
        let entries = svc.audit_entries_for_subject(id).expect("entries");
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["register", "authenticate"]);
        assert!(svc.devices()[0].last_seen >= svc.devices()[0].register_time);
    }
}
