// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! qix - QIX engine operator CLI
//!
//! Front end for the archive / reload / snapshot flows plus a handful of
//! one-shot inspection commands.
//!
//! Usage:
//!   qix <command> [options]
//!
//! Commands:
//!   ls                            List the document catalogue
//!   archive [-a <title>]          Extract apps to the workdir
//!   script <app>                  Print an app's load script
//!   objects <app>                 List every object in an app
//!   sheets <app>                  List each sheet's children
//!   props <app> --object <id>     Print an object's stored definition
//!   reload [--config <file>]      Reload the configured apps
//!   snapshot                      Commit and push the workdir
//!   whoami                        Echo the authenticated identity
//!   check-certs                   Validate the certificate material

use std::path::Path;
use std::process::ExitCode;

use serde_json::{Value, json};
use tracing::debug;

use qix_ops::{
    DEFAULT_PROJECT_FILE, OpsError, ProjectConfig, ReloadStatus, ReloadTiming, SnapshotOutcome,
    archive_all, artifact, run_reloads, snapshot,
};
use qix_protocol::{TlsIdentity, build_client_tls};
use qix_session::{DocListEntry, EngineConfig, ObjectHandle, Session, Target};

fn print_usage() {
    eprintln!(
        r#"Usage: qix <command> [options]

Operate a QIX engine: list and extract apps, batch reload, snapshot.

COMMANDS:
    ls                              List the document catalogue
    archive                         Extract every app to the workdir
    script <app>                    Print an app's load script
    objects <app>                   List every object in an app
    sheets <app>                    List each sheet's children
    props <app> --object <id>       Print an object's stored definition
    reload                          Reload the configured apps in order
    snapshot                        Commit and push the workdir
    whoami                          Echo the authenticated identity
    check-certs                     Validate the certificate material

TARGET:
    -t, --target <Local|Remote>     Engine to talk to (default: Local)

ARCHIVE OPTIONS:
    -a, --app <title>               Only this app

PROPS OPTIONS:
    --object <id>                   Object to inspect (required)
    --full                          Full property tree instead of properties

RELOAD OPTIONS:
    --config <file>                 Project file (default: qix.toml)
    -d, --dryrun                    Open check only, no reload or save

ENVIRONMENT:
    QIX_LOCAL_URI                   Local engine URI (default: ws://localhost:4848/app/)
    QIX_LOCAL_WORKDIR               Artifact root for the Local target
    QIX_REMOTE_URI                  Remote engine URI
    QIX_REMOTE_WORKDIR              Artifact root for the Remote target
    QIX_CERT_DIR                    Directory with client.pem, client_key.pem, root.pem
    QIX_USER_DIRECTORY              Impersonated user directory
    QIX_USER_ID                     Impersonated user id
    QIX_SKIP_TLS_VERIFY             Skip server certificate verification (default: false)

EXAMPLES:
    # Archive everything the local desktop engine serves
    qix archive

    # Reload the allow-list from qix.toml against the server
    qix reload -t Remote

    # Inspect one chart's stored definition
    qix props "Sales" --object qtkJfs --full
"#
    );
}

#[derive(Debug)]
enum Command {
    Ls {
        target: Target,
    },
    Archive {
        target: Target,
        app: Option<String>,
    },
    Script {
        target: Target,
        app: String,
    },
    Objects {
        target: Target,
        app: String,
    },
    Sheets {
        target: Target,
        app: String,
    },
    Props {
        target: Target,
        app: String,
        object: String,
        full: bool,
    },
    Reload {
        target: Target,
        config_path: String,
        dryrun: bool,
    },
    Snapshot {
        target: Target,
    },
    Whoami {
        target: Target,
    },
    CheckCerts,
}

fn parse_target(raw: &str) -> Result<Target, String> {
    raw.parse::<Target>().map_err(|e| e.to_string())
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            std::process::exit(0);
        }
        "ls" => {
            let mut target = Target::Local;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Ls { target })
        }
        "archive" => {
            let mut target = Target::Local;
            let mut app: Option<String> = None;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    "-a" | "--app" => {
                        i += 1;
                        app = Some(args.get(i).ok_or("--app requires a title")?.clone());
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Archive { target, app })
        }
        "script" => {
            let app = args.get(2).ok_or("App title required")?.clone();
            let mut target = Target::Local;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Script { target, app })
        }
        "objects" => {
            let app = args.get(2).ok_or("App title required")?.clone();
            let mut target = Target::Local;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Objects { target, app })
        }
        "sheets" => {
            let app = args.get(2).ok_or("App title required")?.clone();
            let mut target = Target::Local;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Sheets { target, app })
        }
        "props" => {
            let app = args.get(2).ok_or("App title required")?.clone();
            let mut target = Target::Local;
            let mut object: Option<String> = None;
            let mut full = false;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    "--object" => {
                        i += 1;
                        object = Some(args.get(i).ok_or("--object requires an id")?.clone());
                    }
                    "--full" => {
                        full = true;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Props {
                target,
                app,
                object: object.ok_or("--object is required")?,
                full,
            })
        }
        "reload" => {
            let mut target = Target::Local;
            let mut config_path = DEFAULT_PROJECT_FILE.to_string();
            let mut dryrun = false;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    "--config" => {
                        i += 1;
                        config_path = args.get(i).ok_or("--config requires a path")?.clone();
                    }
                    "-d" | "--dryrun" => {
                        dryrun = true;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Reload {
                target,
                config_path,
                dryrun,
            })
        }
        "snapshot" => {
            let mut target = Target::Local;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Snapshot { target })
        }
        "whoami" => {
            let mut target = Target::Local;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" | "--target" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--target requires a mode")?)?;
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Whoami { target })
        }
        "check-certs" => Ok(Command::CheckCerts),
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qix_ops=info,qix_session=info,qix_protocol=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    let cmd = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match execute_command(cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn engine_config(target: Target) -> Result<EngineConfig, String> {
    EngineConfig::from_env(target).map_err(|e| e.to_string())
}

/// Find an app in the live catalogue by title. On duplicated titles the
/// later document wins, same as the reload batch.
async fn resolve_doc(config: &EngineConfig, title: &str) -> Result<DocListEntry, String> {
    let mut session = Session::connect(config, None)
        .await
        .map_err(|e| e.to_string())?;
    let docs = session.doc_list().await.map_err(|e| e.to_string())?;
    session.close().await;
    docs.into_iter()
        .rev()
        .find(|d| d.title == title)
        .ok_or_else(|| OpsError::UnknownApp(title.to_string()).to_string())
}

async fn open_app(
    config: &EngineConfig,
    doc_id: &str,
) -> Result<(Session, ObjectHandle), String> {
    let mut session = Session::connect(config, Some(doc_id))
        .await
        .map_err(|e| e.to_string())?;
    let app = session.open_doc(doc_id).await.map_err(|e| e.to_string())?;
    Ok((session, app))
}

async fn execute_command(cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Ls { target } => {
            let config = engine_config(target)?;
            let mut session = Session::connect(&config, None)
                .await
                .map_err(|e| e.to_string())?;
            let docs = session.doc_list().await.map_err(|e| e.to_string())?;
            session.close().await;

            let summary: Vec<Value> = docs
                .iter()
                .map(|d| {
                    json!({
                        "title": d.title,
                        "docId": d.doc_id,
                        "stream": d.meta.stream.as_ref().map(|s| s.name.clone()),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&Value::Array(summary)).map_err(|e| e.to_string())?
            );
        }

        Command::Archive { target, app } => {
            let config = engine_config(target)?;
            let report = archive_all(&config, app.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            println!(
                "Archived {} apps ({} skipped)",
                report.apps_written, report.apps_skipped
            );
        }

        Command::Script { target, app } => {
            let config = engine_config(target)?;
            let doc = resolve_doc(&config, &app).await?;
            let (mut session, handle) = open_app(&config, &doc.doc_id).await?;
            let script = session.script(handle).await.map_err(|e| e.to_string())?;
            session.close().await;
            print!("{}", script);
        }

        Command::Objects { target, app } => {
            let config = engine_config(target)?;
            let doc = resolve_doc(&config, &app).await?;
            let (mut session, handle) = open_app(&config, &doc.doc_id).await?;
            let infos = session.all_infos(handle).await.map_err(|e| e.to_string())?;
            session.close().await;
            for info in infos {
                println!("{} - {}", info.obj_type, info.id);
            }
        }

        Command::Sheets { target, app } => {
            let config = engine_config(target)?;
            let doc = resolve_doc(&config, &app).await?;
            let (mut session, handle) = open_app(&config, &doc.doc_id).await?;
            let lists = session.app_lists(handle).await.map_err(|e| e.to_string())?;
            for sheet in &lists.sheets.items {
                let Some(sheet_id) = sheet["qInfo"]["qId"].as_str() else {
                    continue;
                };
                let name =
                    artifact::title_or_id(sheet.get("qMeta").and_then(|m| m.get("title")), sheet_id);
                let sheet_handle = session
                    .object(handle, sheet_id)
                    .await
                    .map_err(|e| e.to_string())?;
                let children = session
                    .child_infos(sheet_handle)
                    .await
                    .map_err(|e| e.to_string())?;
                println!("{}:", name);
                for child in children {
                    println!("    {} - {}", child.obj_type, child.id);
                }
            }
            session.close().await;
        }

        Command::Props {
            target,
            app,
            object,
            full,
        } => {
            let config = engine_config(target)?;
            let doc = resolve_doc(&config, &app).await?;
            let (mut session, handle) = open_app(&config, &doc.doc_id).await?;
            let object_handle = session
                .object(handle, &object)
                .await
                .map_err(|e| e.to_string())?;
            let payload = if full {
                session.full_property_tree(object_handle).await
            } else {
                session.properties(object_handle).await
            }
            .map_err(|e| e.to_string())?;
            session.close().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?
            );
        }

        Command::Reload {
            target,
            config_path,
            dryrun,
        } => {
            let config = engine_config(target)?;
            let project =
                ProjectConfig::load(Path::new(&config_path)).map_err(|e| e.to_string())?;
            let apps = project.reload_apps();
            if apps.is_empty() {
                println!("No apps configured in {}", config_path);
                return Ok(());
            }

            let outcomes = run_reloads(&config, &apps, &ReloadTiming::default(), dryrun)
                .await
                .map_err(|e| e.to_string())?;
            for outcome in &outcomes {
                let status = match outcome.status {
                    ReloadStatus::Reloaded => "reloaded",
                    ReloadStatus::SaveFailed => "reloaded, save FAILED",
                    ReloadStatus::DryRun => "ok (dry run)",
                };
                println!("{}: {}", outcome.title, status);
            }
        }

        Command::Snapshot { target } => {
            let config = engine_config(target)?;
            match snapshot(&config.workdir).map_err(|e| e.to_string())? {
                SnapshotOutcome::Clean => println!("Nothing to snapshot"),
                SnapshotOutcome::Pushed { commit } => println!("Pushed {}", commit),
            }
        }

        Command::Whoami { target } => {
            let config = engine_config(target)?;
            let mut session = Session::connect(&config, None)
                .await
                .map_err(|e| e.to_string())?;
            let user = session
                .authenticated_user()
                .await
                .map_err(|e| e.to_string())?;
            session.close().await;
            println!("{}", user);
        }

        Command::CheckCerts => {
            let dir = std::env::var("QIX_CERT_DIR")
                .map_err(|_| "QIX_CERT_DIR is not set".to_string())?;
            let identity = TlsIdentity::from_dir(Path::new(&dir));
            build_client_tls(&identity).map_err(|e| e.to_string())?;
            println!("Certificates OK ({})", dir);
        }
    }

    Ok(())
}
