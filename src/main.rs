use anyhow::{Context, Result};
use clap::Parser;
use routescope::cli::{self, WorkspaceArgs};
use routescope::config::Config;
use routescope::session::SearchSession;
use routescope::{rpc, watch};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries JSON; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("routescope=info".parse().context("parse log directive")?),
        )
        .with_target(false)
        .init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Scan { workspace } => {
            let (session, _) = open_session(&workspace)?;
            let store = session.store();
            let output = json!({
                "controllers": store.controllers().as_slice(),
                "routes": store.routes().as_slice(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        cli::Command::Search {
            workspace,
            query,
            flat,
        } => {
            let (mut session, _) = open_session(&workspace)?;
            let output = if flat {
                serde_json::to_string_pretty(&session.search_flat(&query))?
            } else {
                serde_json::to_string_pretty(&session.search_with_grouping(&query))?
            };
            println!("{output}");
            Ok(())
        }
        cli::Command::Request {
            workspace,
            method,
            params,
            id,
        } => {
            let (session, _) = open_session(&workspace)?;
            let response = rpc::call(session, method, &params, &id)?;
            println!("{response}");
            Ok(())
        }
        cli::Command::Serve {
            workspace,
            watch: watch_mode,
            watch_debounce_ms,
        } => {
            let (session, config) = open_session(&workspace)?;
            let config_root = session
                .store()
                .index()
                .roots()
                .first()
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            let notifier = watch::ChangeNotifier::new(config_root, workspace.config.clone());
            let watch_config = watch::WatchConfig::new(
                watch_mode,
                watch_debounce_ms.unwrap_or(config.watch_debounce_ms),
            );
            rpc::serve(session, notifier, watch_config)
        }
    }
}

fn open_session(workspace: &WorkspaceArgs) -> Result<(SearchSession, Config)> {
    let first_root = workspace
        .roots
        .first()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = Config::load(&first_root, workspace.config.as_deref())?;
    let session = SearchSession::open(workspace.roots.clone(), &config)
        .with_context(|| format!("open workspace {}", first_root.display()))?;
    Ok((session, config))
}
