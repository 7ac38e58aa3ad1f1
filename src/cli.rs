use crate::watch::WatchMode;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "routescope",
    version,
    about = "NestJS route explorer",
    after_help = r#"Examples:
  routescope scan --root .
  routescope search --root . --query "cats id"
  routescope search --root . --query users --flat
  routescope request --method toggle_owner --params '{"owner":"CatsController"}'
  routescope serve --root apps/api --root apps/admin --watch auto
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Clone)]
pub struct WorkspaceArgs {
    /// Workspace root to scan; repeat for several roots.
    #[arg(long = "root", default_value = ".")]
    pub roots: Vec<PathBuf>,
    /// Config file (default: routescope.yaml/.yml/.json in the first root).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan once and print controllers and routes as JSON.
    Scan {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },
    /// Scan once and print a search result as JSON.
    Search {
        #[command(flatten)]
        workspace: WorkspaceArgs,
        #[arg(long, default_value = "")]
        query: String,
        /// Print the flat match list instead of the grouped result.
        #[arg(long)]
        flat: bool,
    },
    /// Run a single JSONL request and exit.
    Request {
        #[command(flatten)]
        workspace: WorkspaceArgs,
        #[arg(long)]
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value = "1")]
        id: String,
    },
    /// Run JSONL RPC server over stdin/stdout.
    Serve {
        #[command(flatten)]
        workspace: WorkspaceArgs,
        /// File watch mode: auto|on|off.
        #[arg(long, default_value = "auto")]
        watch: WatchMode,
        /// Debounce window for filesystem events in milliseconds
        /// (default: watchDebounceMs from config).
        #[arg(long)]
        watch_debounce_ms: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_roots() {
        let args = Args::try_parse_from([
            "routescope",
            "search",
            "--root",
            "a",
            "--root",
            "b",
            "--query",
            "cats",
            "--flat",
        ])
        .unwrap();
        let Command::Search {
            workspace,
            query,
            flat,
        } = args.command
        else {
            panic!("expected search");
        };
        assert_eq!(workspace.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(query, "cats");
        assert!(flat);
    }

    #[test]
    fn serve_defaults_to_auto_watch() {
        let args = Args::try_parse_from(["routescope", "serve"]).unwrap();
        let Command::Serve {
            workspace,
            watch,
            watch_debounce_ms,
        } = args.command
        else {
            panic!("expected serve");
        };
        assert_eq!(workspace.roots, vec![PathBuf::from(".")]);
        assert_eq!(watch, WatchMode::Auto);
        assert_eq!(watch_debounce_ms, None);
    }
}
