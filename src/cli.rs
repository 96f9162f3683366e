use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keep the mod archive's stores in line with its metadata.
#[derive(Debug, Parser)]
#[command(name = "mcarch", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON).
    #[arg(short, long, global = true, env = "MCARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Metadata repository directory; overrides the configured one.
    #[arg(short, long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Report what would happen without writing to any store or document.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print reports as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// More logging; repeat for more still.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find missing, orphaned and stale files in every store.
    Check(StoreArg),
    /// Upload local files for the catalog entries they belong to.
    Archive(ArchiveArgs),
    /// Copy everything archived in one store into another.
    Propagate(PropagateArgs),
    /// Make object-store visibility match the metadata.
    SetAcl(StoreArg),
    /// Reconcile and repair: pin missing content, fix visibility and
    /// re-key stale references.
    Pin(StoreArg),
    /// Delete orphaned keys.
    Prune(PruneArgs),
    /// Upload a single file outside the catalog and print its key.
    Upload(UploadArgs),
    /// Run a repair pass on an interval until interrupted.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct StoreArg {
    /// Only this configured store.
    #[arg(short, long)]
    pub store: Option<String>,
}

#[derive(Debug, Args)]
pub struct ArchiveArgs {
    #[command(flatten)]
    pub store: StoreArg,
    /// Only match files belonging to this mod.
    #[arg(long = "mod")]
    pub mod_id: Option<String>,
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PropagateArgs {
    /// Store to copy from.
    #[arg(long)]
    pub from: String,
    /// Store to copy into.
    #[arg(long)]
    pub to: String,
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Store to prune.
    #[arg(short, long)]
    pub store: String,
    /// Actually delete; without this only the orphans are listed.
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Store to upload into.
    #[arg(short, long)]
    pub store: String,
    pub file: PathBuf,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between passes.
    #[arg(long, default_value_t = 3600)]
    pub interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["mcarch", "prune", "--store", "b2", "--confirm", "--json", "--dry-run"]);
        assert!(cli.json && cli.dry_run);
        let Command::Prune(args) = cli.command else { panic!("not prune") };
        assert_eq!(args.store, "b2");
        assert!(args.confirm);
    }

    #[test]
    fn archive_needs_files() {
        assert!(Cli::try_parse_from(["mcarch", "archive"]).is_err());
        let cli = Cli::parse_from(["mcarch", "archive", "--mod", "examplemod", "examplemod-1.0.jar"]);
        let Command::Archive(args) = cli.command else { panic!("not archive") };
        assert_eq!(args.mod_id.as_deref(), Some("examplemod"));
        assert_eq!(args.files, vec![PathBuf::from("examplemod-1.0.jar")]);
    }
}
