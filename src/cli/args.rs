//! CLI argument definitions using clap derive

use crate::ops::FileSpec;
use crate::referrers::ReferrersMode;
use crate::target::LayoutReference;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// orca - replicate OCI artifacts between content-addressable stores
///
/// Targets are OCI image layout directories, written
/// `<dir>[:<tag>|@<digest>]`.
#[derive(Parser, Debug)]
#[command(name = "orca")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ORCA_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy an artifact and everything it references
    Copy(CopyArgs),

    /// Package files as an artifact
    Push(PushArgs),

    /// Write an artifact's titled files to a directory
    Pull(PullArgs),

    /// Add tags to an existing artifact
    Tag(TagArgs),

    /// List artifacts referring to an artifact
    Discover(DiscoverArgs),

    /// Delete an artifact
    Delete(DeleteArgs),

    /// Copy artifacts and their referrers into a layout
    Backup(BackupArgs),

    /// Copy artifacts out of a backup layout
    Restore(RestoreArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Inspect or clear the content cache
    Cache(CacheArgs),
}

/// Flags shared by every command that copies content
#[derive(Args, Debug, Clone, Default)]
pub struct CopyFlags {
    /// Maximum concurrent transfers (default: from config)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// How referrers are discovered and recorded (default: from config)
    #[arg(long, value_enum)]
    pub referrers: Option<ReferrersMode>,

    /// Keep superseded referrers indexes
    #[arg(long)]
    pub skip_gc: bool,
}

/// Arguments for the copy command
#[derive(Parser, Debug)]
pub struct CopyArgs {
    /// Source, e.g. ./images:v1
    pub source: LayoutReference,

    /// Destination; tagged with the source tag unless it names its own
    pub destination: LayoutReference,

    /// Also copy artifacts referring to the source
    #[arg(short, long)]
    pub recursive: bool,

    /// Rounds of referrer discovery with --recursive
    #[arg(long, requires = "recursive")]
    pub depth: Option<usize>,

    /// Only follow referrers of this artifact type
    #[arg(long)]
    pub artifact_type: Option<String>,

    /// Additional tags for the destination (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub tag: Vec<String>,

    /// Show what would be copied without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Bypass the content cache
    #[arg(long)]
    pub no_cache: bool,

    #[command(flatten)]
    pub flags: CopyFlags,
}

/// Arguments for the push command
#[derive(Parser, Debug)]
pub struct PushArgs {
    /// Destination, e.g. ./artifacts:v1
    pub destination: LayoutReference,

    /// Files to push, as path[:media-type]
    #[arg(required = true)]
    pub files: Vec<FileSpec>,

    /// Artifact type of the manifest
    #[arg(long)]
    pub artifact_type: Option<String>,

    /// Media type for files without one
    #[arg(long)]
    pub media_type: Option<String>,

    /// Config blob, as path[:media-type]
    #[arg(long = "config-file")]
    pub config_file: Option<FileSpec>,

    /// Manifest annotation (KEY=VALUE)
    #[arg(short, long, value_parser = parse_annotation)]
    pub annotation: Vec<(String, String)>,

    /// Reference of the artifact this one refers to, in the destination
    #[arg(long)]
    pub subject: Option<String>,

    /// Additional tags (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub tag: Vec<String>,

    #[command(flatten)]
    pub flags: CopyFlags,
}

/// Arguments for the pull command
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// Source, e.g. ./artifacts:v1
    pub source: LayoutReference,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Also pull files of artifacts referring to the source
    #[arg(long)]
    pub include_referrers: bool,

    /// Only follow referrers of this artifact type
    #[arg(long, requires = "include_referrers")]
    pub artifact_type: Option<String>,

    /// Write the config blob to this path inside the output directory
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Show what would be written without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Bypass the content cache
    #[arg(long)]
    pub no_cache: bool,

    #[command(flatten)]
    pub flags: CopyFlags,
}

/// Arguments for the tag command
#[derive(Parser, Debug)]
pub struct TagArgs {
    /// Artifact to tag, e.g. ./images:v1
    pub target: LayoutReference,

    /// New tags
    #[arg(required = true)]
    pub tags: Vec<String>,

    /// Maximum concurrent tag operations (default: from config)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the discover command
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Subject artifact, e.g. ./images:v1
    pub target: LayoutReference,

    /// Only list referrers of this artifact type
    #[arg(long)]
    pub artifact_type: Option<String>,

    /// Levels of referrers to expand (default: all)
    #[arg(long)]
    pub depth: Option<usize>,

    /// How referrers are discovered (default: from config)
    #[arg(long, value_enum)]
    pub referrers: Option<ReferrersMode>,

    /// Output format
    #[arg(short, long, default_value = "tree")]
    pub format: OutputFormat,
}

/// Arguments for the delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Artifact to delete, e.g. ./images@sha256:...
    pub target: LayoutReference,

    /// How the subject's referrers are recorded (default: from config)
    #[arg(long, value_enum)]
    pub referrers: Option<ReferrersMode>,

    /// Keep superseded referrers indexes
    #[arg(long)]
    pub skip_gc: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the backup command
#[derive(Parser, Debug)]
pub struct BackupArgs {
    /// Source layout; its reference is backed up unless --ref is given
    pub source: LayoutReference,

    /// Backup layout directory (created when missing)
    pub output: PathBuf,

    /// Reference to back up (repeatable; default: every source tag)
    #[arg(long = "ref")]
    pub references: Vec<String>,

    /// Skip artifacts referring to the backed up ones
    #[arg(long)]
    pub exclude_referrers: bool,

    /// Only follow referrers of this artifact type
    #[arg(long, conflicts_with = "exclude_referrers")]
    pub artifact_type: Option<String>,

    /// Bypass the content cache
    #[arg(long)]
    pub no_cache: bool,

    #[command(flatten)]
    pub flags: CopyFlags,
}

/// Arguments for the restore command
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Backup layout directory
    pub input: PathBuf,

    /// Destination layout
    pub destination: PathBuf,

    /// Tag to restore (repeatable; default: every tag in the backup)
    #[arg(long = "ref")]
    pub references: Vec<String>,

    /// Skip artifacts referring to the restored ones
    #[arg(long)]
    pub exclude_referrers: bool,

    /// Only follow referrers of this artifact type
    #[arg(long, conflicts_with = "exclude_referrers")]
    pub artifact_type: Option<String>,

    /// Show what would be copied without writing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub flags: CopyFlags,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., copy.concurrency)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Indented tree
    Tree,
    /// JSON output
    Json,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache roots and their usage
    Info,

    /// Remove every cached blob
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Parse an annotation in KEY=VALUE format
fn parse_annotation(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if pos == 0 {
        return Err(format!("empty annotation key in '{s}'"));
    }
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Reference;

    #[test]
    fn parse_annotation_valid() {
        let (k, v) = parse_annotation("org.example.owner=team=a").unwrap();
        assert_eq!(k, "org.example.owner");
        assert_eq!(v, "team=a");
    }

    #[test]
    fn parse_annotation_invalid() {
        assert!(parse_annotation("novalue").is_err());
        assert!(parse_annotation("=value").is_err());
    }

    #[test]
    fn cli_parses_copy() {
        let cli = Cli::parse_from([
            "orca", "copy", "./src:v1", "./dst", "-r", "--tag", "a,b", "--referrers", "tag-scheme",
        ]);
        match cli.command {
            Commands::Copy(args) => {
                assert_eq!(args.source.path, PathBuf::from("./src"));
                assert_eq!(args.source.reference, Some(Reference::Tag("v1".to_string())));
                assert!(args.destination.reference.is_none());
                assert!(args.recursive);
                assert_eq!(args.tag, vec!["a", "b"]);
                assert_eq!(args.flags.referrers, Some(ReferrersMode::TagScheme));
            }
            _ => panic!("expected Copy command"),
        }
    }

    #[test]
    fn cli_depth_requires_recursive() {
        let result = Cli::try_parse_from(["orca", "copy", "./src:v1", "./dst", "--depth", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_push() {
        let cli = Cli::parse_from([
            "orca",
            "push",
            "./out:v1",
            "a.txt",
            "b.tar:application/vnd.example.layer",
            "-a",
            "owner=me",
        ]);
        match cli.command {
            Commands::Push(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(
                    args.files[1].media_type.as_deref(),
                    Some("application/vnd.example.layer")
                );
                assert_eq!(args.annotation, vec![("owner".to_string(), "me".to_string())]);
            }
            _ => panic!("expected Push command"),
        }
    }

    #[test]
    fn cli_push_requires_files() {
        assert!(Cli::try_parse_from(["orca", "push", "./out:v1"]).is_err());
    }

    #[test]
    fn cli_parses_restore_refs() {
        let cli = Cli::parse_from([
            "orca", "restore", "./backup", "./dst", "--ref", "v1", "--ref", "v2", "--dry-run",
        ]);
        match cli.command {
            Commands::Restore(args) => {
                assert_eq!(args.references, vec!["v1", "v2"]);
                assert!(args.dry_run);
            }
            _ => panic!("expected Restore command"),
        }
    }

    #[test]
    fn cli_parses_cache_clear() {
        let cli = Cli::parse_from(["orca", "cache", "clear", "-y"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Clear { yes },
            }) => assert!(yes),
            _ => panic!("expected Cache Clear command"),
        }
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["orca", "cache", "info"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["orca", "-v", "cache", "info"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["orca", "-vv", "cache", "info"]);
        assert_eq!(cli.verbose, 2);
    }
}
