//! dirlookup command-line tool.
//!
//! Generates and validates configuration files, checks that the directory
//! server accepts the configured bind, and runs user lookups by email or by
//! account name.

mod output;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use dirlookup_core::config::AppConfig;
use dirlookup_core::directory::filter::{
    escape_filter_chars, FILTER_SPECIAL_CHARS, FILTER_SPECIAL_CHARS_KEEP_WILDCARD,
};
use dirlookup_core::directory::{
    DirectoryConnector, DirectorySession, LdapSession, SearchRecord, UserLookup,
};

use output::OutputFormat;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// dirlookup command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "dirlookup",
    version,
    about = "Look up directory users by email address or account name"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// (default: <user config dir>/dirlookup/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a sample configuration file.
    Init {
        /// Output path (default: the --config path).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,

    /// Bind to the directory server and report the outcome.
    Check,

    /// Search for user objects.
    Search {
        #[command(subcommand)]
        by: SearchBy,
    },

    /// Print a value escaped for use inside a search filter.
    Escape {
        /// Raw value.
        text: String,

        /// Leave `*` unescaped.
        #[arg(long)]
        keep_wildcard: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SearchBy {
    /// Users whose mail attribute starts with EMAIL.
    Email {
        email: String,

        #[command(flatten)]
        opts: SearchOpts,
    },
    /// Users whose sAMAccountName starts with USER_ID.
    UserId {
        user_id: String,

        #[command(flatten)]
        opts: SearchOpts,
    },
}

#[derive(Args, Debug)]
struct SearchOpts {
    /// Search base DN (default: the configured base_dn).
    #[arg(long)]
    base: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    match cli.command {
        Commands::Init { output } => {
            init_logging(cli.verbose, None);
            cmd_init(output.as_deref().unwrap_or(&config_path))
        }
        Commands::Escape {
            text,
            keep_wildcard,
        } => {
            init_logging(cli.verbose, None);
            cmd_escape(&text, keep_wildcard);
            Ok(())
        }
        Commands::Validate => cmd_validate(&config_path, cli.verbose),
        Commands::Check => {
            let config = load_config(&config_path)?;
            init_logging(cli.verbose, Some(&config));
            cmd_check(&config)
        }
        Commands::Search { by } => {
            let config = load_config(&config_path)?;
            init_logging(cli.verbose, Some(&config));
            let (lookup, value, opts) = match by {
                SearchBy::Email { email, opts } => (UserLookup::Email, email, opts),
                SearchBy::UserId { user_id, opts } => (UserLookup::UserId, user_id, opts),
            };
            cmd_search(&config, lookup, &value, &opts)
        }
    }
}

/// Logs go to stderr. `RUST_LOG` wins over `--verbose`, which wins over the
/// config file's `log_level`.
fn init_logging(verbose: bool, config: Option<&AppConfig>) {
    let level = if verbose {
        "debug"
    } else {
        config.map_or("warn", |c| c.logging.log_level.as_str())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

const SAMPLE_CONFIG: &str = r#"# dirlookup configuration

[directory]
# Hostname or IP of the directory server (no scheme).
host = "dc01.example.com"
# Default search base.
base_dn = "DC=example,DC=com"
# Identity for the simple bind: a DN or DOMAIN\user.
bind_identity = "EXAMPLE\\svc-lookup"
# Environment variable holding the bind password.
bind_password_env = "DIRLOOKUP_BIND_PASSWORD"
# 389 is promoted to 636 when use_tls is true.
port = 389
use_tls = false
connect_timeout_secs = 10

[logging]
# trace, debug, info, warn, error
log_level = "warn"
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    std::fs::write(output, SAMPLE_CONFIG).context("failed to write config file")?;

    println!("Sample configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the [directory] section for your server");
    println!("  2. export DIRLOOKUP_BIND_PASSWORD=...");
    println!(
        "  3. Check the bind with: dirlookup --config {} check",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path, verbose: bool) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    init_logging(verbose, Some(&config));
    println!("  [OK] TOML structure is valid");

    config.resolve_env_vars()?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All required fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let dir = &config.directory;
    println!();
    println!("Configuration summary:");
    println!("  Host          : {}", dir.host);
    println!("  Port          : {}", dir.effective_port());
    println!(
        "  Transport     : {}",
        if dir.use_tls { "LDAPS" } else { "cleartext LDAP" }
    );
    println!("  Base DN       : {}", dir.base_dn);
    println!("  Bind identity : {}", dir.bind_identity);
    println!(
        "  Bind password : {}",
        if dir.bind_password.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!("  Timeout       : {}s", dir.connect_timeout_secs);
    println!();

    if dir.bind_password.is_none() {
        println!(
            "{}",
            style::warn(&format!(
                "{} is not set; lookups will fail until it is",
                dir.bind_password_env
            ))
        );
    } else {
        println!("Configuration is valid.");
    }

    Ok(())
}

fn cmd_check(config: &AppConfig) -> Result<()> {
    let dir = &config.directory;
    let mut session =
        LdapSession::lazy_from_config(dir).context("failed to build session settings")?;

    match session.try_bind() {
        Ok(()) => {
            println!(
                "{}",
                style::success(&format!(
                    "bound to {}:{} as {}",
                    dir.host,
                    dir.effective_port(),
                    dir.bind_identity
                ))
            );
            session.unbind().context("unbind failed")?;
            Ok(())
        }
        Err(e) => {
            println!("{}", style::error(&format!("bind failed: {}", e)));
            anyhow::bail!("directory check failed");
        }
    }
}

fn cmd_search(
    config: &AppConfig,
    lookup: UserLookup,
    value: &str,
    opts: &SearchOpts,
) -> Result<()> {
    let mut session = LdapSession::lazy_from_config(&config.directory)
        .context("failed to build session settings")?;
    session
        .try_bind()
        .context("failed to bind to directory server")?;

    let records = lookup_and_unbind(&mut session, lookup, value, opts.base.as_deref())?;

    if opts.format == OutputFormat::Table {
        println!("{}", style::header(&format!("Results for {} {}", lookup.label(), value)));
        println!();
    }
    println!("{}", output::render(&records, opts.format)?);
    Ok(())
}

/// Run one lookup and release the session whatever its outcome.
fn lookup_and_unbind<C: DirectoryConnector>(
    session: &mut DirectorySession<C>,
    lookup: UserLookup,
    value: &str,
    base: Option<&str>,
) -> Result<Vec<SearchRecord>> {
    let result = session.search_user(lookup, value, base);
    if let Err(e) = session.unbind() {
        warn!(error = %e, "unbind after search failed");
    }
    result.with_context(|| format!("{} lookup failed", lookup.label()))
}

fn cmd_escape(text: &str, keep_wildcard: bool) {
    let chars = if keep_wildcard {
        FILTER_SPECIAL_CHARS_KEEP_WILDCARD
    } else {
        FILTER_SPECIAL_CHARS
    };
    println!("{}", escape_filter_chars(text, chars));
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use dirlookup_core::config::{BindCredential, SessionConfig};
    use dirlookup_core::directory::{DirectoryConnection, RawEntry, SearchScope, ServerDescriptor};
    use dirlookup_core::errors::DirectoryError;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_email() {
        let cli = Cli::try_parse_from([
            "dirlookup",
            "--config",
            "/tmp/d.toml",
            "search",
            "email",
            "jane@",
            "--base",
            "OU=Staff,DC=example,DC=com",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/d.toml")));
        match cli.command {
            Commands::Search {
                by: SearchBy::Email { email, opts },
            } => {
                assert_eq!(email, "jane@");
                assert_eq!(opts.base.as_deref(), Some("OU=Staff,DC=example,DC=com"));
                assert_eq!(opts.format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_search_user_id_defaults() {
        let cli = Cli::try_parse_from(["dirlookup", "search", "user-id", "jdoe"]).unwrap();
        match cli.command {
            Commands::Search {
                by: SearchBy::UserId { user_id, opts },
            } => {
                assert_eq!(user_id, "jdoe");
                assert!(opts.base.is_none());
                assert_eq!(opts.format, OutputFormat::Table);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_sample_config_parses_and_validates() {
        let config: AppConfig = toml::from_str(SAMPLE_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.directory.bind_identity, "EXAMPLE\\svc-lookup");
        assert_eq!(config.directory.bind_password_env, "DIRLOOKUP_BIND_PASSWORD");
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        cmd_init(&path).unwrap();
        assert!(path.exists());

        let err = cmd_init(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    /// Connection whose searches always fail; counts unbinds.
    struct FailingSearch {
        unbinds: Rc<Cell<usize>>,
        bound: bool,
    }

    struct FailingConnector {
        unbinds: Rc<Cell<usize>>,
    }

    impl DirectoryConnector for FailingConnector {
        type Connection = FailingSearch;

        fn connect(
            &self,
            _server: &ServerDescriptor,
            _identity: &str,
            _credential: &BindCredential,
        ) -> Result<FailingSearch, DirectoryError> {
            Ok(FailingSearch {
                unbinds: Rc::clone(&self.unbinds),
                bound: true,
            })
        }
    }

    impl DirectoryConnection for FailingSearch {
        fn is_bound(&self) -> bool {
            self.bound
        }

        fn search(
            &mut self,
            base: &str,
            filter: &str,
            _scope: SearchScope,
            _attributes: &[&str],
        ) -> Result<Vec<RawEntry>, DirectoryError> {
            Err(DirectoryError::Search {
                base: base.to_string(),
                filter: filter.to_string(),
                detail: "rc=32 (noSuchObject)".into(),
            })
        }

        fn unbind(&mut self) -> Result<(), DirectoryError> {
            self.bound = false;
            self.unbinds.set(self.unbinds.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_failed_lookup_still_unbinds() {
        let unbinds = Rc::new(Cell::new(0));
        let config = SessionConfig::new(
            "dc01.example.com",
            "DC=example,DC=com",
            "EXAMPLE\\svc-lookup",
            BindCredential::new("pw"),
        );
        let mut session = DirectorySession::new(
            config,
            FailingConnector {
                unbinds: Rc::clone(&unbinds),
            },
        );

        let err = lookup_and_unbind(&mut session, UserLookup::UserId, "jdoe", Some("OU=Gone"))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("noSuchObject"));
        assert_eq!(unbinds.get(), 1);
        assert!(!session.is_bound());
    }
}
