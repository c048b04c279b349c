use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use memsync::{loc::user, store::DEFAULT_STORE_FILE, Config, FileId, LocalStore, RemoteConfig};
use memsync_drive::{configure_drive, storage::gdrive::GoogleDrive};

#[derive(Parser)]
#[command(name = "memsync")]
#[command(author, version, about, long_about=None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[clap(long, short = 'c', global = true)]
    config: Option<Utf8PathBuf>,

    /// Path of the store file
    #[clap(long, short = 's', global = true)]
    store: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create the store if it does not exist
    Init,
    /// Append an entry to the store
    Add(AddArgs),
    /// Print all entries
    List,
    /// Mirror the store to Google Drive
    Sync(SyncArgs),
    /// Check the Google Drive credentials
    Status,
}

#[derive(clap::Args)]
struct AddArgs {
    /// Text of the entry
    #[clap(required = true)]
    text: Vec<String>,

    /// Mirror the store after the entry is added
    #[clap(long)]
    sync: bool,

    #[command(flatten)]
    target: SyncArgs,
}

#[derive(clap::Args)]
struct SyncArgs {
    /// Name of the remote file (defaults to the store file name)
    #[clap(long, short = 't')]
    target: Option<String>,

    /// Id of the Drive folder to mirror into
    #[clap(long, short = 'f')]
    folder: Option<String>,
}

/// Settings resolved from command line, config file and defaults
struct Settings {
    store_path: Utf8PathBuf,
    target_name: Option<String>,
    folder_id: Option<FileId>,
}

impl Settings {
    async fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from_file(path).await?,
            None => {
                let path = user::config_file()?;
                if path.exists() {
                    log::info!("Found config file: {path}");
                    Config::load_from_file(&path).await?
                } else {
                    Config::default()
                }
            }
        };
        log::trace!("Loaded config: {config:?}");

        let store_path = cli
            .store
            .clone()
            .or(config.store_path)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_STORE_FILE));
        Ok(Self {
            store_path,
            target_name: config.target_name,
            folder_id: config.folder_id,
        })
    }

    fn target_name(&self, args: &SyncArgs) -> String {
        args.target
            .clone()
            .or_else(|| self.target_name.clone())
            .unwrap_or_else(|| default_target_name(&self.store_path))
    }

    fn folder_id(&self, args: &SyncArgs) -> Option<FileId> {
        args.folder
            .clone()
            .map(FileId::from)
            .or_else(|| self.folder_id.clone())
    }
}

fn default_target_name(store_path: &Utf8Path) -> String {
    store_path
        .file_name()
        .unwrap_or(DEFAULT_STORE_FILE)
        .to_string()
}

async fn sync(settings: &Settings, args: &SyncArgs) -> anyhow::Result<()> {
    let remote_config = RemoteConfig::from_env()?;
    let handle = configure_drive(
        &remote_config,
        &settings.target_name(args),
        settings.folder_id(args),
    )?;
    let res = handle.sync(&settings.store_path).await?;
    println!("{}", serde_json::to_string_pretty(&res)?);
    Ok(())
}

async fn status() -> anyhow::Result<()> {
    let remote_config = RemoteConfig::from_env()?;
    let drive = GoogleDrive::from_config(&remote_config, reqwest::Client::new())?;
    let about = drive.check_access().await?;
    match &about.user.email_address {
        Some(email) => println!("connected as {} <{email}>", about.user.display_name),
        None => println!("connected as {}", about.user.display_name),
    }
    if let Some(usage) = about.storage_quota.describe_usage() {
        println!("usage: {usage}");
    }
    if let Some(folder) = &remote_config.folder_id {
        println!("folder: {folder}");
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::resolve(&cli).await?;

    match &cli.command {
        Commands::Init => {
            let store = LocalStore::initialize(&settings.store_path).await?;
            println!("{}", store.path());
        }
        Commands::Add(args) => {
            let store = LocalStore::initialize(&settings.store_path).await?;
            store.append(args.text.join(" ")).await?;
            if args.sync {
                sync(&settings, &args.target).await?;
            }
        }
        Commands::List => {
            let store = LocalStore::initialize(&settings.store_path).await?;
            let entries = store.load().await?;
            if entries.is_empty() {
                println!("(no entry yet)");
            }
            for (idx, ent) in entries.iter().enumerate() {
                println!("{:>3}  {}", idx + 1, ent.as_str());
            }
        }
        Commands::Sync(args) => sync(&settings, args).await?,
        Commands::Status => status().await?,
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            log::error!("Could not start the runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
