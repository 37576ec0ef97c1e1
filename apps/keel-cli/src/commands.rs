//! Subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use bytes::{Bytes, BytesMut};
use clap::{Args, Subcommand};
use keel_store::{LocalStore, validate_object_key};
use keel_transfer::{ReadGroup, RemoteStorage, WriteGroup};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload local files into a directory of a bucket.
    Put(PutArgs),

    /// Download objects from a directory of a bucket.
    Get(GetArgs),

    /// List the objects in a directory.
    Ls(LsArgs),

    /// Delete objects from a directory.
    Rm(RmArgs),

    /// Show an object's size.
    Stat(StatArgs),
}

#[derive(Args, Debug)]
pub struct PutArgs {
    pub bucket: String,

    /// Directory inside the bucket ("" for the bucket root).
    pub prefix: String,

    /// Files to upload; each keeps its file name.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    pub bucket: String,

    pub prefix: String,

    #[arg(required = true)]
    pub names: Vec<String>,

    /// Destination directory.
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    pub bucket: String,

    #[arg(default_value = "")]
    pub prefix: String,
}

#[derive(Args, Debug)]
pub struct RmArgs {
    pub bucket: String,

    pub prefix: String,

    pub names: Vec<String>,

    /// Delete everything under the directory.
    #[arg(long, conflicts_with = "names")]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct StatArgs {
    pub bucket: String,

    pub key: String,
}

pub async fn run(
    storage: &RemoteStorage,
    store: &LocalStore,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Put(args) => put(storage, store, args).await,
        Command::Get(args) => get(storage, args).await,
        Command::Ls(args) => ls(storage, args).await,
        Command::Rm(args) => rm(storage, args).await,
        Command::Stat(args) => stat(storage, args).await,
    }
}

/// Key of `name` inside the directory `prefix`.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

async fn put(storage: &RemoteStorage, store: &LocalStore, args: PutArgs) -> anyhow::Result<()> {
    store.create_bucket(&args.bucket).await?;

    let group = WriteGroup::new();
    for path in &args.files {
        let name = file_name(path)?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let key = object_key(&args.prefix, &name);
        let size = data.len();

        group.add_op(
            storage.put_async(&args.bucket, &key, Bytes::from(data)),
            name,
            move || {
                info!(key = %key, size, "uploaded");
                println!("{key}\t{size}");
                Ok(())
            },
        );
    }
    group.finish().await?;
    Ok(())
}

async fn get(storage: &RemoteStorage, args: GetArgs) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&args.out).await?;

    let group = ReadGroup::new();
    for name in &args.names {
        validate_object_key(name)?;
        let key = object_key(&args.prefix, name);
        let size = storage
            .size(&args.bucket, &key)
            .await
            .with_context(|| format!("cannot stat {}/{key}", args.bucket))?;
        let dest = args.out.join(name);

        group.add_returns_op(
            storage.get_async(&args.bucket, &key, 0, BytesMut::zeroed(size as usize)),
            name.clone(),
            move |data: BytesMut| {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&dest, &data)?;
                info!(key = %key, path = %dest.display(), size = data.len(), "downloaded");
                println!("{}", dest.display());
                Ok(())
            },
        );
    }
    group.finish().await?;
    Ok(())
}

async fn ls(storage: &RemoteStorage, args: LsArgs) -> anyhow::Result<()> {
    for name in storage.list(&args.bucket, &args.prefix).await? {
        println!("{name}");
    }
    Ok(())
}

async fn rm(storage: &RemoteStorage, args: RmArgs) -> anyhow::Result<()> {
    let names: Vec<String> = if args.all {
        storage
            .list(&args.bucket, &args.prefix)
            .await?
            .into_iter()
            .collect()
    } else if args.names.is_empty() {
        bail!("nothing to delete: name objects or pass --all");
    } else {
        args.names
    };

    storage.delete(&args.bucket, &args.prefix, &names).await?;
    info!(bucket = %args.bucket, prefix = %args.prefix, count = names.len(), "deleted");
    println!("deleted {} object(s)", names.len());
    Ok(())
}

async fn stat(storage: &RemoteStorage, args: StatArgs) -> anyhow::Result<()> {
    if !storage.exists(&args.bucket, &args.key).await? {
        bail!("{}/{} not found", args.bucket, args.key);
    }
    let size = storage.size(&args.bucket, &args.key).await?;
    println!("{}\t{size}", args.key);
    Ok(())
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .with_context(|| format!("{} has no usable file name", path.display()))
}
