// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use chrono::{DateTime, Utc};
use console::style;
use std::io::Write;
use tabled::{Table, Tabled};
use tokio::io::AsyncReadExt;
use urifs_core::{
    CopyOptions, DiskUsage, DuOptions, EntryKind, FileSystem, FindOptions, Permissions,
    RemoveOptions, Uri, UrifsResult,
};
use urifs_vfs::UriFilesystem;

/// Fully-qualified form of a user-supplied argument
fn qualified(arg: &str) -> String {
    Uri::parse(arg)
        .map(|uri| uri.to_string())
        .unwrap_or_else(|_| arg.to_string())
}

fn format_time(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_size(size: Option<u64>, human: bool) -> String {
    match size {
        Some(s) if human => bytesize::ByteSize(s).to_string(),
        Some(s) => s.to_string(),
        None => "-".to_string(),
    }
}

fn format_kind(kind: EntryKind) -> String {
    match kind {
        EntryKind::Directory => style("d").cyan().to_string(),
        EntryKind::File => "-".to_string(),
        EntryKind::Symlink => style("l").magenta().to_string(),
        EntryKind::Unknown => "?".to_string(),
    }
}

fn format_permissions(permissions: Option<Permissions>) -> String {
    permissions
        .map(|p| p.to_rwx_string())
        .unwrap_or_else(|| "---------".to_string())
}

fn write_stdout(data: &[u8]) -> UrifsResult<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(data)?;
    stdout.flush()?;
    Ok(())
}

#[derive(Tabled)]
struct LsEntry {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Permissions")]
    perms: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "URI")]
    uri: String,
}

#[derive(Tabled)]
struct DuEntry {
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "URI")]
    uri: String,
}

/// List directory contents
pub async fn ls(fs: &UriFilesystem, path: &str, long: bool, human: bool) -> UrifsResult<()> {
    tracing::debug!(uri = %qualified(path), "listing");
    let entries = fs.ls(path).await?;

    if entries.is_empty() {
        println!("(empty directory)");
        return Ok(());
    }

    if long {
        let rows: Vec<LsEntry> = entries
            .into_iter()
            .map(|e| LsEntry {
                kind: format_kind(e.kind),
                perms: format_permissions(e.metadata.permissions),
                size: format_size(e.metadata.size, human),
                modified: format_time(e.metadata.modified),
                uri: e.path,
            })
            .collect();
        println!("{}", Table::new(rows));
    } else {
        for entry in entries {
            if entry.is_directory() {
                println!("{}", style(&entry.path).cyan());
            } else {
                println!("{}", entry.path);
            }
        }
    }

    Ok(())
}

/// Display file contents
pub async fn cat(fs: &UriFilesystem, path: &str) -> UrifsResult<()> {
    let data = fs.cat(path).await?;
    write_stdout(&data)
}

pub async fn head(fs: &UriFilesystem, path: &str, bytes: usize) -> UrifsResult<()> {
    let data = fs.head(path, bytes).await?;
    write_stdout(&data)
}

pub async fn tail(fs: &UriFilesystem, path: &str, bytes: usize) -> UrifsResult<()> {
    let data = fs.tail(path, bytes).await?;
    write_stdout(&data)
}

/// Copy files, within one backend or across two
pub async fn cp(fs: &UriFilesystem, source: &str, dest: &str, recursive: bool) -> UrifsResult<()> {
    fs.copy(source, dest, &CopyOptions { recursive }).await?;
    println!("Copied {} -> {}", qualified(source), qualified(dest));
    Ok(())
}

/// Remove files or directories
pub async fn rm(fs: &UriFilesystem, paths: &[String], recursive: bool) -> UrifsResult<()> {
    for path in paths {
        fs.rm(path, &RemoveOptions { recursive }).await?;
        println!("Removed {}", qualified(path));
    }
    Ok(())
}

/// Create directories
pub async fn mkdir(fs: &UriFilesystem, paths: &[String], parents: bool) -> UrifsResult<()> {
    for path in paths {
        if parents {
            fs.makedirs(path, true).await?;
        } else {
            fs.mkdir(path, false).await?;
        }
        println!("Created {}", qualified(path));
    }
    Ok(())
}

pub async fn touch(fs: &UriFilesystem, paths: &[String]) -> UrifsResult<()> {
    for path in paths {
        fs.touch(path, false).await?;
    }
    Ok(())
}

/// Show file/directory information
pub async fn stat(fs: &UriFilesystem, path: &str) -> UrifsResult<()> {
    let entry = fs.info(path).await?;

    println!("  URI: {}", entry.path);
    println!("  Type: {:?}", entry.kind);

    if let Some(size) = entry.metadata.size {
        println!("  Size: {} ({})", size, bytesize::ByteSize(size));
    }

    if let Some(perms) = entry.metadata.permissions {
        println!("  Mode: {:o} ({})", perms.mode, perms.to_rwx_string());
    }

    if let Some(modified) = entry.metadata.modified {
        println!("  Modified: {}", modified);
    }

    if let Some(created) = entry.metadata.created {
        println!("  Created: {}", created);
    }

    if let Some(hash) = &entry.metadata.content_hash {
        println!("  Hash: {}", hash);
    }

    Ok(())
}

pub async fn exists(fs: &UriFilesystem, path: &str) -> UrifsResult<bool> {
    let found = fs.exists(path).await?;
    let uri = qualified(path);
    if found {
        println!("{} {}", style("yes").green(), uri);
    } else {
        println!("{} {}", style("no").red(), uri);
    }
    Ok(found)
}

pub async fn find(
    fs: &UriFilesystem,
    path: &str,
    maxdepth: Option<usize>,
    dirs: bool,
) -> UrifsResult<()> {
    let options = FindOptions { maxdepth, withdirs: dirs };
    for uri in fs.find(path, &options).await? {
        println!("{uri}");
    }
    Ok(())
}

pub async fn glob(fs: &UriFilesystem, pattern: &str) -> UrifsResult<()> {
    for uri in fs.glob(pattern).await? {
        println!("{uri}");
    }
    Ok(())
}

/// Disk usage, per file or summarized
pub async fn du(fs: &UriFilesystem, path: &str, summarize: bool, human: bool) -> UrifsResult<()> {
    let options = DuOptions { total: summarize, maxdepth: None };
    let usage = fs.du(path, &options).await?;
    let total = usage.total();
    match usage {
        DiskUsage::Total(_) => {
            println!("{}\t{}", format_size(Some(total), human), qualified(path));
        }
        DiskUsage::PerPath(sizes) => {
            let mut rows: Vec<DuEntry> = sizes
                .into_iter()
                .map(|(uri, size)| DuEntry { size: format_size(Some(size), human), uri })
                .collect();
            rows.push(DuEntry {
                size: style(format_size(Some(total), human)).bold().to_string(),
                uri: style("total").bold().to_string(),
            });
            println!("{}", Table::new(rows));
        }
    }
    Ok(())
}

pub async fn checksum(fs: &UriFilesystem, paths: &[String]) -> UrifsResult<()> {
    for path in paths {
        let hash = fs.checksum(path).await?;
        println!("{hash}  {}", qualified(path));
    }
    Ok(())
}

/// Write everything on stdin to `path`
pub async fn put(fs: &UriFilesystem, path: &str) -> UrifsResult<()> {
    let mut data = Vec::new();
    tokio::io::stdin().read_to_end(&mut data).await?;
    let size = data.len() as u64;
    fs.pipe_file(path, data.into()).await?;
    eprintln!("Wrote {} to {}", bytesize::ByteSize(size), qualified(path));
    Ok(())
}

/// List supported URI schemes
pub fn schemes(fs: &UriFilesystem) {
    println!("Supported schemes:");
    for scheme in fs.container().factories().schemes() {
        println!("  {}://", style(scheme).green());
    }
}
