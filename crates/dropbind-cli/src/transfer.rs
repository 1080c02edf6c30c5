//! Blocking transfers between local files and remote bindings

use crate::RemoteNotFound;
use anyhow::{Context, Result};
use dropbind::{runtime, Binder, BlockingUpload, BufferedUpload, FileBinding};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

fn transfer_bar(enabled: bool, len: Option<u64>, message: String) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let bar = match len {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::no_length(),
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(message);
    bar
}

/// Upload `local` to the binding's path; returns the bytes committed
pub fn put(
    binder: &Binder,
    binding: &FileBinding,
    params: &HashMap<String, String>,
    local: &Path,
    unbuffered: bool,
    progress: bool,
) -> Result<u64> {
    let remote = binder.path(binding, params)?;
    let resolver = binder.resolver(binding)?;

    let file = File::open(local).with_context(|| format!("Failed to open {:?}", local))?;
    let size = file.metadata().map(|m| m.len()).ok();

    let upload = if unbuffered {
        BufferedUpload::new(resolver.resolve_write(&remote), 0)
    } else {
        resolver.resolve_write_buffered(&remote)
    };
    let mut upload = BlockingUpload::new(upload)?;

    let bar = transfer_bar(progress, size, format!("Uploading {}", remote));
    let copied = io::copy(&mut bar.wrap_read(file), &mut upload)
        .with_context(|| format!("Failed to upload {:?} to {}", local, remote))?;
    bar.finish_and_clear();

    let committed = upload
        .finish()
        .with_context(|| format!("Failed to commit {}", remote))?;
    debug!(copied, committed, "Upload finished");
    Ok(committed)
}

/// Download the binding's file to `output`, or stdout; returns the bytes read
pub fn get(
    binder: &Binder,
    binding: &FileBinding,
    params: &HashMap<String, String>,
    output: Option<&Path>,
    progress: bool,
) -> Result<u64> {
    let remote = binder.path(binding, params)?;
    let resolver = binder.resolver(binding)?;

    let stream = runtime::block_on(resolver.resolve_read(&remote))??
        .ok_or_else(|| RemoteNotFound(remote.to_string()))?;

    let bar = transfer_bar(progress, stream.size(), format!("Downloading {}", remote));
    let mut reader = bar.wrap_read(stream.into_blocking()?);

    let copied = match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
            let mut writer = BufWriter::new(file);
            let copied = io::copy(&mut reader, &mut writer)?;
            writer.flush()?;
            copied
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            let copied = io::copy(&mut reader, &mut lock)?;
            lock.flush()?;
            copied
        }
    };
    bar.finish_and_clear();
    Ok(copied)
}
