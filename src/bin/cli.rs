// filestream-core - Streaming file I/O for mobile
// Copyright (C) 2025 filestream-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use filestream_core::download::{DownloadCompleteEvent, DownloadErrorEvent};
use filestream_core::stream::{copy_file_with_progress, process_file_in_chunks};
use filestream_core::{DownloadConfig, DownloadManager, DownloadOptions, EngineConfig, ReadStreamOptions, StreamEngine};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filestream-cli")]
#[command(about = "filestream CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Engine config as JSON (defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file through a read stream and a write stream
    Copy {
        source: String,
        dest: String,
        /// Chunk size in bytes
        #[arg(short, long)]
        buffer_size: Option<usize>,
    },
    /// Read a file chunk by chunk and print a per-chunk summary
    Chunks {
        path: String,
        #[arg(short, long)]
        buffer_size: Option<usize>,
        /// First byte offset
        #[arg(long)]
        start: Option<u64>,
        /// Last byte offset, inclusive
        #[arg(long)]
        end: Option<u64>,
    },
    /// Download a URL to a file
    Download {
        url: String,
        dest: String,
        /// Report progress every N percent
        #[arg(long, default_value_t = 10)]
        progress_divider: u32,
        /// Connect timeout in milliseconds
        #[arg(long, default_value_t = 0)]
        connect_timeout: u64,
    },
}

enum DownloadEnd {
    Complete(DownloadCompleteEvent),
    Failed(DownloadErrorEvent),
    Resumable(u64),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Copy {
            source,
            dest,
            buffer_size,
        } => {
            let engine = StreamEngine::new(config)?;
            let mut last_tenth = -1i64;
            let bytes = copy_file_with_progress(&engine, &source, &dest, buffer_size, |ratio| {
                let tenth = (ratio * 10.0).floor() as i64;
                if tenth != last_tenth {
                    last_tenth = tenth;
                    println!("{:>3.0}%", ratio * 100.0);
                }
            })
            .await
            .with_context(|| format!("copying {} to {}", source, dest))?;
            println!("Copied {} bytes", bytes);
        }
        Commands::Chunks {
            path,
            buffer_size,
            start,
            end,
        } => {
            let engine = StreamEngine::new(config)?;
            let options = ReadStreamOptions {
                buffer_size,
                start,
                end,
            };
            let total = process_file_in_chunks(&engine, &path, options, |data, chunk, position| {
                println!("chunk {:>6} @ {:>10}: {} bytes", chunk, position, data.len());
                async { Ok(()) }
            })
            .await
            .with_context(|| format!("reading {}", path))?;
            println!("Read {} bytes", total);
        }
        Commands::Download {
            url,
            dest,
            progress_divider,
            connect_timeout,
        } => {
            let manager = DownloadManager::new(DownloadConfig::default())?;
            let (tx, mut rx) = mpsc::unbounded_channel();

            let _progress = manager.listen_to_download_progress(|event| match event.content_length {
                Some(length) => println!("{} / {} bytes", event.bytes_written, length),
                None => println!("{} bytes", event.bytes_written),
            });
            let complete_tx = tx.clone();
            let _complete = manager.listen_to_download_complete(move |event| {
                let _ = complete_tx.send(DownloadEnd::Complete(event));
            });
            let error_tx = tx.clone();
            let _error = manager.listen_to_download_error(move |event| {
                let _ = error_tx.send(DownloadEnd::Failed(event));
            });
            let _resumable = manager.listen_to_download_can_be_resumed(move |event| {
                let _ = tx.send(DownloadEnd::Resumable(event.bytes_written));
            });

            let mut options = DownloadOptions::new(1, url, dest);
            options.progress_divider = progress_divider;
            options.connection_timeout = connect_timeout;
            manager.download_file(options).await?;

            match rx.recv().await {
                Some(DownloadEnd::Complete(event)) if (200..300).contains(&event.status_code) => {
                    println!("Downloaded {} bytes", event.bytes_written);
                }
                Some(DownloadEnd::Complete(event)) => bail!("server answered HTTP {}", event.status_code),
                Some(DownloadEnd::Failed(event)) => bail!("download failed: {}", event.error),
                Some(DownloadEnd::Resumable(bytes)) => {
                    bail!("download interrupted after {} bytes", bytes)
                }
                None => bail!("download ended without a result"),
            }
        }
    }

    Ok(())
}
