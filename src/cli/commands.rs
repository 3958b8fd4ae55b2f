use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_BIND_ADDR;

#[derive(Parser)]
#[command(name = "mediafeed")]
#[command(about = "Feed gateway that injects self-hosted media enclosures")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
        bind: String,
    },

    /// Rewrite a local feed file and print the result
    Rewrite {
        /// Path to the feed document
        path: PathBuf,

        /// Base URL used in the injected download links
        #[arg(long, default_value = "http://localhost:8000")]
        base_url: String,

        /// Strip media enclosures already present in the feed
        #[arg(long)]
        remove_existing_media: bool,

        /// Drop short-form entries
        #[arg(long)]
        exclude_shorts: bool,

        /// Media namespace used when the feed declares none
        #[arg(long, env = "MEDIA_NAMESPACE")]
        media_namespace: Option<String>,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
