use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "injector")]
#[command(about = "Browse, watch and inject secrets from a Secret Injector backend")]
pub struct Cli {
    /// Config file (defaults to ./injector.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend origin, overrides the config file and PUBLIC_BASE_URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List projects
    Projects,
    /// Show a project and its secrets
    Project {
        id: String,
        /// Print secret values instead of masking them
        #[arg(long)]
        reveal: bool,
    },
    /// Stream changes of a feed
    Watch {
        feed: FeedKind,
        /// Only show changes of this project
        #[arg(long)]
        project: Option<String>,
    },
    /// Run a program with the secrets of one or more projects in its environment
    Inject {
        #[arg(required = true)]
        project_ids: Vec<String>,
        /// Program and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the resolved URL of a backend path
    Url { kind: UrlKind, path: String },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Projects,
    Secrets,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Api,
    Events,
}
