/* 📖 # Why does every command share one error path?

All commands end in the same two outcomes: output on stdout and exit code 0,
or a `title: details` line on stderr and exit code 1. The exception is
`inject`, which exits with the child's own code so it can stand in for the
program it wraps in scripts.

Commands only wire things together. Fetching, feed handling and environment
building live in injector_client; formatting lives in `render`.
*/

mod cli;
mod render;

use std::fmt;
use std::ops::ControlFlow;
use std::process;

use clap::Parser;
use serde::de::DeserializeOwned;

use injector_base::tracing::{error, info, init_tracing};
use injector_base::{InjectorError, ReqwestTransport, TransportHandle};
use injector_client::{
    ApiClient, ClientConfig, Endpoints, Entity, FeedClient, FeedEvent, FeedHandle, LiveSet,
    LoadError, ProjectPageError, WatchError, build_environment, load_project_page, load_projects,
    resolve_api_url, resolve_event_url, run_with_environment,
};

use crate::cli::{Cli, Command, FeedKind, UrlKind};
use crate::render::{
    describe_project, describe_secret, render_change, render_project_page, render_projects,
};

enum Failure {
    Setup(Box<InjectorError>),
    Load(LoadError),
    Page(ProjectPageError),
    Watch(WatchError),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let load_error = match self {
            Self::Setup(e) => return write!(f, "Error: {}", e),
            Self::Load(e) => e,
            Self::Page(e) => &e.error,
            Self::Watch(WatchError::Rejected(e)) => e,
            Self::Watch(WatchError::GaveUp { last, .. }) => last,
        };
        write!(f, "{}: {}", load_error.title(), load_error.details())
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing() {
        eprintln!("Error: {}", e);
    }
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(failure) => {
            eprintln!("{}", failure);
            process::exit(1);
        }
    }
}

struct Clients {
    config: ClientConfig,
    api: ApiClient,
    feeds: FeedClient,
}

fn connect(config: ClientConfig) -> Result<Clients, Failure> {
    let transport = ReqwestTransport::new(config.request_timeout()).map_err(Failure::Setup)?;
    let transport = TransportHandle::new(transport);
    let endpoints = Endpoints::new(config.base_url.clone());
    Ok(Clients {
        api: ApiClient::new(transport.clone(), endpoints.clone()),
        feeds: FeedClient::new(transport, endpoints),
        config,
    })
}

fn run(cli: Cli) -> Result<i32, Failure> {
    let config = ClientConfig::load(cli.config.as_deref(), cli.base_url.as_deref())
        .map_err(Failure::Setup)?;
    info!(base_url = %config.base_url, "using backend");

    match cli.command {
        Command::Url { kind, path } => {
            let url = match kind {
                UrlKind::Api => resolve_api_url(&config.base_url, &path),
                UrlKind::Events => resolve_event_url(&config.base_url, &path),
            };
            println!("{}", url);
            Ok(0)
        }
        Command::Projects => {
            let clients = connect(config)?;
            let page = load_projects(&clients.api).map_err(Failure::Load)?;
            print!("{}", render_projects(&page.projects));
            Ok(0)
        }
        Command::Project { id, reveal } => {
            let clients = connect(config)?;
            let page = load_project_page(&clients.api, &id).map_err(|e| {
                if let Some(project) = &e.project {
                    eprintln!("{} ({})", project.name, project.id);
                }
                Failure::Page(e)
            })?;
            print!("{}", render_project_page(&page, reveal));
            Ok(0)
        }
        Command::Watch { feed, project } => {
            let clients = connect(config)?;
            watch(&clients, feed, project)?;
            Ok(0)
        }
        Command::Inject {
            project_ids,
            command,
        } => {
            let clients = connect(config)?;
            inject(&clients, &project_ids, &command)
        }
    }
}

fn watch(clients: &Clients, feed: FeedKind, project: Option<String>) -> Result<(), Failure> {
    let result = match (feed, project) {
        (FeedKind::Projects, None) => {
            let snapshot = clients.api.list_projects().map_err(Failure::Load)?;
            follow(clients, "projects", LiveSet::from_snapshot(snapshot), describe_project)
        }
        (FeedKind::Projects, Some(project_id)) => {
            let snapshot = vec![clients.api.get_project(&project_id).map_err(Failure::Load)?];
            let set = LiveSet::from_snapshot(snapshot).scoped(move |p| p.id == project_id);
            follow(clients, "projects", set, describe_project)
        }
        (FeedKind::Secrets, None) => {
            let snapshot = clients.api.list_secrets().map_err(Failure::Load)?;
            follow(clients, "secrets", LiveSet::from_snapshot(snapshot), describe_secret)
        }
        (FeedKind::Secrets, Some(project_id)) => {
            let snapshot = clients
                .api
                .list_project_secrets(&project_id)
                .map_err(Failure::Load)?;
            let set = LiveSet::from_snapshot(snapshot).scoped(move |s| s.project_id == project_id);
            follow(clients, "secrets", set, describe_secret)
        }
    };
    result.map_err(|e| {
        error!(error = %e, "watch ended");
        Failure::Watch(e)
    })
}

/// Apply every change of the feed at `path` to `set` and print what changed.
fn follow<T: Entity + DeserializeOwned>(
    clients: &Clients,
    path: &str,
    mut set: LiveSet<T>,
    describe: fn(&T) -> String,
) -> Result<(), WatchError> {
    info!(path, items = set.len(), "watching feed");
    let handle = FeedHandle::new();
    clients
        .feeds
        .watch::<T, _>(path, clients.config.reconnect_policy(), &handle, |event| {
            match event {
                FeedEvent::Connected { channel } => info!(?channel, "feed connected"),
                FeedEvent::Change(envelope) => {
                    let applied = set.apply(&envelope);
                    if let Some(line) = render_change(&envelope, applied, describe) {
                        println!("{}", line);
                    }
                }
            }
            ControlFlow::Continue(())
        })?;
    Ok(())
}

fn inject(clients: &Clients, project_ids: &[String], command: &[String]) -> Result<i32, Failure> {
    let Some((program, args)) = command.split_first() else {
        return Err(Failure::Setup(injector_base::err!("No program given after --")));
    };
    let mut secrets = Vec::new();
    for project_id in project_ids {
        let page = load_project_page(&clients.api, project_id).map_err(Failure::Page)?;
        info!(project_id = %page.project.id, secrets = page.secrets.len(), "loaded secrets");
        secrets.extend(page.secrets);
    }
    let env = build_environment(&secrets);
    let status = run_with_environment(program, args, &env).map_err(Failure::Setup)?;
    Ok(status.code().unwrap_or(1))
}
