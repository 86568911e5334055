use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use cited::cli::{AskArgs, Cli, Command, IndexArgs, SessionAction};
use cited::config::Config;
use cited::env::Env;
use cited::fetch::{GithubFetcher, RemoteFetcher};
use cited::gateway::ToolGateway;
use cited::index;
use cited::models::RequestStatus;
use cited::oracle::rig::RigOracle;
use cited::orchestrator::{AskRequest, Orchestrator};
use cited::output;
use cited::session::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Ask(args) => run_ask(args).await,
        Command::Index(args) => run_index(args),
        Command::Session { action } => run_session(action),
    }
}

async fn run_ask(args: AskArgs) -> Result<()> {
    let env = Env::real();
    let mut config = Config::load(Some(&args.repo), &env)?;
    args.apply_to_config(&mut config);

    let oracle = RigOracle::new(config.provider.clone())
        .context("configure an LLM provider before asking questions")?;

    let (mut repo_index, report) =
        index::ingest(&args.repo, &config.index).context("failed to index the repository")?;
    if args.verbose {
        eprintln!(
            "{} {} files, {} chunks ({} skipped)",
            "indexed".dimmed(),
            repo_index.repo.total_files,
            repo_index.repo.total_chunks,
            report.skipped.len()
        );
    }
    if config.index.tags {
        let tag_report = index::tags::generate_tags(&mut repo_index, &oracle).await;
        if args.verbose {
            eprintln!(
                "{} {} tagged, {} untagged, {} failed batches",
                "tags".dimmed(),
                tag_report.tagged,
                tag_report.untagged,
                tag_report.failed_batches
            );
        }
    }
    let repo_index = Arc::new(repo_index);

    let fetcher: Option<Arc<dyn RemoteFetcher>> = match &config.remote.repo {
        Some(slug) => Some(Arc::new(GithubFetcher::new(
            &config.remote.api_base,
            slug,
            config.remote.token.clone(),
        )?)),
        None => None,
    };

    let session_store = match &args.session {
        Some(_) => Some(SessionStore::default_location()?),
        None => None,
    };
    let mut session = match (&args.session, &session_store) {
        (Some(name), Some(store)) => Some(store.open(name)?),
        _ => None,
    };
    let session_context = session.as_ref().map(|s| s.context()).unwrap_or_default();

    let gateway = Arc::new(ToolGateway::new(repo_index, fetcher, args.verbose));
    let orchestrator = Orchestrator::new(
        gateway,
        Arc::new(oracle),
        config.orchestrator.clone(),
        config.retrieval.clone(),
        args.verbose,
    );

    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let envelope = orchestrator
        .run(AskRequest {
            query: args.query.clone(),
            mode: args.mode,
            scope: args.scope,
            session_context,
        })
        .await;

    print!("{}", output::render(&envelope, args.format));

    if let (Some(session), Some(store)) = (session.as_mut(), &session_store) {
        session.record(&args.query, &envelope);
        store.save(session)?;
    }

    if envelope.status == RequestStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_index(args: IndexArgs) -> Result<()> {
    let env = Env::real();
    let config = Config::load(Some(&args.repo), &env)?;
    let (repo_index, report) =
        index::ingest(&args.repo, &config.index).context("failed to index the repository")?;

    println!(
        "{} {}",
        "indexed".green().bold(),
        args.repo.display()
    );
    println!("  files:      {}", repo_index.repo.total_files);
    println!("  chunks:     {}", repo_index.repo.total_chunks);
    println!("  vocabulary: {}", repo_index.lexical.vocabulary_size());
    println!("  epoch:      {}", repo_index.epoch());
    if !report.skipped.is_empty() {
        println!("  skipped:    {}", report.skipped.len());
        if args.verbose {
            for skip in &report.skipped {
                println!("    {} ({})", skip.path, skip.reason.dimmed());
            }
        }
    }
    Ok(())
}

fn run_session(action: SessionAction) -> Result<()> {
    let store = SessionStore::default_location()?;
    match action {
        SessionAction::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("no saved sessions");
            }
            for name in names {
                println!("{name}");
            }
        }
        SessionAction::Show { name } => match store.load(&name)? {
            Some(session) => {
                println!("{} ({} queries)", session.name.bold(), session.queries.len());
                for record in &session.queries {
                    println!("  {} {}", "Q".cyan(), record.query);
                    println!("    {}", record.summary.dimmed());
                }
            }
            None => println!("no session named {name:?}"),
        },
        SessionAction::Clear { name } => {
            store.clear(&name)?;
            println!("cleared session {name:?}");
        }
    }
    Ok(())
}
