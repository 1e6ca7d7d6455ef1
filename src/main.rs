use std::sync::Arc;

mod app;
mod cli;
mod config;
mod db;
mod error;
mod feed;
mod ident;
mod models;
mod server;
mod services;

use app::App;
use cli::{Args, Command};
use config::Config;
use error::Result;
use server::Server;
use services::rss_cache::CacheStatus;

#[tokio::main]
async fn main() {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config_path.as_deref())?;
    let app = App::new(config).await?;

    match args.command {
        Command::Add { url } => {
            let feed = app.add_feed(&url).await?;
            println!("[{}] added {} ({})", feed.id, feed.title, feed.url);
        }

        Command::Update => {
            for outcome in app.update().await? {
                if let Err(e) = &outcome.result {
                    tracing::debug!("[{}] {:?}", outcome.id, e);
                }
                println!("{outcome}");
            }
        }

        Command::Inspect { id } => println!("{}", app.inspect(&id).await?),

        Command::Delete { id } => {
            app.delete_feed(&id).await?;
            println!("[{id}] deleted");
        }

        Command::Reset { id } => {
            let feed = app.reset_feed(&id).await?;
            println!("[{}] will be retried on the next update", feed.id);
        }

        Command::Sources => {
            for source in app.sources().await? {
                println!("[{}] {} {}", source.id, source.kind, source.url);
            }
        }

        Command::AddSource { url, kind } => {
            let source = app.add_source(&url, kind).await?;
            println!("[{}] added {} source {}", source.id, source.kind, source.url);
        }

        Command::Suggest { url } => {
            let suggestion = app.suggest(&url).await?;
            println!("[{}] suggested {}", suggestion.id, suggestion.url);
        }

        Command::Suggestions => {
            for s in app.suggestions().await? {
                let social = s.social.as_deref().unwrap_or("-");
                println!("[{}] {} <{}> {}", s.id, s.title, s.homepage, social);
            }
        }

        Command::Approve { id } => {
            let feed = app.approve(&id).await?;
            println!("[{}] added {} ({})", feed.id, feed.title, feed.url);
        }

        Command::Reject { id } => {
            app.reject(&id).await?;
            println!("[{id}] rejected");
        }

        Command::Hn { thread } => {
            let count = app.add_hackernews(&thread).await?;
            println!("{count} new suggestions");
        }

        Command::FindProfiles => {
            for (feed, handle) in app.find_profiles().await? {
                println!("[{}] {} is {}", feed.id, feed.homepage, handle);
            }
        }

        Command::PostRandom => println!("{}", app.post_random().await?),

        Command::Config { key, value } => {
            app.set_option(&key, &value).await?;
            println!("{key} set");
        }

        Command::Rss { force } => {
            for (freq, num, status) in app.regenerate_rss(force).await? {
                match status {
                    CacheStatus::Created(path) => {
                        println!("{freq} days, {num} posts: wrote {}", path.display());
                    }
                    CacheStatus::Fresh(left) => {
                        println!(
                            "{freq} days, {num} posts: still valid for {} minutes",
                            left.as_secs() / 60
                        );
                    }
                }
            }
        }

        Command::Random { count } => {
            for post in app.random_many(count).await? {
                println!("{} | {} | {}", post.feed_title, post.item_title, post.item_url);
            }
        }

        Command::Stats => println!("{}", serde_json::to_string_pretty(&app.stats().await?)?),

        Command::Export => println!("{}", serde_json::to_string_pretty(&app.export().await?)?),

        Command::Serve { bind_addr } => {
            let bind_addr = bind_addr.unwrap_or_else(|| app.config().bind_addr.clone());
            let server = Server::new(Arc::new(app), &bind_addr).await?;
            tracing::info!("Listening on {}", server.local_addr()?);
            server.serve().await?;
        }
    }

    Ok(())
}
