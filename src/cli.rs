use std::path::PathBuf;

use clap::ValueHint;

use crate::models::SourceKind;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// Defaults to `feed-roulette/config.toml` in the user's config directory.
    /// The file is created with default values if it does not exist.
    #[arg(
        long = "config",
        global = true,
        env = "FEED_ROULETTE_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Subscribe to a feed (or a page announcing one).
    Add { url: String },

    /// Refresh all due feeds, then read all suggestion sources.
    Update,

    /// Show what is known about a feed, source or suggestion.
    Inspect { id: String },

    /// Remove a feed and all of its items.
    Delete { id: String },

    /// Make an errored feed due on the next update.
    Reset { id: String },

    /// List suggestion sources.
    Sources,

    /// Add a suggestion source.
    AddSource {
        url: String,
        /// feed, list or opml
        #[arg(long, default_value = "feed", value_parser = source_kind)]
        kind: SourceKind,
    },

    /// Suggest a feed for moderation.
    Suggest { url: String },

    /// List pending suggestions.
    Suggestions,

    /// Subscribe to a suggested feed.
    Approve { id: String },

    /// Drop a suggestion.
    Reject { id: String },

    /// Suggest the blogs linked from a HackerNews thread (ID or URL).
    Hn { thread: String },

    /// Look up Mastodon profiles for feeds that have none.
    FindProfiles,

    /// Announce a random post on Mastodon.
    PostRandom,

    /// Set a runtime option (mastodon_instance, mastodon_token).
    Config { key: String, value: String },

    /// Regenerate the cached RSS feeds of random posts.
    Rss {
        /// Regenerate files that are still fresh.
        #[arg(long)]
        force: bool,
    },

    /// Print random posts.
    Random {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Print collection statistics as JSON.
    Stats,

    /// Print all feeds as JSON.
    Export,

    /// Run the web front end.
    Serve {
        /// Address to bind to, overriding the config file.
        #[arg(long)]
        bind_addr: Option<String>,
    },
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}

fn source_kind(value: &str) -> Result<SourceKind, String> {
    value.parse().map_err(|e: crate::error::AppError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn commands_parse() {
        let args = Args::try_parse_from([
            "feed-roulette",
            "add-source",
            "https://b.example/x.opml",
            "--kind",
            "opml",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::AddSource { kind: SourceKind::Opml, .. }
        ));

        let args =
            Args::try_parse_from(["feed-roulette", "random", "-n", "3", "--config", "/tmp/c.toml"])
                .unwrap();
        assert!(matches!(args.command, Command::Random { count: 3 }));
        assert_eq!(args.config_path, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn bad_source_kind_is_rejected() {
        let args = Args::try_parse_from(["feed-roulette", "add-source", "x", "--kind", "blog"]);
        assert!(args.is_err());
    }
}
