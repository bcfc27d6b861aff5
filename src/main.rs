use std::fs::OpenOptions;
use std::time::Duration;

use anyhow::Context;

use feedsync::cli::{Command, Flags};
use feedsync::controllers::{self, demo, Services};
use feedsync::models::{cache, Config};

fn init_logging() -> anyhow::Result<()> {
    let path = cache::log_file()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file at {:?}", path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    //Get Flags
    let flags = Flags::from_args();
    init_logging()?;

    let (services, config) = if flags.demo {
        let backend = demo::seeded_backend();
        demo::spawn_activity(backend.clone(), Duration::from_secs(3));
        (Services::memory(backend), Config::load().unwrap_or_default())
    } else {
        let mut config = Config::load()?;
        let services = Services::nostr(&mut config).await?;
        (services, config)
    };

    match flags.command() {
        Command::Post => {
            let post = controllers::publish_post(&services, &flags, &config).await?;
            println!("Posted {}", post.id);
            if flags.demo {
                // The in-process feed disappears on exit, so show it now.
                controllers::start_app(services, config, Some(post))
                    .await
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
            }
        }
        Command::Profile => {
            let session = controllers::complete_profile_from_flags(&services, &flags, &config).await?;
            println!("Profile saved for {}", session.user.metadata.username);
        }
        Command::Feed => {
            controllers::start_app(services, config, None)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
        }
    }
    Ok(())
}
