use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Command {
    Feed,
    Post,
    Profile,
}

#[allow(
    clippy::struct_excessive_bools,
    reason = "this is not a state machine, but a set of flags"
)]
#[derive(Parser, Debug, Default)]
#[command(
    about = concat!(env!("CARGO_CRATE_NAME"), " - live photo and video feed"),
    disable_help_flag = true
)]
pub struct Flags {
    /// feed (default), post or profile
    #[arg(default_value = None)]
    pub command: Option<Command>,

    /// run against an in-process backend with simulated activity
    #[arg(long, action = ArgAction::SetTrue)]
    pub demo: bool,

    /// photo or video to share
    #[arg(long, value_name = "FILE")]
    pub media: Option<PathBuf>,

    /// where the post was taken
    #[arg(long)]
    pub location: Option<String>,

    /// usernames of collaborators
    #[arg(long)]
    pub collaborators: Option<String>,

    /// mark the post for sharing to facebook
    #[arg(long, action = ArgAction::SetTrue)]
    pub share_facebook: bool,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub full_name: Option<String>,

    #[arg(long)]
    pub about: Option<String>,

    /// profile image, a URL or a local file
    #[arg(long)]
    pub image: Option<String>,

    /// print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl Flags {
    /// Parse from `std::env::args_os()`, [exit][clap::Error::exit] on error.
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Feed)
    }
}
