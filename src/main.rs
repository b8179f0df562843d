use clap::{Parser, Subcommand};
use log::{error, info};
use std::process::ExitCode;
use tokio_stream::StreamExt;
use vote_lock::{db, Config, PollId, PollResults, PollService, VoteCoordinator, VoteResult};

#[derive(Parser)]
#[command(name = "vote-lock", about = "Exclusive voting on shared polls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a poll and print its id
    Create {
        question: String,
        /// One argument per option
        options: Vec<String>,
        /// Options as newline-separated text instead
        #[arg(long, conflicts_with = "options")]
        options_text: Option<String>,
    },
    /// Cast a vote
    Vote {
        poll_id: String,
        option: String,
        voter_id: String,
    },
    /// Print a poll's current tally
    Show {
        poll_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Print every new snapshot of a poll until interrupted
    Watch { poll_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> vote_lock::Result<()> {
    // One store for the whole process, handed to both services.
    let store = db::open(&config).await?;
    let polls = PollService::new(store.clone());
    let votes = VoteCoordinator::new(store, config.retry.clone());

    match command {
        Command::Create {
            question,
            options,
            options_text,
        } => {
            let poll_id = match options_text {
                Some(text) => polls.create_poll_from_text(&question, &text).await?,
                None => polls.create_poll(&question, &options).await?,
            };
            println!("{}", poll_id);
        }
        Command::Vote {
            poll_id,
            option,
            voter_id,
        } => match votes.cast_vote(&PollId::from(poll_id), &option, &voter_id).await? {
            VoteResult::Voted(_) => println!("Your vote has been cast!"),
            VoteResult::AlreadyVoted => println!("You have already voted on this poll."),
        },
        Command::Show { poll_id, json } => {
            let poll_id = PollId::from(poll_id);
            let Some(poll) = polls.get_poll_snapshot(&poll_id).await? else {
                println!("Poll not found. It might have been deleted.");
                return Ok(());
            };
            let results = PollResults::from_poll(&poll);
            if json {
                let out = serde_json::json!({ "poll": poll, "results": results });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}\n\n{}", poll.question, results.summary());
            }
        }
        Command::Watch { poll_id } => {
            let mut snapshots = polls.subscribe(&PollId::from(poll_id)).await?;
            info!("Watching poll {}", snapshots.poll_id());
            loop {
                tokio::select! {
                    snapshot = snapshots.next() => match snapshot {
                        Some(poll) => {
                            let results = PollResults::from_poll(&poll);
                            println!("[v{}] {}\n{}\n", poll.version, poll.question, results.summary());
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}
