use clap::Parser;
use color_eyre::eyre::{
    Result,
    eyre,
};
use fixture::{
    Fixture,
    FixtureIndexer,
};
use quest_engine::{
    EngineConfig,
    Felt,
    QuestTracker,
    QuestView,
    notify::Toast,
    tracker::system_clock,
};
use std::{
    path::PathBuf,
    sync::OnceLock,
};
use tracing_subscriber::EnvFilter;

mod fixture;

#[derive(Parser, Debug)]
#[command(version, about = "Replay a recorded quest session", long_about = None)]
struct Args {
    /// Recorded indexer session (initial records plus live batches).
    #[arg(short, long)]
    fixture: PathBuf,

    /// Player address whose quests are tracked.
    #[arg(short, long)]
    account: String,

    /// Engine configuration; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pin the clock (unix seconds) used to pick quest intervals.
    #[arg(long)]
    now: Option<u64>,

    /// Print the final quest list as JSON.
    #[arg(long, default_value = "false")]
    json: bool,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

static PINNED_NOW: OnceLock<u64> = OnceLock::new();

fn clock() -> u64 {
    PINNED_NOW.get().copied().unwrap_or_else(system_clock)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,quest_engine=debug")),
        )
        .try_init();
}

fn render(quests: &[QuestView]) -> String {
    let mut out = String::new();
    for quest in quests {
        let marker = match (quest.locked, quest.completed, quest.claimed) {
            (true, _, _) => "locked",
            (_, true, true) => "claimed",
            (_, true, false) => "done",
            _ => "open",
        };
        out.push_str(&format!(
            "[{marker:>7}] {} ({:.0}%) ends {}\n",
            quest.name, quest.progression, quest.end
        ));
        for task in &quest.tasks {
            out.push_str(&format!(
                "          - {} {}/{}\n",
                task.description, task.count, task.total
            ));
        }
    }
    out
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }
    if let Some(now) = args.now {
        let _ = PINNED_NOW.set(now);
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| eyre!("{e:#}"))?,
        None => EngineConfig::default(),
    };
    let account: Felt = args.account.parse()?;
    let fixture = Fixture::load(&args.fixture)?;

    let toaster = |toast: Toast| println!("* {}: {}", toast.title, toast.subtitle);
    let mut tracker =
        QuestTracker::new(FixtureIndexer::new(&fixture), toaster, config).with_clock(clock);
    tracker
        .set_account(Some(account))
        .await
        .map_err(|e| eyre!("{e:#}"))?;
    tracing::info!(state = ?tracker.state(), status = ?tracker.status(), "initial sync done");

    for batch in &fixture.live {
        if tracker.client().replay(batch) == 0 {
            tracing::warn!(stream = ?batch.stream, "no live subscription for batch");
            continue;
        }
        if let Some(event) = tracker.next_update().await {
            tracing::info!(?event, "applied live batch");
        }
    }
    tracker.shutdown();

    let quests = tracker.quests();
    if args.json {
        println!("{}", serde_json::to_string_pretty(quests.as_slice())?);
    } else {
        print!("{}", render(&quests));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use quest_engine::projector::TaskView;

    fn quest(name: &str, completed: bool, claimed: bool, locked: bool) -> QuestView {
        QuestView {
            id: Felt::from(1u64),
            interval_id: 0,
            name: name.to_string(),
            description: String::new(),
            registry: String::new(),
            end: 10,
            completed,
            claimed,
            locked,
            progression: 50.0,
            rewards: Vec::new(),
            tasks: vec![TaskView {
                id: Felt::from(1u64),
                description: "win".to_string(),
                total: 2,
                count: 1,
            }],
        }
    }

    #[test]
    fn render__marks_each_quest_state() {
        let out = render(&[
            quest("A", false, false, true),
            quest("B", true, true, false),
            quest("C", true, false, false),
            quest("D", false, false, false),
        ]);

        let lines: Vec<&str> = out.lines().filter(|l| l.starts_with('[')).collect();
        assert_eq!(lines[0], "[ locked] A (50%) ends 10");
        assert_eq!(lines[1], "[claimed] B (50%) ends 10");
        assert_eq!(lines[2], "[   done] C (50%) ends 10");
        assert_eq!(lines[3], "[   open] D (50%) ends 10");
        assert!(out.contains("- win 1/2"));
    }
}
