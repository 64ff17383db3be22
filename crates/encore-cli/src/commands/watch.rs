use encore_core::QueueSnapshot;

use crate::commands::common::{expect_success, format_queue_lines, open_session};
use crate::error::CliError;

pub async fn run_watch(limit: usize, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_session(profile)?;
    let mut queue = engine.watch_queue();
    expect_success(engine.start().await)?;
    render(&queue.borrow_and_update(), limit);

    loop {
        tokio::select! {
            changed = queue.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&queue.borrow_and_update(), limit);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.stop().await;
    Ok(())
}

fn render(snapshot: &QueueSnapshot, limit: usize) {
    let stale = if snapshot.stale { ", stale" } else { "" };
    println!();
    println!(
        "[{}{stale}] {} request(s)",
        snapshot.connection,
        snapshot.requests.len()
    );
    let visible = snapshot
        .requests
        .iter()
        .take(limit)
        .cloned()
        .collect::<Vec<_>>();
    for line in format_queue_lines(&visible) {
        println!("{line}");
    }
}
